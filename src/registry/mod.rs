pub mod state;

use std::collections::BTreeMap;
use std::path::PathBuf;

use crate::error::{Error, Result};
use crate::models::{CaseRecord, Parametrization, RecordId, SuiteKey};
use crate::report::{self, Persisted};

pub use state::{SuiteSpec, SuiteState};

/// Maps each suite key to the records contributed to it since its last export.
///
/// Lifecycle per suite: registered (empty) -> accumulating -> exported (empty, reusable),
/// cycling back to accumulating for the next permutation of a parametrized suite.
#[derive(Debug, Default)]
pub struct SuiteRegistry {
    suites: BTreeMap<SuiteKey, SuiteState>,
    fail_on_missing_suite: bool,
}

impl SuiteRegistry {
    pub fn new(fail_on_missing_suite: bool) -> Self {
        Self {
            suites: BTreeMap::new(),
            fail_on_missing_suite,
        }
    }

    /// Register a suite. Registering the same target twice is an error.
    pub fn register(&mut self, spec: SuiteSpec, report_dir: PathBuf) -> Result<SuiteKey> {
        let key = spec.target.clone();
        if self.suites.contains_key(&key) {
            return Err(Error::DuplicateSuite(key));
        }
        tracing::debug!(suite = %key, dir = %report_dir.display(), "suite registered");
        self.suites
            .insert(key.clone(), SuiteState::new(spec, report_dir));
        Ok(key)
    }

    pub fn contains(&self, key: &SuiteKey) -> bool {
        self.suites.contains_key(key)
    }

    pub fn get(&self, key: &SuiteKey) -> Option<&SuiteState> {
        self.suites.get(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &SuiteKey> {
        self.suites.keys()
    }

    /// Drop a suite entirely; used by harnesses that tear suites down between sessions.
    pub fn remove(&mut self, key: &SuiteKey) -> Option<SuiteState> {
        self.suites.remove(key)
    }

    /// Start a new permutation of `key`, remembering the parametrization its report is named by.
    pub fn begin(&mut self, key: &SuiteKey, params: &Parametrization) {
        if let Some(state) = self.suites.get_mut(key)
            && !params.is_empty()
        {
            state.params = params.clone();
        }
    }

    /// Append `record` to its suite. Returns whether the record was kept.
    ///
    /// An unknown or missing key drops the record, or fails with [`Error::SuiteNotFound`]
    /// when `fail_on_missing_suite` is set.
    pub fn register_case(&mut self, record: CaseRecord, key: Option<&SuiteKey>) -> Result<bool> {
        let Some(state) = key.and_then(|k| self.suites.get_mut(k)) else {
            if self.fail_on_missing_suite {
                return Err(Error::SuiteNotFound { case: record.name });
            }
            tracing::warn!(case = %record.name, "no suite found for case, record dropped");
            return Ok(false);
        };

        if record.category.is_fixture() {
            state.undrained_fixture = true;
        }
        if state.params.is_empty() && !record.parametrize.is_empty() {
            state.params = record.parametrize.clone();
        }
        tracing::debug!(case = %record.name, suite = %state.spec.target, "case registered");
        state.records.push(record);
        Ok(true)
    }

    pub fn set_self_failure(&mut self, key: &SuiteKey, record: CaseRecord) -> Result<()> {
        let state = self
            .suites
            .get_mut(key)
            .ok_or_else(|| Error::UnknownSuite(key.clone()))?;
        state.self_failure = Some(record);
        Ok(())
    }

    pub fn record_mut(&mut self, key: &SuiteKey, id: RecordId) -> Option<&mut CaseRecord> {
        self.suites.get_mut(key)?.record_mut(id)
    }

    /// Write the suite's report and clear it.
    ///
    /// Nothing is written when the suite holds no records, or when a fixture is still waiting
    /// for teardown and `force` is off; in that case the records are kept.
    pub fn export(&mut self, key: &SuiteKey, force: bool) -> Result<Option<Persisted>> {
        let state = self
            .suites
            .get_mut(key)
            .ok_or_else(|| Error::UnknownSuite(key.clone()))?;

        if state.is_empty() {
            return Ok(None);
        }
        if state.undrained_fixture && !force {
            tracing::debug!(suite = %key, "export deferred until fixture teardown");
            return Ok(None);
        }

        let suite_name = key.report_name();
        let document = report::render(&suite_name, &state.report_records(), state.created_at);
        let file_name = report::report_file_name(
            &suite_name,
            &state.params,
            state.spec.custom_filename.as_deref(),
        );
        let persisted = report::persist(&document, &state.report_dir, &file_name)?;
        state.clear();

        tracing::info!(
            suite = %key,
            path = %persisted.path.display(),
            tests = persisted.tests,
            failures = persisted.failures,
            "suite exported"
        );
        Ok(Some(persisted))
    }

    /// Export every known suite. All suites are attempted; the first error is returned.
    pub fn collect_all(&mut self, force: bool) -> Result<Vec<Persisted>> {
        let keys: Vec<SuiteKey> = self.suites.keys().cloned().collect();
        let mut written = Vec::new();
        let mut first_error = None;

        for key in keys {
            match self.export(&key, force) {
                Ok(Some(persisted)) => written.push(persisted),
                Ok(None) => {}
                Err(e) => {
                    tracing::error!(suite = %key, error = %e, "suite export failed");
                    first_error.get_or_insert(e);
                }
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(written),
        }
    }

    /// The last fixture the suite still held, set up by record `id`, has been released.
    ///
    /// The suite's export was deferred while its fixtures were pending; it is written now.
    /// Nothing happens when the record is no longer held (the suite was exported meanwhile).
    pub fn fixture_cleanup(&mut self, id: RecordId, key: &SuiteKey) -> Result<Option<Persisted>> {
        let Some(state) = self.suites.get_mut(key) else {
            return Ok(None);
        };
        if !state.records.iter().any(|r| r.id == id) {
            return Ok(None);
        }

        state.undrained_fixture = false;
        self.export(key, true)
    }
}
