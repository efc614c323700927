use std::path::PathBuf;

use chrono::{DateTime, Local};

use crate::models::{CaseRecord, ParamDecl, Parametrization, RecordId, Target};

/// Declaration of a suite, made once when the suite is instrumented.
#[derive(Debug, Clone)]
pub struct SuiteSpec {
    pub target: Target,
    /// Overrides the session's report directory.
    pub report_dir: Option<PathBuf>,
    /// Replaces the derived report file name entirely (`{custom}.xml`).
    pub custom_filename: Option<String>,
    /// Parametrization declarations in application order, innermost first.
    pub parametrize: Vec<ParamDecl>,
}

impl SuiteSpec {
    pub fn new(owner: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            target: Target::new(owner, name),
            report_dir: None,
            custom_filename: None,
            parametrize: Vec::new(),
        }
    }

    pub fn report_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.report_dir = Some(dir.into());
        self
    }

    pub fn custom_filename(mut self, name: impl Into<String>) -> Self {
        self.custom_filename = Some(name.into());
        self
    }

    /// Apply one parametrization declaration. Like stacked decorators, each call wraps the
    /// previous ones: the last declaration applied is reported first.
    pub fn parametrize<I, V>(mut self, name: impl Into<String>, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: ToString,
    {
        self.parametrize.push(ParamDecl::new(name, values));
        self
    }
}

/// Accumulated state of one suite between two exports.
#[derive(Debug)]
pub struct SuiteState {
    pub(crate) spec: SuiteSpec,
    pub(crate) report_dir: PathBuf,
    pub(crate) records: Vec<CaseRecord>,
    pub(crate) undrained_fixture: bool,
    pub(crate) created_at: DateTime<Local>,
    pub(crate) self_failure: Option<CaseRecord>,
    pub(crate) params: Parametrization,
}

impl SuiteState {
    pub(crate) fn new(spec: SuiteSpec, report_dir: PathBuf) -> Self {
        Self {
            spec,
            report_dir,
            records: Vec::new(),
            undrained_fixture: false,
            created_at: Local::now(),
            self_failure: None,
            params: Parametrization::new(),
        }
    }

    pub fn spec(&self) -> &SuiteSpec {
        &self.spec
    }

    pub fn records(&self) -> &[CaseRecord] {
        &self.records
    }

    pub fn self_failure(&self) -> Option<&CaseRecord> {
        self.self_failure.as_ref()
    }

    pub fn has_undrained_fixture(&self) -> bool {
        self.undrained_fixture
    }

    pub fn params(&self) -> &Parametrization {
        &self.params
    }

    pub fn report_dir(&self) -> &std::path::Path {
        &self.report_dir
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.records.is_empty() && self.self_failure.is_none()
    }

    /// Records in report order: contributed cases, then the suite's own failure if any.
    pub(crate) fn report_records(&self) -> Vec<CaseRecord> {
        self.records
            .iter()
            .chain(self.self_failure.iter())
            .cloned()
            .collect()
    }

    pub(crate) fn record_mut(&mut self, id: RecordId) -> Option<&mut CaseRecord> {
        self.records.iter_mut().find(|r| r.id == id)
    }

    pub(crate) fn clear(&mut self) {
        self.records.clear();
        self.self_failure = None;
        self.undrained_fixture = false;
        self.params = Parametrization::new();
    }
}
