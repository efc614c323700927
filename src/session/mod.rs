pub mod context;
pub mod fixture;
pub mod params;
pub mod resolver;
mod wrapper;

use std::collections::BTreeMap;

use crate::config::Config;
use crate::error::{Error, Result};
use crate::failure::CaseResult;
use crate::models::{Parametrization, RecordId, SuiteKey, Target};
use crate::registry::{SuiteRegistry, SuiteSpec};
use crate::report::Persisted;

use context::{CallContext, Frame, FrameKind};
use fixture::{ActiveFixture, FixtureState};

/// Fixtures acquired and context depth at the moment a runner item was entered.
#[derive(Debug, Clone, Copy)]
struct ItemScope {
    fixtures: usize,
    depth: usize,
}

/// One test session: the suites it knows about and the invocations currently running.
///
/// Harness integration is three calls per runner item: [`Session::enter_item`], then
/// fixture setups and [`Session::run_suite`], then [`Session::exit_item`].
pub struct Session {
    config: Config,
    registry: SuiteRegistry,
    context: CallContext,
    fixtures: Vec<ActiveFixture>,
    fixture_states: BTreeMap<Target, FixtureState>,
    item_scopes: Vec<ItemScope>,
    next_record: u64,
    /// A caught panic was already written into a record by an inner invocation.
    panic_recorded: bool,
    errors: Vec<Error>,
}

impl Session {
    pub fn new(config: Config) -> Self {
        let registry = SuiteRegistry::new(config.fail_on_missing_suite);
        Self {
            config,
            registry,
            context: CallContext::new(),
            fixtures: Vec::new(),
            fixture_states: BTreeMap::new(),
            item_scopes: Vec::new(),
            next_record: 0,
            panic_recorded: false,
            errors: Vec::new(),
        }
    }

    /// Session configured from `junit-report.toml` and the environment.
    pub fn from_env() -> Self {
        Self::new(Config::from_env())
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn registry(&self) -> &SuiteRegistry {
        &self.registry
    }

    pub fn registry_mut(&mut self) -> &mut SuiteRegistry {
        &mut self.registry
    }

    /// Number of live frames in the calling context.
    pub fn depth(&self) -> usize {
        self.context.depth()
    }

    pub fn register_suite(&mut self, spec: SuiteSpec) -> Result<SuiteKey> {
        let report_dir = self.config.resolve_report_dir(spec.report_dir.as_deref());
        self.registry.register(spec, report_dir)
    }

    /// The runner is about to execute the suite `key` with argument values `bindings`.
    /// Fixtures set up from here on belong to this item.
    pub fn enter_item(&mut self, key: &SuiteKey, bindings: Parametrization) {
        self.item_scopes.push(ItemScope {
            fixtures: self.fixtures.len(),
            depth: self.context.depth(),
        });
        self.context
            .push(Frame::new(FrameKind::Item(key.clone()), bindings));
    }

    /// Release the item's fixtures in reverse acquisition order and leave the item.
    pub fn exit_item(&mut self) -> CaseResult<()> {
        let Some(scope) = self.item_scopes.pop() else {
            tracing::warn!("exit_item called without a matching enter_item");
            return Ok(());
        };

        let outcome = self.release_from(scope.fixtures);
        self.context.truncate(scope.depth);
        outcome.into_result()
    }

    /// End the session: release every fixture still held, then export what is left.
    pub fn close(&mut self) -> CaseResult<()> {
        let outcome = self.release_from(0);
        self.item_scopes.clear();
        self.context.truncate(0);
        if let Err(e) = self.registry.collect_all(false) {
            self.note_error(e);
        }
        outcome.into_result()
    }

    /// Export every suite holding records. `force` ignores pending fixture teardowns.
    pub fn collect_all(&mut self, force: bool) -> Result<Vec<Persisted>> {
        self.registry.collect_all(force)
    }

    /// Bookkeeping errors that were logged instead of failing an invocation.
    pub fn take_errors(&mut self) -> Vec<Error> {
        std::mem::take(&mut self.errors)
    }

    pub(crate) fn note_error(&mut self, error: Error) {
        tracing::error!(error = %error, "report bookkeeping failed");
        self.errors.push(error);
    }

    pub(crate) fn next_record_id(&mut self) -> RecordId {
        self.next_record += 1;
        RecordId(self.next_record)
    }
}

impl Default for Session {
    fn default() -> Self {
        Self::new(Config::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::failure::CaseFailure;
    use crate::session::fixture::FnFixture;

    fn session(dir: &std::path::Path) -> Session {
        Session::new(Config {
            report_dir: Some(dir.to_path_buf()),
            ..Config::default()
        })
    }

    #[test]
    fn items_restore_the_context() {
        let mut session = Session::default();
        let key = Target::new("A", "suite");
        session.enter_item(&key, Parametrization::new());
        assert_eq!(session.depth(), 1);
        session.exit_item().unwrap();
        assert_eq!(session.depth(), 0);
        session.exit_item().unwrap();
    }

    #[test]
    fn duplicate_suite_is_an_error() {
        let mut session = Session::default();
        session.register_suite(SuiteSpec::new("A", "suite")).unwrap();
        let err = session
            .register_suite(SuiteSpec::new("A", "suite"))
            .unwrap_err();
        assert!(matches!(err, Error::DuplicateSuite(_)));
    }

    #[test]
    fn suite_report_dir_overrides_session() {
        let session_dir = tempfile::tempdir().unwrap();
        let suite_dir = tempfile::tempdir().unwrap();
        let mut session = session(session_dir.path());
        let key = session
            .register_suite(SuiteSpec::new("A", "suite").report_dir(suite_dir.path()))
            .unwrap();
        session
            .run_suite(&key, Parametrization::new(), |s| {
                s.case(Target::new("A", "a"), |_| Ok(()))
            })
            .unwrap();
        assert!(suite_dir.path().join("junit_A_suite_report.xml").exists());
        assert!(!session_dir.path().join("junit_A_suite_report.xml").exists());
    }

    #[test]
    fn close_releases_session_fixtures() {
        let dir = tempfile::tempdir().unwrap();
        let mut session = session(dir.path());
        let key = session.register_suite(SuiteSpec::new("A", "suite")).unwrap();
        let target = Target::new("A", "held");

        session.enter_item(&key, Parametrization::new());
        session
            .setup_fixture(FnFixture::new(target.clone(), |_| Ok(()), |_| {
                Err(CaseFailure::msg("IOError", "close failed"))
            }))
            .unwrap();
        // Left without exit_item, as when a runner aborts.
        let err = session.close().unwrap_err();
        assert_eq!(err.kind(), "IOError");
        assert_eq!(session.depth(), 0);
        assert_eq!(session.fixture_state(&target), FixtureState::Failed);

        let xml =
            std::fs::read_to_string(dir.path().join("junit_A_suite_report.xml")).unwrap();
        assert!(xml.contains("[TEARDOWN EXCEPTION] close failed"));
        assert!(xml.contains("class=\"fixture-teardown\""));
    }
}
