use std::marker::PhantomData;

use crate::failure::{CaseFailure, CaseResult};
use crate::models::{CaseCategory, FailurePhase, RecordId, SuiteKey, Target};

use super::Session;
use super::context::{Frame, FrameKind};
use super::wrapper::Outcome;

/// A setup/teardown resource provider.
///
/// `setup` runs before the suite body and its record joins the suite of the pending item.
/// `teardown` runs once when the item (or the session) releases the fixture.
pub trait Fixture {
    type Value;

    fn target(&self) -> &Target;

    fn setup(&mut self, session: &mut Session) -> CaseResult<Self::Value>;

    fn teardown(&mut self, _session: &mut Session) -> CaseResult<()> {
        Ok(())
    }

    /// Fixtures without a teardown step are done as soon as setup returns.
    fn has_teardown(&self) -> bool {
        true
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FixtureState {
    NotStarted,
    SetupRunning,
    /// Setup returned its value; teardown is pending.
    Suspended,
    TeardownRunning,
    Done,
    Failed,
}

impl FixtureState {
    pub fn is_finished(&self) -> bool {
        matches!(self, FixtureState::Done | FixtureState::Failed)
    }
}

type NoTeardown = fn(&mut Session) -> CaseResult<()>;

/// A fixture built from closures.
pub struct FnFixture<S, D, T> {
    target: Target,
    setup: S,
    teardown: Option<D>,
    _value: PhantomData<fn() -> T>,
}

impl<S, D, T> FnFixture<S, D, T>
where
    S: FnMut(&mut Session) -> CaseResult<T>,
    D: FnMut(&mut Session) -> CaseResult<()>,
{
    pub fn new(target: Target, setup: S, teardown: D) -> Self {
        Self {
            target,
            setup,
            teardown: Some(teardown),
            _value: PhantomData,
        }
    }
}

impl<S, T> FnFixture<S, NoTeardown, T>
where
    S: FnMut(&mut Session) -> CaseResult<T>,
{
    /// A fixture that only sets up.
    pub fn plain(target: Target, setup: S) -> Self {
        Self {
            target,
            setup,
            teardown: None,
            _value: PhantomData,
        }
    }
}

impl<S, D, T> Fixture for FnFixture<S, D, T>
where
    S: FnMut(&mut Session) -> CaseResult<T>,
    D: FnMut(&mut Session) -> CaseResult<()>,
{
    type Value = T;

    fn target(&self) -> &Target {
        &self.target
    }

    fn setup(&mut self, session: &mut Session) -> CaseResult<T> {
        (self.setup)(session)
    }

    fn teardown(&mut self, session: &mut Session) -> CaseResult<()> {
        match &mut self.teardown {
            Some(teardown) => teardown(session),
            None => Ok(()),
        }
    }

    fn has_teardown(&self) -> bool {
        self.teardown.is_some()
    }
}

/// Teardown half of a fixture, with its value type erased.
pub(crate) trait Teardown {
    fn run(&mut self, session: &mut Session) -> CaseResult<()>;
}

impl<F: Fixture> Teardown for F {
    fn run(&mut self, session: &mut Session) -> CaseResult<()> {
        self.teardown(session)
    }
}

/// A fixture whose setup completed and whose release is still owed.
pub(crate) struct ActiveFixture {
    pub(crate) target: Target,
    /// Where the setup record is stored, if it was kept.
    pub(crate) record: Option<(SuiteKey, RecordId)>,
    /// `None` for fixtures without a teardown step; they only signal cleanup.
    pub(crate) teardown: Option<Box<dyn Teardown>>,
}

impl Session {
    /// Set up `fixture` and return its value.
    ///
    /// The setup is recorded like a case of the pending item's suite. On failure the error is
    /// returned unchanged and every suite is exported; no teardown is owed. On success the
    /// fixture is released by [`Session::exit_item`], [`Session::teardown_fixture`] or
    /// [`Session::close`].
    pub fn setup_fixture<F>(&mut self, mut fixture: F) -> CaseResult<F::Value>
    where
        F: Fixture + 'static,
    {
        let target = fixture.target().clone();
        self.set_fixture_state(&target, FixtureState::SetupRunning);

        let frame = Frame::bare(FrameKind::Fixture(target.clone()));
        let (mut invocation, mut outcome) =
            self.instrument(frame, &target, CaseCategory::Fixture, |s| fixture.setup(s));
        if let Some(failure) = self.unrecorded_failure(&mut outcome, FailurePhase::Call) {
            invocation.record.add_failure(failure);
        }
        let hook = self.finish(invocation, true);

        if outcome.is_failed() {
            self.set_fixture_state(&target, FixtureState::Failed);
            if let Err(e) = hook {
                self.note_error(e);
            }
            if let Err(e) = self.registry.collect_all(true) {
                self.note_error(e);
            }
            return outcome.into_result();
        }

        let (record, hook) = match hook {
            Ok(record) => (record, Ok(())),
            Err(e) => (None, Err(e)),
        };
        let teardown: Option<Box<dyn Teardown>> = if fixture.has_teardown() {
            self.set_fixture_state(&target, FixtureState::Suspended);
            Some(Box::new(fixture))
        } else {
            self.set_fixture_state(&target, FixtureState::Done);
            None
        };
        self.fixtures.push(ActiveFixture {
            target,
            record,
            teardown,
        });

        self.settle(outcome, hook).into_result()
    }

    /// Release the most recently set up active fixture named by `target`.
    /// Releasing a fixture that is not active does nothing.
    pub fn teardown_fixture(&mut self, target: &Target) -> CaseResult<()> {
        let Some(index) = self.fixtures.iter().rposition(|f| &f.target == target) else {
            tracing::debug!(fixture = %target, "fixture is not active");
            return Ok(());
        };
        let active = self.fixtures.remove(index);
        for scope in &mut self.item_scopes {
            if scope.fixtures > index {
                scope.fixtures -= 1;
            }
        }
        self.drive_teardown(active).into_result()
    }

    /// Run the teardown of `active`, attach any failure to its setup record and signal cleanup.
    pub(crate) fn drive_teardown(&mut self, mut active: ActiveFixture) -> Outcome<()> {
        let Some(mut teardown) = active.teardown.take() else {
            self.cleanup_fixture(&active);
            return Outcome::Returned(Ok(()));
        };

        self.set_fixture_state(&active.target, FixtureState::TeardownRunning);
        let frame = Frame::bare(FrameKind::Fixture(active.target.clone()));
        let mut outcome = self.guarded(frame, |s| teardown.run(s));

        if let Some(failure) = self.unrecorded_failure(&mut outcome, FailurePhase::Teardown) {
            let record = active
                .record
                .as_ref()
                .and_then(|(key, id)| self.registry.record_mut(key, *id));
            match record {
                Some(record) => {
                    record.category = CaseCategory::FixtureTeardown;
                    record.add_failure(failure);
                }
                None => tracing::warn!(
                    fixture = %active.target,
                    "setup record already exported, teardown failure not reported"
                ),
            }
        }

        let failed = outcome.is_failed();
        let state = if failed {
            FixtureState::Failed
        } else {
            FixtureState::Done
        };
        self.set_fixture_state(&active.target, state);
        self.cleanup_fixture(&active);
        outcome
    }

    /// Export the fixture's suite once no other fixture of that suite is still held.
    /// While one is, its own teardown may still add a failure to the held records.
    fn cleanup_fixture(&mut self, active: &ActiveFixture) {
        let Some((key, id)) = &active.record else {
            return;
        };
        let sibling_held = self
            .fixtures
            .iter()
            .any(|f| f.record.as_ref().is_some_and(|(k, _)| k == key));
        if sibling_held {
            tracing::debug!(
                fixture = %active.target,
                suite = %key,
                "export waits for held fixtures"
            );
            return;
        }
        if let Err(e) = self.registry.fixture_cleanup(*id, key) {
            self.note_error(e);
        }
    }

    /// Release held fixtures above index `start`, most recent first. Every fixture is released
    /// even when a teardown fails. All failures are returned, chained onto the first one; a
    /// caught panic resumes once every fixture is released.
    pub(crate) fn release_from(&mut self, start: usize) -> Outcome<()> {
        let mut failure: Option<CaseFailure> = None;
        let mut panicked = None;

        while self.fixtures.len() > start {
            let Some(active) = self.fixtures.pop() else {
                break;
            };
            match self.drive_teardown(active) {
                Outcome::Returned(Ok(())) => {}
                Outcome::Returned(Err(later)) => match &mut failure {
                    Some(first) => first.chain(later),
                    None => failure = Some(later),
                },
                Outcome::Panicked(payload) => {
                    if panicked.is_none() {
                        panicked = Some(payload);
                    }
                }
            }
        }

        match (panicked, failure) {
            (Some(payload), failure) => {
                if let Some(failure) = failure {
                    tracing::warn!(error = %failure, "teardown failures superseded by a panic");
                }
                Outcome::Panicked(payload)
            }
            (None, Some(failure)) => Outcome::Returned(Err(failure)),
            (None, None) => Outcome::Returned(Ok(())),
        }
    }

    pub fn fixture_state(&self, target: &Target) -> FixtureState {
        self.fixture_states
            .get(target)
            .copied()
            .unwrap_or(FixtureState::NotStarted)
    }

    fn set_fixture_state(&mut self, target: &Target, state: FixtureState) {
        tracing::trace!(fixture = %target, ?state, "fixture state");
        self.fixture_states.insert(target.clone(), state);
    }
}
