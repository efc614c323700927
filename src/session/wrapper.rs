use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::time::Instant;

use crate::error::{Error, Result};
use crate::failure::{CaseFailure, CaseResult};
use crate::models::{
    CaseCategory, CaseRecord, FailurePhase, FailureRecord, Parametrization, RecordId, SuiteKey,
    Target,
};

use super::Session;
use super::context::{CallContext, Frame, FrameKind};
use super::{params, resolver};

pub(crate) type PanicPayload = Box<dyn Any + Send + 'static>;

/// How an instrumented body ended.
pub(crate) enum Outcome<T> {
    Returned(CaseResult<T>),
    Panicked(PanicPayload),
}

impl<T> Outcome<T> {
    pub(crate) fn is_failed(&self) -> bool {
        !matches!(self, Outcome::Returned(Ok(_)))
    }

    /// Hand the outcome to the caller unchanged. A caught panic resumes with its original payload.
    pub(crate) fn into_result(self) -> CaseResult<T> {
        match self {
            Outcome::Returned(result) => result,
            Outcome::Panicked(payload) => panic::resume_unwind(payload),
        }
    }
}

fn panic_failure(payload: &PanicPayload) -> CaseFailure {
    let message = payload
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "panic with a non-string payload".to_string());
    CaseFailure::msg("panic", message)
}

/// A finished invocation waiting for its end hook.
pub(crate) struct Invocation {
    pub(crate) target: Target,
    pub(crate) record: CaseRecord,
    /// Context the invocation was called from, without its own frame.
    pub(crate) context: CallContext,
}

impl Session {
    /// Run `body` under `frame`, catching panics. The context is restored afterwards.
    pub(crate) fn guarded<T, F>(&mut self, frame: Frame, body: F) -> Outcome<T>
    where
        F: FnOnce(&mut Session) -> CaseResult<T>,
    {
        let depth = self.context.depth();
        self.context.push(frame);
        self.panic_recorded = false;

        let result = panic::catch_unwind(AssertUnwindSafe(|| body(self)));
        self.context.truncate(depth);

        match result {
            Ok(result) => Outcome::Returned(result),
            Err(payload) => Outcome::Panicked(payload),
        }
    }

    /// Time `body` and prepare the record describing it.
    pub(crate) fn instrument<T, F>(
        &mut self,
        frame: Frame,
        target: &Target,
        category: CaseCategory,
        body: F,
    ) -> (Invocation, Outcome<T>)
    where
        F: FnOnce(&mut Session) -> CaseResult<T>,
    {
        let context = self.context.snapshot();
        let record = CaseRecord::new(self.next_record_id(), target, category);
        let started = Instant::now();

        let outcome = self.guarded(frame, body);

        let mut invocation = Invocation {
            target: target.clone(),
            record,
            context,
        };
        invocation.record.elapsed = started.elapsed();
        (invocation, outcome)
    }

    /// Failure to write for this invocation, or `None` when it passed or an inner invocation
    /// already recorded the same failure.
    pub(crate) fn unrecorded_failure<T>(
        &mut self,
        outcome: &mut Outcome<T>,
        phase: FailurePhase,
    ) -> Option<FailureRecord> {
        match outcome {
            Outcome::Returned(Ok(_)) => None,
            Outcome::Returned(Err(failure)) => {
                if failure.is_recorded() {
                    return None;
                }
                failure.mark_recorded();
                Some(FailureRecord::from_failure(failure, phase))
            }
            Outcome::Panicked(payload) => {
                if self.panic_recorded {
                    return None;
                }
                self.panic_recorded = true;
                Some(FailureRecord::from_failure(&panic_failure(payload), phase))
            }
        }
    }

    /// End hook of a case or fixture: resolve its suite and parent, then hand the record over.
    /// Returns where the record was stored, if it was kept.
    pub(crate) fn finish(
        &mut self,
        invocation: Invocation,
        is_fixture: bool,
    ) -> Result<Option<(SuiteKey, RecordId)>> {
        let Invocation {
            target,
            mut record,
            context,
        } = invocation;

        let resolution = resolver::resolve(&context, &target, is_fixture);
        tracing::debug!(
            case = %target,
            suite = ?resolution.suite,
            parent = ?resolution.parent,
            inside_fixture = resolution.inside_fixture,
            via_item = resolution.via_item,
            "invocation resolved"
        );
        if let Some(parent) = &resolution.parent {
            record.set_parent(parent);
        }
        if let Some(key) = &resolution.suite
            && let Some(state) = self.registry.get(key)
        {
            record.set_parametrize(params::extract(&context, &state.spec().parametrize));
        }

        let id = record.id;
        let kept = self
            .registry
            .register_case(record, resolution.suite.as_ref())?;
        Ok(if kept {
            resolution.suite.map(|key| (key, id))
        } else {
            None
        })
    }

    /// Combine the body's outcome with the end hook's result.
    ///
    /// The body's own failure always wins. A strict-mode missing suite fails an otherwise
    /// passing invocation; other bookkeeping errors are logged and kept on the session.
    pub(crate) fn settle<T>(&mut self, outcome: Outcome<T>, hook: Result<()>) -> Outcome<T> {
        let Err(error) = hook else {
            return outcome;
        };
        match outcome {
            Outcome::Returned(Ok(_)) if matches!(error, Error::SuiteNotFound { .. }) => {
                let mut failure = CaseFailure::from_engine(error);
                failure.mark_recorded();
                Outcome::Returned(Err(failure))
            }
            outcome => {
                self.note_error(error);
                outcome
            }
        }
    }

    /// Run `body` as a test case.
    ///
    /// The case's record lands in the closest enclosing suite. A failure is recorded here
    /// and passed on unchanged; enclosing cases see it as already recorded.
    pub fn case<T, F>(&mut self, target: Target, body: F) -> CaseResult<T>
    where
        F: FnOnce(&mut Session) -> CaseResult<T>,
    {
        self.case_with(target, Parametrization::new(), body)
    }

    /// Like [`Session::case`], binding argument values visible to parametrization lookup.
    pub fn case_with<T, F>(
        &mut self,
        target: Target,
        bindings: Parametrization,
        body: F,
    ) -> CaseResult<T>
    where
        F: FnOnce(&mut Session) -> CaseResult<T>,
    {
        let frame = Frame::new(FrameKind::Case(target.clone()), bindings);
        let (mut invocation, mut outcome) =
            self.instrument(frame, &target, CaseCategory::Function, body);
        if let Some(failure) = self.unrecorded_failure(&mut outcome, FailurePhase::Call) {
            invocation.record.add_failure(failure);
        }

        let hook = self.finish(invocation, false).map(|_| ());
        self.settle(outcome, hook).into_result()
    }

    /// Run a registered suite. `bindings` carries the values of its parametrized arguments.
    ///
    /// Cases invoked by `body` accumulate in the suite. A failure no case recorded becomes the
    /// suite's own failing entry. The report is written when the body returns, unless a
    /// fixture of the suite still awaits teardown.
    pub fn run_suite<T, F>(
        &mut self,
        key: &SuiteKey,
        bindings: Parametrization,
        body: F,
    ) -> CaseResult<T>
    where
        F: FnOnce(&mut Session) -> CaseResult<T>,
    {
        let Some(state) = self.registry.get(key) else {
            return Err(CaseFailure::from_engine(Error::UnknownSuite(key.clone())));
        };

        let frame = Frame::new(FrameKind::Suite(key.clone()), bindings);
        let mut context = self.context.snapshot();
        context.push(frame.clone());
        let params = params::extract(&context, &state.spec().parametrize);
        self.registry.begin(key, &params);

        let (invocation, mut outcome) = self.instrument(frame, key, CaseCategory::Suite, body);

        let mut hook = Ok(());
        if let Some(failure) = self.unrecorded_failure(&mut outcome, FailurePhase::Suite) {
            let mut record = invocation.record;
            record.set_parametrize(params);
            record.add_failure(failure);
            tracing::debug!(suite = %key, "suite failed outside of its cases");
            hook = self.registry.set_self_failure(key, record);
        }
        let hook = hook.and_then(|()| self.registry.export(key, false).map(|_| ()));

        self.settle(outcome, hook).into_result()
    }
}
