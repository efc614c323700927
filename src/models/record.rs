use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};

use super::category::{CaseCategory, CaseStatus};
use super::params::Parametrization;
use crate::failure::CaseFailure;

/// An instrumented callable: the owning class or module name plus the function name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Target {
    pub owner: String,
    pub name: String,
}

impl Target {
    pub fn new(owner: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            owner: owner.into(),
            name: name.into(),
        }
    }

    /// `{owner}_{name}`, the suite name used in reports.
    pub fn report_name(&self) -> String {
        format!("{}_{}", self.owner, self.name)
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.owner, self.name)
    }
}

/// Correlation key of a suite: its undecorated target.
pub type SuiteKey = Target;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RecordId(pub u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum FailurePhase {
    #[default]
    Call,
    Teardown,
    Suite,
}

impl FailurePhase {
    pub fn message_prefix(&self) -> Option<&'static str> {
        match self {
            FailurePhase::Call => None,
            FailurePhase::Teardown => Some("[TEARDOWN EXCEPTION]"),
            FailurePhase::Suite => Some("[SUITE EXCEPTION]"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailureRecord {
    pub message: String,
    pub output: String,
    pub kind: String,
    pub phase: FailurePhase,
}

impl FailureRecord {
    pub fn from_failure(failure: &CaseFailure, phase: FailurePhase) -> Self {
        let message = match phase.message_prefix() {
            Some(prefix) => format!("{} {}", prefix, failure.message()),
            None => failure.message(),
        };
        Self {
            message,
            output: failure.trace(),
            kind: failure.kind().to_string(),
            phase,
        }
    }
}

/// One report entry produced by a single instrumented invocation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CaseRecord {
    pub id: RecordId,
    pub name: String,
    pub classname: String,
    pub category: CaseCategory,
    pub started_at: DateTime<Local>,
    pub elapsed: Duration,
    pub failures: Vec<FailureRecord>,
    pub parametrize: Parametrization,
    pub parent: Option<String>,
}

impl CaseRecord {
    pub fn new(id: RecordId, target: &Target, category: CaseCategory) -> Self {
        Self {
            id,
            name: target.name.clone(),
            classname: target.owner.clone(),
            category,
            started_at: Local::now(),
            elapsed: Duration::ZERO,
            failures: Vec::new(),
            parametrize: Parametrization::new(),
            parent: None,
        }
    }

    /// Rename the record with its parametrization suffix. Empty parametrization is a no-op.
    pub fn set_parametrize(&mut self, params: Parametrization) {
        if params.is_empty() {
            return;
        }
        self.name.push_str(&params.case_suffix());
        self.parametrize = params;
    }

    pub fn set_parent(&mut self, parent: &str) {
        if self.parent.is_some() {
            return;
        }
        self.classname = format!("{}.{}", self.classname, parent);
        self.parent = Some(parent.to_string());
    }

    pub fn add_failure(&mut self, failure: FailureRecord) {
        self.failures.push(failure);
    }

    pub fn status(&self) -> CaseStatus {
        if self.failures.is_empty() {
            CaseStatus::Passed
        } else {
            CaseStatus::Failed
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record() -> CaseRecord {
        CaseRecord::new(
            RecordId(1),
            &Target::new("A", "case"),
            CaseCategory::Function,
        )
    }

    #[test]
    fn parametrize_renames_once() {
        let mut r = record();
        r.set_parametrize([("version", "6.5")].into_iter().collect());
        assert_eq!(r.name, "case(version=6.5)");

        let mut r = record();
        r.set_parametrize(Parametrization::new());
        assert_eq!(r.name, "case");
    }

    #[test]
    fn parent_qualifies_classname() {
        let mut r = record();
        r.set_parent("outer");
        r.set_parent("outermost");
        assert_eq!(r.classname, "A.outer");
        assert_eq!(r.parent.as_deref(), Some("outer"));
    }

    #[test]
    fn teardown_failures_are_prefixed() {
        let failure = CaseFailure::msg("ValueError", "boom");
        let f = FailureRecord::from_failure(&failure, FailurePhase::Teardown);
        assert_eq!(f.message, "[TEARDOWN EXCEPTION] boom");
        assert_eq!(f.kind, "ValueError");

        let mut r = record();
        r.add_failure(f);
        assert!(r.status().is_failed());
    }
}
