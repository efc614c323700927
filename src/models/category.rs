use serde::{Deserialize, Serialize};

/// What kind of instrumented invocation produced a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum CaseCategory {
    #[default]
    #[serde(rename = "function")]
    Function,
    #[serde(rename = "fixture")]
    Fixture,
    #[serde(rename = "fixture-teardown")]
    FixtureTeardown,
    #[serde(rename = "suite-function")]
    Suite,
}

impl CaseCategory {
    pub fn label(&self) -> &'static str {
        match self {
            CaseCategory::Function => "function",
            CaseCategory::Fixture => "fixture",
            CaseCategory::FixtureTeardown => "fixture-teardown",
            CaseCategory::Suite => "suite-function",
        }
    }

    /// Fixture records hold their suite's export until teardown has been accounted for.
    pub fn is_fixture(&self) -> bool {
        matches!(self, CaseCategory::Fixture | CaseCategory::FixtureTeardown)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum CaseStatus {
    #[default]
    Passed,
    Failed,
}

impl CaseStatus {
    pub fn icon(&self) -> &'static str {
        match self {
            CaseStatus::Passed => "✔",
            CaseStatus::Failed => "✘",
        }
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, CaseStatus::Failed)
    }
}
