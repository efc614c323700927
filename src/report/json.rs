use std::path::Path;

use chrono::{DateTime, FixedOffset, Local};
use quick_junit::{NonSuccessKind, Report, TestCase, TestCaseStatus, TestSuite, XmlString};
use serde_json::{Map, Value};

use super::{Persisted, persist};
use crate::config::ExportConfig;
use crate::error::Result;

/// Which fields of a log record feed the report.
#[derive(Debug, Clone)]
pub struct CaseFormatKeys {
    pub case_name: String,
    pub severity_key: String,
    /// Defaults to `case_name`.
    pub case_classname: Option<String>,
    /// Defaults to `case_name`.
    pub case_category: Option<String>,
    pub case_timestamp: Option<String>,
}

impl CaseFormatKeys {
    pub fn new(case_name: impl Into<String>, severity_key: impl Into<String>) -> Self {
        Self {
            case_name: case_name.into(),
            severity_key: severity_key.into(),
            case_classname: None,
            case_category: None,
            case_timestamp: None,
        }
    }

    fn classname_key(&self) -> &str {
        self.case_classname.as_deref().unwrap_or(&self.case_name)
    }

    fn category_key(&self) -> &str {
        self.case_category.as_deref().unwrap_or(&self.case_name)
    }
}

/// Batch converter from structured log records to one report document.
///
/// Every record becomes a case (or only the failing ones when `export_on_success` is off);
/// records whose severity is in the allow-list fail, with the pretty-printed record as the
/// failure text and the severity as its kind.
#[derive(Debug, Clone)]
pub struct JsonExporter {
    keys: CaseFormatKeys,
    report_prefix: String,
    severities: Vec<String>,
    export_on_success: bool,
}

impl JsonExporter {
    pub fn new(keys: CaseFormatKeys) -> Self {
        Self::with_config(keys, &ExportConfig::default())
    }

    pub fn with_config(keys: CaseFormatKeys, config: &ExportConfig) -> Self {
        Self {
            keys,
            report_prefix: config.report_prefix.clone(),
            severities: config.severities.clone(),
            export_on_success: config.export_on_success,
        }
    }

    pub fn export_on_success(mut self, enabled: bool) -> Self {
        self.export_on_success = enabled;
        self
    }

    pub fn severities<I, S>(mut self, severities: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.severities = severities.into_iter().map(Into::into).collect();
        self
    }

    pub fn report_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.report_prefix = prefix.into();
        self
    }

    pub fn file_name(&self, suite_name: &str) -> String {
        format!("{}_{}.xml", self.report_prefix, suite_name)
    }

    /// Build the report document for `entries`.
    pub fn render(&self, entries: &[Map<String, Value>], suite_name: &str) -> Report {
        let mut timestamp = None;
        let mut suite = TestSuite::new(suite_name);

        for entry in entries {
            let severity = field(entry, &self.keys.severity_key);
            let failed = severity
                .as_deref()
                .is_some_and(|s| self.severities.iter().any(|allowed| allowed == s));
            if !failed && !self.export_on_success {
                continue;
            }

            let case_timestamp = self.entry_timestamp(entry);
            timestamp.get_or_insert(case_timestamp);
            let failed_severity = if failed { severity } else { None };
            suite.add_test_case(self.render_case(entry, failed_severity, case_timestamp));
        }

        suite.set_timestamp(timestamp.unwrap_or_else(|| Local::now().fixed_offset()));

        let mut report = Report::new(suite_name);
        report.add_test_suite(suite);
        report
    }

    /// Render `entries` and write `{prefix}_{suite_name}.xml` into `report_dir`.
    pub fn collect(
        &self,
        entries: &[Map<String, Value>],
        report_dir: &Path,
        suite_name: &str,
    ) -> Result<Persisted> {
        let report = self.render(entries, suite_name);
        persist(&report, report_dir, &self.file_name(suite_name))
    }

    fn render_case(
        &self,
        entry: &Map<String, Value>,
        failed_severity: Option<String>,
        timestamp: DateTime<FixedOffset>,
    ) -> TestCase {
        let status = match failed_severity {
            Some(severity) => {
                let text = serde_json::to_string_pretty(entry).unwrap_or_default();
                let mut status = TestCaseStatus::non_success(NonSuccessKind::Failure);
                status.set_message(text.as_str());
                status.set_description(text.as_str());
                status.set_type(severity.as_str());
                status
            }
            None => TestCaseStatus::success(),
        };

        let name = field(entry, &self.keys.case_name).unwrap_or_default();
        let mut case = TestCase::new(name.as_str(), status);
        if let Some(classname) = field(entry, self.keys.classname_key()) {
            case.set_classname(classname.as_str());
        }
        if let Some(category) = field(entry, self.keys.category_key()) {
            case.extra
                .insert(XmlString::new("class"), XmlString::new(category));
        }
        case.set_timestamp(timestamp);
        case
    }

    fn entry_timestamp(&self, entry: &Map<String, Value>) -> DateTime<FixedOffset> {
        self.keys
            .case_timestamp
            .as_deref()
            .and_then(|key| field(entry, key))
            .and_then(|raw| DateTime::parse_from_rfc3339(&raw).ok())
            .unwrap_or_else(|| Local::now().fixed_offset())
    }
}

/// String form of a record field; non-string values use their JSON text.
fn field(entry: &Map<String, Value>, key: &str) -> Option<String> {
    match entry.get(key)? {
        Value::String(s) => Some(s.clone()),
        Value::Null => None,
        other => Some(other.to_string()),
    }
}
