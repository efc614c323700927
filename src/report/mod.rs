pub mod json;

use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{DateTime, FixedOffset};
use quick_junit::{NonSuccessKind, Report, TestCase, TestCaseStatus, TestSuite, XmlString};

use crate::error::{Error, Result};
use crate::models::{CaseRecord, FailureRecord, Parametrization};

pub const REPORT_FILE_PREFIX: &str = "junit_";
pub const REPORT_FILE_SUFFIX: &str = "_report";

/// A report written to disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Persisted {
    pub path: PathBuf,
    pub tests: usize,
    pub failures: usize,
}

/// Build the report document for one suite from its accumulated records.
pub fn render(
    suite_name: &str,
    records: &[CaseRecord],
    timestamp: impl Into<DateTime<FixedOffset>>,
) -> Report {
    let mut suite = TestSuite::new(suite_name);
    suite.set_timestamp(timestamp);
    suite.set_time(records.iter().map(|r| r.elapsed).sum::<Duration>());
    for record in records {
        suite.add_test_case(render_case(record));
    }

    let mut report = Report::new(suite_name);
    report.add_test_suite(suite);
    report
}

fn render_case(record: &CaseRecord) -> TestCase {
    let status = match record.failures.split_first() {
        None => TestCaseStatus::success(),
        Some((first, rest)) => {
            let mut status = TestCaseStatus::non_success(NonSuccessKind::Failure);
            let output = failure_output(first, rest);
            status.set_message(first.message.as_str());
            status.set_type(first.kind.as_str());
            status.set_description(output.as_str());
            status
        }
    };

    let mut case = TestCase::new(record.name.as_str(), status);
    case.set_classname(record.classname.as_str());
    case.set_time(record.elapsed);
    case.set_timestamp(record.started_at.fixed_offset());
    case.extra.insert(
        XmlString::new("class"),
        XmlString::new(record.category.label()),
    );
    case
}

/// junit `<failure>` holds a single message; later failures of the same record are appended
/// to the output text.
fn failure_output(first: &FailureRecord, rest: &[FailureRecord]) -> String {
    let mut output = first.output.clone();
    for failure in rest {
        output.push_str(&format!(
            "\n\n{}: {}\n{}",
            failure.kind, failure.message, failure.output
        ));
    }
    output
}

/// `junit_{suite}_report.xml`, `junit_{suite}_report[{v1_v2}].xml` when parametrized, or
/// `{custom}.xml` when a custom name is configured.
pub fn report_file_name(
    suite_name: &str,
    params: &Parametrization,
    custom_filename: Option<&str>,
) -> String {
    if let Some(custom) = custom_filename {
        return format!("{}.xml", custom);
    }
    if params.is_empty() {
        format!("{REPORT_FILE_PREFIX}{suite_name}{REPORT_FILE_SUFFIX}.xml")
    } else {
        format!(
            "{REPORT_FILE_PREFIX}{suite_name}{REPORT_FILE_SUFFIX}[{}].xml",
            params.values_joined()
        )
    }
}

pub fn serialize(report: &Report) -> Result<String> {
    Ok(report.to_string()?)
}

/// Write `report` to `dir/file_name`, creating `dir` if needed. The file is replaced atomically.
pub fn persist(report: &Report, dir: &Path, file_name: &str) -> Result<Persisted> {
    let xml = serialize(report)?;

    std::fs::create_dir_all(dir).map_err(|e| Error::io(dir, e))?;
    let path = dir.join(file_name);

    let mut file = tempfile::Builder::new()
        .prefix(".junit-report-")
        .suffix(".xml")
        .tempfile_in(dir)
        .map_err(|e| Error::io(dir, e))?;
    file.write_all(xml.as_bytes())
        .map_err(|e| Error::io(file.path(), e))?;
    file.persist(&path).map_err(|e| Error::io(&path, e.error))?;

    tracing::debug!(path = %path.display(), tests = report.tests, "report written");

    Ok(Persisted {
        path,
        tests: report.tests,
        failures: report.failures,
    })
}
