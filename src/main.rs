use std::path::{Path, PathBuf};
use std::sync::Mutex;

use anyhow::{Context, Result, bail};
use serde_json::{Map, Value};
use tracing_subscriber::EnvFilter;

use junit_report::{CaseFormatKeys, CaseStatus, Config, JsonExporter};

const LOG_ENV: &str = "JUNIT_REPORT_LOG";
const DEBUG_FILE_ENV: &str = "JUNIT_REPORT_DEBUG";

const USAGE: &str = "usage: junit-report <suite-name> <file-or-glob>... \
[--dir <path>] [--failures-only] [--name-key <key>] [--severity-key <key>]";

#[derive(Debug, PartialEq, Eq)]
struct Args {
    suite: String,
    inputs: Vec<String>,
    dir: Option<PathBuf>,
    failures_only: bool,
    name_key: String,
    severity_key: String,
}

fn main() -> Result<()> {
    init_logging();

    let args = parse_args(std::env::args().skip(1))?;
    let config = Config::from_env();

    let mut entries = Vec::new();
    for path in expand_inputs(&args.inputs)? {
        let content = std::fs::read_to_string(&path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        let records = parse_records(&content)
            .with_context(|| format!("failed to parse {}", path.display()))?;
        tracing::debug!(path = %path.display(), records = records.len(), "input read");
        entries.extend(records);
    }

    let mut exporter = JsonExporter::with_config(
        CaseFormatKeys::new(&args.name_key, &args.severity_key),
        &config.export,
    );
    if args.failures_only {
        exporter = exporter.export_on_success(false);
    }

    let report_dir = config.resolve_report_dir(args.dir.as_deref());
    let persisted = exporter.collect(&entries, &report_dir, &args.suite)?;

    let status = if persisted.failures > 0 {
        CaseStatus::Failed
    } else {
        CaseStatus::Passed
    };
    println!(
        "{} {} ({} tests, {} failures)",
        status.icon(),
        persisted.path.display(),
        persisted.tests,
        persisted.failures
    );
    Ok(())
}

/// Log to stderr, or to the file named by `JUNIT_REPORT_DEBUG` when set.
fn init_logging() {
    let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("info"));

    let file = std::env::var(DEBUG_FILE_ENV).ok().and_then(|path| {
        std::fs::OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(path)
            .ok()
    });

    match file {
        Some(file) => tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_ansi(false)
            .with_writer(Mutex::new(file))
            .init(),
        None => tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init(),
    }
}

fn parse_args(mut args: impl Iterator<Item = String>) -> Result<Args> {
    let mut positional = Vec::new();
    let mut dir = None;
    let mut failures_only = false;
    let mut name_key = "message".to_string();
    let mut severity_key = "level".to_string();

    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--dir" => dir = Some(PathBuf::from(flag_value(&mut args, "--dir")?)),
            "--failures-only" => failures_only = true,
            "--name-key" => name_key = flag_value(&mut args, "--name-key")?,
            "--severity-key" => severity_key = flag_value(&mut args, "--severity-key")?,
            "-h" | "--help" => bail!(USAGE),
            flag if flag.starts_with("--") => bail!("unknown flag '{}'\n{}", flag, USAGE),
            _ => positional.push(arg),
        }
    }

    let mut positional = positional.into_iter();
    let Some(suite) = positional.next() else {
        bail!(USAGE);
    };
    let inputs: Vec<String> = positional.collect();
    if inputs.is_empty() {
        bail!("no input files given\n{}", USAGE);
    }

    Ok(Args {
        suite,
        inputs,
        dir,
        failures_only,
        name_key,
        severity_key,
    })
}

fn flag_value(args: &mut impl Iterator<Item = String>, flag: &str) -> Result<String> {
    args.next()
        .with_context(|| format!("{} expects a value", flag))
}

/// Expand glob patterns. A pattern matching nothing is an error.
fn expand_inputs(patterns: &[String]) -> Result<Vec<PathBuf>> {
    let mut paths = Vec::new();
    for pattern in patterns {
        let before = paths.len();
        let matches =
            glob::glob(pattern).with_context(|| format!("invalid pattern '{}'", pattern))?;
        for entry in matches {
            let path = entry?;
            if path.is_file() {
                paths.push(path);
            }
        }
        if paths.len() == before {
            let literal = Path::new(pattern);
            if !literal.is_file() {
                bail!("no input matches '{}'", pattern);
            }
            paths.push(literal.to_path_buf());
        }
    }
    Ok(paths)
}

/// A JSON array of records, or one record per line. Lines that are not JSON objects are skipped.
fn parse_records(content: &str) -> Result<Vec<Map<String, Value>>> {
    let trimmed = content.trim_start();
    if trimmed.starts_with('[') {
        return Ok(serde_json::from_str(trimmed)?);
    }

    let mut records = Vec::new();
    for line in content.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        match serde_json::from_str::<Map<String, Value>>(line) {
            Ok(record) => records.push(record),
            Err(_) => tracing::debug!(line, "skipping non-JSON line"),
        }
    }
    Ok(records)
}
