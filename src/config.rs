use std::path::{Path, PathBuf};

use serde::Deserialize;

pub const REPORT_DIR_ENV: &str = "JUNIT_REPORT_DIR";
pub const FAIL_ON_MISSING_SUITE_ENV: &str = "FAIL_ON_MISSING_SUITE";
pub const CONFIG_FILE: &str = "junit-report.toml";

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    /// Directory reports are written to when a suite does not name its own.
    /// Falls back to the current working directory.
    #[serde(default)]
    pub report_dir: Option<PathBuf>,
    /// Fail an invocation that cannot be correlated to any suite instead of dropping its record.
    #[serde(default)]
    pub fail_on_missing_suite: bool,
    #[serde(default)]
    pub export: ExportConfig,
}

/// Defaults for the structured-log exporter.
#[derive(Debug, Clone, Deserialize)]
pub struct ExportConfig {
    /// Severity values that turn a log record into a failing case.
    /// Example: ["error", "critical", "fatal"]
    #[serde(default = "default_severities")]
    pub severities: Vec<String>,
    #[serde(default = "default_report_prefix")]
    pub report_prefix: String,
    /// Emit passing records as cases too, not only the failing ones.
    #[serde(default = "default_true")]
    pub export_on_success: bool,
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            severities: default_severities(),
            report_prefix: default_report_prefix(),
            export_on_success: true,
        }
    }
}

fn default_severities() -> Vec<String> {
    vec!["error".into(), "critical".into(), "fatal".into()]
}

fn default_report_prefix() -> String {
    "junit_report".into()
}

fn default_true() -> bool {
    true
}

impl Config {
    /// Load `junit-report.toml` from `dir`, falling back to defaults if absent or invalid.
    pub fn load(dir: &Path) -> Self {
        let path = dir.join(CONFIG_FILE);
        let Ok(content) = std::fs::read_to_string(&path) else {
            return Self::default();
        };
        match toml::from_str(&content) {
            Ok(config) => config,
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "ignoring invalid config file");
                Self::default()
            }
        }
    }

    /// Load from the current directory, then apply environment overrides.
    pub fn from_env() -> Self {
        let cwd = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
        let mut config = Self::load(&cwd);
        config.apply_env(|key| std::env::var(key).ok());
        config
    }

    /// Apply overrides from a variable lookup (the process environment in `from_env`).
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(dir) = lookup(REPORT_DIR_ENV).filter(|d| !d.is_empty()) {
            self.report_dir = Some(PathBuf::from(dir));
        }
        if let Some(flag) = lookup(FAIL_ON_MISSING_SUITE_ENV) {
            self.fail_on_missing_suite = parse_flag(&flag);
        }
    }

    /// Resolve the report directory: explicit argument, then configuration, then the cwd.
    pub fn resolve_report_dir(&self, explicit: Option<&Path>) -> PathBuf {
        explicit
            .map(Path::to_path_buf)
            .or_else(|| self.report_dir.clone())
            .unwrap_or_else(|| std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")))
    }
}

pub fn parse_flag(value: &str) -> bool {
    matches!(
        value.trim().to_lowercase().as_str(),
        "true" | "1" | "yes" | "y"
    )
}
