use std::path::PathBuf;

use thiserror::Error;

use crate::models::SuiteKey;

/// Bookkeeping and configuration errors raised by the report engine itself.
///
/// Failures of user code are never represented here; they travel as
/// [`CaseFailure`](crate::CaseFailure) so the caller gets the original error back.
#[derive(Debug, Error)]
pub enum Error {
    /// The same suite target was registered twice.
    #[error("suite '{0}' already exists")]
    DuplicateSuite(SuiteKey),

    /// An invocation could not be correlated to any registered suite while
    /// `fail_on_missing_suite` is enabled.
    #[error("can't find a suite for test case '{case}'")]
    SuiteNotFound { case: String },

    /// A suite key was used that was never registered.
    #[error("unknown suite '{0}'")]
    UnknownSuite(SuiteKey),

    #[error("failed to write report '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to serialize report: {0}")]
    Serialize(#[from] quick_junit::SerializeError),

    #[error("invalid configuration: {0}")]
    Config(String),
}

impl Error {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Short label used as the failure kind when this error surfaces from an invocation.
    pub fn kind(&self) -> &'static str {
        match self {
            Error::DuplicateSuite(_) => "DuplicateSuiteError",
            Error::SuiteNotFound { .. } => "SuiteNotFoundError",
            Error::UnknownSuite(_) => "UnknownSuiteError",
            Error::Io { .. } => "IoError",
            Error::Serialize(_) => "SerializeError",
            Error::Config(_) => "ConfigError",
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
