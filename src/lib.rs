//! JUnit XML reports for instrumented test suites.
//!
//! A [`Session`] tracks which suite, case and fixture invocations are running, records each
//! one as a report entry and writes one JUnit XML file per suite (per parametrization
//! permutation). [`JsonExporter`] turns structured log records into the same report format.

pub mod config;
pub mod error;
pub mod failure;
pub mod models;
pub mod registry;
pub mod report;
pub mod session;

pub use config::Config;
pub use error::{Error, Result};
pub use failure::{CaseFailure, CaseResult};
pub use models::{
    CaseCategory, CaseRecord, CaseStatus, FailurePhase, FailureRecord, ParamDecl, Parametrization,
    SuiteKey, Target,
};
pub use registry::{SuiteRegistry, SuiteSpec};
pub use report::Persisted;
pub use report::json::{CaseFormatKeys, JsonExporter};
pub use session::Session;
pub use session::fixture::{Fixture, FixtureState, FnFixture};
