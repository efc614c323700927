pub mod category;
pub mod params;
pub mod record;

pub use category::{CaseCategory, CaseStatus};
pub use params::{ParamDecl, Parametrization};
pub use record::{CaseRecord, FailurePhase, FailureRecord, RecordId, SuiteKey, Target};
