// shared-types-rs/src/lib.rs
// Types exchanged between the classifier, gateway, sandbox validator and
// orchestrator crates. Nothing here performs I/O.

pub mod error;
pub mod fix;
pub mod model;
pub mod result;
pub mod secrets;

pub use error::AutofixError;
pub use fix::{
    ChangeOperation, CodeChange, FixType, FixValidationResult, ProposedFix, ValidationResult,
};
pub use model::{
    clamp_unit, FailureAnalysis, FailureCategory, FailureClassification, FailureEvent, FailureType,
    Severity,
};
pub use result::{
    AttemptOutcome, AutoFixResult, CandidateAttempt, FailureReason, PipelineState,
    SubmissionResult,
};
pub use secrets::SecretHandle;

/// Result alias used across the pipeline crates.
pub type Result<T> = std::result::Result<T, AutofixError>;
