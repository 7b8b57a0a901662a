// shared-types-rs/src/error.rs
// Pipeline-level error taxonomy.

use crate::result::FailureReason;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum AutofixError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Authentication error: {0}")]
    Authentication(String),

    #[error("Analysis error: {0}")]
    Analysis(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("No valid fix: {0}")]
    NoValidFix(String),

    #[error("Submission error: {0}")]
    Submission(String),

    #[error("Source control error: {0}")]
    SourceControl(String),

    #[error("Operation cancelled")]
    Cancelled,
}

impl AutofixError {
    /// Terminal reason recorded when this error ends a run.
    pub fn failure_reason(&self) -> FailureReason {
        match self {
            AutofixError::NoValidFix(_) => FailureReason::NoValidFix,
            AutofixError::Submission(_) => FailureReason::SubmissionError,
            _ => FailureReason::UpstreamError,
        }
    }

    /// Errors that no amount of retrying will clear.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            AutofixError::Configuration(_) | AutofixError::Authentication(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reasons_follow_error_kind() {
        assert_eq!(
            AutofixError::NoValidFix("none".into()).failure_reason(),
            FailureReason::NoValidFix
        );
        assert_eq!(
            AutofixError::Submission("409".into()).failure_reason(),
            FailureReason::SubmissionError
        );
        assert_eq!(
            AutofixError::Analysis("bad json".into()).failure_reason(),
            FailureReason::UpstreamError
        );
        assert!(AutofixError::Authentication("401".into()).is_fatal());
        assert!(!AutofixError::Cancelled.is_fatal());
    }
}
