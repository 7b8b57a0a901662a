// sandbox-validator-rs/src/error.rs

use std::time::Duration;

use shared_types::AutofixError;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, SandboxError>;

/// Failures to *run* a stage. A command that runs and exits non-zero is not
/// an error; it is recorded in the `ValidationResult`.
#[derive(Debug, Error)]
pub enum SandboxError {
    #[error("failed to provision sandbox: {0}")]
    Provision(String),

    #[error("failed to seed workspace from {source_ref}: {reason}")]
    Seed { source_ref: String, reason: String },

    #[error("failed to launch `{command}`: {reason}")]
    Launch { command: String, reason: String },

    #[error("`{command}` timed out after {timeout:?}")]
    Timeout { command: String, timeout: Duration },

    #[error("path escapes the workspace: {0}")]
    InvalidPath(String),

    #[error("sandbox operation cancelled")]
    Cancelled,

    #[error("sandbox I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl SandboxError {
    pub fn launch(command: impl Into<String>, reason: impl ToString) -> Self {
        SandboxError::Launch {
            command: command.into(),
            reason: reason.to_string(),
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, SandboxError::Cancelled)
    }
}

impl From<SandboxError> for AutofixError {
    fn from(err: SandboxError) -> Self {
        match err {
            SandboxError::Cancelled => AutofixError::Cancelled,
            other => AutofixError::Validation(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn converts_to_pipeline_errors() {
        let err: AutofixError = SandboxError::launch("go test", "sh: not found").into();
        assert!(matches!(err, AutofixError::Validation(ref m) if m.contains("go test")));
        assert_eq!(AutofixError::from(SandboxError::Cancelled), AutofixError::Cancelled);
    }
}
