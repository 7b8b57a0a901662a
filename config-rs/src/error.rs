//! Configuration errors.

use shared_types::AutofixError;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing configuration: {0}")]
    Missing(String),

    #[error("Invalid value for {key}: {reason}")]
    Invalid { key: String, reason: String },
}

impl ConfigError {
    pub fn invalid(key: impl Into<String>, reason: impl Into<String>) -> Self {
        ConfigError::Invalid {
            key: key.into(),
            reason: reason.into(),
        }
    }

    pub fn is_missing(&self) -> bool {
        matches!(self, ConfigError::Missing(_))
    }
}

impl From<ConfigError> for AutofixError {
    fn from(err: ConfigError) -> Self {
        AutofixError::Configuration(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, ConfigError>;
