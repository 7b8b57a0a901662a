//! Error handling for the reasoning gateway
//!
//! This module provides the gateway's error system that:
//! - Categorizes errors by type (network, auth, rate limit, etc.)
//! - Attaches request context (provider, status code, endpoint)
//! - Decides which failures are worth retrying
//! - Converts into the pipeline-level `AutofixError`

use std::collections::HashMap;
use std::fmt;

use shared_types::AutofixError;
use thiserror::Error;

pub mod mapping;

/// Result type for gateway operations
pub type Result<T> = std::result::Result<T, ServiceError>;

#[derive(Error, Debug)]
pub enum ServiceError {
    /// Network or connection errors
    #[error("Network error: {0}")]
    Network(String),

    /// Credential rejected (401)
    #[error("Authentication error: {0}")]
    Authentication(String),

    /// Permission denied (403)
    #[error("Authorization error: {0}")]
    Authorization(String),

    /// Upstream rate limiting (429)
    #[error("Rate limit exceeded: {0}")]
    RateLimit(String),

    /// Upstream server errors (5xx)
    #[error("Service error: {0}")]
    Service(String),

    /// Request rejected as malformed (400, 404, 422)
    #[error("Validation error: {0}")]
    Validation(String),

    /// Response could not be understood
    #[error("Parsing error: {0}")]
    Parsing(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Timeout error: {0}")]
    Timeout(String),

    /// Local circuit breaker rejected the call
    #[error("Circuit broken: {0}")]
    CircuitBroken(String),

    /// Local token bucket rejected the call
    #[error("Rate limited locally: {0}")]
    RateLimited(String),

    #[error("Operation cancelled")]
    Cancelled,

    #[error("Internal error: {0}")]
    Internal(String),

    /// Errors with additional context
    #[error("{inner}")]
    WithContext {
        inner: Box<ServiceError>,
        context: ErrorContext,
    },
}

impl ServiceError {
    pub fn network(message: impl Into<String>) -> Self {
        ServiceError::Network(message.into())
    }

    pub fn authentication(message: impl Into<String>) -> Self {
        ServiceError::Authentication(message.into())
    }

    pub fn authorization(message: impl Into<String>) -> Self {
        ServiceError::Authorization(message.into())
    }

    pub fn rate_limit(message: impl Into<String>) -> Self {
        ServiceError::RateLimit(message.into())
    }

    pub fn service(message: impl Into<String>) -> Self {
        ServiceError::Service(message.into())
    }

    pub fn validation(message: impl Into<String>) -> Self {
        ServiceError::Validation(message.into())
    }

    pub fn parsing(message: impl Into<String>) -> Self {
        ServiceError::Parsing(message.into())
    }

    pub fn configuration(message: impl Into<String>) -> Self {
        ServiceError::Configuration(message.into())
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        ServiceError::Timeout(message.into())
    }

    pub fn circuit_broken(message: impl Into<String>) -> Self {
        ServiceError::CircuitBroken(message.into())
    }

    pub fn rate_limited(message: impl Into<String>) -> Self {
        ServiceError::RateLimited(message.into())
    }

    pub fn internal(message: impl Into<String>) -> Self {
        ServiceError::Internal(message.into())
    }

    /// Add context to an existing error
    pub fn with_context(self, context: ErrorContext) -> Self {
        ServiceError::WithContext {
            inner: Box::new(self),
            context,
        }
    }

    /// Add a single context key/value to an existing error
    pub fn with_context_value(self, key: impl Into<String>, value: impl fmt::Display) -> Self {
        let mut context = ErrorContext::new();
        context.add(key, value);
        self.with_context(context)
    }

    /// The innermost error, with all context layers removed
    pub fn root(&self) -> &ServiceError {
        match self {
            ServiceError::WithContext { inner, .. } => inner.root(),
            other => other,
        }
    }

    /// HTTP status code, if any context layer recorded one
    pub fn status_code(&self) -> Option<u16> {
        match self {
            ServiceError::WithContext { inner, context } => {
                context.status_code.or_else(|| inner.status_code())
            }
            _ => None,
        }
    }

    /// Provider name, if any context layer recorded one
    pub fn service_name(&self) -> Option<&str> {
        match self {
            ServiceError::WithContext { context, .. } => Some(&context.service),
            _ => None,
        }
    }

    /// Transient failures that the retry wrapper should attempt again.
    /// Local rejections (open circuit, empty bucket) fail fast.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self.root(),
            ServiceError::Network(_)
                | ServiceError::Timeout(_)
                | ServiceError::RateLimit(_)
                | ServiceError::Service(_)
        )
    }

    pub fn is_authentication(&self) -> bool {
        matches!(
            self.root(),
            ServiceError::Authentication(_) | ServiceError::Authorization(_)
        )
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self.root(), ServiceError::Cancelled)
    }

    pub fn is_circuit_broken(&self) -> bool {
        matches!(self.root(), ServiceError::CircuitBroken(_))
    }
}

/// Where an error came from, attached through `ServiceError::WithContext`
#[derive(Debug, Clone)]
pub struct ErrorContext {
    /// Provider or dependency that produced the error
    pub service: String,
    pub timestamp: Option<chrono::DateTime<chrono::Utc>>,
    pub status_code: Option<u16>,
    /// Provider-specific error code
    pub error_code: Option<String>,
    pub request_id: Option<String>,
    /// Sanitized request URL
    pub endpoint: Option<String>,
    pub data: HashMap<String, String>,
}

impl Default for ErrorContext {
    fn default() -> Self {
        Self {
            service: "unknown".to_string(),
            timestamp: Some(chrono::Utc::now()),
            status_code: None,
            error_code: None,
            request_id: None,
            endpoint: None,
            data: HashMap::new(),
        }
    }
}

impl ErrorContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn for_service(service: impl Into<String>) -> Self {
        Self {
            service: service.into(),
            ..Self::default()
        }
    }

    pub fn status_code(mut self, code: u16) -> Self {
        self.status_code = Some(code);
        self
    }

    pub fn request_id(mut self, id: impl Into<String>) -> Self {
        self.request_id = Some(id.into());
        self
    }

    pub fn endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = Some(endpoint.into());
        self
    }

    pub fn add<K, V>(&mut self, key: K, value: V)
    where
        K: Into<String>,
        V: fmt::Display,
    {
        self.data.insert(key.into(), value.to_string());
    }
}

/// Convert reqwest errors to ServiceError
impl From<reqwest::Error> for ServiceError {
    fn from(err: reqwest::Error) -> Self {
        let context = ErrorContext::for_service("http_client");

        let service_error = if err.is_timeout() {
            ServiceError::timeout(format!("Request timed out: {}", err))
        } else if err.is_connect() {
            ServiceError::network(format!("Connection error: {}", err))
        } else if err.is_request() {
            ServiceError::network(format!("Request failed: {}", err))
        } else if err.is_redirect() {
            ServiceError::network(format!("Too many redirects: {}", err))
        } else if err.is_decode() {
            ServiceError::parsing(format!("Response decode error: {}", err))
        } else {
            ServiceError::internal(format!("HTTP client error: {}", err))
        };

        match err.status() {
            Some(status) => service_error.with_context(context.status_code(status.as_u16())),
            None => service_error.with_context(context),
        }
    }
}

impl From<serde_json::Error> for ServiceError {
    fn from(err: serde_json::Error) -> Self {
        ServiceError::parsing(format!("JSON error: {}", err))
            .with_context(ErrorContext::for_service("json"))
    }
}

/// Gateway failures surface to the pipeline as analysis errors, except
/// rejected credentials which are fatal.
impl From<ServiceError> for AutofixError {
    fn from(err: ServiceError) -> Self {
        match err.root() {
            ServiceError::Authentication(_) | ServiceError::Authorization(_) => {
                AutofixError::Authentication(err.to_string())
            }
            ServiceError::Cancelled => AutofixError::Cancelled,
            ServiceError::Configuration(_) => AutofixError::Configuration(err.to_string()),
            _ => AutofixError::Analysis(err.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retryability_follows_the_root_error() {
        assert!(ServiceError::network("reset").is_retryable());
        assert!(ServiceError::service("502").is_retryable());
        assert!(ServiceError::rate_limit("429").is_retryable());
        assert!(!ServiceError::validation("bad").is_retryable());
        assert!(!ServiceError::circuit_broken("open").is_retryable());
        assert!(!ServiceError::rate_limited("bucket").is_retryable());
        assert!(!ServiceError::Cancelled.is_retryable());

        let wrapped = ServiceError::timeout("slow")
            .with_context(ErrorContext::for_service("openai").status_code(408));
        assert!(wrapped.is_retryable());
        assert_eq!(wrapped.status_code(), Some(408));
        assert_eq!(wrapped.service_name(), Some("openai"));
    }

    #[test]
    fn conversion_to_pipeline_errors() {
        let auth: AutofixError = ServiceError::authentication("bad key")
            .with_context_value("provider", "anthropic")
            .into();
        assert!(matches!(auth, AutofixError::Authentication(_)));

        let parse: AutofixError = ServiceError::parsing("no choices").into();
        assert!(matches!(parse, AutofixError::Analysis(_)));

        let cancelled: AutofixError = ServiceError::Cancelled.into();
        assert_eq!(cancelled, AutofixError::Cancelled);
    }
}
