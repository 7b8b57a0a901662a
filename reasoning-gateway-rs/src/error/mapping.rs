//! Error mapping for provider APIs
//!
//! Converts non-success HTTP responses into `ServiceError`s. The status code
//! decides the category; the body only contributes the message.

use serde_json::Value;

use super::{ErrorContext, ServiceError};
use crate::util::truncate_string;

/// Map a status code and message to an error category.
pub fn error_for_status(status: u16, message: impl Into<String>) -> ServiceError {
    let message = message.into();
    match status {
        401 => ServiceError::authentication(message),
        403 => ServiceError::authorization(message),
        400 | 404 | 422 => ServiceError::validation(message),
        408 => ServiceError::timeout(message),
        429 => ServiceError::rate_limit(message),
        s if s >= 500 => ServiceError::service(message),
        _ => ServiceError::validation(message),
    }
}

/// Pull a human-readable message out of a provider error body.
///
/// Handles the OpenAI/Anthropic/xAI shape `{"error": {"message", "type", "code"}}`,
/// the Gemini shape `{"error": {"message", "status"}}`, Ollama's
/// `{"error": "..."}` and a bare `{"message": "..."}`.
fn extract_message(json: &Value, context: &mut ErrorContext) -> Option<String> {
    match json.get("error") {
        Some(Value::Object(error)) => {
            if let Some(kind) = error
                .get("type")
                .or_else(|| error.get("status"))
                .and_then(Value::as_str)
            {
                context.add("error_type", kind);
            }
            match error.get("code") {
                Some(Value::String(code)) => context.error_code = Some(code.clone()),
                Some(Value::Number(code)) => context.error_code = Some(code.to_string()),
                _ => {}
            }
            error
                .get("message")
                .and_then(Value::as_str)
                .map(str::to_string)
        }
        Some(Value::String(message)) => Some(message.clone()),
        _ => json
            .get("message")
            .and_then(Value::as_str)
            .map(str::to_string),
    }
}

/// Map a non-success HTTP response to a `ServiceError` carrying `context`.
pub fn map_http_error(status: u16, body: &str, mut context: ErrorContext) -> ServiceError {
    context.status_code = Some(status);

    let message = serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|json| extract_message(&json, &mut context))
        .unwrap_or_else(|| {
            if body.trim().is_empty() {
                format!("HTTP {}", status)
            } else {
                format!("HTTP {}: {}", status, truncate_string(body.trim(), 200))
            }
        });

    error_for_status(status, message).with_context(context)
}
