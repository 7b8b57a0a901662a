//! HTTP transport for provider calls
//!
//! The gateway talks to providers through the `Transport` trait so tests can
//! substitute a double; `HttpTransport` is the reqwest-backed implementation.

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{header, Client};
use serde_json::Value;

use crate::error::mapping::map_http_error;
use crate::error::{ErrorContext, Result, ServiceError};
use crate::providers::Headers;
use crate::util::{generate_request_id, measure_time_async, sanitize_for_logging, truncate_string};

/// One outbound JSON POST.
#[derive(Clone)]
pub struct HttpRequest {
    /// Provider name, used for error context and logs
    pub service: String,
    pub url: String,
    pub headers: Headers,
    pub body: Value,
    pub timeout: Duration,
}

impl fmt::Debug for HttpRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let header_names: Vec<&str> = self.headers.iter().map(|(name, _)| name.as_str()).collect();
        f.debug_struct("HttpRequest")
            .field("service", &self.service)
            .field("url", &sanitize_for_logging(&self.url))
            .field("headers", &header_names)
            .field("timeout", &self.timeout)
            .finish()
    }
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Transport: Send + Sync {
    /// POST `request.body` and return the decoded JSON reply. Non-2xx replies
    /// are mapped to a categorised `ServiceError`.
    async fn post_json(&self, request: HttpRequest) -> Result<Value>;
}

/// UserAgent structure for identifying the client to upstream services
#[derive(Debug, Clone)]
pub struct UserAgent {
    pub app_name: String,
    pub version: String,
    pub extra: Option<String>,
}

impl Default for UserAgent {
    fn default() -> Self {
        Self {
            app_name: "ci-autofix".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            extra: Some("reasoning-gateway".to_string()),
        }
    }
}

impl fmt::Display for UserAgent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.app_name, self.version)?;
        if let Some(ref extra) = self.extra {
            write!(f, " ({})", extra)?;
        }
        Ok(())
    }
}

/// Build a standard HTTP client with default settings
pub fn build_http_client(user_agent: Option<UserAgent>, timeout: Option<Duration>) -> Result<Client> {
    let mut headers = header::HeaderMap::new();
    let ua = user_agent.unwrap_or_default().to_string();

    headers.insert(
        header::USER_AGENT,
        header::HeaderValue::from_str(&ua)
            .map_err(|e| ServiceError::configuration(format!("Invalid user agent: {}", e)))?,
    );

    reqwest::Client::builder()
        .default_headers(headers)
        .timeout(timeout.unwrap_or_else(|| Duration::from_secs(60)))
        .gzip(true)
        .build()
        .map_err(|e| ServiceError::configuration(format!("Failed to build HTTP client: {}", e)))
}

#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: Client,
}

impl HttpTransport {
    pub fn new(timeout: Duration) -> Result<Self> {
        Ok(Self {
            client: build_http_client(None, Some(timeout))?,
        })
    }

    pub fn with_client(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn post_json(&self, request: HttpRequest) -> Result<Value> {
        let request_id = generate_request_id();
        let context = ErrorContext::for_service(request.service.clone())
            .endpoint(sanitize_for_logging(&request.url))
            .request_id(request_id.clone());

        let mut builder = self
            .client
            .post(&request.url)
            .timeout(request.timeout)
            .header("x-request-id", &request_id)
            .json(&request.body);
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }

        log::debug!(
            "POST {} [{}] body={}",
            sanitize_for_logging(&request.url),
            request_id,
            truncate_string(&sanitize_for_logging(&request.body.to_string()), 512)
        );

        let (sent, elapsed) = measure_time_async(|| builder.send()).await;
        let response = sent.map_err(|e| ServiceError::from(e).with_context(context.clone()))?;
        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| ServiceError::from(e).with_context(context.clone()))?;

        log::debug!(
            "{} answered {} in {:?} [{}]",
            request.service,
            status.as_u16(),
            elapsed,
            request_id
        );

        if !status.is_success() {
            return Err(map_http_error(status.as_u16(), &text, context));
        }

        serde_json::from_str(&text).map_err(|e| {
            ServiceError::parsing(format!(
                "{} returned non-JSON body: {} ({})",
                request.service,
                e,
                truncate_string(&sanitize_for_logging(&text), 200)
            ))
            .with_context(context)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn debug_output_hides_header_values() {
        let request = HttpRequest {
            service: "openai".to_string(),
            url: "http://localhost/v1/chat/completions".to_string(),
            headers: vec![("Authorization".to_string(), "Bearer sk-secret-value".to_string())],
            body: Value::Null,
            timeout: Duration::from_secs(1),
        };
        let printed = format!("{:?}", request);
        assert!(printed.contains("Authorization"));
        assert!(!printed.contains("sk-secret-value"));
    }

    #[test]
    fn user_agent_formats() {
        let ua = UserAgent {
            app_name: "a".into(),
            version: "1".into(),
            extra: None,
        };
        assert_eq!(ua.to_string(), "a/1");
    }
}
