//! # Reasoning Gateway
//!
//! A provider-neutral client for the reasoning backends used by the autofix
//! pipeline.
//!
//! This crate provides:
//!
//! - `ReasoningGateway`: one `send` operation over normalized requests and
//!   responses, with tool-calling
//! - Provider adapters for OpenAI-compatible APIs, Anthropic, Gemini and Ollama
//! - Per-provider defaults (model, token limit, temperature, timeout, retries)
//! - Resilience patterns (retry, circuit breaker, token bucket) and a registry
//!   that keeps one instance of each per downstream dependency
//! - `ServiceError`, with HTTP status mapping and conversion into the
//!   pipeline-level `AutofixError`
//!
//! Provider selection is a configuration value (`config_rs::ProviderKind`);
//! callers never branch on it.

pub mod error;
pub use error::{ErrorContext, Result, ServiceError};

pub mod resilience;
pub use resilience::{
    CircuitBreaker, CircuitBreakerConfig, CircuitBreakerStatus, RateLimiterConfig, Resilience,
    ResilienceConfig, ResilienceRegistry, RetryConfig, RetryExecutor, TokenBucket,
};

pub mod models;
pub use models::{ReasoningRequest, ReasoningResponse, ToolDeclaration, ToolInvocation, Usage};

pub mod providers;
pub use providers::{adapter_for, defaults_for, ProviderAdapter, ProviderDefaults};

pub mod transport;
pub use transport::{HttpRequest, HttpTransport, Transport};

pub mod gateway;
pub use gateway::{ProviderEndpoint, ProviderGateway, ProviderGatewayBuilder, ReasoningGateway};

pub mod util;

pub use config_rs::ProviderKind;

#[cfg(test)]
mod tests;
