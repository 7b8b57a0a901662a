//! Provider adapters
//!
//! Each reasoning backend differs in endpoint path, auth header style, request
//! body and reply shape. An adapter owns those four things and nothing else;
//! transport, retries and breaker state live in the gateway.

mod anthropic;
mod defaults;
mod gemini;
mod ollama;
mod openai;

pub use anthropic::AnthropicAdapter;
pub use defaults::{defaults_for, resolve, ProviderDefaults, ResolvedOptions};
pub use gemini::GeminiAdapter;
pub use ollama::OllamaAdapter;
pub use openai::OpenAiCompatibleAdapter;

use config_rs::ProviderKind;
use serde_json::{json, Value};
use shared_types::SecretHandle;

use crate::error::{Result, ServiceError};
use crate::models::{ReasoningRequest, ReasoningResponse, ToolDeclaration};

/// Header name/value pairs. Values may carry credentials and are never logged.
pub type Headers = Vec<(String, String)>;

pub trait ProviderAdapter: Send + Sync {
    fn kind(&self) -> ProviderKind;

    /// Full URL for one completion call.
    fn endpoint(&self, base_url: &str, model: &str) -> String;

    fn headers(&self, credential: Option<&SecretHandle>) -> Headers;

    fn build_body(&self, request: &ReasoningRequest, options: &ResolvedOptions) -> Value;

    /// Map the provider reply into the normalized response. A reply that does
    /// not have the expected shape is a `ServiceError::Parsing`.
    fn parse_response(&self, body: &Value, model: &str) -> Result<ReasoningResponse>;
}

/// The adapter serving `kind`.
pub fn adapter_for(kind: ProviderKind) -> Box<dyn ProviderAdapter> {
    match kind {
        ProviderKind::Anthropic => Box::new(AnthropicAdapter),
        ProviderKind::Gemini => Box::new(GeminiAdapter),
        ProviderKind::Ollama => Box::new(OllamaAdapter),
        ProviderKind::OpenAi
        | ProviderKind::DeepSeek
        | ProviderKind::OpenRouter
        | ProviderKind::Xai
        | ProviderKind::LocalProxy => Box::new(OpenAiCompatibleAdapter::new(kind)),
    }
}

fn join_url(base_url: &str, path: &str) -> String {
    format!("{}/{}", base_url.trim_end_matches('/'), path.trim_start_matches('/'))
}

fn bearer(credential: Option<&SecretHandle>) -> Headers {
    credential
        .filter(|c| !c.is_empty())
        .map(|c| vec![("Authorization".to_string(), format!("Bearer {}", c.expose()))])
        .unwrap_or_default()
}

/// `system` + `user` chat messages, as used by the OpenAI and Ollama shapes.
fn chat_messages(request: &ReasoningRequest) -> Vec<Value> {
    let mut messages = Vec::with_capacity(2);
    if let Some(system) = &request.system {
        messages.push(json!({ "role": "system", "content": system }));
    }
    messages.push(json!({ "role": "user", "content": request.prompt }));
    messages
}

/// Function declarations in the OpenAI `tools` shape (also accepted by Ollama).
fn function_tools(tools: &[ToolDeclaration]) -> Vec<Value> {
    tools
        .iter()
        .map(|t| {
            json!({
                "type": "function",
                "function": {
                    "name": t.name,
                    "description": t.description,
                    "parameters": t.parameters,
                }
            })
        })
        .collect()
}

fn missing(provider: ProviderKind, what: &str) -> ServiceError {
    ServiceError::parsing(format!("{} response has no {}", provider, what))
        .with_context_value("provider", provider)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_provider_has_an_adapter() {
        for kind in ProviderKind::ALL {
            assert_eq!(adapter_for(kind).kind(), kind);
        }
    }

    #[test]
    fn urls_join_without_double_slashes() {
        assert_eq!(join_url("http://h/v1/", "/chat/completions"), "http://h/v1/chat/completions");
        assert_eq!(join_url("http://h/v1", "messages"), "http://h/v1/messages");
    }

    #[test]
    fn blank_credentials_send_no_auth_header() {
        assert!(bearer(None).is_empty());
        assert!(bearer(Some(&SecretHandle::new("  "))).is_empty());
        assert_eq!(bearer(Some(&SecretHandle::new("k"))).len(), 1);
    }
}
