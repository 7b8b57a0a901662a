//! Per-provider defaults applied when a request leaves a knob unset.

use std::time::Duration;

use config_rs::ProviderKind;

use crate::models::ReasoningRequest;

#[derive(Debug, Clone, PartialEq)]
pub struct ProviderDefaults {
    pub model: &'static str,
    pub max_tokens: u32,
    pub temperature: f32,
    pub timeout: Duration,
    pub max_retries: u32,
}

pub fn defaults_for(kind: ProviderKind) -> ProviderDefaults {
    let hosted = |model, max_tokens| ProviderDefaults {
        model,
        max_tokens,
        temperature: 0.2,
        timeout: Duration::from_secs(60),
        max_retries: 3,
    };

    match kind {
        ProviderKind::OpenAi => hosted("gpt-4o", 4096),
        ProviderKind::Anthropic => hosted("claude-3-5-sonnet-latest", 8192),
        ProviderKind::Gemini => hosted("gemini-1.5-pro", 8192),
        ProviderKind::DeepSeek => hosted("deepseek-chat", 4096),
        ProviderKind::OpenRouter => hosted("anthropic/claude-3.5-sonnet", 4096),
        ProviderKind::Xai => hosted("grok-2-latest", 4096),
        ProviderKind::Ollama => ProviderDefaults {
            model: "llama3.1",
            max_tokens: 4096,
            temperature: 0.2,
            timeout: Duration::from_secs(180),
            max_retries: 1,
        },
        ProviderKind::LocalProxy => ProviderDefaults {
            model: "local-model",
            max_tokens: 4096,
            temperature: 0.2,
            timeout: Duration::from_secs(120),
            max_retries: 1,
        },
    }
}

/// Request knobs after defaults have been applied.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedOptions {
    pub model: String,
    pub max_tokens: u32,
    pub temperature: f32,
    pub timeout: Duration,
    pub max_retries: u32,
}

/// Fill every unset knob of `request` from the provider defaults.
/// `model_override` (from configuration) sits between the two.
pub fn resolve(kind: ProviderKind, request: &ReasoningRequest, model_override: Option<&str>) -> ResolvedOptions {
    let defaults = defaults_for(kind);
    ResolvedOptions {
        model: request
            .model
            .clone()
            .or_else(|| model_override.map(str::to_string))
            .unwrap_or_else(|| defaults.model.to_string()),
        max_tokens: request.max_tokens.unwrap_or(defaults.max_tokens),
        temperature: request.temperature.unwrap_or(defaults.temperature),
        timeout: request.timeout.unwrap_or(defaults.timeout),
        max_retries: request.max_retries.unwrap_or(defaults.max_retries),
    }
}
