//! Normalized request and response types
//!
//! Callers build a `ReasoningRequest` without knowing which provider will
//! serve it; every provider adapter maps its own reply into a
//! `ReasoningResponse`.

use std::time::Duration;

use config_rs::ProviderKind;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A function the model may call instead of (or as well as) answering in text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDeclaration {
    pub name: String,
    pub description: String,
    /// JSON schema of the arguments object
    pub parameters: Value,
}

impl ToolDeclaration {
    pub fn new(name: impl Into<String>, description: impl Into<String>, parameters: Value) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            parameters,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolInvocation {
    pub id: Option<String>,
    pub name: String,
    pub arguments: Value,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Usage {
    pub input_tokens: Option<u64>,
    pub output_tokens: Option<u64>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReasoningRequest {
    pub prompt: String,
    pub system: Option<String>,
    pub tools: Vec<ToolDeclaration>,
    /// Provider hint; the gateway default is used when absent
    pub provider: Option<ProviderKind>,
    pub model: Option<String>,
    pub max_tokens: Option<u32>,
    pub temperature: Option<f32>,
    pub timeout: Option<Duration>,
    pub max_retries: Option<u32>,
}

impl ReasoningRequest {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            ..Self::default()
        }
    }

    pub fn system(mut self, system: impl Into<String>) -> Self {
        self.system = Some(system.into());
        self
    }

    pub fn tool(mut self, tool: ToolDeclaration) -> Self {
        self.tools.push(tool);
        self
    }

    pub fn provider(mut self, provider: ProviderKind) -> Self {
        self.provider = Some(provider);
        self
    }

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    pub fn max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    pub fn temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = Some(max_retries);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReasoningResponse {
    pub provider: ProviderKind,
    pub model: String,
    /// Concatenated text content; empty when the reply is tool calls only
    pub content: String,
    pub tool_invocations: Vec<ToolInvocation>,
    pub finish_reason: Option<String>,
    pub usage: Option<Usage>,
}

impl ReasoningResponse {
    /// Invocations of the named tool, in reply order.
    pub fn invocations_of<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a ToolInvocation> + 'a {
        self.tool_invocations.iter().filter(move |t| t.name == name)
    }
}
