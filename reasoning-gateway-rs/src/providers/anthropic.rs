//! Anthropic messages API.

use config_rs::ProviderKind;
use serde::Deserialize;
use serde_json::{json, Value};
use shared_types::SecretHandle;

use super::{join_url, missing, Headers, ProviderAdapter, ResolvedOptions};
use crate::error::{Result, ServiceError};
use crate::models::{ReasoningRequest, ReasoningResponse, ToolInvocation, Usage};

const API_VERSION: &str = "2023-06-01";

#[derive(Debug, Clone, Copy, Default)]
pub struct AnthropicAdapter;

#[derive(Debug, Deserialize)]
struct MessagesReply {
    #[serde(default)]
    model: Option<String>,
    content: Option<Vec<ContentBlock>>,
    #[serde(default)]
    stop_reason: Option<String>,
    #[serde(default)]
    usage: Option<MessagesUsage>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ContentBlock {
    Text {
        text: String,
    },
    ToolUse {
        #[serde(default)]
        id: Option<String>,
        name: String,
        #[serde(default)]
        input: Value,
    },
    #[serde(other)]
    Other,
}

#[derive(Debug, Deserialize)]
struct MessagesUsage {
    #[serde(default)]
    input_tokens: Option<u64>,
    #[serde(default)]
    output_tokens: Option<u64>,
}

impl ProviderAdapter for AnthropicAdapter {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Anthropic
    }

    fn endpoint(&self, base_url: &str, _model: &str) -> String {
        join_url(base_url, "messages")
    }

    fn headers(&self, credential: Option<&SecretHandle>) -> Headers {
        let mut headers = vec![("anthropic-version".to_string(), API_VERSION.to_string())];
        if let Some(key) = credential.filter(|c| !c.is_empty()) {
            headers.push(("x-api-key".to_string(), key.expose().to_string()));
        }
        headers
    }

    fn build_body(&self, request: &ReasoningRequest, options: &ResolvedOptions) -> Value {
        let mut body = json!({
            "model": options.model,
            "max_tokens": options.max_tokens,
            "temperature": options.temperature,
            "messages": [{ "role": "user", "content": request.prompt }],
        });
        if let Some(system) = &request.system {
            body["system"] = json!(system);
        }
        if !request.tools.is_empty() {
            body["tools"] = request
                .tools
                .iter()
                .map(|t| json!({ "name": t.name, "description": t.description, "input_schema": t.parameters }))
                .collect();
        }
        body
    }

    fn parse_response(&self, body: &Value, model: &str) -> Result<ReasoningResponse> {
        let reply: MessagesReply = serde_json::from_value(body.clone()).map_err(|e| {
            ServiceError::parsing(format!("unexpected anthropic response: {}", e))
                .with_context_value("provider", self.kind())
        })?;
        let blocks = reply.content.ok_or_else(|| missing(self.kind(), "content"))?;

        let mut text = Vec::new();
        let mut tool_invocations = Vec::new();
        for block in blocks {
            match block {
                ContentBlock::Text { text: t } => text.push(t),
                ContentBlock::ToolUse { id, name, input } => {
                    tool_invocations.push(ToolInvocation { id, name, arguments: input })
                }
                ContentBlock::Other => {}
            }
        }

        Ok(ReasoningResponse {
            provider: self.kind(),
            model: reply.model.unwrap_or_else(|| model.to_string()),
            content: text.join(""),
            tool_invocations,
            finish_reason: reply.stop_reason,
            usage: reply.usage.map(|u| Usage {
                input_tokens: u.input_tokens,
                output_tokens: u.output_tokens,
            }),
        })
    }
}
