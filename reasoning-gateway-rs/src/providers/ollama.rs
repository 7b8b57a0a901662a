//! Ollama `/api/chat`, non-streaming.

use config_rs::ProviderKind;
use serde::Deserialize;
use serde_json::{json, Value};
use shared_types::SecretHandle;

use super::{bearer, chat_messages, function_tools, join_url, missing, Headers, ProviderAdapter, ResolvedOptions};
use crate::error::{Result, ServiceError};
use crate::models::{ReasoningRequest, ReasoningResponse, ToolInvocation, Usage};

#[derive(Debug, Clone, Copy, Default)]
pub struct OllamaAdapter;

#[derive(Debug, Deserialize)]
struct ChatReply {
    #[serde(default)]
    model: Option<String>,
    message: Option<Message>,
    #[serde(default)]
    done_reason: Option<String>,
    #[serde(default)]
    prompt_eval_count: Option<u64>,
    #[serde(default)]
    eval_count: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct Message {
    #[serde(default)]
    content: String,
    #[serde(default)]
    tool_calls: Vec<ToolCall>,
}

#[derive(Debug, Deserialize)]
struct ToolCall {
    function: FunctionCall,
}

#[derive(Debug, Deserialize)]
struct FunctionCall {
    name: String,
    #[serde(default)]
    arguments: Value,
}

impl ProviderAdapter for OllamaAdapter {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Ollama
    }

    fn endpoint(&self, base_url: &str, _model: &str) -> String {
        join_url(base_url, "api/chat")
    }

    /// Ollama needs no key, but one is forwarded if configured (e.g. behind a proxy).
    fn headers(&self, credential: Option<&SecretHandle>) -> Headers {
        bearer(credential)
    }

    fn build_body(&self, request: &ReasoningRequest, options: &ResolvedOptions) -> Value {
        let mut body = json!({
            "model": options.model,
            "messages": chat_messages(request),
            "stream": false,
            "options": {
                "num_predict": options.max_tokens,
                "temperature": options.temperature,
            },
        });
        if !request.tools.is_empty() {
            body["tools"] = Value::Array(function_tools(&request.tools));
        }
        body
    }

    fn parse_response(&self, body: &Value, model: &str) -> Result<ReasoningResponse> {
        let reply: ChatReply = serde_json::from_value(body.clone()).map_err(|e| {
            ServiceError::parsing(format!("unexpected ollama response: {}", e))
                .with_context_value("provider", self.kind())
        })?;
        let message = reply.message.ok_or_else(|| missing(self.kind(), "message"))?;

        let usage = match (reply.prompt_eval_count, reply.eval_count) {
            (None, None) => None,
            (input, output) => Some(Usage {
                input_tokens: input,
                output_tokens: output,
            }),
        };

        Ok(ReasoningResponse {
            provider: self.kind(),
            model: reply.model.unwrap_or_else(|| model.to_string()),
            content: message.content,
            tool_invocations: message
                .tool_calls
                .into_iter()
                .map(|call| ToolInvocation {
                    id: None,
                    name: call.function.name,
                    arguments: call.function.arguments,
                })
                .collect(),
            finish_reason: reply.done_reason,
            usage,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::resolve;

    #[test]
    fn body_disables_streaming() {
        let request = ReasoningRequest::new("p");
        let options = resolve(ProviderKind::Ollama, &request, None);
        let body = OllamaAdapter.build_body(&request, &options);
        assert_eq!(body["stream"], false);
        assert_eq!(body["model"], "llama3.1");
        assert_eq!(OllamaAdapter.endpoint("http://localhost:11434/", "x"), "http://localhost:11434/api/chat");
    }

    #[test]
    fn parses_message_with_object_arguments() {
        let reply = json!({
            "model": "llama3.1",
            "message": {
                "role": "assistant",
                "content": "",
                "tool_calls": [{"function": {"name": "propose_fix", "arguments": {"confidence": 0.4}}}]
            },
            "done": true,
            "done_reason": "stop",
            "eval_count": 42
        });
        let response = OllamaAdapter.parse_response(&reply, "m").unwrap();
        assert_eq!(response.tool_invocations[0].arguments["confidence"], 0.4);
        assert_eq!(response.usage.unwrap().output_tokens, Some(42));
    }

    #[test]
    fn missing_message_is_a_parse_error() {
        assert!(OllamaAdapter.parse_response(&json!({"done": true}), "m").is_err());
    }
}
