//! OpenAI chat-completions shape, shared by every OpenAI-compatible backend
//! (OpenAI, DeepSeek, OpenRouter, xAI and the local proxy).

use config_rs::ProviderKind;
use serde::Deserialize;
use serde_json::{json, Value};
use shared_types::SecretHandle;

use super::{bearer, chat_messages, function_tools, join_url, missing, Headers, ProviderAdapter, ResolvedOptions};
use crate::error::{Result, ServiceError};
use crate::models::{ReasoningRequest, ReasoningResponse, ToolInvocation, Usage};

#[derive(Debug, Clone, Copy)]
pub struct OpenAiCompatibleAdapter {
    kind: ProviderKind,
}

impl OpenAiCompatibleAdapter {
    pub fn new(kind: ProviderKind) -> Self {
        Self { kind }
    }
}

#[derive(Debug, Deserialize)]
struct ChatCompletion {
    #[serde(default)]
    model: Option<String>,
    #[serde(default)]
    choices: Vec<Choice>,
    #[serde(default)]
    usage: Option<CompletionUsage>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: Message,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Message {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    tool_calls: Vec<ToolCall>,
}

#[derive(Debug, Deserialize)]
struct ToolCall {
    #[serde(default)]
    id: Option<String>,
    function: FunctionCall,
}

#[derive(Debug, Deserialize)]
struct FunctionCall {
    name: String,
    /// JSON-encoded string in the OpenAI API; some compatible servers send an object
    #[serde(default)]
    arguments: Value,
}

#[derive(Debug, Deserialize)]
struct CompletionUsage {
    #[serde(default)]
    prompt_tokens: Option<u64>,
    #[serde(default)]
    completion_tokens: Option<u64>,
}

fn decode_arguments(name: &str, arguments: Value) -> Result<Value> {
    match arguments {
        Value::String(raw) if raw.trim().is_empty() => Ok(json!({})),
        Value::String(raw) => serde_json::from_str(&raw).map_err(|e| {
            ServiceError::parsing(format!("arguments of tool call '{}' are not JSON: {}", name, e))
        }),
        Value::Null => Ok(json!({})),
        other => Ok(other),
    }
}

impl ProviderAdapter for OpenAiCompatibleAdapter {
    fn kind(&self) -> ProviderKind {
        self.kind
    }

    fn endpoint(&self, base_url: &str, _model: &str) -> String {
        join_url(base_url, "chat/completions")
    }

    fn headers(&self, credential: Option<&SecretHandle>) -> Headers {
        let mut headers = bearer(credential);
        if self.kind == ProviderKind::OpenRouter {
            headers.push(("X-Title".to_string(), "ci-autofix".to_string()));
        }
        headers
    }

    fn build_body(&self, request: &ReasoningRequest, options: &ResolvedOptions) -> Value {
        let mut body = json!({
            "model": options.model,
            "messages": chat_messages(request),
            "max_tokens": options.max_tokens,
            "temperature": options.temperature,
        });
        if !request.tools.is_empty() {
            body["tools"] = Value::Array(function_tools(&request.tools));
        }
        body
    }

    fn parse_response(&self, body: &Value, model: &str) -> Result<ReasoningResponse> {
        let completion: ChatCompletion = serde_json::from_value(body.clone()).map_err(|e| {
            ServiceError::parsing(format!("unexpected {} response: {}", self.kind, e))
                .with_context_value("provider", self.kind)
        })?;

        let choice = completion
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| missing(self.kind, "choices"))?;

        let tool_invocations = choice
            .message
            .tool_calls
            .into_iter()
            .map(|call| {
                let arguments = decode_arguments(&call.function.name, call.function.arguments)?;
                Ok(ToolInvocation {
                    id: call.id,
                    name: call.function.name,
                    arguments,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(ReasoningResponse {
            provider: self.kind,
            model: completion.model.unwrap_or_else(|| model.to_string()),
            content: choice.message.content.unwrap_or_default(),
            tool_invocations,
            finish_reason: choice.finish_reason,
            usage: completion.usage.map(|u| Usage {
                input_tokens: u.prompt_tokens,
                output_tokens: u.completion_tokens,
            }),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ToolDeclaration;
    use crate::providers::resolve;

    fn adapter() -> OpenAiCompatibleAdapter {
        OpenAiCompatibleAdapter::new(ProviderKind::OpenAi)
    }

    #[test]
    fn body_carries_messages_and_tools() {
        let request = ReasoningRequest::new("fix it")
            .system("you are a CI engineer")
            .tool(ToolDeclaration::new("propose_fix", "propose", json!({"type": "object"})));
        let options = resolve(ProviderKind::OpenAi, &request, None);
        let body = adapter().build_body(&request, &options);

        assert_eq!(body["model"], "gpt-4o");
        assert_eq!(body["messages"][0]["role"], "system");
        assert_eq!(body["messages"][1]["content"], "fix it");
        assert_eq!(body["tools"][0]["function"]["name"], "propose_fix");
    }

    #[test]
    fn parses_text_and_string_encoded_tool_arguments() {
        let reply = json!({
            "model": "gpt-4o-2024-08-06",
            "choices": [{
                "message": {
                    "content": null,
                    "tool_calls": [{
                        "id": "call_1",
                        "type": "function",
                        "function": {"name": "propose_fix", "arguments": "{\"confidence\": 0.8}"}
                    }]
                },
                "finish_reason": "tool_calls"
            }],
            "usage": {"prompt_tokens": 12, "completion_tokens": 7}
        });
        let response = adapter().parse_response(&reply, "gpt-4o").unwrap();
        assert_eq!(response.content, "");
        assert_eq!(response.model, "gpt-4o-2024-08-06");
        assert_eq!(response.tool_invocations[0].arguments["confidence"], 0.8);
        assert_eq!(response.usage.unwrap().output_tokens, Some(7));
    }

    #[test]
    fn empty_choices_is_a_parse_error() {
        let err = adapter().parse_response(&json!({"choices": []}), "gpt-4o").unwrap_err();
        assert!(matches!(err.root(), ServiceError::Parsing(_)));
    }

    #[test]
    fn malformed_arguments_are_a_parse_error() {
        let reply = json!({"choices": [{"message": {"tool_calls": [
            {"function": {"name": "propose_fix", "arguments": "{not json"}}
        ]}}]});
        assert!(adapter().parse_response(&reply, "m").is_err());
    }

    #[test]
    fn openrouter_adds_title_header() {
        let headers = OpenAiCompatibleAdapter::new(ProviderKind::OpenRouter)
            .headers(Some(&SecretHandle::new("k")));
        assert!(headers.iter().any(|(name, _)| name == "X-Title"));
    }
}
