//! Gemini generateContent API.

use config_rs::ProviderKind;
use serde::Deserialize;
use serde_json::{json, Value};
use shared_types::SecretHandle;

use super::{join_url, missing, Headers, ProviderAdapter, ResolvedOptions};
use crate::error::{Result, ServiceError};
use crate::models::{ReasoningRequest, ReasoningResponse, ToolInvocation, Usage};

#[derive(Debug, Clone, Copy, Default)]
pub struct GeminiAdapter;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateReply {
    #[serde(default)]
    candidates: Vec<Candidate>,
    #[serde(default)]
    usage_metadata: Option<UsageMetadata>,
    #[serde(default)]
    model_version: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    #[serde(default)]
    content: Option<Content>,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Content {
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Part {
    #[serde(default)]
    text: Option<String>,
    #[serde(default)]
    function_call: Option<FunctionCall>,
}

#[derive(Debug, Deserialize)]
struct FunctionCall {
    name: String,
    #[serde(default)]
    args: Value,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UsageMetadata {
    #[serde(default)]
    prompt_token_count: Option<u64>,
    #[serde(default)]
    candidates_token_count: Option<u64>,
}

impl ProviderAdapter for GeminiAdapter {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Gemini
    }

    fn endpoint(&self, base_url: &str, model: &str) -> String {
        join_url(base_url, &format!("models/{}:generateContent", model))
    }

    fn headers(&self, credential: Option<&SecretHandle>) -> Headers {
        credential
            .filter(|c| !c.is_empty())
            .map(|c| vec![("x-goog-api-key".to_string(), c.expose().to_string())])
            .unwrap_or_default()
    }

    fn build_body(&self, request: &ReasoningRequest, options: &ResolvedOptions) -> Value {
        let mut body = json!({
            "contents": [{ "role": "user", "parts": [{ "text": request.prompt }] }],
            "generationConfig": {
                "maxOutputTokens": options.max_tokens,
                "temperature": options.temperature,
            },
        });
        if let Some(system) = &request.system {
            body["systemInstruction"] = json!({ "parts": [{ "text": system }] });
        }
        if !request.tools.is_empty() {
            let declarations: Vec<Value> = request
                .tools
                .iter()
                .map(|t| json!({ "name": t.name, "description": t.description, "parameters": t.parameters }))
                .collect();
            body["tools"] = json!([{ "functionDeclarations": declarations }]);
        }
        body
    }

    fn parse_response(&self, body: &Value, model: &str) -> Result<ReasoningResponse> {
        let reply: GenerateReply = serde_json::from_value(body.clone()).map_err(|e| {
            ServiceError::parsing(format!("unexpected gemini response: {}", e))
                .with_context_value("provider", self.kind())
        })?;

        let candidate = match reply.candidates.into_iter().next() {
            Some(candidate) => candidate,
            None => {
                // A blocked prompt comes back with promptFeedback and no candidates.
                let reason = body
                    .pointer("/promptFeedback/blockReason")
                    .and_then(Value::as_str)
                    .map(|r| format!("candidates (blocked: {})", r));
                return Err(missing(self.kind(), reason.as_deref().unwrap_or("candidates")));
            }
        };

        let mut text = Vec::new();
        let mut tool_invocations = Vec::new();
        for part in candidate.content.map(|c| c.parts).unwrap_or_default() {
            if let Some(t) = part.text {
                text.push(t);
            }
            if let Some(call) = part.function_call {
                tool_invocations.push(ToolInvocation {
                    id: None,
                    name: call.name,
                    arguments: call.args,
                });
            }
        }

        Ok(ReasoningResponse {
            provider: self.kind(),
            model: reply.model_version.unwrap_or_else(|| model.to_string()),
            content: text.join(""),
            tool_invocations,
            finish_reason: candidate.finish_reason,
            usage: reply.usage_metadata.map(|u| Usage {
                input_tokens: u.prompt_token_count,
                output_tokens: u.candidates_token_count,
            }),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ToolDeclaration;
    use crate::providers::resolve;

    #[test]
    fn model_is_part_of_the_path() {
        assert_eq!(
            GeminiAdapter.endpoint("https://g/v1beta", "gemini-1.5-pro"),
            "https://g/v1beta/models/gemini-1.5-pro:generateContent"
        );
    }

    #[test]
    fn tools_become_function_declarations() {
        let request = ReasoningRequest::new("p").tool(ToolDeclaration::new("propose_fix", "d", json!({})));
        let options = resolve(ProviderKind::Gemini, &request, None);
        let body = GeminiAdapter.build_body(&request, &options);
        assert_eq!(body["tools"][0]["functionDeclarations"][0]["name"], "propose_fix");
        assert_eq!(body["generationConfig"]["maxOutputTokens"], 8192);
    }

    #[test]
    fn parses_parts() {
        let reply = json!({
            "candidates": [{
                "content": {"parts": [
                    {"text": "root cause: "},
                    {"text": "missing import"},
                    {"functionCall": {"name": "propose_fix", "args": {"confidence": 0.6}}}
                ]},
                "finishReason": "STOP"
            }],
            "usageMetadata": {"promptTokenCount": 5, "candidatesTokenCount": 9}
        });
        let response = GeminiAdapter.parse_response(&reply, "gemini-1.5-pro").unwrap();
        assert_eq!(response.content, "root cause: missing import");
        assert_eq!(response.tool_invocations[0].arguments["confidence"], 0.6);
        assert_eq!(response.model, "gemini-1.5-pro");
    }

    #[test]
    fn blocked_prompt_is_a_parse_error() {
        let reply = json!({"promptFeedback": {"blockReason": "SAFETY"}});
        let err = GeminiAdapter.parse_response(&reply, "m").unwrap_err();
        assert!(err.to_string().contains("SAFETY"));
    }
}
