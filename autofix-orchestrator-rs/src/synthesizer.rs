// autofix-orchestrator-rs/src/synthesizer.rs
// Candidate fix synthesis from a finished analysis

use std::cmp::Ordering;
use std::fmt::Write as _;
use std::sync::Arc;

use reasoning_gateway::{ReasoningGateway, ReasoningRequest, ReasoningResponse, ToolDeclaration};
use serde_json::{json, Value};
use shared_types::{
    clamp_unit, AutofixError, ChangeOperation, CodeChange, FailureAnalysis, FixType, ProposedFix,
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use crate::extract::{extract_json, str_field, string_list};

pub const PROPOSE_FIX_TOOL: &str = "propose_fix";

/// Used when a candidate states no confidence of its own.
const DEFAULT_CONFIDENCE: f64 = 0.5;

const SYNTHESIS_SYSTEM: &str = "You are a senior engineer fixing a broken CI build. Propose minimal, \
    self-contained source changes. Reply with JSON only, or call the propose_fix tool once per fix.";

pub fn propose_fix_tool() -> ToolDeclaration {
    ToolDeclaration::new(
        PROPOSE_FIX_TOOL,
        "Propose one candidate fix for the failure",
        json!({
            "type": "object",
            "properties": {
                "type": {
                    "type": "string",
                    "enum": ["code", "configuration", "dependency", "infrastructure", "workflow", "test", "security"]
                },
                "description": { "type": "string" },
                "rationale": { "type": "string" },
                "confidence": { "type": "number", "minimum": 0, "maximum": 1 },
                "risks": { "type": "array", "items": { "type": "string" } },
                "benefits": { "type": "array", "items": { "type": "string" } },
                "changes": {
                    "type": "array",
                    "items": {
                        "type": "object",
                        "properties": {
                            "file_path": { "type": "string" },
                            "operation": { "type": "string", "enum": ["add", "modify", "delete"] },
                            "old_content": { "type": "string" },
                            "new_content": { "type": "string" },
                            "explanation": { "type": "string" }
                        },
                        "required": ["file_path", "operation"]
                    }
                }
            },
            "required": ["type", "description", "confidence", "changes"]
        }),
    )
}

pub struct FixSynthesizer {
    gateway: Arc<dyn ReasoningGateway>,
    max_candidates: usize,
}

impl FixSynthesizer {
    pub fn new(gateway: Arc<dyn ReasoningGateway>, max_candidates: usize) -> Self {
        Self {
            gateway,
            max_candidates: max_candidates.max(1),
        }
    }

    pub fn max_candidates(&self) -> usize {
        self.max_candidates
    }

    /// The synthesis prompt. The same analysis always yields the same
    /// prompt; the processing time is left out for that reason.
    pub fn build_prompt(&self, analysis: &FailureAnalysis) -> String {
        let c = &analysis.classification;
        let mut prompt = String::new();
        let _ = writeln!(prompt, "Propose up to {} fixes for CI run {}.", self.max_candidates, analysis.run_id);
        let _ = writeln!(prompt);
        let _ = writeln!(
            prompt,
            "Failure: type={} severity={} category={}",
            c.failure_type, c.severity, c.category
        );
        let _ = writeln!(prompt, "Root cause: {}", analysis.root_cause);
        if !analysis.affected_files.is_empty() {
            let _ = writeln!(prompt, "Affected files:");
            for file in &analysis.affected_files {
                let _ = writeln!(prompt, "- {}", file);
            }
        }
        if !analysis.error_patterns.is_empty() {
            let _ = writeln!(prompt, "Key errors:");
            for pattern in &analysis.error_patterns {
                let _ = writeln!(prompt, "- {}", pattern);
            }
        }
        if let Some(approach) = &analysis.suggested_approach {
            let _ = writeln!(prompt, "Suggested approach: {}", approach);
        }
        let _ = writeln!(prompt);
        let _ = write!(
            prompt,
            "Return a JSON array. Each element has \"type\" (code, configuration, dependency, \
             infrastructure, workflow, test or security), \"description\", \"rationale\", \
             \"confidence\" (0 to 1), \"risks\", \"benefits\" and \"changes\": a list of \
             {{\"file_path\", \"operation\" (add, modify or delete), \"old_content\", \
             \"new_content\", \"explanation\"}}. Order fixes from most to least likely to work."
        );
        prompt
    }

    /// One reasoning round trip. An empty list is a valid answer.
    #[instrument(skip(self, analysis, cancel), fields(run_id = %analysis.run_id))]
    pub async fn synthesize(
        &self,
        analysis: &FailureAnalysis,
        cancel: &CancellationToken,
    ) -> Result<Vec<ProposedFix>, AutofixError> {
        let request = ReasoningRequest::new(self.build_prompt(analysis))
            .system(SYNTHESIS_SYSTEM)
            .tool(propose_fix_tool());

        let response = self.gateway.send(&request, cancel).await.map_err(|err| {
            warn!(error = %err, "synthesis request failed");
            AutofixError::from(err)
        })?;

        let fixes = parse_fixes(&response, self.max_candidates);
        info!(candidates = fixes.len(), "fix candidates synthesized");
        Ok(fixes)
    }
}

/// Candidate fixes from a reply, best first, at most `max_candidates`.
///
/// `propose_fix` tool calls take precedence; otherwise the text is searched
/// for a JSON array of fixes, a `{"fixes": [...]}` object or a single fix
/// object. Fixes that need file changes but carry none are dropped.
pub fn parse_fixes(response: &ReasoningResponse, max_candidates: usize) -> Vec<ProposedFix> {
    let mut raw: Vec<Value> = response
        .invocations_of(PROPOSE_FIX_TOOL)
        .map(|call| call.arguments.clone())
        .collect();

    if raw.is_empty() {
        raw = match extract_json(&response.content) {
            Some(Value::Array(items)) => items,
            Some(Value::Object(mut map)) => match map.remove("fixes") {
                Some(Value::Array(items)) => items,
                Some(_) => Vec::new(),
                None if map.contains_key("description") || map.contains_key("changes") => {
                    vec![Value::Object(map)]
                }
                None => Vec::new(),
            },
            _ => Vec::new(),
        };
    }

    let mut fixes: Vec<ProposedFix> = raw
        .iter()
        .filter_map(fix_from_value)
        .filter(|fix| {
            let keep = fix.is_applicable();
            if !keep {
                warn!(fix = %fix.id, fix_type = %fix.fix_type, "dropping fix without changes");
            }
            keep
        })
        .collect();

    fixes.sort_by(|a, b| b.confidence.partial_cmp(&a.confidence).unwrap_or(Ordering::Equal));
    if fixes.len() > max_candidates {
        debug!(dropped = fixes.len() - max_candidates, "keeping the most confident candidates");
        fixes.truncate(max_candidates);
    }
    fixes
}

fn fix_from_value(value: &Value) -> Option<ProposedFix> {
    if !value.is_object() {
        return None;
    }
    let description = str_field(value, "description").or_else(|| str_field(value, "title"))?;
    let fix_type = str_field(value, "type")
        .or_else(|| str_field(value, "fix_type"))
        .map(FixType::parse_lenient)
        .unwrap_or(FixType::Code);
    let confidence = value
        .get("confidence")
        .and_then(Value::as_f64)
        .unwrap_or(DEFAULT_CONFIDENCE);

    let mut fix = ProposedFix::new(fix_type, description, clamp_unit(confidence));
    if let Some(id) = str_field(value, "id") {
        fix.id = id.to_string();
    }
    fix.rationale = str_field(value, "rationale").unwrap_or_default().to_string();
    fix.risks = string_list(value, "risks");
    fix.benefits = string_list(value, "benefits");
    fix.changes = value
        .get("changes")
        .and_then(Value::as_array)
        .map(|changes| changes.iter().filter_map(change_from_value).collect())
        .unwrap_or_default();
    Some(fix)
}

fn change_from_value(value: &Value) -> Option<CodeChange> {
    let file_path = str_field(value, "file_path")
        .or_else(|| str_field(value, "path"))
        .or_else(|| str_field(value, "file"))?;
    let content = |key: &str| value.get(key).and_then(Value::as_str).map(String::from);
    Some(CodeChange {
        file_path: file_path.to_string(),
        operation: str_field(value, "operation")
            .map(ChangeOperation::parse_lenient)
            .unwrap_or(ChangeOperation::Modify),
        old_content: content("old_content"),
        new_content: content("new_content"),
        explanation: str_field(value, "explanation").unwrap_or_default().to_string(),
    })
}
