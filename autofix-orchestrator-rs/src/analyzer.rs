// autofix-orchestrator-rs/src/analyzer.rs
// Root-cause analysis: one reasoning round trip on top of the classification

use std::fmt::Write as _;
use std::sync::Arc;
use std::time::{Duration, Instant};

use failure_classifier::scan_window;
use once_cell::sync::Lazy;
use reasoning_gateway::{ReasoningGateway, ReasoningRequest};
use regex::Regex;
use serde_json::Value;
use shared_types::{AutofixError, FailureAnalysis, FailureClassification, FailureEvent};
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument, warn};

use crate::extract::{extract_json, scan_paths, str_field, string_list};

/// Log bytes included in the prompt.
pub const DEFAULT_PROMPT_LOG_LIMIT: usize = 12 * 1024;

const MAX_ERROR_PATTERNS: usize = 10;
const MAX_PATTERN_LEN: usize = 200;

const ANALYSIS_SYSTEM: &str = "You are a CI failure analyst. Reply with a single JSON object and nothing else.";

static ERROR_LINE: Lazy<Option<Regex>> =
    Lazy::new(|| Regex::new(r"(?i)\b(error|failed|failure|panic(?:ked)?|exception|fatal)\b").ok());

pub struct FailureAnalyzer {
    gateway: Arc<dyn ReasoningGateway>,
    log_limit: usize,
}

impl FailureAnalyzer {
    pub fn new(gateway: Arc<dyn ReasoningGateway>) -> Self {
        Self {
            gateway,
            log_limit: DEFAULT_PROMPT_LOG_LIMIT,
        }
    }

    pub fn with_log_limit(mut self, limit: usize) -> Self {
        self.log_limit = limit.max(1);
        self
    }

    /// The analysis prompt. Depends only on its inputs.
    pub fn build_prompt(&self, event: &FailureEvent, classification: &FailureClassification) -> String {
        let mut prompt = String::new();
        let _ = writeln!(prompt, "A CI run failed. Identify the root cause.");
        let _ = writeln!(prompt);
        let _ = writeln!(prompt, "Run: {}", event.run_id);
        if !event.repository.is_empty() {
            let _ = writeln!(prompt, "Repository: {}", event.repository);
        }
        let _ = writeln!(prompt, "Branch: {}", event.branch);
        if !event.commit.is_empty() {
            let _ = writeln!(prompt, "Commit: {}", event.commit);
        }
        if let Some(workflow) = &event.workflow {
            let _ = writeln!(prompt, "Workflow: {}", workflow);
        }
        let _ = writeln!(prompt, "Trigger: {}", event.trigger);
        let _ = writeln!(
            prompt,
            "Classification: type={} severity={} category={} confidence={:.2}",
            classification.failure_type,
            classification.severity,
            classification.category,
            classification.confidence
        );
        if !classification.tags.is_empty() {
            let tags: Vec<&str> = classification.tags.iter().map(String::as_str).collect();
            let _ = writeln!(prompt, "Tags: {}", tags.join(", "));
        }
        let _ = writeln!(prompt);
        let _ = writeln!(prompt, "Log excerpt:");
        let _ = writeln!(prompt, "```");
        let _ = writeln!(prompt, "{}", scan_window(&event.logs, self.log_limit).trim_end());
        let _ = writeln!(prompt, "```");
        let _ = writeln!(prompt);
        let _ = write!(
            prompt,
            "Respond with a JSON object with keys \"root_cause\" (string), \"affected_files\" \
             (array of repository-relative paths), \"error_patterns\" (array of the key error \
             lines) and \"suggested_approach\" (string)."
        );
        prompt
    }

    #[instrument(
        skip(self, event, classification, cancel),
        fields(run_id = %event.run_id, failure_type = %classification.failure_type)
    )]
    pub async fn analyze(
        &self,
        event: &FailureEvent,
        classification: FailureClassification,
        cancel: &CancellationToken,
    ) -> Result<FailureAnalysis, AutofixError> {
        let started = Instant::now();
        let request = ReasoningRequest::new(self.build_prompt(event, &classification)).system(ANALYSIS_SYSTEM);

        let response = self.gateway.send(&request, cancel).await.map_err(|err| {
            warn!(error = %err, "analysis request failed");
            AutofixError::from(err)
        })?;

        debug!(provider = %response.provider, model = %response.model, "analysis reply received");
        Ok(interpret(event, classification, &response.content, started.elapsed()))
    }
}

/// Builds the analysis from a reply. Never fails: a reply without JSON
/// becomes the root-cause narrative, and anything the reply leaves out is
/// recovered from the log text.
pub fn interpret(
    event: &FailureEvent,
    classification: FailureClassification,
    reply: &str,
    processing_time: Duration,
) -> FailureAnalysis {
    let parsed = extract_json(reply).filter(Value::is_object);
    if parsed.is_none() {
        debug!(run_id = %event.run_id, "analysis reply is not JSON; using it verbatim");
    }

    let root_cause = parsed
        .as_ref()
        .and_then(|v| str_field(v, "root_cause"))
        .map(String::from)
        .unwrap_or_else(|| reply.trim().to_string());

    let mut affected_files = parsed
        .as_ref()
        .map(|v| string_list(v, "affected_files"))
        .unwrap_or_default();
    if affected_files.is_empty() {
        affected_files = scan_paths(&scan_window(&event.logs, failure_classifier::DEFAULT_SCAN_LIMIT));
    }

    let mut error_patterns = parsed
        .as_ref()
        .map(|v| string_list(v, "error_patterns"))
        .unwrap_or_default();
    if error_patterns.is_empty() {
        error_patterns = error_lines(&event.logs);
    }

    let suggested_approach = parsed
        .as_ref()
        .and_then(|v| str_field(v, "suggested_approach"))
        .map(String::from);

    FailureAnalysis {
        run_id: event.run_id.clone(),
        classification,
        root_cause,
        affected_files,
        error_patterns,
        suggested_approach,
        processing_time,
    }
}

/// Distinct error-looking log lines, first seen first.
fn error_lines(logs: &str) -> Vec<String> {
    let Some(re) = ERROR_LINE.as_ref() else {
        return Vec::new();
    };
    let window = scan_window(logs, failure_classifier::DEFAULT_SCAN_LIMIT);
    let mut lines: Vec<String> = Vec::new();
    for line in window.lines().map(str::trim).filter(|l| re.is_match(l)) {
        let line: String = line.chars().take(MAX_PATTERN_LEN).collect();
        if !lines.contains(&line) {
            lines.push(line);
        }
        if lines.len() == MAX_ERROR_PATTERNS {
            break;
        }
    }
    lines
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared_types::{FailureCategory, FailureType, Severity};

    fn event() -> FailureEvent {
        FailureEvent::new(
            "run-7",
            "Compiling app v0.1.0\nerror[E0425]: cannot find value `cfg` in this scope\n --> src/main.rs:4:5\nerror: could not compile `app`\n",
        )
        .with_repository("acme/app")
        .with_workflow("ci")
    }

    fn classification() -> FailureClassification {
        FailureClassification::new(FailureType::Build, Severity::High, FailureCategory::Systematic, 0.85)
            .with_tags(["build", "compile"])
    }

    #[test]
    fn json_reply_is_used() {
        let reply = "```json\n{\"root_cause\": \"`cfg` was renamed\", \"affected_files\": [\"src/main.rs\"], \
                     \"error_patterns\": [\"error[E0425]\"], \"suggested_approach\": \"restore the binding\"}\n```";
        let analysis = interpret(&event(), classification(), reply, Duration::from_millis(3));
        assert_eq!(analysis.root_cause, "`cfg` was renamed");
        assert_eq!(analysis.affected_files, vec!["src/main.rs"]);
        assert_eq!(analysis.error_patterns, vec!["error[E0425]"]);
        assert_eq!(analysis.suggested_approach.as_deref(), Some("restore the binding"));
        assert_eq!(analysis.processing_time, Duration::from_millis(3));
    }

    #[test]
    fn plain_reply_becomes_narrative_and_logs_fill_the_rest() {
        let analysis = interpret(
            &event(),
            classification(),
            "  The variable cfg no longer exists.  ",
            Duration::ZERO,
        );
        assert_eq!(analysis.root_cause, "The variable cfg no longer exists.");
        assert_eq!(analysis.affected_files, vec!["src/main.rs"]);
        assert_eq!(
            analysis.error_patterns,
            vec![
                "error[E0425]: cannot find value `cfg` in this scope",
                "error: could not compile `app`"
            ]
        );
        assert!(analysis.suggested_approach.is_none());
    }

    #[test]
    fn prompt_is_deterministic() {
        struct Unused;
        #[async_trait::async_trait]
        impl ReasoningGateway for Unused {
            async fn send(
                &self,
                _request: &ReasoningRequest,
                _cancel: &CancellationToken,
            ) -> reasoning_gateway::Result<reasoning_gateway::ReasoningResponse> {
                Err(reasoning_gateway::ServiceError::internal("unused"))
            }
        }

        let analyzer = FailureAnalyzer::new(Arc::new(Unused));
        let a = analyzer.build_prompt(&event(), &classification());
        let b = analyzer.build_prompt(&event(), &classification());
        assert_eq!(a, b);
        assert!(a.contains("type=build severity=high category=systematic"));
        assert!(a.contains("Tags: build, compile"));
        assert!(a.contains("src/main.rs:4:5"));
    }
}
