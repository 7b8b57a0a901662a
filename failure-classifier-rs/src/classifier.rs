// failure-classifier-rs/src/classifier.rs
// Pattern-based failure classification.

use shared_types::{
    FailureCategory, FailureClassification, FailureEvent, FailureType, Severity,
};
use tracing::instrument;

use crate::rules::RULES;
use crate::scan::scan_window;

/// Bytes of log text examined per classification.
pub const DEFAULT_SCAN_LIMIT: usize = 64 * 1024;

const FALLBACK_CONFIDENCE: f64 = 0.3;

/// Strategy interface for failure classification.
///
/// Implementations must be deterministic: the same event always produces
/// an identical classification.
pub trait FailureClassifier: Send + Sync {
    fn classify(&self, event: &FailureEvent) -> FailureClassification;
}

/// Classifier backed by the ordered regex rule table.
#[derive(Debug, Clone)]
pub struct PatternFailureClassifier {
    scan_limit: usize,
}

impl Default for PatternFailureClassifier {
    fn default() -> Self {
        Self {
            scan_limit: DEFAULT_SCAN_LIMIT,
        }
    }
}

impl PatternFailureClassifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_scan_limit(mut self, limit: usize) -> Self {
        self.scan_limit = limit.max(1);
        self
    }

    pub fn scan_limit(&self) -> usize {
        self.scan_limit
    }

    /// Used when no rule matches. Workflow names give a weak hint.
    fn fallback(event: &FailureEvent) -> FailureClassification {
        let workflow = event
            .workflow
            .as_deref()
            .unwrap_or_default()
            .to_ascii_lowercase();

        let (failure_type, severity, category, hint) = if workflow.contains("deploy")
            || workflow.contains("release")
        {
            (FailureType::Deployment, Severity::Medium, FailureCategory::Environmental, "workflow:deploy")
        } else if workflow.contains("lint") {
            (FailureType::Code, Severity::Low, FailureCategory::Systematic, "workflow:lint")
        } else if workflow.contains("test") {
            (FailureType::Test, Severity::Medium, FailureCategory::Systematic, "workflow:test")
        } else {
            (FailureType::Code, Severity::Medium, FailureCategory::Systematic, "workflow:unknown")
        };

        FailureClassification::new(failure_type, severity, category, FALLBACK_CONFIDENCE)
            .with_tags(["unclassified", hint])
    }
}

impl FailureClassifier for PatternFailureClassifier {
    #[instrument(skip(self, event), fields(run_id = %event.run_id, log_bytes = event.logs.len()))]
    fn classify(&self, event: &FailureEvent) -> FailureClassification {
        let window = scan_window(&event.logs, self.scan_limit);

        let classification = match RULES.iter().find(|rule| rule.pattern.is_match(&window)) {
            Some(rule) => {
                tracing::debug!(rule = rule.name, "classification rule matched");
                FailureClassification::new(
                    rule.failure_type,
                    rule.severity,
                    rule.category,
                    rule.confidence,
                )
                .with_tags(rule.tags.iter().copied())
                .with_tags([format!("rule:{}", rule.name)])
            }
            None => {
                tracing::debug!("no classification rule matched; using fallback");
                Self::fallback(event)
            }
        };

        metrics::increment_counter!(
            "failure_classifier_classifications_total",
            "failure_type" => classification.failure_type.as_str()
        );

        classification
    }
}
