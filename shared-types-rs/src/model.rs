// shared-types-rs/src/model.rs
// Failure events as reported by source control, plus the classification and
// analysis records derived from them.

use std::collections::BTreeSet;
use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A failing pipeline run. Immutable once received.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FailureEvent {
    pub run_id: String,
    /// Repository the run belongs to, e.g. `owner/name` or a local path.
    pub repository: String,
    /// What triggered the run (`push`, `pull_request`, ...).
    pub trigger: String,
    pub branch: String,
    pub commit: String,
    pub workflow: Option<String>,
    pub timestamp: DateTime<Utc>,
    pub logs: String,
    #[serde(default)]
    pub structured_logs: Option<serde_json::Value>,
}

impl FailureEvent {
    pub fn new(run_id: impl Into<String>, logs: impl Into<String>) -> Self {
        Self {
            run_id: run_id.into(),
            repository: String::new(),
            trigger: "push".to_string(),
            branch: "main".to_string(),
            commit: String::new(),
            workflow: None,
            timestamp: Utc::now(),
            logs: logs.into(),
            structured_logs: None,
        }
    }

    pub fn with_repository(mut self, repository: impl Into<String>) -> Self {
        self.repository = repository.into();
        self
    }

    pub fn with_branch(mut self, branch: impl Into<String>) -> Self {
        self.branch = branch.into();
        self
    }

    pub fn with_commit(mut self, commit: impl Into<String>) -> Self {
        self.commit = commit.into();
        self
    }

    pub fn with_workflow(mut self, workflow: impl Into<String>) -> Self {
        self.workflow = Some(workflow.into());
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureType {
    Infrastructure,
    Code,
    Test,
    Dependency,
    Build,
    Deployment,
    Configuration,
    Security,
}

impl FailureType {
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureType::Infrastructure => "infrastructure",
            FailureType::Code => "code",
            FailureType::Test => "test",
            FailureType::Dependency => "dependency",
            FailureType::Build => "build",
            FailureType::Deployment => "deployment",
            FailureType::Configuration => "configuration",
            FailureType::Security => "security",
        }
    }
}

impl fmt::Display for FailureType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Severity::Low => "low",
            Severity::Medium => "medium",
            Severity::High => "high",
            Severity::Critical => "critical",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureCategory {
    Transient,
    Systematic,
    Environmental,
    Flaky,
}

impl fmt::Display for FailureCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            FailureCategory::Transient => "transient",
            FailureCategory::Systematic => "systematic",
            FailureCategory::Environmental => "environmental",
            FailureCategory::Flaky => "flaky",
        };
        f.write_str(s)
    }
}

/// Output of the failure classifier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FailureClassification {
    pub failure_type: FailureType,
    pub severity: Severity,
    pub category: FailureCategory,
    /// Always within `[0, 1]`.
    pub confidence: f64,
    pub tags: BTreeSet<String>,
}

impl FailureClassification {
    pub fn new(
        failure_type: FailureType,
        severity: Severity,
        category: FailureCategory,
        confidence: f64,
    ) -> Self {
        Self {
            failure_type,
            severity,
            category,
            confidence: clamp_unit(confidence),
            tags: BTreeSet::new(),
        }
    }

    pub fn with_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags.extend(tags.into_iter().map(Into::into));
        self
    }
}

/// Classification enriched by the reasoning service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FailureAnalysis {
    pub run_id: String,
    pub classification: FailureClassification,
    pub root_cause: String,
    pub affected_files: Vec<String>,
    pub error_patterns: Vec<String>,
    pub suggested_approach: Option<String>,
    pub processing_time: Duration,
}

/// Clamps a score into `[0, 1]`, mapping NaN to 0.
pub fn clamp_unit(value: f64) -> f64 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, 1.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classification_confidence_is_clamped() {
        let c = FailureClassification::new(
            FailureType::Build,
            Severity::High,
            FailureCategory::Systematic,
            1.7,
        );
        assert_eq!(c.confidence, 1.0);

        let c = FailureClassification::new(
            FailureType::Test,
            Severity::Low,
            FailureCategory::Flaky,
            f64::NAN,
        );
        assert_eq!(c.confidence, 0.0);
    }

    #[test]
    fn tags_are_ordered() {
        let c = FailureClassification::new(
            FailureType::Configuration,
            Severity::Low,
            FailureCategory::Systematic,
            0.5,
        )
        .with_tags(["style", "eslint", "format"]);
        let tags: Vec<_> = c.tags.iter().cloned().collect();
        assert_eq!(tags, vec!["eslint", "format", "style"]);
    }

    #[test]
    fn display_uses_wire_names() {
        assert_eq!(FailureType::Infrastructure.to_string(), "infrastructure");
        assert_eq!(Severity::Critical.to_string(), "critical");
        assert_eq!(FailureCategory::Environmental.to_string(), "environmental");
        assert_eq!(
            serde_json::to_string(&FailureType::Dependency).unwrap(),
            "\"dependency\""
        );
    }
}
