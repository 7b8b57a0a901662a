// shared-types-rs/src/fix.rs
// Candidate fixes and the outcome of validating them in a sandbox.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::model::clamp_unit;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FixType {
    Code,
    Configuration,
    Dependency,
    Test,
    Infrastructure,
    Security,
    Workflow,
}

impl FixType {
    /// Whether a fix of this type must carry at least one code change.
    pub fn requires_changes(&self) -> bool {
        !matches!(self, FixType::Infrastructure)
    }

    /// Lenient parse used for model output. Unknown names map to `Code`.
    pub fn parse_lenient(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "configuration" | "config" => FixType::Configuration,
            "dependency" | "dependencies" => FixType::Dependency,
            "test" | "tests" => FixType::Test,
            "infrastructure" | "infra" => FixType::Infrastructure,
            "security" => FixType::Security,
            "workflow" | "ci" => FixType::Workflow,
            _ => FixType::Code,
        }
    }
}

impl fmt::Display for FixType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            FixType::Code => "code",
            FixType::Configuration => "configuration",
            FixType::Dependency => "dependency",
            FixType::Test => "test",
            FixType::Infrastructure => "infrastructure",
            FixType::Security => "security",
            FixType::Workflow => "workflow",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeOperation {
    Add,
    Modify,
    Delete,
}

impl ChangeOperation {
    pub fn parse_lenient(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "add" | "create" => ChangeOperation::Add,
            "delete" | "remove" => ChangeOperation::Delete,
            _ => ChangeOperation::Modify,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CodeChange {
    pub file_path: String,
    pub operation: ChangeOperation,
    pub old_content: Option<String>,
    pub new_content: Option<String>,
    #[serde(default)]
    pub explanation: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProposedFix {
    pub id: String,
    pub fix_type: FixType,
    pub description: String,
    pub rationale: String,
    pub changes: Vec<CodeChange>,
    /// Always within `[0, 1]`.
    pub confidence: f64,
    #[serde(default)]
    pub risks: Vec<String>,
    #[serde(default)]
    pub benefits: Vec<String>,
}

impl ProposedFix {
    pub fn new(fix_type: FixType, description: impl Into<String>, confidence: f64) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            fix_type,
            description: description.into(),
            rationale: String::new(),
            changes: Vec::new(),
            confidence: clamp_unit(confidence),
            risks: Vec::new(),
            benefits: Vec::new(),
        }
    }

    pub fn with_change(mut self, change: CodeChange) -> Self {
        self.changes.push(change);
        self
    }

    /// A fix whose type implies edits but carries none cannot be applied.
    pub fn is_applicable(&self) -> bool {
        !self.fix_type.requires_changes() || !self.changes.is_empty()
    }
}

/// Outcome of running the build/lint/test/coverage stages in a sandbox.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ValidationResult {
    pub success: bool,
    pub framework: String,
    pub build_passed: bool,
    /// `None` when the framework has no lint step.
    pub lint_passed: Option<bool>,
    pub total_tests: u32,
    pub passed: u32,
    pub failed: u32,
    pub skipped: u32,
    pub coverage_percent: f64,
    pub duration: Duration,
    pub output: String,
}

impl ValidationResult {
    pub fn build_failure(framework: impl Into<String>, output: impl Into<String>) -> Self {
        Self {
            success: false,
            framework: framework.into(),
            build_passed: false,
            output: output.into(),
            ..Self::default()
        }
    }
}

/// A candidate fix paired with its validation outcome.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FixValidationResult {
    pub fix: ProposedFix,
    pub validation: ValidationResult,
    pub valid: bool,
}

impl FixValidationResult {
    /// `valid` holds exactly when the stages succeeded and coverage meets the floor.
    pub fn evaluate(fix: ProposedFix, validation: ValidationResult, min_coverage: f64) -> Self {
        let valid = validation.success && validation.coverage_percent >= min_coverage;
        Self {
            fix,
            validation,
            valid,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn passing(coverage: f64) -> ValidationResult {
        ValidationResult {
            success: true,
            build_passed: true,
            coverage_percent: coverage,
            ..ValidationResult::default()
        }
    }

    #[test]
    fn validity_requires_success_and_coverage_floor() {
        let fix = ProposedFix::new(FixType::Code, "patch", 0.8);

        assert!(FixValidationResult::evaluate(fix.clone(), passing(85.0), 85.0).valid);
        assert!(!FixValidationResult::evaluate(fix.clone(), passing(84.9), 85.0).valid);

        let mut failed = passing(99.0);
        failed.success = false;
        assert!(!FixValidationResult::evaluate(fix, failed, 0.0).valid);
    }

    #[test]
    fn code_fix_without_changes_is_not_applicable() {
        let fix = ProposedFix::new(FixType::Code, "nothing", 0.5);
        assert!(!fix.is_applicable());

        let fix = fix.with_change(CodeChange {
            file_path: "src/lib.rs".into(),
            operation: ChangeOperation::Modify,
            old_content: Some("a".into()),
            new_content: Some("b".into()),
            explanation: String::new(),
        });
        assert!(fix.is_applicable());

        assert!(ProposedFix::new(FixType::Infrastructure, "rerun", 0.2).is_applicable());
    }

    #[test]
    fn lenient_parsing() {
        assert_eq!(FixType::parse_lenient(" Config "), FixType::Configuration);
        assert_eq!(FixType::parse_lenient("whatever"), FixType::Code);
        assert_eq!(ChangeOperation::parse_lenient("create"), ChangeOperation::Add);
        assert_eq!(ChangeOperation::parse_lenient("edit"), ChangeOperation::Modify);
    }

    #[test]
    fn proposed_fix_clamps_confidence() {
        assert_eq!(ProposedFix::new(FixType::Test, "x", -0.3).confidence, 0.0);
    }
}
