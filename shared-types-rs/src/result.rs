// shared-types-rs/src/result.rs
// Pipeline state machine vocabulary and the per-run result record.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::fix::FixValidationResult;
use crate::model::{FailureAnalysis, FailureClassification};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureReason {
    NoValidFix,
    SubmissionError,
    UpstreamError,
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            FailureReason::NoValidFix => "no_valid_fix",
            FailureReason::SubmissionError => "submission_error",
            FailureReason::UpstreamError => "upstream_error",
        };
        f.write_str(s)
    }
}

/// States a single run moves through. `Succeeded` and `Failed` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "state", content = "reason")]
pub enum PipelineState {
    Idle,
    Detected,
    Classifying,
    Analyzing,
    Synthesizing,
    Validating,
    Selecting,
    Submitting,
    Succeeded,
    Failed(FailureReason),
}

impl PipelineState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, PipelineState::Succeeded | PipelineState::Failed(_))
    }

    /// Whether `next` is a legal successor of `self`.
    pub fn can_transition_to(&self, next: PipelineState) -> bool {
        use PipelineState::*;
        match (*self, next) {
            (Idle, Detected)
            | (Detected, Classifying)
            | (Classifying, Analyzing)
            | (Analyzing, Synthesizing)
            | (Synthesizing, Validating)
            | (Validating, Selecting)
            | (Selecting, Submitting)
            | (Submitting, Succeeded) => true,
            (from, Failed(_)) => !from.is_terminal() && from != Idle,
            _ => false,
        }
    }
}

impl fmt::Display for PipelineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PipelineState::Idle => f.write_str("idle"),
            PipelineState::Detected => f.write_str("detected"),
            PipelineState::Classifying => f.write_str("classifying"),
            PipelineState::Analyzing => f.write_str("analyzing"),
            PipelineState::Synthesizing => f.write_str("synthesizing"),
            PipelineState::Validating => f.write_str("validating"),
            PipelineState::Selecting => f.write_str("selecting"),
            PipelineState::Submitting => f.write_str("submitting"),
            PipelineState::Succeeded => f.write_str("succeeded"),
            PipelineState::Failed(reason) => write!(f, "failed({})", reason),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum AttemptOutcome {
    Validated { result: FixValidationResult },
    Errored { message: String },
}

/// Record of one candidate's trip through an isolated branch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidateAttempt {
    pub fix_id: String,
    pub branch: String,
    pub outcome: AttemptOutcome,
}

impl CandidateAttempt {
    pub fn validated(&self) -> Option<&FixValidationResult> {
        match &self.outcome {
            AttemptOutcome::Validated { result } => Some(result),
            AttemptOutcome::Errored { .. } => None,
        }
    }
}

/// Handle returned by source control after a fix was submitted for review.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmissionResult {
    pub identifier: String,
    pub url: Option<String>,
    pub branch: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AutoFixResult {
    pub run_id: String,
    pub state: PipelineState,
    /// Every state entered, in order, ending with `state`.
    pub trail: Vec<PipelineState>,
    pub classification: Option<FailureClassification>,
    pub analysis: Option<FailureAnalysis>,
    pub attempts: Vec<CandidateAttempt>,
    pub selected: Option<FixValidationResult>,
    pub submission: Option<SubmissionResult>,
    pub error: Option<String>,
    /// Set when submission failed; the run stays marked as processed.
    pub retryable_submission: bool,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl AutoFixResult {
    pub fn succeeded(&self) -> bool {
        self.state == PipelineState::Succeeded
    }

    pub fn failure_reason(&self) -> Option<FailureReason> {
        match self.state {
            PipelineState::Failed(reason) => Some(reason),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn happy_path_transitions_are_legal() {
        use PipelineState::*;
        let path = [
            Idle,
            Detected,
            Classifying,
            Analyzing,
            Synthesizing,
            Validating,
            Selecting,
            Submitting,
            Succeeded,
        ];
        for pair in path.windows(2) {
            assert!(pair[0].can_transition_to(pair[1]), "{} -> {}", pair[0], pair[1]);
        }
    }

    #[test]
    fn terminal_states_do_not_move() {
        use PipelineState::*;
        assert!(!Succeeded.can_transition_to(Failed(FailureReason::UpstreamError)));
        assert!(!Failed(FailureReason::NoValidFix).can_transition_to(Submitting));
        assert!(Validating.can_transition_to(Failed(FailureReason::NoValidFix)));
        assert!(!Analyzing.can_transition_to(Submitting));
    }

    #[test]
    fn failed_state_display_includes_reason() {
        assert_eq!(
            PipelineState::Failed(FailureReason::SubmissionError).to_string(),
            "failed(submission_error)"
        );
    }
}
