// autofix-orchestrator-rs/src/pipeline.rs
// One failing run, start to finish:
//
//   Detected -> Classifying -> Analyzing -> Synthesizing -> Validating
//            -> Selecting -> Submitting -> Succeeded
//
// Any stage may end the run in Failed(reason). Every disposable branch
// created for a candidate is removed before `run` returns, whatever the
// outcome.

use std::sync::Arc;

use chrono::Utc;
use config_rs::AutofixConfig;
use futures::future::join_all;
use metrics::increment_counter;
use reasoning_gateway::{Resilience, ServiceError};
use sandbox_validator::{SandboxError, SandboxValidator};
use shared_types::{
    AttemptOutcome, AutoFixResult, AutofixError, CandidateAttempt, FailureEvent, FixValidationResult,
    PipelineState, ProposedFix,
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use failure_classifier::FailureClassifier;

use crate::analyzer::FailureAnalyzer;
use crate::selector::select;
use crate::source_control::{source_control_error, BranchGuard, SourceControl};
use crate::synthesizer::FixSynthesizer;

#[derive(Debug, Clone, PartialEq)]
pub struct PipelineSettings {
    /// Coverage floor for a candidate to count as valid, in percent
    pub min_coverage_percent: f64,
    pub max_candidates: usize,
    /// Validate candidates concurrently, each in its own branch and workspace
    pub parallel_validation: bool,
    pub branch_prefix: String,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self::from(&AutofixConfig::default())
    }
}

impl From<&AutofixConfig> for PipelineSettings {
    fn from(config: &AutofixConfig) -> Self {
        Self {
            min_coverage_percent: config.min_coverage_percent,
            max_candidates: config.max_candidates,
            parallel_validation: config.parallel_validation,
            branch_prefix: "autofix".to_string(),
        }
    }
}

/// Accumulates the result while a run moves through its states.
struct RunRecord {
    result: AutoFixResult,
}

impl RunRecord {
    fn new(run_id: &str) -> Self {
        let now = Utc::now();
        Self {
            result: AutoFixResult {
                run_id: run_id.to_string(),
                state: PipelineState::Idle,
                trail: vec![PipelineState::Idle],
                classification: None,
                analysis: None,
                attempts: Vec::new(),
                selected: None,
                submission: None,
                error: None,
                retryable_submission: false,
                started_at: now,
                finished_at: now,
            },
        }
    }

    fn enter(&mut self, next: PipelineState) {
        debug_assert!(
            self.result.state.can_transition_to(next),
            "illegal transition {} -> {}",
            self.result.state,
            next
        );
        debug!(run_id = %self.result.run_id, from = %self.result.state, to = %next, "state transition");
        self.result.state = next;
        self.result.trail.push(next);
    }

    fn finish(mut self, outcome: Result<(), AutofixError>) -> AutoFixResult {
        match outcome {
            Ok(()) => {
                increment_counter!("autofix_pipelines_succeeded_total");
            }
            Err(err) => {
                let reason = err.failure_reason();
                increment_counter!("autofix_pipelines_failed_total", "reason" => reason.to_string());
                self.result.error = Some(err.to_string());
                self.enter(PipelineState::Failed(reason));
            }
        }
        self.result.finished_at = Utc::now();
        self.result
    }
}

/// Result for a run that was admitted but cancelled before it could start.
pub(crate) fn cancelled_before_start(run_id: &str) -> AutoFixResult {
    let mut record = RunRecord::new(run_id);
    record.enter(PipelineState::Detected);
    record.finish(Err(AutofixError::Cancelled))
}

fn branch_name(prefix: &str, run_id: &str, index: usize) -> String {
    let run: String = run_id
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') { c } else { '-' })
        .collect();
    let nonce = uuid::Uuid::new_v4().simple().to_string();
    format!("{}/{}/{}-{}", prefix, run, index + 1, &nonce[..8])
}

/// Sandbox failures as seen by the resilience wrapper: provisioning and I/O
/// problems are worth another attempt, command failures are not.
fn sandbox_service_error(err: SandboxError) -> ServiceError {
    match err {
        SandboxError::Cancelled => ServiceError::Cancelled,
        SandboxError::Provision(_) | SandboxError::Io(_) => ServiceError::service(err.to_string()),
        other => ServiceError::internal(other.to_string()),
    }
}

fn errored(fix: &ProposedFix, branch: String, err: &AutofixError) -> CandidateAttempt {
    increment_counter!("autofix_candidates_validated_total", "outcome" => "errored");
    CandidateAttempt {
        fix_id: fix.id.clone(),
        branch,
        outcome: AttemptOutcome::Errored {
            message: err.to_string(),
        },
    }
}

pub struct Pipeline {
    pub(crate) classifier: Arc<dyn FailureClassifier>,
    pub(crate) analyzer: FailureAnalyzer,
    pub(crate) synthesizer: FixSynthesizer,
    pub(crate) validator: SandboxValidator,
    pub(crate) source_control: Arc<dyn SourceControl>,
    pub(crate) source_control_resilience: Resilience,
    pub(crate) sandbox_resilience: Resilience,
    pub(crate) settings: PipelineSettings,
}

impl Pipeline {
    pub fn settings(&self) -> &PipelineSettings {
        &self.settings
    }

    /// Drive one failing run to a terminal state. Never panics and never
    /// returns early: every failure is folded into the returned result.
    #[instrument(skip(self, event, cancel), fields(run_id = %event.run_id))]
    pub async fn run(&self, mut event: FailureEvent, cancel: &CancellationToken) -> AutoFixResult {
        let mut record = RunRecord::new(&event.run_id);
        record.enter(PipelineState::Detected);

        let outcome = self.drive(&mut record, &mut event, cancel).await;
        let result = record.finish(outcome);

        match result.state {
            PipelineState::Succeeded => info!(trail = ?result.trail, "autofix run succeeded"),
            state => warn!(
                %state,
                error = result.error.as_deref().unwrap_or_default(),
                "autofix run failed"
            ),
        }
        result
    }

    async fn drive(
        &self,
        record: &mut RunRecord,
        event: &mut FailureEvent,
        cancel: &CancellationToken,
    ) -> Result<(), AutofixError> {
        let source_control = self.source_control.as_ref();

        record.enter(PipelineState::Classifying);
        if event.logs.trim().is_empty() {
            let run_id = event.run_id.as_str();
            event.logs = self
                .source_control_resilience
                .execute(cancel, move || source_control.get_run_logs(run_id))
                .await
                .map_err(source_control_error)?;
        }
        let classification = self.classifier.classify(event);
        info!(
            failure_type = %classification.failure_type,
            severity = %classification.severity,
            category = %classification.category,
            confidence = classification.confidence,
            "failure classified"
        );
        record.result.classification = Some(classification.clone());

        record.enter(PipelineState::Analyzing);
        let analysis = self.analyzer.analyze(event, classification, cancel).await?;
        record.result.analysis = Some(analysis.clone());

        record.enter(PipelineState::Synthesizing);
        let candidates = self.synthesizer.synthesize(&analysis, cancel).await?;
        if candidates.is_empty() {
            return Err(AutofixError::NoValidFix("no candidate fixes were proposed".into()));
        }

        record.enter(PipelineState::Validating);
        let total = candidates.len();
        self.validate_all(event, candidates, &mut record.result.attempts, cancel).await?;
        if cancel.is_cancelled() {
            return Err(AutofixError::Cancelled);
        }

        let validated: Vec<FixValidationResult> = record
            .result
            .attempts
            .iter()
            .filter_map(|attempt| attempt.validated().cloned())
            .collect();
        if validated.is_empty() {
            return Err(AutofixError::Validation(format!(
                "all {} candidates failed to validate",
                total
            )));
        }

        record.enter(PipelineState::Selecting);
        let selected = select(&validated).cloned().ok_or_else(|| {
            AutofixError::NoValidFix(format!(
                "none of {} validated candidates passed with coverage >= {}%",
                validated.len(),
                self.settings.min_coverage_percent
            ))
        })?;
        info!(fix = %selected.fix.id, confidence = selected.fix.confidence, "fix selected");
        record.result.selected = Some(selected.clone());

        record.enter(PipelineState::Submitting);
        let submitted = self
            .source_control_resilience
            .execute(cancel, || source_control.submit_for_review(&analysis, &selected))
            .await;
        match submitted {
            Ok(submission) => {
                info!(identifier = %submission.identifier, branch = %submission.branch, "fix submitted for review");
                record.result.submission = Some(submission);
                record.enter(PipelineState::Succeeded);
                Ok(())
            }
            Err(err) => {
                record.result.retryable_submission = true;
                Err(AutofixError::Submission(err.to_string()))
            }
        }
    }

    /// Validate every candidate into `attempts`. A fatal error (rejected
    /// credentials, say) stops the run instead of being pinned on one
    /// candidate; sequential validation then skips the candidates left.
    async fn validate_all(
        &self,
        event: &FailureEvent,
        candidates: Vec<ProposedFix>,
        attempts: &mut Vec<CandidateAttempt>,
        cancel: &CancellationToken,
    ) -> Result<(), AutofixError> {
        if self.settings.parallel_validation {
            let validations = candidates
                .iter()
                .enumerate()
                .map(|(index, fix)| self.validate_candidate(event, index, fix, cancel));
            let mut fatal = None;
            for (attempt, halt) in join_all(validations).await {
                attempts.push(attempt);
                fatal = fatal.or(halt);
            }
            return fatal.map_or(Ok(()), Err);
        }

        for (index, fix) in candidates.iter().enumerate() {
            let (attempt, halt) = self.validate_candidate(event, index, fix, cancel).await;
            attempts.push(attempt);
            if let Some(err) = halt {
                return Err(err);
            }
        }
        Ok(())
    }

    #[instrument(skip(self, event, fix, cancel), fields(candidate = %fix.id))]
    async fn validate_candidate(
        &self,
        event: &FailureEvent,
        index: usize,
        fix: &ProposedFix,
        cancel: &CancellationToken,
    ) -> (CandidateAttempt, Option<AutofixError>) {
        let branch = branch_name(&self.settings.branch_prefix, &event.run_id, index);
        if cancel.is_cancelled() {
            return (errored(fix, branch, &AutofixError::Cancelled), None);
        }

        let source_control = self.source_control.as_ref();
        let created = self
            .source_control_resilience
            .execute(cancel, || {
                source_control.create_disposable_branch(event, &branch, &fix.changes)
            })
            .await;
        let guard = match created {
            Ok(cleanup) => BranchGuard::new(branch.as_str(), cleanup),
            Err(err) => {
                let err = source_control_error(err);
                warn!(branch = %branch, error = %err, "could not create disposable branch");
                let halt = err.is_fatal().then(|| err.clone());
                return (errored(fix, branch, &err), halt);
            }
        };

        let source = source_control.source_for(event);
        let validator = &self.validator;
        let (source_ref, branch_ref) = (&source, branch.as_str());
        let validated = self
            .sandbox_resilience
            .execute(cancel, move || async move {
                validator
                    .validate(source_ref, branch_ref, cancel)
                    .await
                    .map_err(sandbox_service_error)
            })
            .await;

        guard.release().await;

        match validated {
            Ok(validation) => {
                let result =
                    FixValidationResult::evaluate(fix.clone(), validation, self.settings.min_coverage_percent);
                increment_counter!(
                    "autofix_candidates_validated_total",
                    "outcome" => if result.valid { "valid" } else { "invalid" }
                );
                info!(
                    valid = result.valid,
                    success = result.validation.success,
                    coverage = result.validation.coverage_percent,
                    "candidate validated"
                );
                let attempt = CandidateAttempt {
                    fix_id: fix.id.clone(),
                    branch,
                    outcome: AttemptOutcome::Validated { result },
                };
                (attempt, None)
            }
            Err(err) => {
                let err = if err.is_cancelled() {
                    AutofixError::Cancelled
                } else {
                    AutofixError::Validation(err.to_string())
                };
                warn!(branch = %branch, error = %err, "candidate could not be validated");
                (errored(fix, branch, &err), None)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn branch_names_are_unique_and_safe() {
        let a = branch_name("autofix", "org/repo#12 34", 0);
        let b = branch_name("autofix", "org/repo#12 34", 0);
        assert_ne!(a, b);
        assert!(a.starts_with("autofix/org-repo-12-34/1-"));
        assert_eq!(a.len(), "autofix/org-repo-12-34/1-".len() + 8);
    }

    #[test]
    fn sandbox_errors_keep_retry_semantics() {
        assert!(sandbox_service_error(SandboxError::Provision("docker down".into())).is_retryable());
        assert!(!sandbox_service_error(SandboxError::launch("make", "not found")).is_retryable());
        assert!(sandbox_service_error(SandboxError::Cancelled).is_cancelled());
    }

    #[test]
    fn cancelled_run_is_an_upstream_failure() {
        let result = cancelled_before_start("run-1");
        assert_eq!(
            result.trail,
            vec![
                PipelineState::Idle,
                PipelineState::Detected,
                PipelineState::Failed(shared_types::FailureReason::UpstreamError)
            ]
        );
        assert_eq!(result.error.as_deref(), Some("Operation cancelled"));
    }
}
