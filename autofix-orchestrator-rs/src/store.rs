// autofix-orchestrator-rs/src/store.rs
// Audit trail of terminal pipeline results

use std::sync::{PoisonError, RwLock};

use async_trait::async_trait;
use serde::Serialize;
use shared_types::{AutoFixResult, FailureReason};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ResultSummary {
    pub total: usize,
    pub succeeded: usize,
    pub no_valid_fix: usize,
    pub submission_error: usize,
    pub upstream_error: usize,
}

impl ResultSummary {
    fn add(&mut self, result: &AutoFixResult) {
        self.total += 1;
        match result.failure_reason() {
            None if result.succeeded() => self.succeeded += 1,
            None => {}
            Some(FailureReason::NoValidFix) => self.no_valid_fix += 1,
            Some(FailureReason::SubmissionError) => self.submission_error += 1,
            Some(FailureReason::UpstreamError) => self.upstream_error += 1,
        }
    }
}

#[async_trait]
pub trait ResultStore: Send + Sync {
    async fn record(&self, result: AutoFixResult);

    async fn get(&self, run_id: &str) -> Option<AutoFixResult>;

    async fn all(&self) -> Vec<AutoFixResult>;

    async fn summary(&self) -> ResultSummary;
}

#[derive(Debug, Default)]
pub struct InMemoryResultStore {
    results: RwLock<Vec<AutoFixResult>>,
}

impl InMemoryResultStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ResultStore for InMemoryResultStore {
    async fn record(&self, result: AutoFixResult) {
        self.results
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(result);
    }

    /// The latest result recorded for `run_id`.
    async fn get(&self, run_id: &str) -> Option<AutoFixResult> {
        self.results
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .rev()
            .find(|r| r.run_id == run_id)
            .cloned()
    }

    async fn all(&self) -> Vec<AutoFixResult> {
        self.results.read().unwrap_or_else(PoisonError::into_inner).clone()
    }

    async fn summary(&self) -> ResultSummary {
        let results = self.results.read().unwrap_or_else(PoisonError::into_inner);
        let mut summary = ResultSummary::default();
        for result in results.iter() {
            summary.add(result);
        }
        summary
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use shared_types::PipelineState;

    fn result(run_id: &str, state: PipelineState) -> AutoFixResult {
        AutoFixResult {
            run_id: run_id.into(),
            state,
            trail: vec![state],
            classification: None,
            analysis: None,
            attempts: Vec::new(),
            selected: None,
            submission: None,
            error: None,
            retryable_submission: false,
            started_at: Utc::now(),
            finished_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn summary_counts_by_outcome() {
        let store = InMemoryResultStore::new();
        store.record(result("a", PipelineState::Succeeded)).await;
        store.record(result("b", PipelineState::Failed(FailureReason::NoValidFix))).await;
        store.record(result("c", PipelineState::Failed(FailureReason::NoValidFix))).await;
        store.record(result("d", PipelineState::Failed(FailureReason::UpstreamError))).await;

        assert_eq!(
            store.summary().await,
            ResultSummary {
                total: 4,
                succeeded: 1,
                no_valid_fix: 2,
                submission_error: 0,
                upstream_error: 1,
            }
        );
        assert_eq!(store.all().await.len(), 4);
        assert_eq!(store.get("d").await.map(|r| r.state), Some(PipelineState::Failed(FailureReason::UpstreamError)));
        assert!(store.get("zzz").await.is_none());
    }
}
