// autofix-orchestrator-rs/src/source_control.rs
// Source-control collaborator contract and the disposable-branch guard

use async_trait::async_trait;
use futures::future::BoxFuture;
use reasoning_gateway::ServiceError;
use sandbox_validator::SourceRef;
use shared_types::{
    AutofixError, CodeChange, FailureAnalysis, FailureEvent, FixValidationResult, SubmissionResult,
};
use tracing::{debug, warn};

/// Deletes a disposable branch. Runs without a cancellation token: cleanup
/// must finish even when the pipeline was cancelled.
pub type CleanupFn = Box<dyn FnOnce() -> BoxFuture<'static, Result<(), ServiceError>> + Send>;

/// The hosting service the failing runs come from. Implementations are thin
/// API clients; their transient failures should surface as retryable
/// `ServiceError`s so the orchestrator's resilience wrapper can retry them.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SourceControl: Send + Sync {
    async fn get_failing_runs(&self) -> Result<Vec<FailureEvent>, ServiceError>;

    async fn get_run_logs(&self, run_id: &str) -> Result<String, ServiceError>;

    /// Create `name` from the failing commit with `changes` applied. The
    /// returned cleanup deletes it again.
    async fn create_disposable_branch(
        &self,
        event: &FailureEvent,
        name: &str,
        changes: &[CodeChange],
    ) -> Result<CleanupFn, ServiceError>;

    async fn submit_for_review(
        &self,
        analysis: &FailureAnalysis,
        fix: &FixValidationResult,
    ) -> Result<SubmissionResult, ServiceError>;

    /// Where a sandbox fetches branches of this event's repository from.
    fn source_for(&self, event: &FailureEvent) -> SourceRef;
}

/// Maps a source-control failure into the pipeline taxonomy.
pub(crate) fn source_control_error(err: ServiceError) -> AutofixError {
    if err.is_cancelled() {
        AutofixError::Cancelled
    } else if err.is_authentication() {
        AutofixError::Authentication(err.to_string())
    } else {
        AutofixError::SourceControl(err.to_string())
    }
}

/// Owns the cleanup of one disposable branch and runs it exactly once:
/// through `release`, or from `Drop` when the owning future is dropped
/// before it got there.
pub struct BranchGuard {
    name: String,
    cleanup: Option<CleanupFn>,
}

impl BranchGuard {
    pub fn new(name: impl Into<String>, cleanup: CleanupFn) -> Self {
        Self {
            name: name.into(),
            cleanup: Some(cleanup),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub async fn release(mut self) {
        if let Some(cleanup) = self.cleanup.take() {
            match cleanup().await {
                Ok(()) => debug!(branch = %self.name, "disposable branch removed"),
                Err(err) => warn!(branch = %self.name, error = %err, "failed to remove disposable branch"),
            }
        }
    }
}

impl Drop for BranchGuard {
    fn drop(&mut self) {
        let Some(cleanup) = self.cleanup.take() else {
            return;
        };
        let name = std::mem::take(&mut self.name);
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move {
                    if let Err(err) = cleanup().await {
                        warn!(branch = %name, error = %err, "failed to remove disposable branch");
                    }
                });
            }
            Err(_) => warn!(branch = %name, "no runtime left to remove disposable branch"),
        }
    }
}

impl std::fmt::Debug for BranchGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BranchGuard")
            .field("name", &self.name)
            .field("pending", &self.cleanup.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::FutureExt;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn counting_cleanup(counter: Arc<AtomicUsize>) -> CleanupFn {
        Box::new(move || {
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }
            .boxed()
        })
    }

    #[tokio::test]
    async fn release_runs_cleanup_once() {
        let counter = Arc::new(AtomicUsize::new(0));
        let guard = BranchGuard::new("autofix/1", counting_cleanup(counter.clone()));
        guard.release().await;
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn dropped_guard_still_cleans_up() {
        let counter = Arc::new(AtomicUsize::new(0));
        drop(BranchGuard::new("autofix/2", counting_cleanup(counter.clone())));
        tokio::task::yield_now().await;
        tokio::task::yield_now().await;
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn errors_map_into_pipeline_taxonomy() {
        assert_eq!(
            source_control_error(ServiceError::Cancelled),
            AutofixError::Cancelled
        );
        assert!(matches!(
            source_control_error(ServiceError::authentication("bad token")),
            AutofixError::Authentication(_)
        ));
        assert!(matches!(
            source_control_error(ServiceError::service("502")),
            AutofixError::SourceControl(_)
        ));
    }
}
