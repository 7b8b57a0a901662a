//! # Autofix orchestrator
//!
//! Polls source control for failing runs and launches one [`Pipeline`] per
//! newly seen run. A run id is admitted at most once per
//! [`ProcessedRunRegistry`]; at most `max_concurrent_fixes` pipelines run at
//! the same time; every terminal result lands in the [`ResultStore`].
//!
//! ```ignore
//! let orchestrator = OrchestratorBuilder::from_config(&config)
//!     .source_control(github)
//!     .gateway(gateway)
//!     .sandbox(Arc::new(LocalProcessSandboxProvider::default()))
//!     .build()?;
//! orchestrator.run(&shutdown).await?;
//! ```

use std::sync::Arc;
use std::time::Duration;

use config_rs::AutofixConfig;
use failure_classifier::{FailureClassifier, PatternFailureClassifier};
use metrics::increment_counter;
use reasoning_gateway::{ReasoningGateway, Resilience, ResilienceConfig, ResilienceRegistry};
use sandbox_validator::{SandboxProvider, SandboxValidator};
use shared_types::{AutoFixResult, AutofixError};
use tokio::sync::{Mutex, Semaphore};
use tokio::task::JoinSet;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

use crate::analyzer::FailureAnalyzer;
use crate::pipeline::{cancelled_before_start, Pipeline, PipelineSettings};
use crate::registry::ProcessedRunRegistry;
use crate::source_control::{source_control_error, SourceControl};
use crate::store::{InMemoryResultStore, ResultStore};
use crate::synthesizer::FixSynthesizer;

/// Resilience key shared by every source-control call.
pub const SOURCE_CONTROL_DEPENDENCY: &str = "source_control";
/// Resilience key shared by every sandbox validation.
pub const SANDBOX_DEPENDENCY: &str = "sandbox";

pub struct Orchestrator {
    source_control: Arc<dyn SourceControl>,
    source_control_resilience: Resilience,
    pipeline: Arc<Pipeline>,
    registry: Arc<ProcessedRunRegistry>,
    store: Arc<dyn ResultStore>,
    permits: Arc<Semaphore>,
    tasks: Mutex<JoinSet<AutoFixResult>>,
    max_concurrent_fixes: usize,
    poll_interval: Duration,
}

impl Orchestrator {
    pub fn builder() -> OrchestratorBuilder {
        OrchestratorBuilder::default()
    }

    pub fn registry(&self) -> &Arc<ProcessedRunRegistry> {
        &self.registry
    }

    pub fn store(&self) -> &Arc<dyn ResultStore> {
        &self.store
    }

    pub fn pipeline(&self) -> &Arc<Pipeline> {
        &self.pipeline
    }

    pub fn max_concurrent_fixes(&self) -> usize {
        self.max_concurrent_fixes
    }

    pub fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    /// Pipelines spawned and not yet collected by [`Orchestrator::wait`].
    pub async fn in_flight(&self) -> usize {
        self.tasks.lock().await.len()
    }

    /// One poll: fetch failing runs and launch a pipeline for each run id
    /// not seen before. Returns the number of runs admitted.
    #[instrument(skip(self, cancel))]
    pub async fn poll_once(&self, cancel: &CancellationToken) -> Result<usize, AutofixError> {
        let source_control = self.source_control.as_ref();
        let events = self
            .source_control_resilience
            .execute(cancel, || source_control.get_failing_runs())
            .await
            .map_err(source_control_error)?;

        let mut tasks = self.tasks.lock().await;
        while let Some(finished) = tasks.try_join_next() {
            if let Err(err) = finished {
                error!(error = %err, "pipeline task aborted");
            }
        }

        let mut admitted = 0;
        for event in events {
            if !self.registry.try_admit(&event.run_id) {
                debug!(run_id = %event.run_id, "run already processed");
                continue;
            }
            admitted += 1;
            increment_counter!("autofix_pipelines_started_total");
            info!(run_id = %event.run_id, "failing run admitted");

            let pipeline = self.pipeline.clone();
            let permits = self.permits.clone();
            let store = self.store.clone();
            let cancel = cancel.clone();
            tasks.spawn(async move {
                let result = tokio::select! {
                    biased;
                    _ = cancel.cancelled() => cancelled_before_start(&event.run_id),
                    permit = permits.acquire_owned() => match permit {
                        Ok(_permit) => pipeline.run(event, &cancel).await,
                        Err(_) => cancelled_before_start(&event.run_id),
                    },
                };
                store.record(result.clone()).await;
                result
            });
        }

        debug!(admitted, in_flight = tasks.len(), "poll complete");
        Ok(admitted)
    }

    /// Poll every `poll_interval` until `cancel` fires, then wait for the
    /// pipelines already running. Authentication and configuration failures
    /// stop the loop; anything else is logged and retried on the next tick.
    pub async fn run(&self, cancel: &CancellationToken) -> Result<(), AutofixError> {
        info!(
            poll_interval = ?self.poll_interval,
            max_concurrent_fixes = self.max_concurrent_fixes,
            "orchestrator started"
        );

        let mut ticker = tokio::time::interval(self.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let mut outcome = Ok(());
        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {}
            }

            match self.poll_once(cancel).await {
                Ok(_) => {}
                Err(AutofixError::Cancelled) => break,
                Err(err) if err.is_fatal() => {
                    error!(error = %err, "stopping orchestrator");
                    outcome = Err(err);
                    break;
                }
                Err(err) => warn!(error = %err, "poll failed"),
            }
        }

        let finished = self.wait().await;
        info!(finished = finished.len(), "orchestrator stopped");
        outcome
    }

    /// Wait for every spawned pipeline and return their results in
    /// completion order.
    pub async fn wait(&self) -> Vec<AutoFixResult> {
        let mut tasks = std::mem::take(&mut *self.tasks.lock().await);
        let mut results = Vec::with_capacity(tasks.len());
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(result) => results.push(result),
                Err(err) => error!(error = %err, "pipeline task aborted"),
            }
        }
        results
    }
}

/// Assembles an [`Orchestrator`] from its collaborators. Classifier, store,
/// registry and resilience registry have defaults; source control, gateway
/// and sandbox provider are required.
pub struct OrchestratorBuilder {
    source_control: Option<Arc<dyn SourceControl>>,
    gateway: Option<Arc<dyn ReasoningGateway>>,
    sandbox: Option<Arc<dyn SandboxProvider>>,
    classifier: Option<Arc<dyn FailureClassifier>>,
    store: Option<Arc<dyn ResultStore>>,
    registry: Option<Arc<ProcessedRunRegistry>>,
    resilience: Option<ResilienceRegistry>,
    resilience_config: ResilienceConfig,
    settings: PipelineSettings,
    max_concurrent_fixes: usize,
    poll_interval: Duration,
    base_image: String,
}

impl Default for OrchestratorBuilder {
    fn default() -> Self {
        Self::from_config(&AutofixConfig::default())
    }
}

impl OrchestratorBuilder {
    pub fn from_config(config: &AutofixConfig) -> Self {
        Self {
            source_control: None,
            gateway: None,
            sandbox: None,
            classifier: None,
            store: None,
            registry: None,
            resilience: None,
            resilience_config: ResilienceConfig::from(&config.gateway),
            settings: PipelineSettings::from(config),
            max_concurrent_fixes: config.max_concurrent_fixes,
            poll_interval: config.poll_interval,
            base_image: config.sandbox_base_image.clone(),
        }
    }

    pub fn source_control(mut self, source_control: Arc<dyn SourceControl>) -> Self {
        self.source_control = Some(source_control);
        self
    }

    pub fn gateway(mut self, gateway: Arc<dyn ReasoningGateway>) -> Self {
        self.gateway = Some(gateway);
        self
    }

    pub fn sandbox(mut self, provider: Arc<dyn SandboxProvider>) -> Self {
        self.sandbox = Some(provider);
        self
    }

    pub fn classifier(mut self, classifier: Arc<dyn FailureClassifier>) -> Self {
        self.classifier = Some(classifier);
        self
    }

    pub fn store(mut self, store: Arc<dyn ResultStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Share a dedup registry between orchestrators.
    pub fn registry(mut self, registry: Arc<ProcessedRunRegistry>) -> Self {
        self.registry = Some(registry);
        self
    }

    /// Share breakers and limiters with other users of the same dependencies.
    pub fn resilience(mut self, registry: ResilienceRegistry) -> Self {
        self.resilience = Some(registry);
        self
    }

    pub fn settings(mut self, settings: PipelineSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn max_concurrent_fixes(mut self, max: usize) -> Self {
        self.max_concurrent_fixes = max;
        self
    }

    pub fn poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn base_image(mut self, image: impl Into<String>) -> Self {
        self.base_image = image.into();
        self
    }

    pub fn build(self) -> Result<Orchestrator, AutofixError> {
        let source_control = self
            .source_control
            .ok_or_else(|| AutofixError::Configuration("source control is required".into()))?;
        let gateway = self
            .gateway
            .ok_or_else(|| AutofixError::Configuration("reasoning gateway is required".into()))?;
        let sandbox = self
            .sandbox
            .ok_or_else(|| AutofixError::Configuration("sandbox provider is required".into()))?;

        if self.max_concurrent_fixes == 0 {
            return Err(AutofixError::Configuration(
                "max_concurrent_fixes must be at least 1".into(),
            ));
        }
        if self.poll_interval.is_zero() {
            return Err(AutofixError::Configuration("poll_interval must be positive".into()));
        }
        if !(0.0..=100.0).contains(&self.settings.min_coverage_percent) {
            return Err(AutofixError::Configuration(format!(
                "min_coverage_percent must be within 0..=100, got {}",
                self.settings.min_coverage_percent
            )));
        }

        let resilience = self
            .resilience
            .unwrap_or_else(|| ResilienceRegistry::new(self.resilience_config));
        let source_control_resilience = resilience.get(SOURCE_CONTROL_DEPENDENCY);

        let pipeline = Pipeline {
            classifier: self
                .classifier
                .unwrap_or_else(|| Arc::new(PatternFailureClassifier::new())),
            analyzer: FailureAnalyzer::new(gateway.clone()),
            synthesizer: FixSynthesizer::new(gateway, self.settings.max_candidates),
            validator: SandboxValidator::new(sandbox, self.base_image),
            source_control: source_control.clone(),
            source_control_resilience: source_control_resilience.clone(),
            sandbox_resilience: resilience.get(SANDBOX_DEPENDENCY),
            settings: self.settings,
        };

        Ok(Orchestrator {
            source_control,
            source_control_resilience,
            pipeline: Arc::new(pipeline),
            registry: self.registry.unwrap_or_default(),
            store: self
                .store
                .unwrap_or_else(|| Arc::new(InMemoryResultStore::new())),
            permits: Arc::new(Semaphore::new(self.max_concurrent_fixes)),
            tasks: Mutex::new(JoinSet::new()),
            max_concurrent_fixes: self.max_concurrent_fixes,
            poll_interval: self.poll_interval,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source_control::MockSourceControl;
    use reasoning_gateway::{ReasoningRequest, ReasoningResponse, ServiceError};
    use sandbox_validator::LocalProcessSandboxProvider;
    use shared_types::FailureEvent;

    struct Silent;

    #[async_trait::async_trait]
    impl ReasoningGateway for Silent {
        async fn send(
            &self,
            _request: &ReasoningRequest,
            _cancel: &CancellationToken,
        ) -> reasoning_gateway::Result<ReasoningResponse> {
            Err(ServiceError::service("unused"))
        }
    }

    fn complete_builder(source_control: MockSourceControl) -> OrchestratorBuilder {
        Orchestrator::builder()
            .source_control(Arc::new(source_control))
            .gateway(Arc::new(Silent))
            .sandbox(Arc::new(LocalProcessSandboxProvider::default()))
    }

    fn assert_configuration_error(result: Result<Orchestrator, AutofixError>) {
        match result {
            Err(AutofixError::Configuration(_)) => {}
            Err(other) => panic!("expected configuration error, got {other}"),
            Ok(_) => panic!("expected configuration error"),
        }
    }

    #[test]
    fn missing_collaborators_are_rejected() {
        assert_configuration_error(Orchestrator::builder().build());
        assert_configuration_error(
            Orchestrator::builder()
                .source_control(Arc::new(MockSourceControl::new()))
                .build(),
        );
    }

    #[test]
    fn invalid_limits_are_rejected() {
        assert_configuration_error(complete_builder(MockSourceControl::new()).max_concurrent_fixes(0).build());
        assert_configuration_error(complete_builder(MockSourceControl::new()).poll_interval(Duration::ZERO).build());

        let settings = PipelineSettings {
            min_coverage_percent: 120.0,
            ..PipelineSettings::default()
        };
        assert_configuration_error(complete_builder(MockSourceControl::new()).settings(settings).build());
    }

    #[tokio::test]
    async fn empty_poll_admits_nothing() {
        let mut source_control = MockSourceControl::new();
        source_control
            .expect_get_failing_runs()
            .times(1)
            .returning(|| Ok(Vec::new()));

        let orchestrator = complete_builder(source_control).build().unwrap();
        let admitted = orchestrator.poll_once(&CancellationToken::new()).await.unwrap();
        assert_eq!(admitted, 0);
        assert_eq!(orchestrator.in_flight().await, 0);
        assert!(orchestrator.registry().is_empty());
    }

    #[tokio::test]
    async fn authentication_failure_stops_the_loop() {
        let mut source_control = MockSourceControl::new();
        source_control
            .expect_get_failing_runs()
            .times(1)
            .returning(|| Err(ServiceError::authentication("bad token")));

        let orchestrator = complete_builder(source_control).build().unwrap();
        let outcome = orchestrator.run(&CancellationToken::new()).await;
        assert!(matches!(outcome, Err(AutofixError::Authentication(_))));
    }

    #[tokio::test]
    async fn cancelled_runs_are_recorded_without_starting() {
        let mut source_control = MockSourceControl::new();
        source_control
            .expect_get_failing_runs()
            .returning(|| Ok(vec![FailureEvent::new("run-7", "boom")]));

        let orchestrator = complete_builder(source_control).build().unwrap();
        let cancel = CancellationToken::new();
        assert_eq!(orchestrator.poll_once(&cancel).await.unwrap(), 1);
        cancel.cancel();

        let results = orchestrator.wait().await;
        assert_eq!(results.len(), 1);
        assert!(!results[0].succeeded());
        assert_eq!(orchestrator.store().summary().await.total, 1);
    }
}
