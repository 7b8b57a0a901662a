mod support;

use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use shared_types::FailureReason;
use tokio_util::sync::CancellationToken;

use autofix_orchestrator::{Orchestrator, OrchestratorBuilder, ProcessedRunRegistry};
use support::{failing_run, fix, FakeSandbox, FakeSourceControl, SandboxStats, ScriptedGateway, Verdict};

fn builder(source_control: Arc<FakeSourceControl>, sandbox: FakeSandbox) -> OrchestratorBuilder {
    Orchestrator::builder()
        .source_control(source_control)
        .gateway(Arc::new(ScriptedGateway::new(json!([fix("only", 0.9)]))))
        .sandbox(Arc::new(sandbox))
}

fn passing() -> (FakeSandbox, Arc<SandboxStats>) {
    let sandbox = FakeSandbox::new(Verdict::Passes { coverage: 95.0 });
    let stats = sandbox.stats.clone();
    (sandbox, stats)
}

#[tokio::test]
async fn concurrent_polls_admit_a_run_once() {
    let source_control = Arc::new(FakeSourceControl::with_runs(vec![failing_run("run-1")]));
    let (sandbox, _) = passing();
    let orchestrator = builder(source_control.clone(), sandbox).build().unwrap();
    let cancel = CancellationToken::new();

    let (a, b, c) = tokio::join!(
        orchestrator.poll_once(&cancel),
        orchestrator.poll_once(&cancel),
        orchestrator.poll_once(&cancel),
    );
    assert_eq!(a.unwrap() + b.unwrap() + c.unwrap(), 1);

    let results = orchestrator.wait().await;
    assert_eq!(results.len(), 1);
    assert!(results[0].succeeded());
    assert_eq!(source_control.submitted(), 1);
    assert_eq!(orchestrator.registry().len(), 1);

    assert_eq!(orchestrator.poll_once(&cancel).await.unwrap(), 0);
    assert!(orchestrator.wait().await.is_empty());
}

#[tokio::test]
async fn in_flight_pipelines_are_bounded() {
    let runs = (1..=3).map(|i| failing_run(&format!("run-{}", i))).collect();
    let source_control = Arc::new(FakeSourceControl::with_runs(runs));
    let (sandbox, stats) = passing();
    let orchestrator = builder(source_control.clone(), sandbox)
        .max_concurrent_fixes(1)
        .build()
        .unwrap();

    assert_eq!(orchestrator.poll_once(&CancellationToken::new()).await.unwrap(), 3);
    let results = orchestrator.wait().await;

    assert_eq!(results.len(), 3);
    assert!(results.iter().all(|r| r.succeeded()));
    assert_eq!(stats.peak(), 1);
    assert_eq!(stats.torn_down(), 3);
    assert_eq!(source_control.cleaned(), 3);

    let summary = orchestrator.store().summary().await;
    assert_eq!(summary.total, 3);
    assert_eq!(summary.succeeded, 3);
}

#[tokio::test]
async fn wider_pool_still_respects_its_limit() {
    let runs = (1..=4).map(|i| failing_run(&format!("run-{}", i))).collect();
    let source_control = Arc::new(FakeSourceControl::with_runs(runs));
    let (sandbox, stats) = passing();
    let orchestrator = builder(source_control, sandbox)
        .max_concurrent_fixes(2)
        .build()
        .unwrap();

    orchestrator.poll_once(&CancellationToken::new()).await.unwrap();
    let results = orchestrator.wait().await;

    assert_eq!(results.len(), 4);
    assert!(stats.peak() <= 2);
}

#[tokio::test]
async fn shared_registry_spans_orchestrators() {
    let registry = Arc::new(ProcessedRunRegistry::new());
    let source_control = Arc::new(FakeSourceControl::with_runs(vec![failing_run("run-9")]));

    let (sandbox, _) = passing();
    let first = builder(source_control.clone(), sandbox)
        .registry(registry.clone())
        .build()
        .unwrap();
    let (sandbox, _) = passing();
    let second = builder(source_control.clone(), sandbox)
        .registry(registry.clone())
        .build()
        .unwrap();

    let cancel = CancellationToken::new();
    assert_eq!(first.poll_once(&cancel).await.unwrap(), 1);
    assert_eq!(second.poll_once(&cancel).await.unwrap(), 0);
    first.wait().await;
    assert!(registry.contains("run-9"));
    assert_eq!(source_control.submitted(), 1);
}

#[tokio::test]
async fn cancelling_the_loop_stops_promptly_and_cleans_up() {
    let source_control = Arc::new(FakeSourceControl::with_runs(vec![failing_run("run-42")]));
    let sandbox = FakeSandbox::new(Verdict::Hang);
    let stats = sandbox.stats.clone();
    let orchestrator = Arc::new(builder(source_control.clone(), sandbox).build().unwrap());

    let cancel = CancellationToken::new();
    let running = {
        let orchestrator = orchestrator.clone();
        let cancel = cancel.clone();
        tokio::spawn(async move { orchestrator.run(&cancel).await })
    };

    stats.hanging.notified().await;
    cancel.cancel();

    let outcome = tokio::time::timeout(Duration::from_secs(5), running)
        .await
        .expect("orchestrator did not stop")
        .unwrap();
    assert!(outcome.is_ok());

    assert_eq!(source_control.created(), 1);
    assert_eq!(source_control.cleaned(), 1);
    assert_eq!(source_control.submitted(), 0);

    let recorded = orchestrator.store().get("run-42").await.unwrap();
    assert_eq!(recorded.failure_reason(), Some(FailureReason::UpstreamError));
    assert_eq!(orchestrator.in_flight().await, 0);
}
