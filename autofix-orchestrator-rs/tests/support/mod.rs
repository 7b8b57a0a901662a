// Hand-written collaborators for the orchestrator integration tests.
#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use futures::FutureExt;
use reasoning_gateway::{ProviderKind, ReasoningGateway, ReasoningRequest, ReasoningResponse, ServiceError};
use sandbox_validator::{CommandOutput, SandboxError, SandboxHandle, SandboxProvider, SandboxSpec, SourceRef};
use serde_json::json;
use shared_types::{
    CodeChange, FailureAnalysis, FailureEvent, FixValidationResult, SubmissionResult,
};
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;

use autofix_orchestrator::{CleanupFn, SourceControl};

pub const COMPILE_FAILURE: &str = "\
   Compiling app v0.1.0 (/work/app)
error[E0425]: cannot find value `config` in this scope
  --> src/main.rs:12:5
error: could not compile `app` due to previous error
";

pub fn failing_run(run_id: &str) -> FailureEvent {
    FailureEvent::new(run_id, COMPILE_FAILURE)
        .with_repository("acme/app")
        .with_branch("main")
        .with_commit("4f2c9e1")
        .with_workflow("ci")
}

// ---------------------------------------------------------------------------
// Source control

#[derive(Default)]
pub struct FakeSourceControl {
    runs: Mutex<Vec<FailureEvent>>,
    logs: String,
    reject_submission: bool,
    reject_branches: bool,
    pub log_fetches: AtomicUsize,
    pub created: AtomicUsize,
    pub cleaned: Arc<AtomicUsize>,
    pub submitted: AtomicUsize,
    pub submitted_fixes: Mutex<Vec<String>>,
    pub branches: Mutex<Vec<String>>,
}

impl FakeSourceControl {
    pub fn with_runs(runs: Vec<FailureEvent>) -> Self {
        Self {
            runs: Mutex::new(runs),
            ..Self::default()
        }
    }

    pub fn with_logs(mut self, logs: &str) -> Self {
        self.logs = logs.to_string();
        self
    }

    pub fn rejecting_submissions(mut self) -> Self {
        self.reject_submission = true;
        self
    }

    /// Branch creation fails as if the token had been revoked.
    pub fn revoked_token(mut self) -> Self {
        self.reject_branches = true;
        self
    }

    pub fn cleaned(&self) -> usize {
        self.cleaned.load(Ordering::SeqCst)
    }

    pub fn created(&self) -> usize {
        self.created.load(Ordering::SeqCst)
    }

    pub fn submitted(&self) -> usize {
        self.submitted.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SourceControl for FakeSourceControl {
    async fn get_failing_runs(&self) -> Result<Vec<FailureEvent>, ServiceError> {
        Ok(self.runs.lock().unwrap().clone())
    }

    async fn get_run_logs(&self, _run_id: &str) -> Result<String, ServiceError> {
        self.log_fetches.fetch_add(1, Ordering::SeqCst);
        Ok(self.logs.clone())
    }

    async fn create_disposable_branch(
        &self,
        _event: &FailureEvent,
        name: &str,
        _changes: &[CodeChange],
    ) -> Result<CleanupFn, ServiceError> {
        self.created.fetch_add(1, Ordering::SeqCst);
        if self.reject_branches {
            return Err(ServiceError::authentication("HTTP 401: token revoked"));
        }
        self.branches.lock().unwrap().push(name.to_string());
        let cleaned = self.cleaned.clone();
        Ok(Box::new(move || {
            async move {
                cleaned.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }
            .boxed()
        }))
    }

    async fn submit_for_review(
        &self,
        _analysis: &FailureAnalysis,
        fix: &FixValidationResult,
    ) -> Result<SubmissionResult, ServiceError> {
        if self.reject_submission {
            return Err(ServiceError::validation("pull request rejected: branch protection"));
        }
        let number = self.submitted.fetch_add(1, Ordering::SeqCst) + 1;
        self.submitted_fixes.lock().unwrap().push(fix.fix.id.clone());
        Ok(SubmissionResult {
            identifier: format!("#{}", number),
            url: Some(format!("https://git.example.com/acme/app/pull/{}", number)),
            branch: format!("autofix/pr-{}", number),
        })
    }

    fn source_for(&self, _event: &FailureEvent) -> SourceRef {
        SourceRef::Git {
            url: "https://git.example.com/acme/app.git".into(),
            branch: None,
        }
    }
}

// ---------------------------------------------------------------------------
// Reasoning gateway

/// Answers the analysis prompt with a JSON analysis and the synthesis prompt
/// (the one offering the `propose_fix` tool) with a canned fix list.
pub struct ScriptedGateway {
    analysis: String,
    fixes: String,
    pub calls: AtomicUsize,
}

impl ScriptedGateway {
    pub fn new(fixes: serde_json::Value) -> Self {
        Self {
            analysis: json!({
                "root_cause": "`config` is used before it is declared in src/main.rs",
                "affected_files": ["src/main.rs"],
                "error_patterns": ["error[E0425]: cannot find value `config` in this scope"],
                "suggested_approach": "declare the binding before use"
            })
            .to_string(),
            fixes: fixes.to_string(),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ReasoningGateway for ScriptedGateway {
    async fn send(
        &self,
        request: &ReasoningRequest,
        _cancel: &CancellationToken,
    ) -> reasoning_gateway::Result<ReasoningResponse> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let content = if request.tools.is_empty() {
            self.analysis.clone()
        } else {
            format!("Here are the candidates:\n```json\n{}\n```", self.fixes)
        };
        Ok(ReasoningResponse {
            provider: ProviderKind::Anthropic,
            model: "scripted".into(),
            content,
            tool_invocations: Vec::new(),
            finish_reason: Some("end_turn".into()),
            usage: None,
        })
    }
}

pub fn fix(id: &str, confidence: f64) -> serde_json::Value {
    json!({
        "id": id,
        "type": "code",
        "description": format!("candidate {}", id),
        "rationale": "declare `config` before use",
        "confidence": confidence,
        "changes": [{
            "file_path": "src/main.rs",
            "operation": "modify",
            "old_content": "println!(\"{}\", config);",
            "new_content": "let config = load();\nprintln!(\"{}\", config);",
            "explanation": "bind config"
        }]
    })
}

// ---------------------------------------------------------------------------
// Sandbox

/// How the sandbox behaves for one candidate, keyed by the 1-based candidate
/// number carried in the branch name.
#[derive(Debug, Clone, Copy)]
pub enum Verdict {
    Passes { coverage: f64 },
    TestsFail,
    LaunchError,
    /// Blocks in `start` until cancelled
    Hang,
    /// Starts, then never finishes its test command
    StallsInTests,
}

#[derive(Default)]
pub struct SandboxStats {
    pub started: AtomicUsize,
    pub torn_down: AtomicUsize,
    active: AtomicUsize,
    pub peak: AtomicUsize,
    pub hanging: Notify,
}

impl SandboxStats {
    pub fn started(&self) -> usize {
        self.started.load(Ordering::SeqCst)
    }

    pub fn torn_down(&self) -> usize {
        self.torn_down.load(Ordering::SeqCst)
    }

    pub fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }

    /// Waits up to a second for every started sandbox to be torn down.
    pub async fn settled(&self) -> bool {
        for _ in 0..200 {
            if self.torn_down() == self.started() {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        false
    }
}

pub struct FakeSandbox {
    verdicts: HashMap<usize, Verdict>,
    fallback: Verdict,
    pub stats: Arc<SandboxStats>,
}

impl FakeSandbox {
    pub fn new(fallback: Verdict) -> Self {
        Self {
            verdicts: HashMap::new(),
            fallback,
            stats: Arc::new(SandboxStats::default()),
        }
    }

    pub fn candidate(mut self, number: usize, verdict: Verdict) -> Self {
        self.verdicts.insert(number, verdict);
        self
    }
}

/// `autofix/<run>/<n>-<nonce>` -> `n`
fn candidate_number(branch: &str) -> Option<usize> {
    let last = branch.rsplit('/').next()?;
    last.split('-').next()?.parse().ok()
}

#[async_trait]
impl SandboxProvider for FakeSandbox {
    async fn start(
        &self,
        spec: &SandboxSpec,
        cancel: &CancellationToken,
    ) -> sandbox_validator::Result<Box<dyn SandboxHandle>> {
        let number = spec.branch.as_deref().and_then(candidate_number).unwrap_or(0);
        let verdict = self.verdicts.get(&number).copied().unwrap_or(self.fallback);

        match verdict {
            Verdict::LaunchError => return Err(SandboxError::launch("docker run", "image not found")),
            Verdict::Hang => {
                self.stats.hanging.notify_one();
                cancel.cancelled().await;
                return Err(SandboxError::Cancelled);
            }
            _ => {}
        }

        self.stats.started.fetch_add(1, Ordering::SeqCst);
        let active = self.stats.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.stats.peak.fetch_max(active, Ordering::SeqCst);
        Ok(Box::new(FakeHandle {
            verdict,
            stats: self.stats.clone(),
        }))
    }
}

struct FakeHandle {
    verdict: Verdict,
    stats: Arc<SandboxStats>,
}

#[async_trait]
impl SandboxHandle for FakeHandle {
    fn id(&self) -> &str {
        "fake-sandbox"
    }

    fn set_env(&mut self, _key: &str, _value: &str) {}

    async fn run_command(
        &self,
        command: &str,
        _cancel: &CancellationToken,
    ) -> sandbox_validator::Result<CommandOutput> {
        tokio::time::sleep(Duration::from_millis(5)).await;
        if matches!(self.verdict, Verdict::StallsInTests) && command.starts_with("go test") {
            self.stats.hanging.notify_one();
            std::future::pending::<()>().await;
        }
        let (exit_code, stdout) = match (self.verdict, command) {
            (Verdict::Passes { .. }, c) if c.starts_with("go test -v") => (
                0,
                "--- PASS: TestLoad (0.00s)\n--- PASS: TestRun (0.00s)\nok  \tacme/app\t0.02s\n".to_string(),
            ),
            (Verdict::Passes { coverage }, c) if c.starts_with("go test -cover") => (
                0,
                format!("ok  \tacme/app\t0.02s\tcoverage: {:.1}% of statements\n", coverage),
            ),
            (Verdict::TestsFail, c) if c.starts_with("go test") => (
                1,
                "--- FAIL: TestLoad (0.00s)\nFAIL\tacme/app\t0.02s\n".to_string(),
            ),
            _ => (0, String::new()),
        };
        Ok(CommandOutput {
            exit_code,
            stdout,
            stderr: String::new(),
            duration: Duration::from_millis(5),
        })
    }

    async fn read_file(&self, _path: &str) -> sandbox_validator::Result<Option<String>> {
        Ok(None)
    }

    async fn file_exists(&self, path: &str) -> sandbox_validator::Result<bool> {
        Ok(path == "go.mod")
    }

    async fn teardown(self: Box<Self>) -> sandbox_validator::Result<()> {
        self.stats.active.fetch_sub(1, Ordering::SeqCst);
        self.stats.torn_down.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
