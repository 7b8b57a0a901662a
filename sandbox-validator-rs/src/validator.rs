// sandbox-validator-rs/src/validator.rs
// Stage runner: detect → build → lint → test → coverage

use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::sync::Arc;
use std::time::Instant;

use metrics::increment_counter;
use shared_types::ValidationResult;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use crate::error::Result;
use crate::framework::{detect_framework, Framework, GENERIC_MARKER, MARKER_FILES};
use crate::parse::{parse_coverage, parse_jacoco_csv, parse_test_output};
use crate::provider::{CommandOutput, SandboxGuard, SandboxHandle, SandboxProvider, SandboxSpec, SourceRef};

/// Bytes of output kept per stage; the tail is kept since summaries come last.
const MAX_STAGE_OUTPUT: usize = 64 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Build,
    Lint,
    Test,
    Coverage,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Build => "build",
            Stage::Lint => "lint",
            Stage::Test => "test",
            Stage::Coverage => "coverage",
        }
    }
}

/// Runs the validation stages for one branch in a fresh disposable environment.
pub struct SandboxValidator {
    provider: Arc<dyn SandboxProvider>,
    base_image: String,
    env: BTreeMap<String, String>,
}

impl SandboxValidator {
    pub fn new(provider: Arc<dyn SandboxProvider>, base_image: impl Into<String>) -> Self {
        Self {
            provider,
            base_image: base_image.into(),
            env: BTreeMap::new(),
        }
    }

    /// Extra environment for every stage, applied before the framework's own.
    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    /// Validate `branch` of `source`. The environment is torn down before this
    /// returns, whatever the outcome, or right after if the call is dropped. Stage failures are reported in the
    /// result; only failures to run a stage are errors.
    #[instrument(skip(self, source, cancel), fields(source = %source))]
    pub async fn validate(
        &self,
        source: &SourceRef,
        branch: &str,
        cancel: &CancellationToken,
    ) -> Result<ValidationResult> {
        let spec = SandboxSpec {
            base_image: self.base_image.clone(),
            source: source.clone(),
            branch: (!branch.is_empty()).then(|| branch.to_string()),
            env: self.env.clone(),
        };

        let mut sandbox = SandboxGuard::new(self.provider.start(&spec, cancel).await?);
        let sandbox_id = sandbox.id().to_string();
        debug!(sandbox = %sandbox_id, "sandbox started");

        let outcome = run_stages(sandbox.handle_mut()?, cancel).await;

        if let Err(err) = sandbox.release().await {
            warn!(sandbox = %sandbox_id, error = %err, "sandbox teardown failed");
        }

        match &outcome {
            Ok(result) => {
                increment_counter!(
                    "sandbox_validations_total",
                    "outcome" => if result.success { "passed" } else { "failed" }
                );
                info!(
                    sandbox = %sandbox_id,
                    framework = %result.framework,
                    success = result.success,
                    passed = result.passed,
                    failed = result.failed,
                    coverage = result.coverage_percent,
                    "validation finished"
                );
            }
            Err(err) => {
                increment_counter!("sandbox_validations_total", "outcome" => "error");
                warn!(sandbox = %sandbox_id, error = %err, "validation could not run");
            }
        }
        outcome
    }
}

/// Marker files present at the workspace root, in priority order.
async fn present_markers(handle: &dyn SandboxHandle) -> Result<Vec<&'static str>> {
    let mut present = Vec::new();
    let candidates = MARKER_FILES
        .iter()
        .map(|(marker, _)| *marker)
        .chain(std::iter::once(GENERIC_MARKER));
    for marker in candidates {
        if handle.file_exists(marker).await? {
            present.push(marker);
        }
    }
    Ok(present)
}

async fn run_stage(
    handle: &dyn SandboxHandle,
    stage: Stage,
    command: &str,
    log: &mut String,
    cancel: &CancellationToken,
) -> Result<CommandOutput> {
    debug!(stage = stage.as_str(), command, "running stage");
    let output = handle.run_command(command, cancel).await?;

    let _ = writeln!(
        log,
        "==> {} `{}` (exit {}, {:?})",
        stage.as_str(),
        command,
        output.exit_code,
        output.duration
    );
    log.push_str(tail(&output.combined(), MAX_STAGE_OUTPUT));
    if !log.ends_with('\n') {
        log.push('\n');
    }

    increment_counter!(
        "sandbox_stage_runs_total",
        "stage" => stage.as_str(),
        "outcome" => if output.success() { "passed" } else { "failed" }
    );
    Ok(output)
}

async fn run_stages(handle: &mut dyn SandboxHandle, cancel: &CancellationToken) -> Result<ValidationResult> {
    let started = Instant::now();
    let present = present_markers(handle).await?;
    let framework: Framework = detect_framework(present.iter().copied());
    for (key, value) in &framework.env {
        handle.set_env(key, value);
    }
    let handle: &dyn SandboxHandle = handle;
    let mut log = String::new();

    let mut result = ValidationResult {
        framework: framework.name().to_string(),
        build_passed: true,
        ..ValidationResult::default()
    };

    if let Some(build) = &framework.build_cmd {
        let output = run_stage(handle, Stage::Build, build, &mut log, cancel).await?;
        if !output.success() {
            let mut failed = ValidationResult::build_failure(framework.name(), log);
            failed.duration = started.elapsed();
            return Ok(failed);
        }
    }

    if let Some(lint) = &framework.lint_cmd {
        let output = run_stage(handle, Stage::Lint, lint, &mut log, cancel).await?;
        result.lint_passed = Some(output.success());
    }

    let mut tests_passed = false;
    if let Some(test) = &framework.test_cmd {
        let output = run_stage(handle, Stage::Test, test, &mut log, cancel).await?;
        let counts = parse_test_output(&output.combined());
        result.total_tests = counts.total;
        result.passed = counts.passed;
        result.failed = counts.failed;
        result.skipped = counts.skipped;
        tests_passed = output.success() && counts.failed == 0;
    }

    if let Some(coverage) = &framework.coverage_cmd {
        let output = run_stage(handle, Stage::Coverage, coverage, &mut log, cancel).await?;
        result.coverage_percent = parse_coverage(&output.combined());
        if let Some(report) = &framework.coverage_report {
            if let Some(percent) = report_coverage(handle, report).await {
                let _ = writeln!(log, "==> coverage report `{}`: {:.2}%", report, percent);
                result.coverage_percent = percent;
            }
        }
    }

    result.success = tests_passed;
    result.duration = started.elapsed();
    result.output = log;
    Ok(result)
}

/// Line coverage from the report a coverage tool left in the workspace.
async fn report_coverage(handle: &dyn SandboxHandle, report: &str) -> Option<f64> {
    match handle.read_file(report).await {
        Ok(Some(csv)) => {
            let percent = parse_jacoco_csv(&csv);
            if percent.is_none() {
                debug!(report, "coverage report has no line counts");
            }
            percent
        }
        Ok(None) => {
            debug!(report, "coverage report was not written");
            None
        }
        Err(err) => {
            warn!(report, error = %err, "could not read coverage report");
            None
        }
    }
}

/// The last `max` bytes of `s`, cut on a char boundary.
fn tail(s: &str, max: usize) -> &str {
    if s.len() <= max {
        return s;
    }
    let mut start = s.len() - max;
    while !s.is_char_boundary(start) {
        start += 1;
    }
    &s[start..]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tail_respects_char_boundaries() {
        let s = "ééééé";
        let t = tail(s, 3);
        assert!(t.len() <= 3);
        assert!(s.ends_with(t));
        assert_eq!(tail("short", 100), "short");
    }
}
