//! # Autofix Orchestrator
//!
//! Turns failing CI runs into validated fix proposals:
//!
//! - `Orchestrator` polls source control, admits each failing run at most
//!   once and runs up to `max_concurrent_fixes` pipelines at a time
//! - `Pipeline` drives one run through classification, analysis, fix
//!   synthesis, sandboxed validation, selection and review submission
//! - `FailureAnalyzer` and `FixSynthesizer` are the two reasoning round trips
//! - `select` picks the highest-confidence valid candidate
//!
//! Every outbound call goes through a per-dependency `Resilience` wrapper
//! (retry, circuit breaker, token bucket) from `reasoning_gateway`, and every
//! disposable branch is removed on every exit path.

pub mod analyzer;
pub mod extract;
pub mod orchestrator;
pub mod pipeline;
pub mod registry;
pub mod selector;
pub mod source_control;
pub mod store;
pub mod synthesizer;
pub mod telemetry;

pub use analyzer::{FailureAnalyzer, DEFAULT_PROMPT_LOG_LIMIT};
pub use orchestrator::{Orchestrator, OrchestratorBuilder, SANDBOX_DEPENDENCY, SOURCE_CONTROL_DEPENDENCY};
pub use pipeline::{Pipeline, PipelineSettings};
pub use registry::ProcessedRunRegistry;
pub use selector::select;
pub use source_control::{BranchGuard, CleanupFn, SourceControl};
pub use store::{InMemoryResultStore, ResultStore, ResultSummary};
pub use synthesizer::{parse_fixes, propose_fix_tool, FixSynthesizer, PROPOSE_FIX_TOOL};
pub use telemetry::{init_tracing, TracingConfig};

pub use shared_types::AutofixError;
