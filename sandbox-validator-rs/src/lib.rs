//! Sandbox Validator Library
//! Runs a candidate branch through build, lint, test and coverage stages in a
//! disposable environment and reports structured results.

pub mod error;
pub mod framework;
pub mod local;
pub mod parse;
pub mod provider;
pub mod validator;

pub use error::{Result, SandboxError};
pub use framework::{detect_framework, framework_for_marker, Framework, FrameworkKind, MARKER_FILES};
pub use local::{LocalProcessSandboxProvider, LocalSandboxHandle};
pub use parse::{parse_coverage, parse_jacoco_csv, parse_test_output, TestCounts};
pub use provider::{CommandOutput, SandboxGuard, SandboxHandle, SandboxProvider, SandboxSpec, SourceRef};
pub use validator::{SandboxValidator, Stage};
