// sandbox-validator-rs/src/provider.rs
// Capability traits for disposable execution environments

use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::error::{Result, SandboxError};

/// Where a workspace is seeded from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum SourceRef {
    /// A local directory (a git checkout or a plain tree)
    Path(PathBuf),
    Git { url: String, branch: Option<String> },
}

impl fmt::Display for SourceRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceRef::Path(path) => write!(f, "{}", path.display()),
            SourceRef::Git { url, branch: Some(branch) } => write!(f, "{}@{}", url, branch),
            SourceRef::Git { url, branch: None } => write!(f, "{}", url),
        }
    }
}

/// Everything a provider needs to start one environment.
#[derive(Debug, Clone, PartialEq)]
pub struct SandboxSpec {
    pub base_image: String,
    pub source: SourceRef,
    /// Branch to check out; overrides a branch carried by `source`
    pub branch: Option<String>,
    pub env: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct CommandOutput {
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
    pub duration: Duration,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }

    /// stdout followed by stderr, the way a terminal would show them.
    pub fn combined(&self) -> String {
        match (self.stdout.is_empty(), self.stderr.is_empty()) {
            (_, true) => self.stdout.clone(),
            (true, false) => self.stderr.clone(),
            (false, false) => format!("{}\n{}", self.stdout.trim_end(), self.stderr),
        }
    }
}

/// Starts disposable environments.
#[async_trait]
pub trait SandboxProvider: Send + Sync {
    async fn start(&self, spec: &SandboxSpec, cancel: &CancellationToken) -> Result<Box<dyn SandboxHandle>>;
}

/// One running disposable environment. Paths are relative to the workspace root.
#[async_trait]
pub trait SandboxHandle: Send + Sync {
    fn id(&self) -> &str;

    fn set_env(&mut self, key: &str, value: &str);

    /// Run `command` through the environment's shell and capture its output.
    /// A non-zero exit is returned as output, not as an error.
    async fn run_command(&self, command: &str, cancel: &CancellationToken) -> Result<CommandOutput>;

    /// `Ok(None)` when the file does not exist.
    async fn read_file(&self, path: &str) -> Result<Option<String>>;

    async fn file_exists(&self, path: &str) -> Result<bool>;

    /// Destroy the environment. Called exactly once.
    async fn teardown(self: Box<Self>) -> Result<()>;
}

/// Owns a started environment until it is torn down. `release` tears down
/// in place; a guard dropped before that (say, because the future holding it
/// was cancelled) hands the teardown to the runtime.
pub struct SandboxGuard {
    id: String,
    handle: Option<Box<dyn SandboxHandle>>,
}

impl SandboxGuard {
    pub fn new(handle: Box<dyn SandboxHandle>) -> Self {
        Self {
            id: handle.id().to_string(),
            handle: Some(handle),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn handle_mut(&mut self) -> Result<&mut dyn SandboxHandle> {
        match self.handle.as_mut() {
            Some(handle) => Ok(handle.as_mut()),
            None => Err(SandboxError::Provision(format!("sandbox {} already torn down", self.id))),
        }
    }

    pub async fn release(mut self) -> Result<()> {
        match self.handle.take() {
            Some(handle) => handle.teardown().await,
            None => Ok(()),
        }
    }
}

impl Drop for SandboxGuard {
    fn drop(&mut self) {
        let Some(handle) = self.handle.take() else {
            return;
        };
        let id = std::mem::take(&mut self.id);
        match tokio::runtime::Handle::try_current() {
            Ok(runtime) => {
                runtime.spawn(async move {
                    match handle.teardown().await {
                        Ok(()) => log::debug!("sandbox {} torn down after its run was abandoned", id),
                        Err(err) => log::warn!("sandbox {} teardown failed: {}", id, err),
                    }
                });
            }
            Err(_) => log::warn!("no runtime left to tear down sandbox {}", id),
        }
    }
}

impl fmt::Debug for SandboxGuard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SandboxGuard")
            .field("id", &self.id)
            .field("pending", &self.handle.is_some())
            .finish()
    }
}
