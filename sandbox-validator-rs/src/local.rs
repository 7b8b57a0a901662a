// sandbox-validator-rs/src/local.rs
// Local-process sandbox: a temporary directory per environment, commands
// run under `sh -c` with a timeout, killed on cancellation.

use std::collections::BTreeMap;
use std::path::{Component, Path, PathBuf};
use std::process::Stdio;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tempfile::TempDir;
use tokio::process::Command;
use tokio_util::sync::CancellationToken;

use crate::error::{Result, SandboxError};
use crate::provider::{CommandOutput, SandboxHandle, SandboxProvider, SandboxSpec, SourceRef};

#[derive(Debug, Clone)]
pub struct LocalProcessSandboxProvider {
    command_timeout: Duration,
    shell: String,
}

impl Default for LocalProcessSandboxProvider {
    fn default() -> Self {
        Self::new(Duration::from_secs(600))
    }
}

impl LocalProcessSandboxProvider {
    pub fn new(command_timeout: Duration) -> Self {
        Self {
            command_timeout,
            shell: "sh".to_string(),
        }
    }

    pub fn with_shell(mut self, shell: impl Into<String>) -> Self {
        self.shell = shell.into();
        self
    }
}

#[async_trait]
impl SandboxProvider for LocalProcessSandboxProvider {
    async fn start(&self, spec: &SandboxSpec, cancel: &CancellationToken) -> Result<Box<dyn SandboxHandle>> {
        let id = format!("local-{}", uuid::Uuid::new_v4().simple());
        let workdir = tempfile::Builder::new()
            .prefix("autofix-sandbox-")
            .tempdir()
            .map_err(|e| SandboxError::Provision(format!("cannot create workspace: {}", e)))?;

        log::debug!(
            "Sandbox {} ignores base image {} and runs on the host in {}",
            id,
            spec.base_image,
            workdir.path().display()
        );

        let handle = LocalSandboxHandle {
            id,
            root: workdir.path().to_path_buf(),
            workdir: Some(workdir),
            env: spec.env.clone(),
            shell: self.shell.clone(),
            command_timeout: self.command_timeout,
        };
        handle.seed(&spec.source, spec.branch.as_deref(), cancel).await?;
        Ok(Box::new(handle))
    }
}

pub struct LocalSandboxHandle {
    id: String,
    root: PathBuf,
    /// Removed on teardown, or on drop if teardown never ran
    workdir: Option<TempDir>,
    env: BTreeMap<String, String>,
    shell: String,
    command_timeout: Duration,
}

fn shell_quote(s: &str) -> String {
    format!("'{}'", s.replace('\'', r"'\''"))
}

impl LocalSandboxHandle {
    pub fn root(&self) -> &Path {
        &self.root
    }

    async fn seed(&self, source: &SourceRef, branch: Option<&str>, cancel: &CancellationToken) -> Result<()> {
        let seed_error = |reason: String| SandboxError::Seed {
            source_ref: source.to_string(),
            reason,
        };

        match source {
            SourceRef::Git { url, branch: source_branch } => {
                let branch = branch.or(source_branch.as_deref());
                self.clone_into_root(url, branch, cancel).await.map_err(|e| seed_error(e.to_string()))
            }
            SourceRef::Path(path) if path.join(".git").exists() && branch.is_some() => {
                let url = path.display().to_string();
                self.clone_into_root(&url, branch, cancel).await.map_err(|e| seed_error(e.to_string()))
            }
            SourceRef::Path(path) => {
                let from = path.clone();
                let to = self.root.clone();
                tokio::task::spawn_blocking(move || copy_tree(&from, &to))
                    .await
                    .map_err(|e| seed_error(e.to_string()))?
                    .map_err(|e| seed_error(e.to_string()))
            }
        }
    }

    async fn clone_into_root(&self, url: &str, branch: Option<&str>, cancel: &CancellationToken) -> Result<()> {
        let mut command = String::from("git clone --quiet --depth 1");
        if let Some(branch) = branch {
            command.push_str(" --branch ");
            command.push_str(&shell_quote(branch));
        }
        command.push(' ');
        command.push_str(&shell_quote(url));
        command.push_str(" .");

        let output = self.run_command(&command, cancel).await?;
        if output.success() {
            Ok(())
        } else {
            Err(SandboxError::launch(command, output.combined().trim().to_string()))
        }
    }

    /// Resolve `relative` inside the workspace, refusing absolute paths and `..`.
    fn resolve(&self, relative: &str) -> Result<PathBuf> {
        let path = Path::new(relative);
        let escapes = path
            .components()
            .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir));
        if escapes {
            return Err(SandboxError::InvalidPath(relative.to_string()));
        }
        Ok(self.root.join(path))
    }
}

fn copy_tree(from: &Path, to: &Path) -> std::io::Result<()> {
    for entry in std::fs::read_dir(from)? {
        let entry = entry?;
        let file_type = entry.file_type()?;
        let target = to.join(entry.file_name());
        if file_type.is_dir() {
            std::fs::create_dir_all(&target)?;
            copy_tree(&entry.path(), &target)?;
        } else if file_type.is_file() {
            std::fs::copy(entry.path(), &target)?;
        }
    }
    Ok(())
}

#[async_trait]
impl SandboxHandle for LocalSandboxHandle {
    fn id(&self) -> &str {
        &self.id
    }

    fn set_env(&mut self, key: &str, value: &str) {
        self.env.insert(key.to_string(), value.to_string());
    }

    async fn run_command(&self, command: &str, cancel: &CancellationToken) -> Result<CommandOutput> {
        if cancel.is_cancelled() {
            return Err(SandboxError::Cancelled);
        }

        let started = Instant::now();
        let child = Command::new(&self.shell)
            .arg("-c")
            .arg(command)
            .current_dir(&self.root)
            .envs(&self.env)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| SandboxError::launch(command, e))?;

        // Dropping the wait future drops the child, which kills it.
        let output = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(SandboxError::Cancelled),
            _ = tokio::time::sleep(self.command_timeout) => {
                return Err(SandboxError::Timeout {
                    command: command.to_string(),
                    timeout: self.command_timeout,
                });
            }
            output = child.wait_with_output() => output?,
        };

        Ok(CommandOutput {
            exit_code: output.status.code().unwrap_or(-1),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            duration: started.elapsed(),
        })
    }

    async fn read_file(&self, path: &str) -> Result<Option<String>> {
        match tokio::fs::read(self.resolve(path)?).await {
            Ok(bytes) => Ok(Some(String::from_utf8_lossy(&bytes).into_owned())),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn file_exists(&self, path: &str) -> Result<bool> {
        Ok(tokio::fs::metadata(self.resolve(path)?).await.is_ok())
    }

    async fn teardown(mut self: Box<Self>) -> Result<()> {
        if let Some(workdir) = self.workdir.take() {
            tokio::task::spawn_blocking(move || workdir.close())
                .await
                .map_err(|e| SandboxError::Provision(format!("teardown task failed: {}", e)))??;
        }
        Ok(())
    }
}
