//! ---
//! msf_section: "07-resilience-fault-tolerance"
//! msf_subsection: "module"
//! msf_type: "source"
//! msf_scope: "code"
//! msf_description: "Failover decision engine and its collaborators."
//! msf_version: "v0.1.0"
//! msf_owner: "tbd"
//! ---
//! Boundary to the container runtime hosting both instances.
//!
//! The engine only needs four primitives: inspect, start, exec and a log
//! tail built on top of exec. Anything with those semantics can stand in.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::process::Command;
use tracing::debug;

use crate::error::{FailoverError, Result};

/// Captured result of a command executed inside an instance.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExecOutput {
    pub success: bool,
    pub stdout: String,
}

impl ExecOutput {
    pub fn ok(stdout: impl Into<String>) -> Self {
        Self {
            success: true,
            stdout: stdout.into(),
        }
    }

    pub fn failed() -> Self {
        Self::default()
    }
}

#[async_trait]
pub trait InstanceRuntime: Send + Sync {
    /// Whether the runtime unit (container) hosting `instance` is running.
    async fn is_running(&self, instance: &str) -> Result<bool>;

    /// Start the runtime unit hosting `instance`.
    async fn start(&self, instance: &str) -> Result<()>;

    /// Run `argv` inside `instance`. A non-zero exit is reported through
    /// [`ExecOutput::success`], not as an error.
    async fn exec(&self, instance: &str, argv: &[String]) -> Result<ExecOutput>;

    /// Return the last `lines` lines of the first existing file in `candidates`,
    /// or `None` when no candidate exists.
    async fn tail_log(
        &self,
        instance: &str,
        candidates: &[String],
        lines: usize,
    ) -> Result<Option<String>> {
        for path in candidates {
            let exists = self
                .exec(instance, &["test".into(), "-f".into(), path.clone()])
                .await?;
            if !exists.success {
                continue;
            }
            let tail = self
                .exec(
                    instance,
                    &["tail".into(), "-n".into(), lines.to_string(), path.clone()],
                )
                .await?;
            if tail.success {
                return Ok(Some(tail.stdout));
            }
            debug!(instance, path = %path, "log file present but tail failed");
        }
        Ok(None)
    }
}

/// Runtime backed by the Docker CLI.
#[derive(Debug, Clone)]
pub struct DockerRuntime {
    binary: PathBuf,
}

impl DockerRuntime {
    pub fn new(binary: impl Into<PathBuf>) -> Self {
        Self {
            binary: binary.into(),
        }
    }

    pub fn binary(&self) -> &Path {
        &self.binary
    }

    async fn run(&self, args: &[&str]) -> Result<std::process::Output> {
        let program = self.binary.display().to_string();
        debug!(program = %program, ?args, "invoking runtime");
        Command::new(&self.binary)
            .args(args)
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|source| FailoverError::Spawn { program, source })
    }

    async fn run_checked(&self, args: &[&str]) -> Result<String> {
        let output = self.run(args).await?;
        if !output.status.success() {
            return Err(FailoverError::CommandFailed {
                program: self.binary.display().to_string(),
                status: output.status.code().unwrap_or(-1),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_owned(),
            });
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

#[async_trait]
impl InstanceRuntime for DockerRuntime {
    async fn is_running(&self, instance: &str) -> Result<bool> {
        let stdout = self
            .run_checked(&["inspect", "-f", "{{.State.Running}}", instance])
            .await?;
        Ok(stdout.trim() == "true")
    }

    async fn start(&self, instance: &str) -> Result<()> {
        self.run_checked(&["start", instance]).await.map(|_| ())
    }

    async fn exec(&self, instance: &str, argv: &[String]) -> Result<ExecOutput> {
        let mut args: Vec<&str> = Vec::with_capacity(argv.len() + 2);
        args.push("exec");
        args.push(instance);
        args.extend(argv.iter().map(String::as_str));
        let output = self.run(&args).await?;
        Ok(ExecOutput {
            success: output.status.success(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
        })
    }
}
