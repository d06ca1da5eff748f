// SPDX-FileCopyrightText: 2026 Proofbench Project Team
// SPDX-License-Identifier: PMPL-1.0-or-later

//! Process isolation for compiler runs
//!
//! Supports two modes:
//! - Bubblewrap: read-only view of the host, private namespaces, only the
//!   scratch directory writable
//! - None: plain child process

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::process::Stdio;
use std::time::{Duration, Instant};
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Kind of sandbox to use
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SandboxKind {
    /// Bubblewrap namespace isolation
    Bubblewrap,
    /// No sandbox
    #[default]
    None,
}

/// Result of one bounded run
#[derive(Debug, Clone)]
pub struct SandboxedOutput {
    pub stdout: String,
    pub stderr: String,
    /// None if killed
    pub exit_code: Option<i32>,
    /// The time limit was hit and the process was killed
    pub timed_out: bool,
    pub elapsed: Duration,
}

impl SandboxedOutput {
    pub fn success(&self) -> bool {
        !self.timed_out && self.exit_code == Some(0)
    }
}

/// Runs one program per call under a time limit
#[derive(Debug, Clone)]
pub struct SandboxedExecutor {
    kind: SandboxKind,
}

impl SandboxedExecutor {
    pub fn new(kind: SandboxKind) -> Self {
        if kind == SandboxKind::Bubblewrap && !Self::bubblewrap_available() {
            warn!("bwrap not found; compiler runs will fail to start");
        }
        Self { kind }
    }

    /// Bubblewrap when installed, otherwise no sandbox
    pub fn auto_detect() -> Self {
        if Self::bubblewrap_available() {
            info!("Using bubblewrap for compiler sandboxing");
            Self::new(SandboxKind::Bubblewrap)
        } else {
            info!("bubblewrap not available; running the compiler without isolation");
            Self::new(SandboxKind::None)
        }
    }

    pub fn kind(&self) -> SandboxKind {
        self.kind
    }

    fn command(&self, program: &Path, args: &[String], workdir: &Path) -> Command {
        let mut cmd = match self.kind {
            SandboxKind::None => Command::new(program),
            SandboxKind::Bubblewrap => {
                let mut cmd = Command::new("bwrap");
                cmd.arg("--ro-bind").arg("/").arg("/")
                    .arg("--dev").arg("/dev")
                    .arg("--proc").arg("/proc")
                    .arg("--bind").arg(workdir).arg(workdir)
                    .arg("--unshare-all")
                    .arg("--die-with-parent")
                    .arg("--chdir").arg(workdir)
                    .arg("--")
                    .arg(program);
                cmd
            }
        };
        cmd.args(args)
            .current_dir(workdir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        cmd
    }

    /// Run `program` in `workdir`, killing it once `limit` has elapsed.
    ///
    /// Fails only if the process cannot be started. The child is reaped on
    /// every path: normal exit, timeout, and cancellation of the caller
    /// (through `kill_on_drop`).
    pub async fn execute(
        &self,
        program: &Path,
        args: &[String],
        workdir: &Path,
        limit: Duration,
    ) -> Result<SandboxedOutput> {
        let started = Instant::now();
        let mut child = self
            .command(program, args, workdir)
            .spawn()
            .with_context(|| format!("Failed to spawn {}", program.display()))?;

        let stdout = child.stdout.take().map(drain);
        let stderr = child.stderr.take().map(drain);

        tokio::select! {
            status = child.wait() => {
                let status = status.context("Failed to wait for compiler process")?;
                Ok(SandboxedOutput {
                    stdout: collect(stdout).await,
                    stderr: collect(stderr).await,
                    exit_code: status.code(),
                    timed_out: false,
                    elapsed: started.elapsed(),
                })
            }
            _ = tokio::time::sleep(limit) => {
                debug!("{} exceeded {:?}, killing", program.display(), limit);
                if let Err(e) = child.kill().await {
                    warn!("Failed to kill {}: {}", program.display(), e);
                }
                for reader in [stdout, stderr].into_iter().flatten() {
                    reader.abort();
                }
                Ok(SandboxedOutput {
                    stdout: String::new(),
                    stderr: String::new(),
                    exit_code: None,
                    timed_out: true,
                    elapsed: started.elapsed(),
                })
            }
        }
    }

    fn bubblewrap_available() -> bool {
        std::process::Command::new("bwrap")
            .arg("--version")
            .output()
            .map(|o| o.status.success())
            .unwrap_or(false)
    }
}

fn drain<R: AsyncRead + Unpin + Send + 'static>(mut pipe: R) -> JoinHandle<String> {
    tokio::spawn(async move {
        let mut buf = Vec::new();
        if let Err(e) = pipe.read_to_end(&mut buf).await {
            debug!("Reading compiler output failed: {}", e);
        }
        String::from_utf8_lossy(&buf).into_owned()
    })
}

async fn collect(reader: Option<JoinHandle<String>>) -> String {
    match reader {
        Some(handle) => handle.await.unwrap_or_default(),
        None => String::new(),
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    fn sh(script: &str) -> Vec<String> {
        vec!["-c".to_string(), script.to_string()]
    }

    #[tokio::test]
    async fn test_captures_output_and_exit_code() {
        let dir = tempfile::tempdir().unwrap();
        let output = SandboxedExecutor::new(SandboxKind::None)
            .execute(
                Path::new("/bin/sh"),
                &sh("echo out; echo err >&2; pwd; exit 3"),
                dir.path(),
                Duration::from_secs(10),
            )
            .await
            .unwrap();
        assert!(!output.timed_out);
        assert_eq!(output.exit_code, Some(3));
        assert!(output.stdout.starts_with("out\n"));
        assert_eq!(output.stderr, "err\n");
        assert!(!output.success());
    }

    #[tokio::test]
    async fn test_timeout_kills_process() {
        let dir = tempfile::tempdir().unwrap();
        let started = Instant::now();
        let output = SandboxedExecutor::new(SandboxKind::None)
            .execute(
                Path::new("/bin/sh"),
                &sh("sleep 30"),
                dir.path(),
                Duration::from_millis(200),
            )
            .await
            .unwrap();
        assert!(output.timed_out);
        assert_eq!(output.exit_code, None);
        assert!(started.elapsed() < Duration::from_secs(10));
    }

    #[tokio::test]
    async fn test_missing_program_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let result = SandboxedExecutor::new(SandboxKind::None)
            .execute(
                Path::new("/definitely/not/coqc"),
                &[],
                dir.path(),
                Duration::from_secs(1),
            )
            .await;
        assert!(result.is_err());
    }

    #[test]
    fn test_sandbox_kind_serde() {
        let kind: SandboxKind = serde_json::from_str("\"bubblewrap\"").unwrap();
        assert_eq!(kind, SandboxKind::Bubblewrap);
        assert_eq!(SandboxKind::default(), SandboxKind::None);
    }
}
