// SPDX-FileCopyrightText: 2026 Proofbench Project Team
// SPDX-License-Identifier: PMPL-1.0-or-later

//! Compiler invocation
//!
//! Every check gets its own scratch directory holding a single file with the
//! original file name. The directory is removed when the check returns,
//! whether the compiler finished, timed out or the caller was cancelled.

use anyhow::{Context, Result};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

use crate::config::VerifySettings;
use crate::executor::{SandboxedExecutor, SandboxedOutput};
use crate::project::CoqProject;

/// Checks one complete source file
#[async_trait]
pub trait ProofChecker: Send + Sync {
    /// Compile `source` as a file named like `file`.
    ///
    /// Errors mean the checker could not run at all; compiler failures are
    /// reported through the returned output.
    async fn check(&self, file: &Path, source: &str) -> Result<SandboxedOutput>;
}

/// `coqc` with the project's load paths
pub struct CoqcChecker {
    coqc: PathBuf,
    args: Vec<String>,
    timeout: Duration,
    executor: SandboxedExecutor,
}

impl CoqcChecker {
    pub fn new(project: &CoqProject, settings: &VerifySettings) -> Self {
        let mut args = project.coqc_args();
        args.extend(settings.extra_args.iter().cloned());
        Self {
            coqc: settings.coqc.clone(),
            args,
            timeout: Duration::from_secs(settings.timeout_secs),
            executor: SandboxedExecutor::new(settings.sandbox),
        }
    }

    pub fn args(&self) -> &[String] {
        &self.args
    }
}

#[async_trait]
impl ProofChecker for CoqcChecker {
    async fn check(&self, file: &Path, source: &str) -> Result<SandboxedOutput> {
        let name = file
            .file_name()
            .with_context(|| format!("{} has no file name", file.display()))?;
        let scratch = tempfile::Builder::new()
            .prefix("proofbench-")
            .tempdir()
            .context("Failed to create scratch directory")?;
        let target = scratch.path().join(name);
        tokio::fs::write(&target, source)
            .await
            .with_context(|| format!("Failed to write {}", target.display()))?;

        let mut args = self.args.clone();
        args.push(name.to_string_lossy().into_owned());
        debug!("coqc {} in {}", args.join(" "), scratch.path().display());

        self.executor
            .execute(&self.coqc, &args, scratch.path(), self.timeout)
            .await
    }
}
