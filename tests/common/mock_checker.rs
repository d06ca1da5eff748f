// SPDX-FileCopyrightText: 2026 Proofbench Project Team
// SPDX-License-Identifier: PMPL-1.0-or-later

//! Mock compiler for testing

use async_trait::async_trait;
use proofbench::executor::SandboxedOutput;
use proofbench::verify::ProofChecker;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

type Rule = Box<dyn Fn(&Path, &str) -> SandboxedOutput + Send + Sync>;

/// Answers every check through a rule over the spliced source
pub struct MockChecker {
    rule: Rule,
    calls: AtomicUsize,
}

impl MockChecker {
    pub fn new(rule: impl Fn(&Path, &str) -> SandboxedOutput + Send + Sync + 'static) -> Self {
        MockChecker {
            rule: Box::new(rule),
            calls: AtomicUsize::new(0),
        }
    }

    /// Accepts every file
    pub fn accepting() -> Self {
        Self::new(|_, _| output("", Some(0)))
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ProofChecker for MockChecker {
    async fn check(&self, file: &Path, source: &str) -> anyhow::Result<SandboxedOutput> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok((self.rule)(file, source))
    }
}

/// A finished compiler run with the given stderr
pub fn output(stderr: &str, exit_code: Option<i32>) -> SandboxedOutput {
    SandboxedOutput {
        stdout: String::new(),
        stderr: stderr.to_string(),
        exit_code,
        timed_out: false,
        elapsed: Duration::from_millis(5),
    }
}

/// An error located at `line` of `file`
pub fn error_at(file: &Path, line: usize, message: &str) -> SandboxedOutput {
    let name = file.file_name().unwrap().to_string_lossy();
    output(
        &format!(
            "File \"./{}\", line {}, characters 2-10:\nError: {}\n",
            name, line, message
        ),
        Some(1),
    )
}
