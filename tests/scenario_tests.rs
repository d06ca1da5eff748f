// SPDX-FileCopyrightText: 2026 Proofbench Project Team
// SPDX-License-Identifier: PMPL-1.0-or-later

//! Scenarios through the real compiler invocation path, with shell scripts
//! standing in for coqc

#![cfg(unix)]

mod common;

use common::mock_provider::MockProvider;
use proofbench::cache::MemoryStore;
use proofbench::core::Outcome;
use proofbench::llm::retry::RetryPolicy;
use proofbench::llm::ModelClient;
use proofbench::project::CoqProject;
use proofbench::runner::{self, Runner};
use proofbench::verify::CoqcChecker;
use proofbench::{RunConfig, VerificationResult, Verifier};
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

const ADD_COMM_V: &str = "\
Require Import Arith.

Theorem add_comm : forall n m : nat, n + m = m + n.
Proof.
  intros n m.
  induction n as [|n IH]; simpl.
  - rewrite Nat.add_0_r. reflexivity.
  - rewrite IH. rewrite Nat.add_succ_r. reflexivity.
Qed.
";

/// Fake compiler: logs each call, then reports an incomplete proof when
/// the file contains `admit.`
const FAKE_COQC: &str = r#"#!/bin/sh
for f; do :; done
echo "$f" >> "@CALLS@"
@BODY@
if grep -q 'admit\.' "$f"; then
  n=$(grep -n 'admit\.' "$f" | head -n 1 | cut -d: -f1)
  echo "File \"./$f\", line $n, characters 2-8:" >&2
  echo "Error: (in proof add_comm): Attempt to save an incomplete proof" >&2
  exit 1
fi
exit 0
"#;

struct Scenario {
    _dir: tempfile::TempDir,
    calls: PathBuf,
    config: RunConfig,
    project: CoqProject,
}

impl Scenario {
    fn new(body: &str) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let project = common::write_project(&dir.path().join("project"), &[("Add.v", ADD_COMM_V)]);
        let calls = dir.path().join("calls");
        let coqc = dir.path().join("coqc");
        let script = FAKE_COQC
            .replace("@CALLS@", &calls.to_string_lossy())
            .replace("@BODY@", body);
        std::fs::write(&coqc, script).unwrap();
        std::fs::set_permissions(&coqc, std::fs::Permissions::from_mode(0o755)).unwrap();

        let mut config = common::test_config(&dir.path().join("logs"));
        config.verify.coqc = coqc;
        config.verify.timeout_secs = 1;
        Scenario {
            _dir: dir,
            calls,
            config,
            project,
        }
    }

    fn compiler_calls(&self) -> usize {
        std::fs::read_to_string(&self.calls)
            .map(|s| s.lines().count())
            .unwrap_or(0)
    }

    async fn run(&self, reply: &str) -> VerificationResult {
        let objects = runner::prepare_objects(&self.config, &self.project, false).unwrap();
        assert_eq!(objects.len(), 1);
        let provider = Arc::new(MockProvider::new(reply));
        let client = ModelClient::new(
            provider,
            Arc::new(MemoryStore::new()),
            "system".to_string(),
            RetryPolicy::default(),
        );
        let checker = CoqcChecker::new(&self.project, &self.config.verify);
        let verifier = Verifier::new(Arc::new(checker), self.project.root.clone());
        let runner = Runner::new(
            self.config.clone(),
            Arc::new(client),
            Arc::new(verifier),
            Arc::new(MemoryStore::new()),
        );
        runner
            .run(objects, std::future::pending::<()>())
            .await
            .unwrap();

        let model = self.config.model("gpt-4o-mini").unwrap();
        let dir = self.config.results_dir(&model, self.config.llm.sampling());
        let mut latest = runner::latest_results(&dir).unwrap();
        assert_eq!(latest.len(), 1);
        latest.remove(0)
    }
}

#[tokio::test]
async fn test_correct_proof_is_verified() {
    let scenario = Scenario::new("");
    let result = scenario
        .run("```coq\nProof.\n  intros n m. apply Nat.add_comm.\nQed.\n```")
        .await;
    assert_eq!(result.outcome, Outcome::Verified);
    assert_eq!(result.declaration, "Demo.Add.add_comm");
    assert_eq!(result.tactics.sequence, vec!["intros", "apply"]);
    assert_eq!(scenario.compiler_calls(), 1);
}

#[tokio::test]
async fn test_admitted_proof_fails() {
    let scenario = Scenario::new("");
    let result = scenario.run("Proof.\n  intros n m.\n  admit.\nQed.").await;
    assert_eq!(result.outcome, Outcome::ProofFailed);
    assert!(result.diagnostics[0].message.contains("incomplete proof"));
    assert_eq!(result.diagnostics[0].line, Some(6));
}

#[tokio::test]
async fn test_unmatched_bracket_is_syntax_error_without_compiling() {
    let scenario = Scenario::new("");
    let result = scenario
        .run("Proof.\n  intros n m.\n  destruct n as [|n.\nQed.")
        .await;
    assert_eq!(result.outcome, Outcome::SyntaxError);
    assert_eq!(scenario.compiler_calls(), 0);
}

#[tokio::test]
async fn test_slow_compiler_times_out_once() {
    let scenario = Scenario::new("sleep 30");
    let started = std::time::Instant::now();
    let result = scenario.run("Proof. auto. Qed.").await;
    assert_eq!(result.outcome, Outcome::Timeout);
    assert_eq!(scenario.compiler_calls(), 1);
    assert!(started.elapsed() < std::time::Duration::from_secs(20));
}

/// Needs a real `coqc` on PATH
#[tokio::test]
#[ignore]
async fn test_real_coqc_verifies_add_comm() {
    let dir = tempfile::tempdir().unwrap();
    let project = common::write_project(dir.path(), &[("Add.v", ADD_COMM_V)]);
    let mut config = common::test_config(&dir.path().join("logs"));
    config.verify.coqc = PathBuf::from("coqc");
    config.verify.timeout_secs = 60;

    let objects = runner::prepare_objects(&config, &project, false).unwrap();
    let decl = &objects[0].declaration;
    let checker = CoqcChecker::new(&project, &config.verify);
    let verifier = Verifier::new(Arc::new(checker), project.root.clone());

    let good = verifier
        .verify(decl, "Proof.\n  intros n m. apply Nat.add_comm.\nQed.")
        .await;
    assert_eq!(good.outcome, Outcome::Verified, "{}", good.raw_diagnostics);

    let bad = verifier.verify(decl, "Proof.\n  intros n m.\n  admit.\nQed.").await;
    assert_eq!(bad.outcome, Outcome::ProofFailed, "{}", bad.raw_diagnostics);
    assert!(Path::new(&project.root).join("theories/Add.v").is_file());
}
