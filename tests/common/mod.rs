// SPDX-FileCopyrightText: 2026 Proofbench Project Team
// SPDX-License-Identifier: PMPL-1.0-or-later

//! Common test utilities for the proofbench test suite

#![allow(dead_code)]

use proofbench::project::CoqProject;
use proofbench::RunConfig;
use std::path::Path;

pub mod generators;
pub mod mock_checker;
pub mod mock_provider;

/// Logical prefix of fixture projects
pub const PREFIX: &str = "Demo";

pub const BASE_V: &str = "\
Require Import Arith.

Definition double (n : nat) := n + n.

Lemma double_zero : double 0 = 0.
Proof. reflexivity. Qed.
";

pub const NAT_V: &str = "\
Require Import Arith.
Require Import Demo.Base.

Lemma add_comm_demo : forall n m : nat, n + m = m + n.
Proof.
  intros n m.
  apply Nat.add_comm.
Qed.

Lemma double_twice : forall n, double n = 2 * n.
Proof.
  intros n. unfold double. lia.
Qed.
";

/// Write a `_CoqProject` mapping `theories/` to [`PREFIX`] plus the given
/// files (paths relative to `theories/`), then open it
pub fn write_project(root: &Path, files: &[(&str, &str)]) -> CoqProject {
    std::fs::create_dir_all(root.join("theories")).unwrap();
    std::fs::write(root.join("_CoqProject"), format!("-Q theories {}\n", PREFIX)).unwrap();
    for (name, text) in files {
        let path = root.join("theories").join(name);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).unwrap();
        }
        std::fs::write(path, text).unwrap();
    }
    CoqProject::open(root).unwrap()
}

/// The two-file fixture: `Base.v` and `Nat.v`
pub fn demo_project(root: &Path) -> CoqProject {
    write_project(root, &[("Base.v", BASE_V), ("Nat.v", NAT_V)])
}

/// Configuration for fast, fully local runs under `logs`
pub fn test_config(logs: &Path) -> RunConfig {
    let mut config = RunConfig::default();
    config.run.logs_dir = logs.to_path_buf();
    config.run.threads = 2;
    config.run.unit_timeout_secs = 30;
    config.run.models = vec!["gpt-4o-mini".to_string()];
    config.verify.timeout_secs = 5;
    config
}
