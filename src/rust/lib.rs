// SPDX-FileCopyrightText: 2026 Proofbench Project Team
// SPDX-License-Identifier: PMPL-1.0-or-later

//! proofbench: machine-checked evaluation of language-model Coq proofs
//!
//! A Coq project is split into declarations with a dependency graph, each
//! provable declaration becomes a self-contained prompt, a model proposes a
//! proof, and `coqc` decides whether it holds.

pub mod cache;
pub mod config;
pub mod context;
pub mod core;
pub mod error;
pub mod executor;
pub mod extract;
pub mod llm;
pub mod project;
pub mod runlog;
pub mod runner;
pub mod stats;
pub mod verify;

pub use crate::config::{ModelSpec, RunConfig};
pub use crate::core::{Ablation, Declaration, Outcome, ProofObject, VerificationResult};
pub use crate::extract::{Extraction, Extractor};
pub use crate::runner::{RunReport, Runner};
pub use crate::verify::Verifier;
