// SPDX-FileCopyrightText: 2026 Proofbench Project Team
// SPDX-License-Identifier: PMPL-1.0-or-later

//! Bounded execution of the proof checker
//!
//! Every compiler run is a child process with piped output, a hard time
//! limit and `kill_on_drop`, optionally wrapped in a bubblewrap sandbox.

pub mod sandbox;

pub use sandbox::{SandboxKind, SandboxedExecutor, SandboxedOutput};
