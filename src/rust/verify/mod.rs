// SPDX-FileCopyrightText: 2026 Proofbench Project Team
// SPDX-License-Identifier: PMPL-1.0-or-later

//! Candidate verification
//!
//! A candidate proof is spliced into its original file in place of the
//! original proof, the whole file is compiled, and the compiler output is
//! classified into an [`Outcome`]. The project tree itself is only read.

pub mod coqc;
pub mod diagnostics;
pub mod refine;
pub mod splice;
pub mod tactics;

pub use coqc::{CoqcChecker, ProofChecker};
pub use diagnostics::{Diagnostic, Severity};
pub use refine::AttemptState;

use dashmap::DashMap;
use regex::Regex;
use std::path::{Path, PathBuf};
use std::sync::{Arc, OnceLock};
use tracing::{debug, warn};

use crate::core::{Declaration, Outcome, Verification};
use crate::extract::sentence;

fn escape_hatch_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"\b(Admitted|admit|give_up|Abort|Obligation|Axiom|Parameter)\b")
            .expect("valid escape hatch regex")
    })
}

/// First construct in `candidate` that closes a proof without proving it
pub fn escape_hatch(candidate: &str) -> Option<String> {
    let masked = sentence::mask(candidate).ok()?;
    escape_hatch_regex()
        .find(&masked)
        .map(|m| m.as_str().to_string())
}

/// Verifies candidates for declarations of one project
pub struct Verifier {
    checker: Arc<dyn ProofChecker>,
    root: PathBuf,
    sources: DashMap<PathBuf, Arc<str>>,
}

impl Verifier {
    pub fn new(checker: Arc<dyn ProofChecker>, root: impl Into<PathBuf>) -> Self {
        Self {
            checker,
            root: root.into(),
            sources: DashMap::new(),
        }
    }

    async fn source(&self, file: &Path) -> std::io::Result<Arc<str>> {
        if let Some(text) = self.sources.get(file) {
            return Ok(Arc::clone(text.value()));
        }
        let text: Arc<str> = tokio::fs::read_to_string(self.root.join(file)).await?.into();
        self.sources.insert(file.to_path_buf(), Arc::clone(&text));
        Ok(text)
    }

    /// Check `candidate` as the proof of `decl`
    pub async fn verify(&self, decl: &Declaration, candidate: &str) -> Verification {
        let Some(proof) = &decl.proof else {
            return Verification::without_compiler(
                Outcome::EnvironmentError,
                format!("{} has no proof to replace", decl.qualified_name),
            );
        };
        let source = match self.source(&decl.file).await {
            Ok(source) => source,
            Err(e) => {
                warn!("Cannot read {}: {}", decl.file.display(), e);
                return Verification::without_compiler(
                    Outcome::EnvironmentError,
                    format!("cannot read {}: {}", decl.file.display(), e),
                );
            }
        };
        if source.get(proof.span.start..proof.span.end) != Some(proof.text.as_str()) {
            return Verification::without_compiler(
                Outcome::EnvironmentError,
                format!("{} changed since extraction", decl.file.display()),
            );
        }

        let tactics = tactics::collect(candidate);
        let file_name = decl
            .file
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();

        if let Some((line, message)) = preflight(candidate) {
            let diagnostic = Diagnostic {
                file: Some(file_name),
                line: Some(proof.span.start_line + line - 1),
                line_end: None,
                chars: None,
                severity: Severity::Error,
                message: message.clone(),
            };
            debug!("{}: rejected before compiling: {}", decl.log_name(), message);
            return Verification {
                outcome: Outcome::SyntaxError,
                diagnostics: vec![diagnostic],
                raw_diagnostics: message,
                elapsed_ms: 0,
                tactics,
            };
        }

        let spliced = match splice::splice(&source, &proof.span, candidate) {
            Ok(spliced) => spliced,
            Err(e) => {
                return Verification::without_compiler(Outcome::EnvironmentError, e.to_string())
            }
        };

        let output = match self.checker.check(&decl.file, &spliced.text).await {
            Ok(output) => output,
            Err(e) => {
                warn!("Compiler did not run for {}: {:#}", decl.log_name(), e);
                return Verification::without_compiler(
                    Outcome::EnvironmentError,
                    format!("{:#}", e),
                );
            }
        };
        let elapsed_ms = output.elapsed.as_millis() as u64;

        if output.timed_out {
            return Verification {
                outcome: Outcome::Timeout,
                diagnostics: vec![Diagnostic::unlocated(format!(
                    "compiler killed after {:.1}s",
                    output.elapsed.as_secs_f64()
                ))],
                raw_diagnostics: String::new(),
                elapsed_ms,
                tactics,
            };
        }

        let raw = format!("{}{}", output.stderr, output.stdout);
        let mut diagnostics = diagnostics::parse(&raw);
        let mut outcome =
            diagnostics::classify(&diagnostics, &file_name, spliced.lines, output.success());

        if outcome == Outcome::Verified {
            if let Some(hatch) = escape_hatch(candidate) {
                outcome = Outcome::ProofFailed;
                diagnostics.push(Diagnostic {
                    file: Some(file_name),
                    line: Some(spliced.lines.0),
                    line_end: Some(spliced.lines.1),
                    chars: None,
                    severity: Severity::Error,
                    message: format!("proof admitted: candidate uses `{}`", hatch),
                });
            }
        }

        debug!("{}: {} in {} ms", decl.log_name(), outcome, elapsed_ms);
        Verification {
            outcome,
            diagnostics,
            raw_diagnostics: raw,
            elapsed_ms,
            tactics,
        }
    }
}

/// Lexical checks that need no compiler: 1-based line within the candidate
/// plus a message
fn preflight(candidate: &str) -> Option<(usize, String)> {
    match sentence::mask(candidate) {
        Err(e) => Some((e.line, format!("Syntax error: {}", e.message))),
        Ok(masked) => sentence::unbalanced_bracket(&masked)
            .map(|line| (line, "Syntax error: unbalanced bracket".to_string())),
    }
}
