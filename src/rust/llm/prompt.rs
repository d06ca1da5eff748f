// SPDX-FileCopyrightText: 2026 Proofbench Project Team
// SPDX-License-Identifier: PMPL-1.0-or-later

//! System prompt, response normalisation and token estimates

use regex::Regex;
use std::path::Path;
use std::sync::OnceLock;
use tokio::process::Command;
use tracing::{debug, warn};

use crate::verify::diagnostics::Diagnostic;

/// Version quoted when `coqc` cannot be asked
pub const DEFAULT_COQ_VERSION: &str = "8.18";

const FENCE_LANGUAGES: &[&str] = &["```coq", "```ocaml", "```haskell", "```hs", "```"];

const TERMINATORS: &[&str] = &["Qed.", "Defined.", "Admitted.", "Abort."];

/// `omega` was the arithmetic tactic before 8.11 introduced `lia`
pub fn uses_omega(version: &str) -> bool {
    let mut parts = version.split('.').map(|p| p.trim().parse::<u32>());
    match (parts.next(), parts.next()) {
        (Some(Ok(major)), Some(Ok(minor))) => (major, minor) < (8, 11),
        _ => false,
    }
}

pub fn system_prompt(coq_version: &str) -> String {
    let omega = if uses_omega(coq_version) {
        " Remember that this version uses `omega` instead of `lia`."
    } else {
        ""
    };
    format!(
        "You are an expert Coq programmer, specifically experienced with Coq version {coq_version}.{omega}

You are provided:

* The current Coq file containing the theorem or lemma to be proved.
* The statement (signature) of the theorem or lemma, which you must prove.
* Relevant dependencies and notations useful for proving the theorem or lemma, if applicable. You may choose to use them or not.

Your task:

* Carefully read the provided context, dependencies, and notations.
* Generate a complete and correct proof for the given theorem or lemma.
* Your response should **only** include the complete proof body, wrapped explicitly between `Proof.` and `Qed.` statements. Do not include any other text, comments, or explanations.
* Do **not** include the theorem or lemma statement (signature) itself, explanations, or additional text outside the proof.
* You may not use Admitted or derivatives in your proof.
* The proof should be valid and compile successfully in Coq.

Example format of your response:

```
Proof.
  (* your complete proof here *)
Qed.
```"
    )
}

/// Extract the proof from a model reply.
///
/// Code fences and their language tags are dropped. A reply that does not
/// open with `Proof` is wrapped in `Proof.` / `Qed.`; one that opens with
/// `Proof` but never closes gets a `Qed.`.
pub fn normalize(raw: &str) -> String {
    let trimmed = raw.trim();
    let lines: Vec<&str> = trimmed.lines().collect();

    let start = lines
        .iter()
        .position(|l| l.trim().starts_with("```"))
        .map_or(0, |i| i + 1);
    let end = lines
        .iter()
        .rposition(|l| l.trim().starts_with("```"))
        .unwrap_or(lines.len());

    let mut text = if start < end {
        lines[start..end].join("\n")
    } else {
        trimmed.to_string()
    };
    text = text.trim().to_string();

    for prefix in FENCE_LANGUAGES {
        if let Some(rest) = text.strip_prefix(prefix) {
            text = rest.trim().to_string();
        }
    }
    if let Some(rest) = text.strip_suffix("```") {
        text = rest.trim().to_string();
    }

    if !text.starts_with("Proof") {
        return format!("Proof.\n{}\nQed.", text);
    }
    if !TERMINATORS.iter().any(|t| text.ends_with(t)) {
        text.push_str("\nQed.");
    }
    text
}

/// Follow-up message for a feedback round
pub fn feedback_message(diagnostics: &[Diagnostic], raw: &str) -> String {
    let errors: Vec<String> = diagnostics
        .iter()
        .filter(|d| d.is_error())
        .map(Diagnostic::to_string)
        .collect();
    let detail = if errors.is_empty() {
        raw.trim().to_string()
    } else {
        errors.join("\n")
    };
    format!(
        "Coq rejected this proof with the following error:\n\n<error>\n{}\n</error>\n\nFix the proof. Respond ONLY with the complete corrected proof body, wrapped strictly between \"Proof.\" and \"Qed.\", without repeating the signature.",
        detail
    )
}

/// Rough token count: four bytes per token
pub fn estimate_tokens(text: &str) -> u64 {
    (text.len() as u64).div_ceil(4)
}

fn version_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"version\s+(\d+\.\d+(?:\.\d+)?)").expect("valid version regex"))
}

pub fn parse_coq_version(output: &str) -> Option<String> {
    version_regex()
        .captures(output)
        .map(|c| c[1].to_string())
}

/// Ask `coqc --version`, falling back to [`DEFAULT_COQ_VERSION`]
pub async fn detect_coq_version(coqc: &Path) -> String {
    match Command::new(coqc).arg("--version").output().await {
        Ok(output) => {
            let stdout = String::from_utf8_lossy(&output.stdout);
            match parse_coq_version(&stdout) {
                Some(version) => {
                    debug!("Detected Coq {}", version);
                    version
                }
                None => {
                    warn!("Could not parse `{} --version` output", coqc.display());
                    DEFAULT_COQ_VERSION.to_string()
                }
            }
        }
        Err(e) => {
            warn!("Could not run {}: {}", coqc.display(), e);
            DEFAULT_COQ_VERSION.to_string()
        }
    }
}
