// SPDX-FileCopyrightText: 2026 Proofbench Project Team
// SPDX-License-Identifier: PMPL-1.0-or-later

//! Core types shared by every stage of the evaluation pipeline

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;

use crate::verify::diagnostics::Diagnostic;

/// Index of a declaration in an [`crate::extract::Extraction`].
///
/// Identifiers are assigned in file dependency order and then source order,
/// so a smaller id never depends on a larger one in a well-formed project.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct DeclId(pub u32);

impl DeclId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for DeclId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Byte range (half open) plus the 1-based, inclusive line range it covers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Span {
    pub start: usize,
    pub end: usize,
    pub start_line: usize,
    pub end_line: usize,
}

impl Span {
    pub fn len(&self) -> usize {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }
}

/// Vernacular keyword that introduced a declaration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DeclKind {
    Theorem,
    Lemma,
    Remark,
    Fact,
    Corollary,
    Proposition,
    Property,
    Example,
    Definition,
    Fixpoint,
    CoFixpoint,
    Inductive,
    CoInductive,
    Variant,
    Record,
    Structure,
    Class,
    Instance,
    Axiom,
    Parameter,
    Variable,
    Hypothesis,
    Conjecture,
    Let,
    Ltac,
    /// `Add Parametric Relation ... as name` and friends
    Relation,
}

impl DeclKind {
    /// Parse a vernacular keyword. `Lemma`-style keywords are case sensitive in Coq.
    pub fn from_keyword(word: &str) -> Option<Self> {
        let kind = match word {
            "Theorem" => DeclKind::Theorem,
            "Lemma" => DeclKind::Lemma,
            "Remark" => DeclKind::Remark,
            "Fact" => DeclKind::Fact,
            "Corollary" => DeclKind::Corollary,
            "Proposition" => DeclKind::Proposition,
            "Property" => DeclKind::Property,
            "Example" => DeclKind::Example,
            "Definition" => DeclKind::Definition,
            "Fixpoint" => DeclKind::Fixpoint,
            "CoFixpoint" => DeclKind::CoFixpoint,
            "Inductive" => DeclKind::Inductive,
            "CoInductive" => DeclKind::CoInductive,
            "Variant" => DeclKind::Variant,
            "Record" => DeclKind::Record,
            "Structure" => DeclKind::Structure,
            "Class" => DeclKind::Class,
            "Instance" => DeclKind::Instance,
            "Axiom" | "Axioms" => DeclKind::Axiom,
            "Parameter" | "Parameters" => DeclKind::Parameter,
            "Variable" | "Variables" => DeclKind::Variable,
            "Hypothesis" | "Hypotheses" => DeclKind::Hypothesis,
            "Conjecture" => DeclKind::Conjecture,
            "Let" => DeclKind::Let,
            "Ltac" => DeclKind::Ltac,
            _ => return None,
        };
        Some(kind)
    }

    /// Statements whose proof is the thing a model is asked to produce
    pub fn is_theorem_like(self) -> bool {
        matches!(
            self,
            DeclKind::Theorem
                | DeclKind::Lemma
                | DeclKind::Remark
                | DeclKind::Fact
                | DeclKind::Corollary
                | DeclKind::Proposition
                | DeclKind::Property
                | DeclKind::Example
        )
    }

    pub fn is_definition_like(self) -> bool {
        !self.is_theorem_like()
    }

    /// Kinds whose sentence is always complete, i.e. never followed by a proof
    pub fn never_has_proof(self) -> bool {
        matches!(
            self,
            DeclKind::Inductive
                | DeclKind::CoInductive
                | DeclKind::Variant
                | DeclKind::Record
                | DeclKind::Structure
                | DeclKind::Axiom
                | DeclKind::Parameter
                | DeclKind::Variable
                | DeclKind::Hypothesis
                | DeclKind::Conjecture
                | DeclKind::Ltac
        )
    }
}

impl fmt::Display for DeclKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

/// Sentence that closed a proof
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProofTerminator {
    Qed,
    Defined,
    Admitted,
    Abort,
    /// `Proof term.` closes the proof in a single sentence
    Inline,
}

impl ProofTerminator {
    pub fn from_keyword(word: &str) -> Option<Self> {
        match word {
            "Qed" | "Save" => Some(ProofTerminator::Qed),
            "Defined" => Some(ProofTerminator::Defined),
            "Admitted" => Some(ProofTerminator::Admitted),
            "Abort" => Some(ProofTerminator::Abort),
            _ => None,
        }
    }

    /// Whether the original proof is a complete, checked proof
    pub fn is_complete(self) -> bool {
        matches!(self, ProofTerminator::Qed | ProofTerminator::Defined)
    }
}

/// Proof script of a declaration, from `Proof` through its terminator
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProofBody {
    pub span: Span,
    pub text: String,
    pub terminator: ProofTerminator,
}

/// A named declaration found in a source file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Declaration {
    pub id: DeclId,
    /// Short name as written in the source
    pub name: String,
    /// Logical module path plus any enclosing `Module` names
    pub qualified_name: String,
    /// Logical module of the file
    pub module: String,
    /// Path relative to the project root
    pub file: PathBuf,
    pub kind: DeclKind,
    pub statement: Span,
    pub statement_text: String,
    pub proof: Option<ProofBody>,
    /// Identifiers that did not resolve to any project declaration
    #[serde(default)]
    pub external_refs: Vec<String>,
}

impl Declaration {
    /// A target for evaluation: theorem-like, or an `Instance` built with a
    /// proof script, with a complete original proof
    pub fn is_provable(&self) -> bool {
        (self.kind.is_theorem_like() || self.kind == DeclKind::Instance)
            && self
                .proof
                .as_ref()
                .is_some_and(|p| p.terminator.is_complete())
    }

    /// Text shown to a model when this declaration appears as a dependency.
    ///
    /// Proofs of theorem-like declarations are never shown. Definitions keep
    /// their interactive body since it is part of what they mean.
    pub fn dependency_text(&self) -> String {
        match (&self.proof, self.kind.is_definition_like()) {
            (Some(proof), true) => format!("{}\n{}", self.statement_text, proof.text),
            _ => self.statement_text.clone(),
        }
    }

    /// Stable per-declaration log name: `name-<8 hex of file path hash>`
    pub fn log_name(&self) -> String {
        let path = self.file.to_string_lossy().replace('\\', "/");
        let path_hash = blake3::hash(path.as_bytes()).to_hex();
        let mut name = self.name.clone();
        if name.len() > 200 {
            let name_hash = blake3::hash(self.name.as_bytes()).to_hex();
            let mut cut = 200;
            while !name.is_char_boundary(cut) {
                cut -= 1;
            }
            name.truncate(cut);
            name.push('-');
            name.push_str(&name_hash[..8]);
        }
        format!("{}-{}", name, &path_hash[..8])
    }
}

/// Context reduction applied when building proof objects
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Ablation {
    /// Render statements of transitive dependencies
    pub external_deps: bool,
    /// Render the file text around the target
    pub in_file_context: bool,
}

impl Ablation {
    pub const FULL: Ablation = Ablation {
        external_deps: true,
        in_file_context: true,
    };
    pub const NO_DEPENDENCIES: Ablation = Ablation {
        external_deps: false,
        in_file_context: true,
    };
    pub const NO_IN_FILE_CONTEXT: Ablation = Ablation {
        external_deps: true,
        in_file_context: false,
    };
    pub const ISOLATED: Ablation = Ablation {
        external_deps: false,
        in_file_context: false,
    };

    pub const ALL: [Ablation; 4] = [
        Ablation::FULL,
        Ablation::NO_DEPENDENCIES,
        Ablation::NO_IN_FILE_CONTEXT,
        Ablation::ISOLATED,
    ];

    pub fn from_flags(no_dependencies: bool, no_lines: bool) -> Self {
        Ablation {
            external_deps: !no_dependencies,
            in_file_context: !no_lines,
        }
    }

    /// Directory-safe name of the combination
    pub fn slug(&self) -> &'static str {
        match (self.in_file_context, self.external_deps) {
            (true, true) => "full",
            (true, false) => "nodeps",
            (false, true) => "nolines",
            (false, false) => "nolines-nodeps",
        }
    }
}

impl Default for Ablation {
    fn default() -> Self {
        Ablation::FULL
    }
}

impl fmt::Display for Ablation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.slug())
    }
}

/// BLAKE3 hex digest identifying a proof object
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Fingerprint(pub String);

impl Fingerprint {
    /// Hash a sequence of fields; fields are NUL separated so boundaries matter
    pub fn of_fields<'a>(fields: impl IntoIterator<Item = &'a str>) -> Self {
        let mut hasher = blake3::Hasher::new();
        for field in fields {
            hasher.update(field.as_bytes());
            hasher.update(&[0]);
        }
        Fingerprint(hasher.finalize().to_hex().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn short(&self) -> &str {
        &self.0[..self.0.len().min(12)]
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Unit of work handed to a model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProofObject {
    pub fingerprint: Fingerprint,
    pub declaration: Declaration,
    pub ablation: Ablation,
    /// Qualified names of the rendered dependencies, dependencies first
    pub dependencies: Vec<String>,
    pub notations: Vec<String>,
    pub imports: Vec<String>,
    /// The user prompt
    pub context: String,
}

impl ProofObject {
    pub fn log_name(&self) -> String {
        self.declaration.log_name()
    }
}

/// Sampling parameters sent with every request
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SamplingParams {
    pub temperature: f32,
    pub max_tokens: u32,
}

impl SamplingParams {
    /// Canonical text used in cache keys and directory names
    pub fn key(&self) -> String {
        format!("{}-{}", self.temperature, self.max_tokens)
    }
}

impl Default for SamplingParams {
    fn default() -> Self {
        Self {
            temperature: 0.1,
            max_tokens: 16384,
        }
    }
}

/// A candidate proof returned by a model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelResponse {
    pub model: String,
    pub params: SamplingParams,
    /// 0 for the initial request, n for the n-th feedback round
    pub round: u32,
    /// Normalised proof text, `Proof.` through terminator
    pub candidate: String,
    pub raw: String,
    pub elapsed_ms: u64,
    pub created_at: DateTime<Utc>,
}

/// Classification of one unit of work
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    Verified,
    ProofFailed,
    SyntaxError,
    Timeout,
    EnvironmentError,
    /// The model call failed terminally; nothing was verified
    ProviderFailed,
}

impl Outcome {
    /// Outcomes a feedback round may improve on
    pub fn accepts_feedback(self) -> bool {
        matches!(self, Outcome::ProofFailed | Outcome::SyntaxError)
    }

    /// Failures that are not attributable to the model
    pub fn is_environmental(self) -> bool {
        matches!(self, Outcome::EnvironmentError | Outcome::ProviderFailed)
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Outcome::Verified => "verified",
            Outcome::ProofFailed => "proof failed",
            Outcome::SyntaxError => "syntax error",
            Outcome::Timeout => "timeout",
            Outcome::EnvironmentError => "environment error",
            Outcome::ProviderFailed => "provider failed",
        };
        f.write_str(s)
    }
}

/// Ordered tactic usage of a candidate proof
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TacticStats {
    /// Tactic names in the order they appear
    pub sequence: Vec<String>,
    pub counts: BTreeMap<String, u32>,
}

impl TacticStats {
    pub fn record(&mut self, tactic: &str) {
        self.sequence.push(tactic.to_string());
        *self.counts.entry(tactic.to_string()).or_insert(0) += 1;
    }

    pub fn total(&self) -> usize {
        self.sequence.len()
    }
}

/// What the verifier concluded about a single candidate
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Verification {
    pub outcome: Outcome,
    pub diagnostics: Vec<Diagnostic>,
    /// Raw compiler output, stderr then stdout
    pub raw_diagnostics: String,
    pub elapsed_ms: u64,
    pub tactics: TacticStats,
}

impl Verification {
    pub fn without_compiler(outcome: Outcome, message: impl Into<String>) -> Self {
        let message = message.into();
        Self {
            outcome,
            diagnostics: vec![Diagnostic::unlocated(message.clone())],
            raw_diagnostics: message,
            elapsed_ms: 0,
            tactics: TacticStats::default(),
        }
    }
}

/// Persisted, final record for one (proof object, model, params) unit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VerificationResult {
    pub fingerprint: Fingerprint,
    pub declaration: String,
    pub file: PathBuf,
    pub model: String,
    pub params: SamplingParams,
    pub ablation: Ablation,
    pub outcome: Outcome,
    pub diagnostics: Vec<Diagnostic>,
    pub raw_diagnostics: String,
    pub elapsed_ms: u64,
    pub tactics: TacticStats,
    /// Number of model requests that led to this result
    pub rounds: u32,
    pub candidate: Option<String>,
    pub finished_at: DateTime<Utc>,
}

impl VerificationResult {
    pub fn new(
        object: &ProofObject,
        model: &str,
        params: SamplingParams,
        rounds: u32,
        candidate: Option<String>,
        verification: Verification,
    ) -> Self {
        Self {
            fingerprint: object.fingerprint.clone(),
            declaration: object.declaration.qualified_name.clone(),
            file: object.declaration.file.clone(),
            model: model.to_string(),
            params,
            ablation: object.ablation,
            outcome: verification.outcome,
            diagnostics: verification.diagnostics,
            raw_diagnostics: verification.raw_diagnostics,
            elapsed_ms: verification.elapsed_ms,
            tactics: verification.tactics,
            rounds,
            candidate,
            finished_at: Utc::now(),
        }
    }
}
