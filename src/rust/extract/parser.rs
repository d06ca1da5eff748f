// SPDX-FileCopyrightText: 2026 Proofbench Project Team
// SPDX-License-Identifier: PMPL-1.0-or-later

//! Declaration recognition over vernacular sentences

use nom::{
    bytes::complete::take_while,
    character::complete::satisfy,
    combinator::recognize,
    sequence::pair,
    IResult,
};
use regex::Regex;
use std::collections::HashSet;
use std::sync::OnceLock;

use super::sentence::{self, LexError, Sentence};
use crate::core::{DeclKind, ProofTerminator, Span};

/// A declaration as found in one file, before name resolution
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawDecl {
    pub name: String,
    /// Enclosing `Module` names, outermost first
    pub module_path: Vec<String>,
    pub kind: DeclKind,
    pub statement: Span,
    pub proof: Option<(Span, ProofTerminator)>,
    /// Other names this declaration introduces (constructors, fields, mutual blocks)
    pub aliases: Vec<String>,
    /// Identifiers used in the statement and proof, first occurrence order
    pub idents: Vec<String>,
}

/// A `Require` sentence
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Require {
    pub from: Option<String>,
    pub modules: Vec<String>,
    pub export: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParsedFile {
    pub decls: Vec<RawDecl>,
    /// Notation sentences, verbatim
    pub notations: Vec<String>,
    pub requires: Vec<Require>,
}

/// Attribute-like words that may precede a vernacular keyword
const MODIFIERS: &[&str] = &[
    "Local",
    "Global",
    "Polymorphic",
    "Monomorphic",
    "Program",
    "Private",
    "Cumulative",
    "NonCumulative",
];

/// Sentence heads that are commands, never tactics
const VERNAC: &[&str] = &[
    "Require", "Import", "Export", "From", "Notation", "Infix", "Reserved", "Section", "End",
    "Module", "Hint", "Hints", "Arguments", "Set", "Unset", "Open", "Close", "Declare", "Implicit",
    "Generalizable", "Context", "Existing", "Create", "Tactic", "Opaque", "Transparent", "Check",
    "Print", "Compute", "Eval", "Search", "Locate", "Canonical", "Coercion", "Derive", "Next",
    "Obligation", "Obligations", "Solve", "Add", "Remove", "Include", "Scheme", "Combined",
    "Functional", "Typeclasses", "Delimit", "Bind", "Strategy", "Extraction", "Goal", "Proof",
];

fn is_vernac_head(word: &str) -> bool {
    DeclKind::from_keyword(word).is_some()
        || VERNAC.contains(&word)
        || MODIFIERS.contains(&word)
        || ProofTerminator::from_keyword(word).is_some()
}

/// Coq identifier, Unicode letters allowed
fn identifier(input: &str) -> IResult<&str, &str> {
    recognize(pair(
        satisfy(|c: char| c.is_alphabetic() || c == '_'),
        take_while(|c: char| c.is_alphanumeric() || c == '_' || c == '\''),
    ))(input)
}

fn leading_ident(word: &str) -> Option<&str> {
    identifier(word).ok().map(|(_, id)| id)
}

/// Words of a masked sentence with attributes, modifiers and the final dot removed
fn head_words(masked: &str) -> Vec<&str> {
    let mut s = masked.trim();
    while let Some(rest) = s.strip_prefix("#[") {
        match rest.find(']') {
            Some(close) => s = rest[close + 1..].trim_start(),
            None => break,
        }
    }
    let s = s.strip_suffix('.').unwrap_or(s);
    let words: Vec<&str> = s.split_whitespace().collect();
    let skip = words.iter().take_while(|w| MODIFIERS.contains(w)).count();
    words[skip..].to_vec()
}

fn ident_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"\b[\p{Alphabetic}_][\p{Alphabetic}\p{N}_']*(?:\.[\p{Alphabetic}_][\p{Alphabetic}\p{N}_']*)*")
            .expect("valid identifier regex")
    })
}

/// Constructors of an inductive body, and mutual blocks
fn constructor_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?:\||:=|\bwith)\s*([\p{Alphabetic}_][\p{Alphabetic}\p{N}_']*)")
            .expect("valid constructor regex")
    })
}

/// `with name` followed by a binder or a type, as in mutual fixpoints
fn mutual_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"\bwith\s+([\p{Alphabetic}_][\p{Alphabetic}\p{N}_']*)\s*(?:\(|\{|:[^=:])")
            .expect("valid mutual block regex")
    })
}

/// Named record constructor, or the single method of a definitional class
fn record_ctor_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r":=\s*([\p{Alphabetic}_][\p{Alphabetic}\p{N}_']*)\s*[{:]")
            .expect("valid record constructor regex")
    })
}

fn field_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?:\{|;)\s*([\p{Alphabetic}_][\p{Alphabetic}\p{N}_']*)\s*:")
            .expect("valid field regex")
    })
}

/// Keywords, sorts and tactic names; none of these is ever a reference
fn stopwords() -> &'static HashSet<&'static str> {
    static WORDS: OnceLock<HashSet<&'static str>> = OnceLock::new();
    WORDS.get_or_init(|| {
        [
            // gallina
            "forall", "exists", "exists2", "fun", "match", "with", "end", "as", "in", "return",
            "let", "if", "then", "else", "fix", "cofix", "struct", "where", "for", "using",
            "Type", "Prop", "Set", "SProp", "_", "is", "measure", "wf",
            // vernacular
            "Proof", "Qed", "Defined", "Admitted", "Abort", "Save", "Theorem", "Lemma", "Remark",
            "Fact", "Corollary", "Proposition", "Property", "Example", "Definition", "Fixpoint",
            "CoFixpoint", "Inductive", "CoInductive", "Variant", "Record", "Structure", "Class",
            "Instance", "Axiom", "Parameter", "Variable", "Variables", "Hypothesis", "Conjecture",
            "Let", "Ltac", "Local", "Global", "Program",
            // tactics
            "intro", "intros", "apply", "eapply", "exact", "eexact", "refine", "rewrite",
            "erewrite", "simpl", "cbn", "cbv", "vm_compute", "native_compute", "compute", "hnf",
            "red", "unfold", "fold", "reflexivity", "symmetry", "transitivity", "etransitivity",
            "induction", "destruct", "edestruct", "case", "case_eq", "elim", "inversion",
            "inversion_clear", "injection", "discriminate", "congruence", "subst", "auto",
            "eauto", "trivial", "easy", "now", "tauto", "intuition", "firstorder", "lia",
            "nia", "omega", "ring", "field", "lra", "nra", "psatz", "assumption",
            "eassumption", "contradiction", "exfalso", "absurd", "split", "left", "right",
            "constructor", "econstructor", "exists", "eexists", "assert", "enough", "pose",
            "set", "remember", "generalize", "specialize", "clear", "clearbody", "revert",
            "rename", "move", "change", "pattern", "replace", "cut", "f_equal", "try", "repeat",
            "do", "first", "solve", "progress", "idtac", "fail", "gfail", "all", "only",
            "abstract", "by", "exact_no_check", "dependent", "functional", "decide",
            "equality", "setoid_rewrite", "autorewrite", "autounfold", "typeclasses",
            "unshelve", "shelve", "give_up", "admit", "lazy", "eval", "type", "of", "at",
            "after", "before", "top", "bottom", "hint", "core", "arith", "zarith", "bool",
            "datatypes", "eqn", "into", "on", "has", "here", "inv", "info", "debug",
        ]
        .into_iter()
        .collect()
    })
}

/// Identifiers of masked code, first occurrence order, stopwords removed
pub fn referenced_idents(masked: &str, exclude: &[&str]) -> Vec<String> {
    let stop = stopwords();
    let mut seen = HashSet::new();
    let mut out = Vec::new();
    for m in ident_regex().find_iter(masked) {
        let id = m.as_str();
        if stop.contains(id) || exclude.contains(&id) {
            continue;
        }
        if seen.insert(id) {
            out.push(id.to_string());
        }
    }
    out
}

enum Block {
    Module(String),
    Section(String),
}

enum State {
    Normal,
    /// A declaration that may be followed by a proof
    Pending { decl: usize, depth: usize },
    InProof { decl: usize, start: Sentence, depth: usize },
}

struct Parser<'a> {
    src: &'a str,
    masked: &'a str,
    blocks: Vec<Block>,
    state: State,
    out: ParsedFile,
}

fn span_of(first: Sentence, last: Sentence) -> Span {
    Span {
        start: first.start,
        end: last.end,
        start_line: first.start_line,
        end_line: last.end_line,
    }
}

impl<'a> Parser<'a> {
    fn module_path(&self) -> Vec<String> {
        self.blocks
            .iter()
            .filter_map(|b| match b {
                Block::Module(name) => Some(name.clone()),
                Block::Section(_) => None,
            })
            .collect()
    }

    fn feed(&mut self, s: Sentence) {
        let masked = s.text(self.masked);
        let words = head_words(masked);
        let first = words.first().copied().unwrap_or("");

        match self.state {
            State::Normal => self.normal(s, &words),
            State::Pending { decl, depth } => {
                if first == "Proof" {
                    if is_inline_proof(&words) {
                        self.close(decl, s, s, ProofTerminator::Inline);
                    } else {
                        self.state = State::InProof { decl, start: s, depth };
                    }
                } else if let Some(term) = ProofTerminator::from_keyword(first) {
                    self.close(decl, s, s, term);
                } else if words.is_empty() || !is_vernac_head(first) {
                    // tactics without a leading `Proof`
                    self.state = State::InProof { decl, start: s, depth };
                } else {
                    self.state = State::Normal;
                    self.feed(s);
                }
            }
            State::InProof { decl, start, depth } => {
                if let Some(term) = ProofTerminator::from_keyword(first) {
                    if depth == 0 {
                        self.close(decl, start, s, term);
                    } else {
                        self.state = State::InProof { decl, start, depth: depth - 1 };
                    }
                } else if DeclKind::from_keyword(first).is_some_and(DeclKind::is_theorem_like) {
                    self.state = State::InProof { decl, start, depth: depth + 1 };
                }
            }
        }
    }

    fn close(&mut self, decl: usize, first: Sentence, last: Sentence, term: ProofTerminator) {
        let span = span_of(first, last);
        let raw = &mut self.out.decls[decl];
        raw.proof = Some((span, term));
        let proof_masked = &self.masked[span.start..span.end];
        let own: Vec<&str> = std::iter::once(raw.name.as_str())
            .chain(raw.aliases.iter().map(String::as_str))
            .collect();
        for id in referenced_idents(proof_masked, &own) {
            if !raw.idents.contains(&id) {
                raw.idents.push(id);
            }
        }
        self.state = State::Normal;
    }

    fn normal(&mut self, s: Sentence, words: &[&str]) {
        let Some(&first) = words.first() else {
            return;
        };
        let text = s.text(self.src);

        if let Some(kind) = DeclKind::from_keyword(first) {
            let name = words.get(1).and_then(|w| leading_ident(w)).unwrap_or("");
            self.declaration(s, kind, name.to_string());
            return;
        }

        match first {
            "Add" if words.contains(&"as") => {
                let name = words
                    .iter()
                    .rposition(|w| *w == "as")
                    .and_then(|i| words.get(i + 1))
                    .and_then(|w| leading_ident(w))
                    .unwrap_or("");
                self.declaration(s, DeclKind::Relation, name.to_string());
            }
            "Notation" | "Infix" => self.out.notations.push(text.to_string()),
            "Reserved" if matches!(words.get(1), Some(&"Notation") | Some(&"Infix")) => {
                self.out.notations.push(text.to_string())
            }
            "Declare" if words.get(1) == Some(&"Custom") => self.out.notations.push(text.to_string()),
            "Require" | "From" => {
                if let Some(req) = parse_require(words) {
                    self.out.requires.push(req);
                }
            }
            "Section" => {
                if let Some(name) = words.get(1).and_then(|w| leading_ident(w)) {
                    self.blocks.push(Block::Section(name.to_string()));
                }
            }
            "Module" => {
                let masked = s.text(self.masked);
                let name = words[1..]
                    .iter()
                    .find(|w| !matches!(**w, "Import" | "Export" | "Type"))
                    .and_then(|w| leading_ident(w));
                if let (Some(name), false) = (name, masked.contains(":=")) {
                    self.blocks.push(Block::Module(name.to_string()));
                }
            }
            "End" => {
                let name = words.get(1).and_then(|w| leading_ident(w));
                let top = match self.blocks.last() {
                    Some(Block::Module(n)) | Some(Block::Section(n)) => Some(n.as_str()),
                    None => None,
                };
                if name.is_some() && name == top {
                    self.blocks.pop();
                }
            }
            _ => {}
        }
    }

    fn declaration(&mut self, s: Sentence, kind: DeclKind, name: String) {
        let masked = s.text(self.masked);
        let statement = span_of(s, s);
        let aliases = aliases_of(kind, &name, masked);
        let own: Vec<&str> = std::iter::once(name.as_str())
            .chain(aliases.iter().map(String::as_str))
            .collect();
        let idents = referenced_idents(masked, &own);

        self.out.decls.push(RawDecl {
            name,
            module_path: self.module_path(),
            kind,
            statement,
            proof: None,
            aliases,
            idents,
        });
        let decl = self.out.decls.len() - 1;

        let has_body = masked.contains(":=");
        let expects_proof = if kind.is_theorem_like() {
            true
        } else {
            !kind.never_has_proof() && !has_body
        };
        if expects_proof {
            self.state = State::Pending { decl, depth: 0 };
        }
    }
}

/// `Proof term.` is a complete proof; `Proof.`, `Proof using ...` and `Proof with ...` open one
fn is_inline_proof(words: &[&str]) -> bool {
    match words.get(1) {
        None => false,
        Some(w) => !matches!(*w, "using" | "with"),
    }
}

fn parse_require(words: &[&str]) -> Option<Require> {
    let (from, rest) = if words.first() == Some(&"From") {
        (words.get(1).map(|s| s.to_string()), words.get(2..).unwrap_or(&[]))
    } else {
        (None, words)
    };
    if rest.first() != Some(&"Require") {
        return None;
    }
    let mut rest = &rest[1..];
    let mut export = false;
    match rest.first() {
        Some(&"Import") => rest = &rest[1..],
        Some(&"Export") => {
            export = true;
            rest = &rest[1..];
        }
        _ => {}
    }
    let modules: Vec<String> = rest
        .iter()
        .map(|m| m.trim_matches(|c| c == '(' || c == ')'))
        .filter(|m| !m.is_empty())
        .map(str::to_string)
        .collect();
    Some(Require { from, modules, export })
}

fn aliases_of(kind: DeclKind, name: &str, masked: &str) -> Vec<String> {
    let mut aliases: Vec<String> = Vec::new();
    let add = |a: &str, aliases: &mut Vec<String>| {
        if a != name && !stopwords().contains(a) && !aliases.iter().any(|x| x == a) {
            aliases.push(a.to_string());
        }
    };
    match kind {
        DeclKind::Inductive | DeclKind::CoInductive | DeclKind::Variant => {
            if let Some(body) = masked.find(":=").map(|i| &masked[i..]) {
                for cap in constructor_regex().captures_iter(body) {
                    add(&cap[1], &mut aliases);
                }
            }
        }
        DeclKind::Record | DeclKind::Structure | DeclKind::Class => {
            add(&format!("Build_{}", name), &mut aliases);
            if let Some(body) = masked.find(":=").map(|i| &masked[i..]) {
                for cap in record_ctor_regex().captures_iter(body) {
                    add(&cap[1], &mut aliases);
                }
                for cap in field_regex().captures_iter(body) {
                    add(&cap[1], &mut aliases);
                }
            }
        }
        DeclKind::Fixpoint | DeclKind::CoFixpoint => {
            for cap in mutual_regex().captures_iter(masked) {
                add(&cap[1], &mut aliases);
            }
        }
        _ => {}
    }
    aliases
}

/// Parse one file's source
pub fn parse_file(src: &str) -> Result<ParsedFile, LexError> {
    let (masked, sentences) = sentence::sentences(src)?;
    let mut parser = Parser {
        src,
        masked: &masked,
        blocks: Vec::new(),
        state: State::Normal,
        out: ParsedFile::default(),
    };
    for s in sentences {
        parser.feed(s);
    }
    let mut out = parser.out;
    out.decls.retain(|d| !d.name.is_empty());
    Ok(out)
}
