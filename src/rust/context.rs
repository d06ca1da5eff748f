// SPDX-FileCopyrightText: 2026 Proofbench Project Team
// SPDX-License-Identifier: PMPL-1.0-or-later

//! Proof object construction
//!
//! Turns a provable declaration into the prompt a model sees, under one of
//! the four ablations. Rendering is a pure function of the extraction and
//! the settings, so equal inputs always give the same fingerprint.

use anyhow::{Context, Result};
use std::collections::BTreeSet;
use std::path::Path;
use tracing::{debug, warn};

use crate::cache::write_atomic;
use crate::config::ContextSettings;
use crate::core::{Ablation, Declaration, Fingerprint, ProofObject};
use crate::extract::Extraction;

/// Bumped whenever the rendering below changes shape
const OBJECT_VERSION: &str = "proofbench-object-v1";

const CLOSING: &str = "Respond ONLY with the complete proof body, wrapped strictly between \"Proof.\" and \"Qed.\", without repeating the signature.";

/// Builds proof objects from an extraction
pub struct ContextBuilder<'a> {
    extraction: &'a Extraction,
    settings: ContextSettings,
}

impl<'a> ContextBuilder<'a> {
    pub fn new(extraction: &'a Extraction, settings: ContextSettings) -> Self {
        Self {
            extraction,
            settings,
        }
    }

    /// Objects for every provable declaration, in topological order
    pub fn build_all(&self, ablation: Ablation) -> Vec<ProofObject> {
        self.extraction
            .provable()
            .map(|decl| self.build(decl, ablation))
            .collect()
    }

    pub fn build(&self, decl: &Declaration, ablation: Ablation) -> ProofObject {
        let text = self
            .extraction
            .file_of(decl.id)
            .map(|f| f.text.as_ref())
            .unwrap_or("");

        let first_line = self.window_start(decl.statement.start_line);
        let mut dependencies = Vec::new();
        let mut dependency_texts = Vec::new();
        let mut notation_files = BTreeSet::new();
        if ablation.external_deps {
            for dep in self.extraction.dependencies(decl.id) {
                notation_files.insert(dep.file.clone());
                // already visible in the file prefix
                if ablation.in_file_context
                    && dep.file == decl.file
                    && dep.statement.start_line >= first_line
                {
                    continue;
                }
                dependencies.push(dep.qualified_name.clone());
                dependency_texts.push(dep.dependency_text());
            }
            notation_files.insert(decl.file.clone());
        }

        let notations: Vec<String> = self
            .extraction
            .files
            .iter()
            .filter(|f| notation_files.contains(&f.path))
            .flat_map(|f| f.notations.iter().cloned())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();

        let head = &text[..decl.statement.start.min(text.len())];
        let imports = import_lines(head);
        let prefix = &head[line_offset(head, first_line)..];
        let following = self.following(text, decl);

        let prompt = render(&PromptParts {
            file: &decl.file.to_string_lossy(),
            signature: &decl.statement_text,
            ablation,
            dependencies: &dependency_texts,
            notations: &notations,
            imports: &imports,
            prefix: prefix.trim_end(),
            following: following.trim_end(),
        });

        let window = self
            .settings
            .window_lines
            .map_or_else(|| "all".to_string(), |n| n.to_string());
        let following_lines = self.settings.following_lines.to_string();
        let file = decl.file.to_string_lossy();
        let fingerprint = Fingerprint::of_fields([
            OBJECT_VERSION,
            decl.qualified_name.as_str(),
            &*file,
            ablation.slug(),
            window.as_str(),
            following_lines.as_str(),
            prompt.as_str(),
        ]);
        debug!(
            "Built {} for {} ({} dependencies)",
            fingerprint.short(),
            decl.qualified_name,
            dependencies.len()
        );

        ProofObject {
            fingerprint,
            declaration: decl.clone(),
            ablation,
            dependencies,
            notations,
            imports,
            context: prompt,
        }
    }

    /// First line of the file prefix shown before a target starting at `start_line`
    fn window_start(&self, start_line: usize) -> usize {
        match self.settings.window_lines {
            Some(n) => start_line.saturating_sub(n).max(1),
            None => 1,
        }
    }

    fn following(&self, text: &str, decl: &Declaration) -> String {
        let n = self.settings.following_lines;
        if n == 0 {
            return String::new();
        }
        let end = decl
            .proof
            .as_ref()
            .map_or(decl.statement.end, |p| p.span.end)
            .min(text.len());
        let rest = &text[end..];
        let rest = rest.strip_prefix('\n').unwrap_or(rest);
        rest.lines().take(n).collect::<Vec<_>>().join("\n")
    }
}

/// Byte offset of the start of 1-based `line`, or the end of `text`
fn line_offset(text: &str, line: usize) -> usize {
    if line <= 1 {
        return 0;
    }
    text.match_indices('\n')
        .nth(line - 2)
        .map_or(text.len(), |(i, _)| i + 1)
}

/// `Require` lines a file loads, leaving out re-exports
pub fn import_lines(text: &str) -> Vec<String> {
    text.lines()
        .map(str::trim)
        .filter(|line| {
            line.starts_with("Require Import")
                || (line.starts_with("Require ") && !line.starts_with("Require Export"))
                || (line.starts_with("From ") && !line.contains("Export"))
        })
        .map(str::to_string)
        .collect()
}

struct PromptParts<'p> {
    file: &'p str,
    signature: &'p str,
    ablation: Ablation,
    dependencies: &'p [String],
    notations: &'p [String],
    imports: &'p [String],
    prefix: &'p str,
    following: &'p str,
}

fn section(out: &mut String, intro: &str, tag: &str, body: &str) {
    out.push_str(intro);
    out.push_str("\n\n<");
    out.push_str(tag);
    out.push_str(">\n");
    out.push_str(body);
    out.push_str("\n</");
    out.push_str(tag);
    out.push_str(">\n\n");
}

fn render(parts: &PromptParts<'_>) -> String {
    let mut out = format!("Current file path: {}\n\n", parts.file);
    section(
        &mut out,
        "Your goal is to prove the following theorem or lemma:",
        "goal_signature",
        parts.signature,
    );
    if parts.ablation.external_deps {
        section(
            &mut out,
            "Relevant dependencies from other files:",
            "dependencies",
            &parts.dependencies.join("\n"),
        );
        section(
            &mut out,
            "Relevant notations needed from other files:",
            "notations",
            &parts.notations.join("\n"),
        );
    }
    if parts.ablation.in_file_context {
        section(
            &mut out,
            "The current file content up to (but excluding) this theorem or lemma is provided below for context:",
            "current_file_content",
            parts.prefix,
        );
        if !parts.following.is_empty() {
            section(
                &mut out,
                "The file content following this theorem or lemma:",
                "following_file_content",
                parts.following,
            );
        }
    } else {
        section(
            &mut out,
            "The imports in the current file are provided below for context:",
            "imports",
            &parts.imports.join("\n"),
        );
    }
    out.push_str(CLOSING);
    out
}

/// Persist objects as `<dir>/<log_name>.json`
pub fn save_objects(dir: &Path, objects: &[ProofObject]) -> Result<()> {
    std::fs::create_dir_all(dir).with_context(|| format!("creating {}", dir.display()))?;
    for object in objects {
        let path = dir.join(format!("{}.json", object.log_name()));
        let json = serde_json::to_vec_pretty(object)?;
        write_atomic(&path, &json)?;
    }
    Ok(())
}

/// Reload objects written by [`save_objects`]; unreadable entries are skipped
pub fn load_objects(dir: &Path) -> Result<Vec<ProofObject>> {
    let mut paths: Vec<_> = std::fs::read_dir(dir)
        .with_context(|| format!("reading {}", dir.display()))?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|p| p.extension().is_some_and(|e| e == "json"))
        .collect();
    paths.sort();

    let mut objects = Vec::with_capacity(paths.len());
    for path in paths {
        let parsed = std::fs::read(&path)
            .map_err(anyhow::Error::from)
            .and_then(|bytes| serde_json::from_slice::<ProofObject>(&bytes).map_err(Into::into));
        match parsed {
            Ok(object) => objects.push(object),
            Err(e) => warn!("Ignoring proof object {}: {}", path.display(), e),
        }
    }
    Ok(objects)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extract::extract_sources;

    const BASE: &str = "Notation \"x ** 2\" := (x * x) (at level 30).\n\nDefinition sq (n : nat) := n * n.\n\nLemma sq_0 : sq 0 = 0.\nProof. reflexivity. Qed.\n";
    const MAIN: &str = "From Coq Require Import Arith.\nRequire Export Demo.Base.\n\nLemma helper : sq 1 = 1.\nProof. reflexivity. Qed.\n\nLemma target : sq 0 + sq 1 = 1.\nProof. rewrite sq_0, helper. reflexivity. Qed.\n\nLemma after : True.\nProof. exact I. Qed.\n";

    fn extraction() -> Extraction {
        extract_sources(
            Path::new("/demo"),
            &[
                ("theories/Base.v", "Demo.Base", BASE),
                ("theories/Main.v", "Demo.Main", MAIN),
            ],
        )
    }

    fn target(ex: &Extraction) -> &Declaration {
        ex.find("Demo.Main.target").unwrap()
    }

    #[test]
    fn test_build_is_deterministic() {
        let ex = extraction();
        let builder = ContextBuilder::new(&ex, ContextSettings::default());
        for ablation in Ablation::ALL {
            let a = builder.build(target(&ex), ablation);
            let b = builder.build(target(&ex), ablation);
            assert_eq!(a, b);
        }
    }

    #[test]
    fn test_ablations_have_distinct_fingerprints() {
        let ex = extraction();
        let builder = ContextBuilder::new(&ex, ContextSettings::default());
        let prints: BTreeSet<_> = Ablation::ALL
            .iter()
            .map(|a| builder.build(target(&ex), *a).fingerprint)
            .collect();
        assert_eq!(prints.len(), 4);
    }

    #[test]
    fn test_full_context_never_shows_target_proof() {
        let ex = extraction();
        let object = ContextBuilder::new(&ex, ContextSettings::default()).build(target(&ex), Ablation::FULL);
        assert!(object.context.contains("<goal_signature>\nLemma target : sq 0 + sq 1 = 1.\n</goal_signature>"));
        assert!(!object.context.contains("rewrite sq_0, helper"));
        assert!(!object.context.contains("Lemma after"));
        // same-file helper is in the prefix, not the dependency list
        assert_eq!(object.dependencies, vec!["Demo.Base.sq", "Demo.Base.sq_0"]);
        assert!(object.context.contains("Definition sq (n : nat) := n * n."));
        assert!(!object.context.contains("Proof. reflexivity. Qed.\n</dependencies>"));
        assert_eq!(object.notations.len(), 1);
        assert!(object.context.ends_with(CLOSING));
    }

    #[test]
    fn test_isolated_shows_imports_only() {
        let ex = extraction();
        let object =
            ContextBuilder::new(&ex, ContextSettings::default()).build(target(&ex), Ablation::ISOLATED);
        assert!(object.dependencies.is_empty());
        assert!(object.notations.is_empty());
        assert!(!object.context.contains("<dependencies>"));
        assert!(!object.context.contains("<current_file_content>"));
        assert!(object.context.contains("<imports>\nFrom Coq Require Import Arith.\n</imports>"));
        assert!(!object.context.contains("Lemma helper"));
    }

    #[test]
    fn test_no_in_file_context_includes_same_file_dependencies() {
        let ex = extraction();
        let object = ContextBuilder::new(&ex, ContextSettings::default())
            .build(target(&ex), Ablation::NO_IN_FILE_CONTEXT);
        assert!(object.dependencies.contains(&"Demo.Main.helper".to_string()));
        assert!(object.context.contains("Lemma helper : sq 1 = 1."));
    }

    #[test]
    fn test_window_and_following_lines() {
        let ex = extraction();
        let settings = ContextSettings {
            window_lines: Some(2),
            following_lines: 2,
        };
        let object = ContextBuilder::new(&ex, settings).build(target(&ex), Ablation::NO_DEPENDENCIES);
        assert!(!object.context.contains("From Coq Require Import Arith."));
        assert!(object.context.contains("Proof. reflexivity. Qed.\n</current_file_content>"));
        assert!(object.context.contains("<following_file_content>\n\nLemma after : True.\n</following_file_content>"));
    }

    #[test]
    fn test_same_file_dependency_outside_window_is_listed() {
        let ex = extraction();
        let narrow = ContextSettings {
            window_lines: Some(2),
            following_lines: 0,
        };
        let object = ContextBuilder::new(&ex, narrow).build(target(&ex), Ablation::FULL);
        assert!(object.dependencies.contains(&"Demo.Main.helper".to_string()));
        assert!(object.context.contains("Lemma helper : sq 1 = 1.\n"));

        let wide = ContextSettings {
            window_lines: Some(3),
            following_lines: 0,
        };
        let object = ContextBuilder::new(&ex, wide).build(target(&ex), Ablation::FULL);
        assert!(!object.dependencies.contains(&"Demo.Main.helper".to_string()));
        assert!(object.context.contains("<current_file_content>\nLemma helper : sq 1 = 1."));
    }

    #[test]
    fn test_import_filter() {
        let lines = import_lines("Require Import A.\nRequire Export B.\nFrom C Require D.\nFrom E Require Export F.\nRequire G.\n");
        assert_eq!(lines, vec!["Require Import A.", "From C Require D.", "Require G."]);
    }

    #[test]
    fn test_objects_round_trip_through_disk() {
        let ex = extraction();
        let objects = ContextBuilder::new(&ex, ContextSettings::default()).build_all(Ablation::FULL);
        let dir = tempfile::tempdir().unwrap();
        save_objects(dir.path(), &objects).unwrap();
        std::fs::write(dir.path().join("garbage.json"), b"{").unwrap();
        let mut loaded = load_objects(dir.path()).unwrap();
        loaded.sort_by(|a, b| a.declaration.id.cmp(&b.declaration.id));
        assert_eq!(loaded, objects);
    }
}
