// SPDX-FileCopyrightText: 2026 Proofbench Project Team
// SPDX-License-Identifier: PMPL-1.0-or-later

//! Dependency extraction
//!
//! Parses every source file of a project into declarations, resolves the
//! identifiers each declaration uses, and builds the dependency graph.
//! Files that fail to parse and declarations caught in a dependency cycle
//! are reported in [`Extraction::failures`] and left out; nothing else is
//! affected by them.

pub mod graph;
pub mod parser;
pub mod resolve;
pub mod sentence;

use anyhow::Result;
use std::cmp::Reverse;
use std::collections::BinaryHeap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::core::{DeclId, Declaration, ProofBody};
use crate::error::ExtractionError;
use crate::project::CoqProject;
use graph::DependencyGraph;
use parser::ParsedFile;
use resolve::SymbolTable;

/// A parsed source file
#[derive(Debug, Clone)]
pub struct SourceFile {
    /// Relative to the project root
    pub path: PathBuf,
    pub module: String,
    pub text: Arc<str>,
    pub notations: Vec<String>,
    /// Project files loaded by this file's `Require`s
    pub requires: Vec<usize>,
    pub declarations: Vec<DeclId>,
}

/// Result of extracting a whole project
#[derive(Debug)]
pub struct Extraction {
    pub root: PathBuf,
    pub files: Vec<SourceFile>,
    pub declarations: Vec<Declaration>,
    pub graph: DependencyGraph,
    pub failures: Vec<ExtractionError>,
    file_of: Vec<usize>,
}

impl Extraction {
    pub fn get(&self, id: DeclId) -> Option<&Declaration> {
        self.declarations.get(id.index())
    }

    /// Look up by qualified name, then by unique short name
    pub fn find(&self, name: &str) -> Option<&Declaration> {
        if let Some(d) = self.declarations.iter().find(|d| d.qualified_name == name) {
            return Some(d);
        }
        let mut short = self.declarations.iter().filter(|d| d.name == name);
        match (short.next(), short.next()) {
            (Some(d), None) => Some(d),
            _ => None,
        }
    }

    pub fn file_of(&self, id: DeclId) -> Option<&SourceFile> {
        self.file_of.get(id.index()).and_then(|&f| self.files.get(f))
    }

    /// Targets: provable declarations not excluded by a cycle, in topological order
    pub fn provable(&self) -> impl Iterator<Item = &Declaration> + '_ {
        self.graph
            .order()
            .iter()
            .filter_map(|id| self.get(*id))
            .filter(|d| d.is_provable())
    }

    /// Transitive dependencies of a declaration, dependencies first
    pub fn dependencies(&self, id: DeclId) -> Vec<&Declaration> {
        self.graph
            .closure(id)
            .iter()
            .filter_map(|d| self.get(*d))
            .collect()
    }

    pub fn is_excluded(&self, id: DeclId) -> bool {
        self.graph.is_excluded(id)
    }
}

/// Extracts declarations and dependencies from a Coq project
pub struct Extractor {
    project: CoqProject,
}

impl Extractor {
    pub fn new(project: CoqProject) -> Self {
        Self { project }
    }

    pub fn project(&self) -> &CoqProject {
        &self.project
    }

    /// Run extraction over every source file of the project
    pub fn extract(&self) -> Result<Extraction> {
        let paths = self.project.source_files()?;
        info!(
            "Extracting declarations from {} files under {}",
            paths.len(),
            self.project.root.display()
        );

        let mut failures = Vec::new();
        let mut parsed: Vec<(PathBuf, String, Arc<str>, ParsedFile)> = Vec::new();
        for path in paths {
            let abs = self.project.root.join(&path);
            let text = match std::fs::read_to_string(&abs) {
                Ok(text) => text,
                Err(source) => {
                    warn!("Skipping {}: {}", path.display(), source);
                    failures.push(ExtractionError::Io { file: path, source });
                    continue;
                }
            };
            match parser::parse_file(&text) {
                Ok(file) => {
                    let module = self.project.module_of(&path);
                    parsed.push((path, module, Arc::from(text), file));
                }
                Err(e) => {
                    warn!("Skipping {}: {}", path.display(), e);
                    failures.push(ExtractionError::Parse {
                        file: path,
                        line: e.line,
                        message: e.message.to_string(),
                    });
                }
            }
        }

        let extraction = build(self.project.root.clone(), parsed, failures);
        info!(
            "Extracted {} declarations ({} provable, {} failures)",
            extraction.declarations.len(),
            extraction.provable().count(),
            extraction.failures.len()
        );
        Ok(extraction)
    }
}

/// Order files so that required files come first; ties and cycles fall back to path order
fn file_order(required: &[Vec<usize>]) -> Vec<usize> {
    let n = required.len();
    let mut pending: Vec<usize> = required.iter().map(Vec::len).collect();
    let mut dependents = vec![Vec::new(); n];
    for (f, reqs) in required.iter().enumerate() {
        for &r in reqs {
            dependents[r].push(f);
        }
    }
    let mut ready: BinaryHeap<Reverse<usize>> =
        (0..n).filter(|&f| pending[f] == 0).map(Reverse).collect();
    let mut order = Vec::with_capacity(n);
    let mut placed = vec![false; n];
    while order.len() < n {
        let next = match ready.pop() {
            Some(Reverse(f)) => f,
            None => {
                let Some(f) = (0..n).find(|&f| !placed[f]) else {
                    break;
                };
                warn!("Require cycle involving file #{}; using path order", f);
                f
            }
        };
        if placed[next] {
            continue;
        }
        placed[next] = true;
        order.push(next);
        for &d in &dependents[next] {
            pending[d] = pending[d].saturating_sub(1);
            if pending[d] == 0 && !placed[d] {
                ready.push(Reverse(d));
            }
        }
    }
    order
}

/// Assemble an extraction from parsed files (path order)
pub fn build(
    root: PathBuf,
    parsed: Vec<(PathBuf, String, Arc<str>, ParsedFile)>,
    mut failures: Vec<ExtractionError>,
) -> Extraction {
    let modules: Vec<String> = parsed.iter().map(|(_, m, _, _)| m.clone()).collect();
    let required: Vec<Vec<usize>> = parsed
        .iter()
        .enumerate()
        .map(|(i, (_, _, _, p))| {
            let mut reqs = resolve::required_files(&p.requires, &modules);
            reqs.retain(|&r| r != i);
            reqs
        })
        .collect();

    // Renumber files in load order so declaration ids follow dependencies
    let order = file_order(&required);
    let mut new_index = vec![0usize; parsed.len()];
    for (pos, &old) in order.iter().enumerate() {
        new_index[old] = pos;
    }
    let mut slots: Vec<Option<(PathBuf, String, Arc<str>, ParsedFile)>> =
        parsed.into_iter().map(Some).collect();
    let mut files: Vec<SourceFile> = Vec::with_capacity(order.len());
    let mut raw_decls = Vec::new();

    for &old in &order {
        let Some((path, module, text, parsed)) = slots[old].take() else {
            continue;
        };
        let requires = required[old].iter().map(|&r| new_index[r]).collect();
        let file_idx = files.len();
        let mut ids = Vec::new();
        for raw in parsed.decls {
            let id = DeclId(raw_decls.len() as u32);
            ids.push(id);
            raw_decls.push((file_idx, raw));
        }
        files.push(SourceFile {
            path,
            module,
            text,
            notations: parsed.notations,
            requires,
            declarations: ids,
        });
    }

    let rank: Vec<usize> = (0..files.len()).collect();
    let file_requires: Vec<Vec<usize>> = files.iter().map(|f| f.requires.clone()).collect();
    let visible: Vec<Vec<usize>> = (0..files.len())
        .map(|f| resolve::visible_files(f, &file_requires, &rank))
        .collect();

    let mut table = SymbolTable::new(files.len());
    let mut declarations = Vec::with_capacity(raw_decls.len());
    let mut file_of = Vec::with_capacity(raw_decls.len());
    for (i, (f, raw)) in raw_decls.iter().enumerate() {
        let id = DeclId(i as u32);
        let file = &files[*f];
        let prefix = std::iter::once(file.module.as_str())
            .filter(|m| !m.is_empty())
            .chain(raw.module_path.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(".");
        let qualify = |name: &str| {
            if prefix.is_empty() {
                name.to_string()
            } else {
                format!("{}.{}", prefix, name)
            }
        };
        table.insert(*f, &raw.name, qualify(&raw.name), id);
        for alias in &raw.aliases {
            table.insert(*f, alias, qualify(alias), id);
        }

        let text = &file.text;
        declarations.push(Declaration {
            id,
            name: raw.name.clone(),
            qualified_name: qualify(&raw.name),
            module: file.module.clone(),
            file: file.path.clone(),
            kind: raw.kind,
            statement: raw.statement,
            statement_text: text[raw.statement.start..raw.statement.end].to_string(),
            proof: raw.proof.map(|(span, terminator)| ProofBody {
                span,
                text: text[span.start..span.end].to_string(),
                terminator,
            }),
            external_refs: Vec::new(),
        });
        file_of.push(*f);
    }

    let mut deps: Vec<Vec<DeclId>> = vec![Vec::new(); declarations.len()];
    for (i, (f, raw)) in raw_decls.iter().enumerate() {
        let id = DeclId(i as u32);
        for ident in &raw.idents {
            match table.resolve(ident, *f, id, &visible[*f]) {
                Some(dep) if dep != id => deps[i].push(dep),
                Some(_) => {}
                None => declarations[i].external_refs.push(ident.clone()),
            }
        }
    }

    let (graph, cycles) = DependencyGraph::new(deps);
    for members in cycles {
        let names: Vec<String> = members
            .iter()
            .filter_map(|m| declarations.get(m.index()))
            .map(|d| d.qualified_name.clone())
            .collect();
        warn!("Excluding declarations in a dependency cycle: {}", names.join(", "));
        failures.push(ExtractionError::Cycle { members: names });
    }
    debug!("Dependency graph has {} nodes", graph.len());

    Extraction {
        root,
        files,
        declarations,
        graph,
        failures,
        file_of,
    }
}

/// Parse in-memory sources as one project; used by tests and benchmarks
pub fn extract_sources(root: &Path, sources: &[(&str, &str, &str)]) -> Extraction {
    let mut parsed = Vec::new();
    let mut failures = Vec::new();
    let mut sorted: Vec<&(&str, &str, &str)> = sources.iter().collect();
    sorted.sort_by_key(|(path, _, _)| *path);
    for (path, module, text) in sorted {
        match parser::parse_file(text) {
            Ok(file) => parsed.push((
                PathBuf::from(path),
                module.to_string(),
                Arc::from(*text),
                file,
            )),
            Err(e) => failures.push(ExtractionError::Parse {
                file: PathBuf::from(path),
                line: e.line,
                message: e.message.to_string(),
            }),
        }
    }
    build(root.to_path_buf(), parsed, failures)
}
