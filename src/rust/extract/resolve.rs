// SPDX-FileCopyrightText: 2026 Proofbench Project Team
// SPDX-License-Identifier: PMPL-1.0-or-later

//! Name resolution against the project-wide declaration table

use std::collections::HashMap;

use super::parser::Require;
use crate::core::DeclId;

/// Does the logical module `module` satisfy `[From from] Require name`?
pub fn require_matches(module: &str, from: Option<&str>, name: &str) -> bool {
    let full = match from {
        Some(prefix) => format!("{}.{}", prefix, name),
        None => name.to_string(),
    };
    if module == full || module.ends_with(&format!(".{}", full)) {
        return true;
    }
    // `From Lib Require A` also finds `Lib.Sub.A`
    match from {
        Some(prefix) => {
            module.starts_with(&format!("{}.", prefix)) && module.ends_with(&format!(".{}", name))
        }
        None => false,
    }
}

/// Indices of the project files a file's `Require`s load; library modules are dropped
pub fn required_files(requires: &[Require], modules: &[String]) -> Vec<usize> {
    let mut out = Vec::new();
    for req in requires {
        for name in &req.modules {
            let hit = modules
                .iter()
                .position(|m| require_matches(m, req.from.as_deref(), name));
            if let Some(i) = hit {
                if !out.contains(&i) {
                    out.push(i);
                }
            }
        }
    }
    out
}

/// One entry of the symbol table
#[derive(Debug, Clone)]
struct Symbol {
    id: DeclId,
    qualified: String,
}

/// Symbol table keyed by file and short name
#[derive(Debug, Default)]
pub struct SymbolTable {
    /// `per_file[f][short]` lists the declarations of file `f` named `short`, source order
    per_file: Vec<HashMap<String, Vec<Symbol>>>,
    qualified: HashMap<String, (usize, DeclId)>,
}

impl SymbolTable {
    pub fn new(files: usize) -> Self {
        Self {
            per_file: vec![HashMap::new(); files],
            qualified: HashMap::new(),
        }
    }

    /// Register `short` (a declaration name or alias) with its qualified form
    pub fn insert(&mut self, file: usize, short: &str, qualified: String, id: DeclId) {
        self.qualified.entry(qualified.clone()).or_insert((file, id));
        self.per_file[file]
            .entry(short.to_string())
            .or_default()
            .push(Symbol { id, qualified });
    }

    /// Resolve `ident` as seen by declaration `from` of file `file`.
    ///
    /// `visible` lists files loaded by `file`, earliest first; later files
    /// shadow earlier ones. Same-file declarations must precede `from`.
    pub fn resolve(&self, ident: &str, file: usize, from: DeclId, visible: &[usize]) -> Option<DeclId> {
        let short = ident.rsplit('.').next().unwrap_or(ident);
        let qualified = ident.contains('.');

        let accept = |f: usize, sym: &Symbol| -> bool {
            if f == file && sym.id >= from {
                return false;
            }
            !qualified || sym.qualified == ident || sym.qualified.ends_with(&format!(".{}", ident))
        };

        if let Some(syms) = self.per_file.get(file).and_then(|m| m.get(short)) {
            if let Some(sym) = syms.iter().rev().find(|s| accept(file, s)) {
                return Some(sym.id);
            }
        }

        for &f in visible.iter().rev() {
            if let Some(syms) = self.per_file.get(f).and_then(|m| m.get(short)) {
                if let Some(sym) = syms.iter().rev().find(|s| accept(f, s)) {
                    return Some(sym.id);
                }
            }
        }

        if qualified {
            // fully qualified names resolve even without a `Require` path to them
            if let Some(&(f, id)) = self.qualified.get(ident) {
                if f != file || id < from {
                    return Some(id);
                }
            }
        }
        None
    }
}

/// Transitive closure of file requirements, earliest loaded first
pub fn visible_files(file: usize, required: &[Vec<usize>], rank: &[usize]) -> Vec<usize> {
    let mut seen = vec![false; required.len()];
    let mut stack: Vec<usize> = required.get(file).cloned().unwrap_or_default();
    let mut out = Vec::new();
    while let Some(f) = stack.pop() {
        if f == file || seen[f] {
            continue;
        }
        seen[f] = true;
        out.push(f);
        stack.extend(required[f].iter().copied());
    }
    out.sort_by_key(|&f| (rank[f], f));
    out
}
