// SPDX-FileCopyrightText: 2026 Proofbench Project Team
// SPDX-License-Identifier: PMPL-1.0-or-later

//! `_CoqProject` handling
//!
//! Maps physical directories to logical module prefixes (`-Q`/`-R`),
//! lists the project's source files and produces the load-path arguments
//! `coqc` needs to compile a file of the project from anywhere.

use anyhow::{Context, Result};
use std::path::{Component, Path, PathBuf};
use tracing::debug;
use walkdir::WalkDir;

use crate::error::ConfigError;

pub const PROJECT_FILE: &str = "_CoqProject";

/// One `-Q`/`-R` mapping
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadPath {
    /// Relative to the project root
    pub physical: PathBuf,
    /// Empty for the anonymous prefix
    pub logical: String,
    /// `-R` rather than `-Q`
    pub recursive: bool,
}

/// Parsed project description
#[derive(Debug, Clone)]
pub struct CoqProject {
    /// Absolute project directory
    pub root: PathBuf,
    pub load_paths: Vec<LoadPath>,
    /// `-I` directories, relative to the root
    pub includes: Vec<PathBuf>,
    /// Values of `-arg` options
    pub extra_args: Vec<String>,
    /// Explicitly listed `.v` files, relative to the root
    pub files: Vec<PathBuf>,
}

impl CoqProject {
    /// Open a project from its directory or its `_CoqProject` file
    pub fn open(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Err(ConfigError::MissingProject(path.to_path_buf()));
        }
        let file = if path.is_dir() {
            path.join(PROJECT_FILE)
        } else {
            path.to_path_buf()
        };
        if !file.is_file() {
            return Err(ConfigError::MissingCoqProject(path.to_path_buf()));
        }
        let content = std::fs::read_to_string(&file).map_err(|e| ConfigError::Parse {
            path: file.clone(),
            message: e.to_string(),
        })?;
        let root = file
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));
        let root = root.canonicalize().map_err(|e| ConfigError::Parse {
            path: root.clone(),
            message: e.to_string(),
        })?;
        Ok(Self::parse(root, &content))
    }

    /// Parse `_CoqProject` contents. Unknown options are ignored.
    pub fn parse(root: PathBuf, content: &str) -> Self {
        let tokens = tokenize(content);
        let mut project = CoqProject {
            root,
            load_paths: Vec::new(),
            includes: Vec::new(),
            extra_args: Vec::new(),
            files: Vec::new(),
        };

        let mut iter = tokens.into_iter();
        while let Some(token) = iter.next() {
            match token.as_str() {
                "-Q" | "-R" => {
                    let (Some(physical), Some(logical)) = (iter.next(), iter.next()) else {
                        break;
                    };
                    project.load_paths.push(LoadPath {
                        physical: normalize(Path::new(&physical)),
                        logical: if logical == "\"\"" { String::new() } else { logical },
                        recursive: token == "-R",
                    });
                }
                "-I" => {
                    if let Some(dir) = iter.next() {
                        project.includes.push(normalize(Path::new(&dir)));
                    }
                }
                "-arg" => {
                    if let Some(arg) = iter.next() {
                        project.extra_args.extend(arg.split_whitespace().map(str::to_string));
                    }
                }
                t if t.ends_with(".v") => project.files.push(normalize(Path::new(t))),
                other => debug!("ignoring _CoqProject token {}", other),
            }
        }
        project
    }

    /// Source files, relative to the root, in path order.
    ///
    /// When the project lists no files, every `.v` file under a mapped
    /// directory is used.
    pub fn source_files(&self) -> Result<Vec<PathBuf>> {
        let mut files = if !self.files.is_empty() {
            self.files.clone()
        } else {
            let mut found = Vec::new();
            let dirs: Vec<&Path> = if self.load_paths.is_empty() {
                vec![Path::new(".")]
            } else {
                self.load_paths.iter().map(|lp| lp.physical.as_path()).collect()
            };
            for dir in dirs {
                let abs = self.root.join(dir);
                for entry in WalkDir::new(&abs).follow_links(true) {
                    let entry = entry.with_context(|| format!("walking {}", abs.display()))?;
                    let path = entry.path();
                    if entry.file_type().is_file() && path.extension().is_some_and(|e| e == "v") {
                        let rel = path.strip_prefix(&self.root).unwrap_or(path);
                        found.push(normalize(rel));
                    }
                }
            }
            found
        };
        files.sort();
        files.dedup();
        Ok(files)
    }

    /// Logical module path of a file, from the longest matching load path
    pub fn module_of(&self, file: &Path) -> String {
        let file = normalize(file);
        let best = self
            .load_paths
            .iter()
            .filter(|lp| file.starts_with(&lp.physical))
            .max_by_key(|lp| lp.physical.components().count());

        let (prefix, rest) = match best {
            Some(lp) => (
                lp.logical.clone(),
                file.strip_prefix(&lp.physical).unwrap_or(&file).to_path_buf(),
            ),
            None => (String::new(), file.clone()),
        };

        let mut parts: Vec<String> = Vec::new();
        if !prefix.is_empty() {
            parts.push(prefix);
        }
        let rest = rest.with_extension("");
        parts.extend(
            rest.components()
                .filter_map(|c| match c {
                    Component::Normal(s) => Some(s.to_string_lossy().into_owned()),
                    _ => None,
                }),
        );
        parts.join(".")
    }

    /// Load-path arguments for `coqc`, with physical paths made absolute
    pub fn coqc_args(&self) -> Vec<String> {
        let mut args = Vec::new();
        for lp in &self.load_paths {
            args.push(if lp.recursive { "-R" } else { "-Q" }.to_string());
            args.push(self.root.join(&lp.physical).to_string_lossy().into_owned());
            // passed without a shell, so the anonymous prefix is a real empty argument
            args.push(lp.logical.clone());
        }
        for dir in &self.includes {
            args.push("-I".to_string());
            args.push(self.root.join(dir).to_string_lossy().into_owned());
        }
        args.extend(self.extra_args.iter().cloned());
        args
    }
}

/// Split on whitespace, honouring double quotes and `#` comments
fn tokenize(content: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    for line in content.lines() {
        let mut current = String::new();
        let mut in_quotes = false;
        let mut had_quotes = false;
        for c in line.chars() {
            match c {
                '"' => {
                    in_quotes = !in_quotes;
                    had_quotes = true;
                }
                '#' if !in_quotes => break,
                c if c.is_whitespace() && !in_quotes => {
                    if !current.is_empty() || had_quotes {
                        tokens.push(if current.is_empty() {
                            "\"\"".to_string()
                        } else {
                            std::mem::take(&mut current)
                        });
                    }
                    had_quotes = false;
                }
                c => current.push(c),
            }
        }
        if !current.is_empty() || had_quotes {
            tokens.push(if current.is_empty() { "\"\"".to_string() } else { current });
        }
    }
    tokens
}

/// Drop `.` components so `./theories` and `theories` compare equal
fn normalize(path: &Path) -> PathBuf {
    let normalized: PathBuf = path
        .components()
        .filter(|c| !matches!(c, Component::CurDir))
        .collect();
    if normalized.as_os_str().is_empty() {
        PathBuf::new()
    } else {
        normalized
    }
}
