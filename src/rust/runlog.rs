// SPDX-FileCopyrightText: 2026 Proofbench Project Team
// SPDX-License-Identifier: PMPL-1.0-or-later

//! Append-only run log in JSONL format (one result per line)
//!
//! Lines are appended in completion order and flushed to disk one at a
//! time. A process killed mid-write leaves at most one torn final line,
//! which [`RunLog::read`] skips. Reopening a log terminates such a line so
//! the next entry starts on a line of its own.

use anyhow::{anyhow, Context, Result};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tracing::warn;
use uuid::Uuid;

use crate::core::VerificationResult;

pub const RUN_LOG_FILE: &str = "run.jsonl";

/// One line of the run log
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunLogEntry {
    /// Invocation that produced the entry
    pub run_id: Uuid,
    #[serde(flatten)]
    pub result: VerificationResult,
}

/// Handle to one `run.jsonl`
pub struct RunLog {
    path: PathBuf,
    run_id: Uuid,
    file: Arc<Mutex<File>>,
}

impl RunLog {
    /// Open for appending, creating the directory and file as needed
    pub fn open(dir: &Path, run_id: Uuid) -> Result<Self> {
        std::fs::create_dir_all(dir).with_context(|| format!("creating {}", dir.display()))?;
        let path = dir.join(RUN_LOG_FILE);
        let mut file = OpenOptions::new()
            .create(true)
            .read(true)
            .append(true)
            .open(&path)
            .with_context(|| format!("opening {}", path.display()))?;
        if !ends_with_newline(&mut file)? {
            warn!("{}: terminating torn final entry", path.display());
            file.write_all(b"\n")?;
            file.sync_data()?;
        }
        Ok(Self {
            path,
            run_id,
            file: Arc::new(Mutex::new(file)),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn append(&self, result: &VerificationResult) -> Result<()> {
        let entry = RunLogEntry {
            run_id: self.run_id,
            result: result.clone(),
        };
        let mut line = serde_json::to_string(&entry)?;
        line.push('\n');

        let file = Arc::clone(&self.file);
        let path = self.path.clone();
        tokio::task::spawn_blocking(move || -> Result<()> {
            let mut file = file
                .lock()
                .map_err(|_| anyhow!("run log lock poisoned"))?;
            file.write_all(line.as_bytes())
                .with_context(|| format!("appending to {}", path.display()))?;
            file.sync_data()?;
            Ok(())
        })
        .await
        .context("run log writer panicked")?
    }

    /// Read every complete entry; malformed lines are skipped with a warning
    pub fn read(path: &Path) -> Result<Vec<RunLogEntry>> {
        let file = match File::open(path) {
            Ok(file) => file,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e).with_context(|| format!("opening {}", path.display())),
        };
        let mut entries = Vec::new();
        for (n, line) in BufReader::new(file).lines().enumerate() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str(&line) {
                Ok(entry) => entries.push(entry),
                Err(e) => warn!("{}:{}: skipping malformed entry: {}", path.display(), n + 1, e),
            }
        }
        Ok(entries)
    }
}

fn ends_with_newline(file: &mut File) -> Result<bool> {
    if file.metadata()?.len() == 0 {
        return Ok(true);
    }
    file.seek(SeekFrom::End(-1))?;
    let mut last = [0u8; 1];
    file.read_exact(&mut last)?;
    Ok(last[0] == b'\n')
}

/// Run logs of one invocation, one per results directory
pub struct RunLogs {
    run_id: Uuid,
    logs: DashMap<PathBuf, Arc<RunLog>>,
}

impl Default for RunLogs {
    fn default() -> Self {
        Self::new()
    }
}

impl RunLogs {
    pub fn new() -> Self {
        Self {
            run_id: Uuid::new_v4(),
            logs: DashMap::new(),
        }
    }

    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    pub fn get(&self, dir: &Path) -> Result<Arc<RunLog>> {
        if let Some(log) = self.logs.get(dir) {
            return Ok(Arc::clone(log.value()));
        }
        let log = Arc::new(RunLog::open(dir, self.run_id)?);
        Ok(Arc::clone(
            self.logs.entry(dir.to_path_buf()).or_insert(log).value(),
        ))
    }
}
