// SPDX-FileCopyrightText: 2026 Proofbench Project Team
// SPDX-License-Identifier: PMPL-1.0-or-later

//! Key-value stores for model responses and verification results
//!
//! Stores are injected into the model client and the runner as
//! `Arc<dyn KvStore>`. Every write commits a whole entry or nothing: the
//! file store writes to a temporary file in the target directory, syncs it
//! and renames it into place.

use anyhow::{Context, Result};
use async_trait::async_trait;
use dashmap::DashMap;
use serde::{de::DeserializeOwned, Serialize};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use tempfile::NamedTempFile;
use tracing::{debug, warn};

use crate::core::{Fingerprint, SamplingParams};

/// Point lookups and idempotent whole-entry writes
#[async_trait]
pub trait KvStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>>;

    async fn put(&self, key: &str, value: &[u8]) -> Result<()>;

    async fn contains(&self, key: &str) -> Result<bool> {
        Ok(self.get(key).await?.is_some())
    }
}

/// Typed read; an entry that no longer deserializes counts as missing
pub async fn get_json<T: DeserializeOwned>(store: &dyn KvStore, key: &str) -> Result<Option<T>> {
    match store.get(key).await? {
        Some(bytes) => match serde_json::from_slice(&bytes) {
            Ok(value) => Ok(Some(value)),
            Err(e) => {
                warn!("Ignoring unreadable cache entry {}: {}", key, e);
                Ok(None)
            }
        },
        None => Ok(None),
    }
}

pub async fn put_json<T: Serialize + Sync>(store: &dyn KvStore, key: &str, value: &T) -> Result<()> {
    let bytes = serde_json::to_vec_pretty(value)?;
    store.put(key, &bytes).await
}

/// Write `bytes` to `path` so readers see either the old or the new content
pub fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    std::fs::create_dir_all(dir).with_context(|| format!("creating {}", dir.display()))?;
    let mut tmp = NamedTempFile::new_in(dir)
        .with_context(|| format!("creating temporary file in {}", dir.display()))?;
    tmp.write_all(bytes)?;
    tmp.as_file().sync_all()?;
    tmp.persist(path)
        .with_context(|| format!("committing {}", path.display()))?;
    Ok(())
}

/// One JSON file per key under a directory
pub struct FsStore {
    dir: PathBuf,
}

impl FsStore {
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir).with_context(|| format!("creating {}", dir.display()))?;
        debug!("Opened store at {}", dir.display());
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{}.json", key))
    }
}

#[async_trait]
impl KvStore for FsStore {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        match tokio::fs::read(self.path(key)).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e).with_context(|| format!("reading cache entry {}", key)),
        }
    }

    async fn put(&self, key: &str, value: &[u8]) -> Result<()> {
        let path = self.path(key);
        let value = value.to_vec();
        tokio::task::spawn_blocking(move || write_atomic(&path, &value))
            .await
            .context("cache writer panicked")?
    }

    async fn contains(&self, key: &str) -> Result<bool> {
        tokio::fs::try_exists(self.path(key))
            .await
            .with_context(|| format!("checking cache entry {}", key))
    }
}

/// In-memory store, used for dry runs and tests
#[derive(Default)]
pub struct MemoryStore {
    entries: DashMap<String, Vec<u8>>,
    puts: AtomicUsize,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Number of writes performed, including overwrites
    pub fn puts(&self) -> usize {
        self.puts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl KvStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        Ok(self.entries.get(key).map(|v| v.value().clone()))
    }

    async fn put(&self, key: &str, value: &[u8]) -> Result<()> {
        self.puts.fetch_add(1, Ordering::SeqCst);
        self.entries.insert(key.to_string(), value.to_vec());
        Ok(())
    }
}

fn digest(fields: &[&str]) -> String {
    Fingerprint::of_fields(fields.iter().copied()).0
}

/// Identity of one model request
#[derive(Debug, Clone, PartialEq)]
pub struct ResponseKey<'a> {
    pub fingerprint: &'a Fingerprint,
    pub model: &'a str,
    pub params: SamplingParams,
    pub round: u32,
    /// Hash of the diagnostics fed back in this round; empty for round 0
    pub feedback: String,
}

impl ResponseKey<'_> {
    pub fn digest(&self) -> String {
        let round = self.round.to_string();
        digest(&[
            "response",
            self.fingerprint.as_str(),
            self.model,
            &self.params.key(),
            &round,
            &self.feedback,
        ])
    }
}

/// Identity of one final verification result
#[derive(Debug, Clone, PartialEq)]
pub struct ResultKey<'a> {
    pub fingerprint: &'a Fingerprint,
    pub model: &'a str,
    pub params: SamplingParams,
}

impl ResultKey<'_> {
    pub fn digest(&self) -> String {
        digest(&["result", self.fingerprint.as_str(), self.model, &self.params.key()])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn print() -> Fingerprint {
        Fingerprint::of_fields(["demo"])
    }

    #[tokio::test]
    async fn test_fs_store_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsStore::open(dir.path().join("results")).unwrap();
        assert!(store.get("k").await.unwrap().is_none());
        assert!(!store.contains("k").await.unwrap());

        store.put("k", b"{\"a\":1}").await.unwrap();
        store.put("k", b"{\"a\":2}").await.unwrap();
        assert_eq!(store.get("k").await.unwrap().unwrap(), b"{\"a\":2}");
        assert!(store.contains("k").await.unwrap());

        // no temporary files left behind
        let names: Vec<_> = std::fs::read_dir(store.dir())
            .unwrap()
            .map(|e| e.unwrap().file_name())
            .collect();
        assert_eq!(names, vec![std::ffi::OsString::from("k.json")]);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_unreadable_store_is_an_error_not_a_miss() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("results");
        let store = FsStore::open(&root).unwrap();
        std::fs::remove_dir(&root).unwrap();
        std::fs::write(&root, b"not a directory").unwrap();

        assert!(store.contains("k").await.is_err());
        assert!(store.get("k").await.is_err());
    }

    #[tokio::test]
    async fn test_corrupt_entry_reads_as_missing() {
        let store = MemoryStore::new();
        store.put("k", b"not json").await.unwrap();
        let value: Option<u32> = get_json(&store, "k").await.unwrap();
        assert!(value.is_none());

        put_json(&store, "k", &7u32).await.unwrap();
        let value: Option<u32> = get_json(&store, "k").await.unwrap();
        assert_eq!(value, Some(7));
        assert_eq!(store.puts(), 2);
    }

    #[test]
    fn test_keys_separate_every_field() {
        let fp = print();
        let base = ResponseKey {
            fingerprint: &fp,
            model: "gpt-4o",
            params: SamplingParams::default(),
            round: 0,
            feedback: String::new(),
        };
        let mut other_round = base.clone();
        other_round.round = 1;
        let mut other_params = base.clone();
        other_params.params.temperature = 0.7;
        let mut other_model = base.clone();
        other_model.model = "o4-mini";

        let digests = [
            base.digest(),
            other_round.digest(),
            other_params.digest(),
            other_model.digest(),
        ];
        for (i, a) in digests.iter().enumerate() {
            for b in &digests[i + 1..] {
                assert_ne!(a, b);
            }
        }
        assert_eq!(base.digest(), base.clone().digest());

        let result = ResultKey {
            fingerprint: &fp,
            model: "gpt-4o",
            params: SamplingParams::default(),
        };
        assert_ne!(result.digest(), base.digest());
    }
}
