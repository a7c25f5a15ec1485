//! Research cache: an injected key-value store plus similarity lookup.
//!
//! Concurrency contract: one store instance serializes its own writers
//! behind a mutex, so runs sharing an `Arc` never interleave a write.
//! Separate processes pointed at the same file are last-writer-wins;
//! each write replaces the whole document atomically (temp file + rename),
//! so a reader never sees a torn file.

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::Mutex;
use serde_json::Value;

use crate::error::Result;
use crate::model::SearchResult;

pub trait CacheStore: Send + Sync {
    fn get(&self, key: &str) -> Option<Value>;
    fn put(&self, key: &str, value: Value) -> Result<()>;
    fn keys(&self) -> Vec<String>;
}

// ── In-memory ──────────────────────────────────────────────────────────

#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<BTreeMap<String, Value>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl CacheStore for MemoryStore {
    fn get(&self, key: &str) -> Option<Value> {
        self.entries.lock().get(key).cloned()
    }

    fn put(&self, key: &str, value: Value) -> Result<()> {
        self.entries.lock().insert(key.to_string(), value);
        Ok(())
    }

    fn keys(&self) -> Vec<String> {
        self.entries.lock().keys().cloned().collect()
    }
}

// ── JSON file ──────────────────────────────────────────────────────────

/// A single JSON object mapping key → value, kept in memory and written through.
#[derive(Debug)]
pub struct JsonFileStore {
    path: PathBuf,
    entries: Mutex<BTreeMap<String, Value>>,
}

impl JsonFileStore {
    /// Open the document at `path`. Missing or corrupt files start empty.
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let entries = read_json_or_default::<BTreeMap<String, Value>>(&path);
        Self {
            path,
            entries: Mutex::new(entries),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl CacheStore for JsonFileStore {
    fn get(&self, key: &str) -> Option<Value> {
        self.entries.lock().get(key).cloned()
    }

    fn put(&self, key: &str, value: Value) -> Result<()> {
        let mut entries = self.entries.lock();
        entries.insert(key.to_string(), value);
        let bytes = serde_json::to_vec_pretty(&*entries)?;
        write_atomic(&self.path, &bytes)
    }

    fn keys(&self) -> Vec<String> {
        self.entries.lock().keys().cloned().collect()
    }
}

/// Read a JSON document, treating absence or corruption as empty.
pub(crate) fn read_json_or_default<T: serde::de::DeserializeOwned + Default>(path: &Path) -> T {
    match std::fs::read(path) {
        Ok(bytes) => match serde_json::from_slice(&bytes) {
            Ok(v) => v,
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "Corrupt JSON document, starting empty");
                T::default()
            }
        },
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => T::default(),
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "Unreadable JSON document, starting empty");
            T::default()
        }
    }
}

pub(crate) fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent)?;
    }
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(format!(".tmp-{}", std::process::id()));
    let tmp = PathBuf::from(tmp);
    std::fs::write(&tmp, bytes)?;
    std::fs::rename(&tmp, path)?;
    Ok(())
}

// ── Similarity ─────────────────────────────────────────────────────────

/// Lowercased alphanumeric tokens of a query or keyword list.
pub fn keyword_set<S: AsRef<str>>(words: &[S]) -> BTreeSet<String> {
    words
        .iter()
        .flat_map(|w| {
            w.as_ref()
                .split(|c: char| !c.is_alphanumeric())
                .filter(|t| !t.is_empty())
                .map(str::to_lowercase)
                .collect::<Vec<_>>()
        })
        .collect()
}

/// |a ∩ b| / |a ∪ b|; two empty sets are dissimilar.
pub fn jaccard(a: &BTreeSet<String>, b: &BTreeSet<String>) -> f64 {
    let union = a.union(b).count();
    if union == 0 {
        return 0.0;
    }
    a.intersection(b).count() as f64 / union as f64
}

/// Typed view over a [`CacheStore`] holding ranked result lists by query.
#[derive(Clone)]
pub struct ResearchCache {
    store: Arc<dyn CacheStore>,
    threshold: f64,
}

impl ResearchCache {
    pub fn new(store: Arc<dyn CacheStore>, threshold: f64) -> Self {
        Self { store, threshold }
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    /// Best cached entry whose keyword set is similar enough to `keywords`.
    pub fn lookup(&self, keywords: &[String]) -> Option<CacheHit> {
        let wanted = keyword_set(keywords);
        let mut best: Option<(f64, String)> = None;
        for key in self.store.keys() {
            let score = jaccard(&wanted, &keyword_set(&[key.as_str()]));
            if score > self.threshold && best.as_ref().is_none_or(|(b, _)| score > *b) {
                best = Some((score, key));
            }
        }
        let (similarity, key) = best?;
        let value = self.store.get(&key)?;
        match serde_json::from_value::<Vec<SearchResult>>(value) {
            Ok(results) if !results.is_empty() => Some(CacheHit {
                key,
                similarity,
                results,
            }),
            Ok(_) => None,
            Err(e) => {
                tracing::warn!(key = %key, error = %e, "Discarding malformed cache entry");
                None
            }
        }
    }

    pub fn store(&self, query: &str, results: &[SearchResult]) -> Result<()> {
        self.store.put(query, serde_json::to_value(results)?)
    }
}

#[derive(Debug, Clone)]
pub struct CacheHit {
    pub key: String,
    pub similarity: f64,
    pub results: Vec<SearchResult>,
}
