//! `localStorage` over a [`JsonStore`]
//!
//! The document is a flat JSON object of string keys to string values, kept
//! in insertion order so `key(index)` enumerates predictably within a
//! process. The order after a reload follows the file and is not a contract.

use crate::error::StorageResult;
use crate::store::{JsonStore, LoadState};
use indexmap::IndexMap;
use std::path::{Path, PathBuf};
use tracing::debug;

/// On-disk shape of a key-value store
pub type KvDocument = IndexMap<String, String>;

/// Web Storage style key-value store
#[derive(Debug)]
pub struct LocalStorage {
    store: JsonStore<KvDocument>,
}

impl LocalStorage {
    /// Open the store at `path`, loading it and writing an empty document if
    /// the file does not exist yet.
    pub async fn open(path: impl Into<PathBuf>) -> StorageResult<Self> {
        let store = JsonStore::new(path);
        store.ensure_loaded().await?;
        if !store.exists().await? {
            store.persist().await?;
            debug!(path = %store.path().display(), "created localStorage file");
        }
        Ok(Self { store })
    }

    /// Backing file path
    pub fn path(&self) -> &Path {
        self.store.path()
    }

    /// Load state of the underlying store
    pub fn state(&self) -> LoadState {
        self.store.state()
    }

    /// Get the value stored under `key`
    pub async fn get_item(&self, key: &str) -> StorageResult<Option<String>> {
        self.store.read(|doc| doc.get(key).cloned()).await
    }

    /// Store `value` under `key`. Returns once the file has been rewritten.
    pub async fn set_item(&self, key: &str, value: &str) -> StorageResult<()> {
        self.store
            .update(|doc| {
                let changed = doc.get(key).map(String::as_str) != Some(value);
                if changed {
                    doc.insert(key.to_string(), value.to_string());
                }
                ((), changed)
            })
            .await
    }

    /// Remove `key`; missing keys are a no-op
    pub async fn remove_item(&self, key: &str) -> StorageResult<()> {
        self.store
            .update(|doc| {
                let removed = doc.shift_remove(key).is_some();
                ((), removed)
            })
            .await
    }

    /// Remove every key
    pub async fn clear(&self) -> StorageResult<()> {
        self.store
            .update(|doc| {
                let changed = !doc.is_empty();
                doc.clear();
                ((), changed)
            })
            .await
    }

    /// Key at zero-based `index` in enumeration order
    pub async fn key(&self, index: usize) -> StorageResult<Option<String>> {
        self.store
            .read(|doc| doc.get_index(index).map(|(k, _)| k.clone()))
            .await
    }

    /// Number of stored keys
    pub async fn length(&self) -> StorageResult<usize> {
        self.store.read(|doc| doc.len()).await
    }

    /// All keys in enumeration order
    pub async fn keys(&self) -> StorageResult<Vec<String>> {
        self.store.read(|doc| doc.keys().cloned().collect()).await
    }

    /// Check if a key exists
    pub async fn has_item(&self, key: &str) -> StorageResult<bool> {
        self.store.read(|doc| doc.contains_key(key)).await
    }
}
