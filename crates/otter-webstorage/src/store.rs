//! JSON-file document store
//!
//! A [`JsonStore`] owns exactly one JSON document on disk. It does not touch
//! the filesystem until first used, loads at most once (concurrent callers
//! wait for the in-flight load), and rewrites the whole file before any
//! mutating call returns.
//!
//! Two processes pointed at the same file are not coordinated: whichever
//! writes last wins.

use crate::error::{StorageError, StorageResult};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::io::AsyncWriteExt;
use tokio::sync::{Mutex, OnceCell};
use tracing::{debug, warn};

/// Distinguishes temp files of concurrent writes within one process
static WRITE_SEQ: AtomicU64 = AtomicU64::new(0);

/// Anything that can live in a [`JsonStore`].
pub trait Document: Serialize + DeserializeOwned + Default + Clone + Send + Sync + 'static {}

impl<T> Document for T where
    T: Serialize + DeserializeOwned + Default + Clone + Send + Sync + 'static
{
}

/// Observable load state of a store.
///
/// Loading itself is transient: it only exists inside one `ensure_loaded`
/// call, and other callers await it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadState {
    Unloaded,
    Loaded,
}

/// Store backed by a single JSON file
pub struct JsonStore<D> {
    path: PathBuf,
    doc: OnceCell<Mutex<D>>,
}

impl<D: Document> JsonStore<D> {
    /// Create an unloaded store for `path`. Does no IO.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            doc: OnceCell::new(),
        }
    }

    /// Backing file path
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Current load state
    pub fn state(&self) -> LoadState {
        if self.doc.initialized() {
            LoadState::Loaded
        } else {
            LoadState::Unloaded
        }
    }

    /// Check whether the backing file exists, without loading it
    pub async fn exists(&self) -> StorageResult<bool> {
        tokio::fs::try_exists(&self.path)
            .await
            .map_err(|e| StorageError::io(&self.path, e))
    }

    /// Load the document if it hasn't been loaded yet.
    ///
    /// A missing file yields an empty document. A file that fails to parse is
    /// logged and replaced by an empty document in memory; the broken file is
    /// left alone until the next write overwrites it. Any other read failure
    /// is returned and the store stays unloaded.
    pub async fn ensure_loaded(&self) -> StorageResult<()> {
        self.cell().await.map(|_| ())
    }

    async fn cell(&self) -> StorageResult<&Mutex<D>> {
        self.doc
            .get_or_try_init(|| async { load_document::<D>(&self.path).await.map(Mutex::new) })
            .await
    }

    /// Run `f` against the loaded document.
    pub async fn read<R>(&self, f: impl FnOnce(&D) -> R) -> StorageResult<R> {
        let doc = self.cell().await?.lock().await;
        Ok(f(&*doc))
    }

    /// Apply `f` to the document and persist it before returning.
    pub async fn mutate<R>(&self, f: impl FnOnce(&mut D) -> R) -> StorageResult<R> {
        self.update(|doc| (f(doc), true)).await
    }

    /// Apply `f`, persisting only when it reports a change.
    ///
    /// `f` works on a copy that replaces the in-memory document only after
    /// the write succeeds, so a failed write leaves memory matching disk.
    /// The lock is held across the write, so writes land in the order they
    /// were issued.
    pub async fn update<R>(&self, f: impl FnOnce(&mut D) -> (R, bool)) -> StorageResult<R> {
        let mut doc = self.cell().await?.lock().await;
        let mut next = doc.clone();
        let (result, changed) = f(&mut next);
        if changed {
            write_document(&self.path, &next).await?;
            *doc = next;
        }
        Ok(result)
    }

    /// Write the current document to disk unconditionally.
    pub async fn persist(&self) -> StorageResult<()> {
        let doc = self.cell().await?.lock().await;
        write_document(&self.path, &*doc).await
    }
}

impl<D> std::fmt::Debug for JsonStore<D> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JsonStore")
            .field("path", &self.path)
            .field("loaded", &self.doc.initialized())
            .finish()
    }
}

async fn load_document<D: Document>(path: &Path) -> StorageResult<D> {
    let bytes = match tokio::fs::read(path).await {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == ErrorKind::NotFound => {
            debug!(path = %path.display(), "store file missing, starting empty");
            return Ok(D::default());
        }
        Err(e) => return Err(StorageError::io(path, e)),
    };

    match serde_json::from_slice(&bytes) {
        Ok(doc) => {
            debug!(path = %path.display(), bytes = bytes.len(), "store loaded");
            Ok(doc)
        }
        Err(err) => {
            warn!(
                path = %path.display(),
                error = %err,
                "store file is corrupt, starting with an empty document"
            );
            Ok(D::default())
        }
    }
}

/// Serialize `doc` and atomically replace the file at `path`.
async fn write_document<D: Serialize>(path: &Path, doc: &D) -> StorageResult<()> {
    let data = serde_json::to_vec(doc)?;

    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| StorageError::io(parent, e))?;
    }

    let mut temp_name = path.file_name().unwrap_or_default().to_os_string();
    temp_name.push(format!(
        ".tmp.{}.{}",
        std::process::id(),
        WRITE_SEQ.fetch_add(1, Ordering::Relaxed)
    ));
    let temp_path = path.with_file_name(temp_name);

    let mut file = tokio::fs::File::create(&temp_path)
        .await
        .map_err(|e| StorageError::io(&temp_path, e))?;
    file.write_all(&data)
        .await
        .map_err(|e| StorageError::io(&temp_path, e))?;
    file.sync_all()
        .await
        .map_err(|e| StorageError::io(&temp_path, e))?;
    drop(file);

    if let Err(e) = tokio::fs::rename(&temp_path, path).await {
        let _ = tokio::fs::remove_file(&temp_path).await;
        return Err(StorageError::io(path, e));
    }

    debug!(path = %path.display(), bytes = data.len(), "store persisted");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use indexmap::IndexMap;
    use std::sync::Arc;

    type Doc = IndexMap<String, String>;

    #[tokio::test]
    async fn test_lazy_until_first_write() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("store.json");
        let store: JsonStore<Doc> = JsonStore::new(&path);

        assert_eq!(store.state(), LoadState::Unloaded);
        store.ensure_loaded().await.unwrap();
        assert_eq!(store.state(), LoadState::Loaded);
        assert!(!path.exists());
        assert!(!path.parent().unwrap().exists());

        store
            .mutate(|doc| doc.insert("a".into(), "1".into()))
            .await
            .unwrap();
        assert!(path.exists());
    }

    #[tokio::test]
    async fn test_mutation_visible_to_new_instance() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("store.json");

        let store: JsonStore<Doc> = JsonStore::new(&path);
        store
            .mutate(|doc| doc.insert("k".into(), "v".into()))
            .await
            .unwrap();

        let reopened: JsonStore<Doc> = JsonStore::new(&path);
        let value = reopened.read(|doc| doc.get("k").cloned()).await.unwrap();
        assert_eq!(value.as_deref(), Some("v"));
    }

    #[tokio::test]
    async fn test_update_without_change_does_not_write() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("store.json");
        let store: JsonStore<Doc> = JsonStore::new(&path);

        let removed = store
            .update(|doc| {
                let removed = doc.shift_remove("missing").is_some();
                (removed, removed)
            })
            .await
            .unwrap();
        assert!(!removed);
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn test_corrupt_file_starts_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("store.json");
        std::fs::write(&path, b"{\"a\": \"1\", ").unwrap();

        let store: JsonStore<Doc> = JsonStore::new(&path);
        let len = store.read(|doc| doc.len()).await.unwrap();
        assert_eq!(len, 0);
        // Left untouched until the next write
        assert_eq!(std::fs::read(&path).unwrap(), b"{\"a\": \"1\", ");

        store
            .mutate(|doc| doc.insert("b".into(), "2".into()))
            .await
            .unwrap();
        let on_disk: Doc = serde_json::from_slice(&std::fs::read(&path).unwrap()).unwrap();
        assert_eq!(on_disk.len(), 1);
        assert_eq!(on_disk["b"], "2");
    }

    #[tokio::test]
    async fn test_read_error_propagates() {
        let dir = tempfile::tempdir().unwrap();
        // A directory where the file should be
        let path = dir.path().join("store.json");
        std::fs::create_dir(&path).unwrap();

        let store: JsonStore<Doc> = JsonStore::new(&path);
        let err = store.ensure_loaded().await.unwrap_err();
        assert!(matches!(err, StorageError::Io { .. }));
        assert_eq!(store.state(), LoadState::Unloaded);
    }

    #[tokio::test]
    async fn test_write_error_propagates() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("not-a-dir");
        std::fs::write(&blocker, b"").unwrap();

        let store: JsonStore<Doc> = JsonStore::new(blocker.join("store.json"));
        let err = store
            .mutate(|doc| doc.insert("k".into(), "v".into()))
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::Io { .. }));
    }

    #[tokio::test]
    async fn test_concurrent_loads_share_one_document() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("store.json");
        std::fs::write(&path, br#"{"x":"1"}"#).unwrap();

        let store: Arc<JsonStore<Doc>> = Arc::new(JsonStore::new(&path));
        let (a, b) = tokio::join!(store.ensure_loaded(), store.ensure_loaded());
        a.unwrap();
        b.unwrap();

        store
            .mutate(|doc| doc.insert("y".into(), "2".into()))
            .await
            .unwrap();
        let keys = store
            .read(|doc| doc.keys().cloned().collect::<Vec<_>>())
            .await
            .unwrap();
        assert_eq!(keys, vec!["x", "y"]);
    }

    #[tokio::test]
    async fn test_failed_write_leaves_document_unchanged() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("store.json");
        let store: JsonStore<Doc> = JsonStore::new(&path);
        store.ensure_loaded().await.unwrap();

        // A directory at the target makes the final rename fail
        std::fs::create_dir(&path).unwrap();
        let err = store
            .mutate(|doc| doc.insert("a".into(), "1".into()))
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::Io { .. }));
        assert_eq!(store.read(|doc| doc.get("a").cloned()).await.unwrap(), None);

        // Retrying the same change after the obstacle is gone must write it
        std::fs::remove_dir(&path).unwrap();
        store
            .update(|doc| {
                let changed = doc.get("a").map(String::as_str) != Some("1");
                if changed {
                    doc.insert("a".into(), "1".into());
                }
                ((), changed)
            })
            .await
            .unwrap();

        let fresh: JsonStore<Doc> = JsonStore::new(&path);
        let value = fresh.read(|doc| doc.get("a").cloned()).await.unwrap();
        assert_eq!(value.as_deref(), Some("1"));
    }

    #[tokio::test]
    async fn test_two_instances_same_file_do_not_share_temp_files() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("store.json");
        let first: JsonStore<Doc> = JsonStore::new(&path);
        let second: JsonStore<Doc> = JsonStore::new(&path);

        async fn write_many(store: &JsonStore<Doc>, prefix: &str) -> StorageResult<()> {
            for i in 0..20 {
                store
                    .mutate(|doc| doc.insert(format!("{prefix}{i}"), i.to_string()))
                    .await?;
            }
            Ok(())
        }

        let (a, b) = tokio::join!(write_many(&first, "a"), write_many(&second, "b"));
        a.unwrap();
        b.unwrap();

        // Each instance writes its whole document, so the last writer wins
        let on_disk: Doc = serde_json::from_slice(&std::fs::read(&path).unwrap()).unwrap();
        assert_eq!(on_disk.len(), 20);
        let leftovers = std::fs::read_dir(dir.path()).unwrap().count();
        assert_eq!(leftovers, 1);
    }
}
