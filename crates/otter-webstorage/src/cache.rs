//! `caches` (CacheStorage) over [`JsonStore`]
//!
//! Every named cache is its own JSON file under the namespace directory:
//!
//! ```text
//! <cache dir>/<cache subsystem>/<namespace id>/<cache name>.json
//! { "entries": { "<url>": { "requestMeta": .., "responseMeta": .., "bodyEncoded": ".." } } }
//! ```
//!
//! Entries are keyed by URL only. Two requests for the same URL with
//! different methods share one slot; the later `put` wins.

use crate::error::{StorageError, StorageResult};
use crate::fetch::Fetcher;
use crate::request::{Headers, Request, RequestInfo, Response};
use crate::store::JsonStore;
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use indexmap::IndexMap;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

const CACHE_FILE_EXT: &str = "json";

/// Stored request metadata
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestMeta {
    pub url: String,
    pub method: String,
    #[serde(default)]
    pub headers: Headers,
}

/// Stored response metadata
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResponseMeta {
    pub status: u16,
    #[serde(default)]
    pub status_text: String,
    #[serde(default)]
    pub headers: Headers,
}

/// One cached request/response pair
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntryRecord {
    pub request_meta: RequestMeta,
    pub response_meta: ResponseMeta,
    /// Standard base64 of the full body
    pub body_encoded: String,
}

impl EntryRecord {
    fn capture(request: Request, response: &Response) -> Self {
        Self {
            request_meta: RequestMeta {
                url: request.url,
                method: request.method,
                headers: request.headers,
            },
            response_meta: ResponseMeta {
                status: response.status,
                status_text: response.status_text.clone(),
                headers: response.headers.clone(),
            },
            body_encoded: BASE64.encode(&response.body),
        }
    }

    fn to_request(&self) -> Request {
        Request {
            url: self.request_meta.url.clone(),
            method: self.request_meta.method.clone(),
            headers: self.request_meta.headers.clone(),
        }
    }

    fn to_response(&self) -> StorageResult<Response> {
        let body = BASE64
            .decode(&self.body_encoded)
            .map_err(|e| StorageError::InvalidBody {
                url: self.request_meta.url.clone(),
                message: e.to_string(),
            })?;
        Ok(Response {
            status: self.response_meta.status,
            status_text: self.response_meta.status_text.clone(),
            headers: self.response_meta.headers.clone(),
            body: body.into(),
        })
    }
}

/// On-disk shape of one named cache
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CacheDocument {
    #[serde(default)]
    pub entries: IndexMap<String, EntryRecord>,
}

/// One named cache
pub struct Cache {
    name: String,
    store: JsonStore<CacheDocument>,
    fetcher: Arc<dyn Fetcher>,
}

impl Cache {
    fn new(name: &str, path: PathBuf, fetcher: Arc<dyn Fetcher>) -> Self {
        Self {
            name: name.to_string(),
            store: JsonStore::new(path),
            fetcher,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Backing file path
    pub fn path(&self) -> &Path {
        self.store.path()
    }

    /// Store `response` for `request`, replacing any entry with the same URL.
    ///
    /// The response is already fully buffered, so the stored body is a
    /// snapshot taken now.
    pub async fn put(
        &self,
        request: impl Into<RequestInfo>,
        response: Response,
    ) -> StorageResult<()> {
        let request = request.into().into_request();
        let url = request.url.clone();
        let record = EntryRecord::capture(request, &response);
        self.store
            .mutate(|doc| doc.entries.insert(url.clone(), record))
            .await?;
        debug!(cache = %self.name, url = %url, status = response.status, "cache put");
        Ok(())
    }

    /// Look up the entry for the request's URL
    pub async fn match_request(
        &self,
        request: impl Into<RequestInfo>,
    ) -> StorageResult<Option<Response>> {
        let request = request.into();
        let record = self
            .store
            .read(|doc| doc.entries.get(request.url()).cloned())
            .await?;
        record.map(|r| r.to_response()).transpose()
    }

    /// Remove the entry for the request's URL; false if there was none
    pub async fn delete(&self, request: impl Into<RequestInfo>) -> StorageResult<bool> {
        let request = request.into();
        self.store
            .update(|doc| {
                let removed = doc.entries.shift_remove(request.url()).is_some();
                (removed, removed)
            })
            .await
    }

    /// Requests of all stored entries, in insertion order
    pub async fn keys(&self) -> StorageResult<Vec<Request>> {
        self.store
            .read(|doc| doc.entries.values().map(EntryRecord::to_request).collect())
            .await
    }

    /// Fetch `request` and store the response
    pub async fn add(&self, request: impl Into<RequestInfo>) -> StorageResult<()> {
        let request = request.into().into_request();
        let response = self.fetcher.fetch(&request).await?;
        if !response.ok() {
            return Err(StorageError::Fetch {
                url: request.url,
                status: response.status,
            });
        }
        self.put(request, response).await
    }

    /// Fetch and store each request in order.
    ///
    /// Stops at the first failure; entries stored before it are kept.
    pub async fn add_all<I>(&self, requests: I) -> StorageResult<()>
    where
        I: IntoIterator,
        I::Item: Into<RequestInfo>,
    {
        for request in requests {
            self.add(request).await?;
        }
        Ok(())
    }
}

impl std::fmt::Debug for Cache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Cache")
            .field("name", &self.name)
            .field("store", &self.store)
            .finish()
    }
}

/// Directory of named caches for one namespace
pub struct CacheStorage {
    dir: PathBuf,
    fetcher: Arc<dyn Fetcher>,
    open: Mutex<HashMap<String, Arc<Cache>>>,
}

impl CacheStorage {
    /// Caches live under `dir`. Nothing is touched until a cache is opened.
    pub fn new(dir: impl Into<PathBuf>, fetcher: Arc<dyn Fetcher>) -> Self {
        Self {
            dir: dir.into(),
            fetcher,
            open: Mutex::new(HashMap::new()),
        }
    }

    /// Namespace directory
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn cache_path(&self, name: &str) -> PathBuf {
        self.dir.join(format!("{}.{}", name, CACHE_FILE_EXT))
    }

    /// Open (or create) the cache called `name`.
    ///
    /// Repeated opens return the same handle. A new cache's file is written
    /// right away so [`CacheStorage::has`] reports it.
    pub async fn open(&self, name: &str) -> StorageResult<Arc<Cache>> {
        validate_cache_name(name)?;

        let cache = {
            let mut open = self.open.lock();
            open.entry(name.to_string())
                .or_insert_with(|| {
                    Arc::new(Cache::new(
                        name,
                        self.cache_path(name),
                        Arc::clone(&self.fetcher),
                    ))
                })
                .clone()
        };

        cache.store.ensure_loaded().await?;
        if !cache.store.exists().await? {
            cache.store.persist().await?;
            debug!(cache = %name, path = %cache.path().display(), "created cache file");
        }
        Ok(cache)
    }

    /// Check whether a cache file exists, without loading it
    pub async fn has(&self, name: &str) -> StorageResult<bool> {
        if validate_cache_name(name).is_err() {
            return Ok(false);
        }
        let path = self.cache_path(name);
        tokio::fs::try_exists(&path)
            .await
            .map_err(|e| StorageError::io(&path, e))
    }

    /// Delete the cache called `name`, both the open handle and its file.
    ///
    /// Returns true if either existed. Handles obtained earlier keep working
    /// and recreate the file on their next write.
    pub async fn delete(&self, name: &str) -> StorageResult<bool> {
        if validate_cache_name(name).is_err() {
            return Ok(false);
        }
        let was_open = self.open.lock().remove(name).is_some();

        let path = self.cache_path(name);
        let existed = match tokio::fs::remove_file(&path).await {
            Ok(()) => true,
            Err(e) if e.kind() == ErrorKind::NotFound => false,
            Err(e) => return Err(StorageError::io(&path, e)),
        };

        if was_open || existed {
            info!(cache = %name, "cache deleted");
        }
        Ok(was_open || existed)
    }

    /// Names of all caches, sorted
    pub async fn keys(&self) -> StorageResult<Vec<String>> {
        let mut names: BTreeSet<String> = self.open.lock().keys().cloned().collect();

        let mut entries = match tokio::fs::read_dir(&self.dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(names.into_iter().collect()),
            Err(e) => return Err(StorageError::io(&self.dir, e)),
        };
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| StorageError::io(&self.dir, e))?
        {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some(CACHE_FILE_EXT) {
                continue;
            }
            if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                names.insert(stem.to_string());
            }
        }

        Ok(names.into_iter().collect())
    }

    /// Look the request up in every cache, in name order
    pub async fn match_request(
        &self,
        request: impl Into<RequestInfo>,
    ) -> StorageResult<Option<Response>> {
        let request = request.into();
        for name in self.keys().await? {
            if validate_cache_name(&name).is_err() {
                continue;
            }
            let cache = self.open(&name).await?;
            if let Some(response) = cache.match_request(request.clone()).await? {
                return Ok(Some(response));
            }
        }
        Ok(None)
    }
}

impl std::fmt::Debug for CacheStorage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheStorage")
            .field("dir", &self.dir)
            .field("open", &self.open.lock().len())
            .finish()
    }
}

/// Cache names become file names.
fn validate_cache_name(name: &str) -> StorageResult<()> {
    let invalid = name.is_empty()
        || name == "."
        || name == ".."
        || name.contains(['/', '\\', ':', '\0']);
    if invalid {
        return Err(StorageError::InvalidCacheName(name.to_string()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;

    struct NoNetwork;

    #[async_trait]
    impl Fetcher for NoNetwork {
        async fn fetch(&self, request: &Request) -> StorageResult<Response> {
            Err(StorageError::Http(format!("offline: {}", request.url)))
        }
    }

    fn storage(dir: &Path) -> CacheStorage {
        CacheStorage::new(dir.join("ns"), Arc::new(NoNetwork))
    }

    #[tokio::test]
    async fn test_put_and_match() {
        let dir = tempfile::tempdir().unwrap();
        let caches = storage(dir.path());
        let cache = caches.open("c1").await.unwrap();

        cache
            .put(
                Request::new("https://x/a"),
                Response::new("hello").header("Content-Type", "text/plain"),
            )
            .await
            .unwrap();

        let hit = cache.match_request("https://x/a").await.unwrap().unwrap();
        assert_eq!(hit.status, 200);
        assert_eq!(hit.text(), "hello");
        assert_eq!(hit.headers.get("Content-Type"), Some("text/plain"));

        assert!(cache.match_request("https://x/b").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_binary_body_survives_reload() {
        let dir = tempfile::tempdir().unwrap();
        let body: Vec<u8> = (0..=255).collect();
        {
            let caches = storage(dir.path());
            let cache = caches.open("bin").await.unwrap();
            cache
                .put("https://x/blob", Response::new(body.clone()))
                .await
                .unwrap();
        }

        let caches = storage(dir.path());
        let cache = caches.open("bin").await.unwrap();
        let hit = cache.match_request("https://x/blob").await.unwrap().unwrap();
        assert_eq!(hit.body.as_ref(), body.as_slice());
    }

    #[tokio::test]
    async fn test_url_only_key_overwrites() {
        let dir = tempfile::tempdir().unwrap();
        let caches = storage(dir.path());
        let cache = caches.open("c").await.unwrap();

        cache
            .put(Request::new("https://x/a"), Response::new("get"))
            .await
            .unwrap();
        cache
            .put(Request::new("https://x/a").method("POST"), Response::new("post"))
            .await
            .unwrap();

        let keys = cache.keys().await.unwrap();
        assert_eq!(keys.len(), 1);
        assert_eq!(keys[0].method, "POST");
        let hit = cache
            .match_request(Request::new("https://x/a"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(hit.text(), "post");
    }

    #[tokio::test]
    async fn test_delete_entry() {
        let dir = tempfile::tempdir().unwrap();
        let caches = storage(dir.path());
        let cache = caches.open("c").await.unwrap();

        cache.put("https://x/a", Response::new("a")).await.unwrap();
        assert!(cache.delete("https://x/a").await.unwrap());
        assert!(cache.match_request("https://x/a").await.unwrap().is_none());
        assert!(!cache.delete("https://x/a").await.unwrap());
    }

    #[tokio::test]
    async fn test_open_returns_same_handle() {
        let dir = tempfile::tempdir().unwrap();
        let caches = storage(dir.path());

        let a = caches.open("same").await.unwrap();
        let b = caches.open("same").await.unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert!(caches.has("same").await.unwrap());
        assert!(!caches.has("other").await.unwrap());
    }

    #[tokio::test]
    async fn test_delete_cache() {
        let dir = tempfile::tempdir().unwrap();
        let caches = storage(dir.path());

        let cache = caches.open("c1").await.unwrap();
        cache.put("https://x/a", Response::new("a")).await.unwrap();
        assert!(caches.has("c1").await.unwrap());

        assert!(caches.delete("c1").await.unwrap());
        assert!(!caches.has("c1").await.unwrap());
        assert!(!caches.delete("c1").await.unwrap());

        let fresh = caches.open("c1").await.unwrap();
        assert!(!Arc::ptr_eq(&cache, &fresh));
        assert!(fresh.keys().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_keys_and_storage_match() {
        let dir = tempfile::tempdir().unwrap();
        let caches = storage(dir.path());
        assert!(caches.keys().await.unwrap().is_empty());

        caches.open("b").await.unwrap();
        let a = caches.open("a").await.unwrap();
        a.put("https://x/in-a", Response::new("from a"))
            .await
            .unwrap();

        assert_eq!(caches.keys().await.unwrap(), vec!["a", "b"]);

        // A fresh directory object only sees files on disk
        let reopened = storage(dir.path());
        assert_eq!(reopened.keys().await.unwrap(), vec!["a", "b"]);
        let hit = reopened
            .match_request("https://x/in-a")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(hit.text(), "from a");
        assert!(reopened.match_request("https://x/none").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_invalid_names() {
        let dir = tempfile::tempdir().unwrap();
        let caches = storage(dir.path());

        for name in ["", ".", "..", "a/b", "a\\b"] {
            assert!(matches!(
                caches.open(name).await,
                Err(StorageError::InvalidCacheName(_))
            ));
            assert!(!caches.has(name).await.unwrap());
        }
    }

    #[tokio::test]
    async fn test_document_shape() {
        let dir = tempfile::tempdir().unwrap();
        let caches = storage(dir.path());
        let cache = caches.open("shape").await.unwrap();
        assert_eq!(
            std::fs::read_to_string(cache.path()).unwrap(),
            r#"{"entries":{}}"#
        );

        cache
            .put(
                Request::new("https://x/a").header("Accept", "text/plain"),
                Response::new("hi").status(201, "Created"),
            )
            .await
            .unwrap();

        let doc: serde_json::Value =
            serde_json::from_slice(&std::fs::read(cache.path()).unwrap()).unwrap();
        let entry = &doc["entries"]["https://x/a"];
        assert_eq!(entry["requestMeta"]["method"], "GET");
        assert_eq!(entry["requestMeta"]["headers"]["accept"], "text/plain");
        assert_eq!(entry["responseMeta"]["status"], 201);
        assert_eq!(entry["responseMeta"]["statusText"], "Created");
        assert_eq!(entry["bodyEncoded"], "aGk=");
    }
}
