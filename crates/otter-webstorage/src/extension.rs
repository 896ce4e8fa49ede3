//! Shim setup
//!
//! Single composition root for the storage shims: resolves where data
//! lives, derives the namespace, and builds the `localStorage` and `caches`
//! objects. Every entry point is a successful no-op outside a standalone
//! executable, so hosts can call it unconditionally.

use crate::cache::CacheStorage;
use crate::cache_dir::{EnvSource, OsFamily, ProcessEnv, resolve_cache_dir};
use crate::config::StorageConfig;
use crate::error::{StorageError, StorageResult};
use crate::fetch::{Fetcher, HttpFetcher};
use crate::local_storage::LocalStorage;
use crate::namespace::namespace_id;
use crate::standalone::{EmbeddedPathDetector, ModeDetector};
use once_cell::sync::OnceCell;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Process-wide installed shims
static INSTALLED: OnceCell<Arc<WebStorage>> = OnceCell::new();

/// Where one application's data lives
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageLayout {
    pub base_dir: PathBuf,
    pub namespace: String,
    kv_subsystem: String,
    cache_subsystem: String,
}

impl StorageLayout {
    /// Resolve the layout for `config`. Fails if no base directory is known.
    pub fn resolve(config: &StorageConfig, env: &dyn EnvSource) -> StorageResult<Self> {
        config.validate()?;
        let base_dir = match &config.base_dir {
            Some(dir) => dir.clone(),
            None => resolve_cache_dir(OsFamily::current(), env).ok_or_else(|| {
                StorageError::config(
                    "cannot determine a cache directory: set XDG_CACHE_HOME or HOME \
                     (LOCALAPPDATA or APPDATA on Windows)",
                )
            })?,
        };

        Ok(Self {
            base_dir,
            namespace: namespace_id(&config.identity),
            kv_subsystem: config.kv_subsystem.clone(),
            cache_subsystem: config.cache_subsystem.clone(),
        })
    }

    /// `<base>/<kv subsystem>/<namespace>.json`
    pub fn local_storage_path(&self) -> PathBuf {
        self.base_dir
            .join(&self.kv_subsystem)
            .join(format!("{}.json", self.namespace))
    }

    /// `<base>/<cache subsystem>/<namespace>`
    pub fn cache_dir(&self) -> PathBuf {
        self.base_dir.join(&self.cache_subsystem).join(&self.namespace)
    }
}

/// Set up `localStorage` alone. `None` outside a standalone executable.
pub async fn setup_local_storage(
    config: &StorageConfig,
    mode: &dyn ModeDetector,
    env: &dyn EnvSource,
) -> StorageResult<Option<LocalStorage>> {
    if !mode.is_running_embedded() {
        debug!("not running embedded, localStorage shim disabled");
        return Ok(None);
    }
    let layout = StorageLayout::resolve(config, env)?;
    open_local_storage(&layout).await.map(Some)
}

/// Set up `caches` alone. `None` outside a standalone executable.
pub async fn setup_cache_storage(
    config: &StorageConfig,
    mode: &dyn ModeDetector,
    env: &dyn EnvSource,
    fetcher: Arc<dyn Fetcher>,
) -> StorageResult<Option<CacheStorage>> {
    if !mode.is_running_embedded() {
        debug!("not running embedded, CacheStorage shim disabled");
        return Ok(None);
    }
    let layout = StorageLayout::resolve(config, env)?;
    open_cache_storage(&layout, fetcher).await.map(Some)
}

async fn open_local_storage(layout: &StorageLayout) -> StorageResult<LocalStorage> {
    let storage = LocalStorage::open(layout.local_storage_path()).await?;
    info!(
        namespace = %layout.namespace,
        path = %storage.path().display(),
        "localStorage ready"
    );
    Ok(storage)
}

async fn open_cache_storage(
    layout: &StorageLayout,
    fetcher: Arc<dyn Fetcher>,
) -> StorageResult<CacheStorage> {
    let dir = layout.cache_dir();
    tokio::fs::create_dir_all(&dir)
        .await
        .map_err(|e| StorageError::io(&dir, e))?;
    info!(namespace = %layout.namespace, dir = %dir.display(), "CacheStorage ready");
    Ok(CacheStorage::new(dir, fetcher))
}

/// Both shims for one application
#[derive(Debug)]
pub struct WebStorage {
    layout: StorageLayout,
    local_storage: LocalStorage,
    caches: CacheStorage,
}

impl WebStorage {
    /// Build both shims. `None` outside a standalone executable, in which
    /// case nothing on disk is read or written.
    pub async fn setup(
        config: &StorageConfig,
        mode: &dyn ModeDetector,
        env: &dyn EnvSource,
        fetcher: Arc<dyn Fetcher>,
    ) -> StorageResult<Option<Self>> {
        if !mode.is_running_embedded() {
            debug!("not running embedded, storage shims disabled");
            return Ok(None);
        }

        let layout = StorageLayout::resolve(config, env)?;
        let local_storage = open_local_storage(&layout).await?;
        let caches = open_cache_storage(&layout, fetcher).await?;

        Ok(Some(Self {
            layout,
            local_storage,
            caches,
        }))
    }

    /// [`WebStorage::setup`] with the process environment, a reqwest-backed
    /// fetcher, and standalone detection that matches the configured identity
    /// against `config.embedded_roots`.
    pub async fn setup_default(config: &StorageConfig) -> StorageResult<Option<Self>> {
        let mode = EmbeddedPathDetector::new(config.identity.clone(), &config.embedded_roots);
        if !mode.is_running_embedded() {
            return Ok(None);
        }
        let fetcher: Arc<dyn Fetcher> = Arc::new(HttpFetcher::new()?);
        Self::setup(config, &mode, &ProcessEnv, fetcher).await
    }

    pub fn local_storage(&self) -> &LocalStorage {
        &self.local_storage
    }

    pub fn caches(&self) -> &CacheStorage {
        &self.caches
    }

    pub fn namespace(&self) -> &str {
        &self.layout.namespace
    }

    pub fn base_dir(&self) -> &Path {
        &self.layout.base_dir
    }

    pub fn layout(&self) -> &StorageLayout {
        &self.layout
    }
}

/// Install `storage` process-wide. The first install wins; later calls get
/// the already installed instance back.
pub fn install(storage: WebStorage) -> Arc<WebStorage> {
    let storage = Arc::new(storage);
    let installed = INSTALLED.get_or_init(|| Arc::clone(&storage));
    if !Arc::ptr_eq(installed, &storage) {
        warn!(namespace = %installed.namespace(), "storage shims already installed");
    }
    Arc::clone(installed)
}

/// The process-wide shims, if [`install`] has run
pub fn installed() -> Option<Arc<WebStorage>> {
    INSTALLED.get().cloned()
}
