//! Configuration for the storage shims.
//!
//! Everything has a default; the only value an embedder normally supplies is
//! the application identity. Settings can also come from the `[storage]`
//! table of an `otter.toml`:
//!
//! ```toml
//! [storage]
//! identity = "file:///$bunfs/root/app.js"
//! base_dir = "/var/cache/my-app"
//! kv_subsystem = "otter-localstorage"
//! cache_subsystem = "otter-cachestorage"
//! embedded_roots = ["file:///$bunfs/", "/$bunfs/"]
//! ```
//!
//! `embedded_roots` lists the virtual filesystem prefixes the bundler gives
//! embedded modules. [`WebStorage::setup_default`] treats the process as a
//! standalone executable only when `identity` starts with one of them, so
//! an empty list keeps the shims disabled.
//!
//! [`WebStorage::setup_default`]: crate::WebStorage::setup_default

use crate::error::{StorageError, StorageResult};
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Default subdirectory for localStorage files
pub const DEFAULT_KV_SUBSYSTEM: &str = "otter-localstorage";

/// Default subdirectory for CacheStorage namespaces
pub const DEFAULT_CACHE_SUBSYSTEM: &str = "otter-cachestorage";

/// Storage shim settings
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Stable identity of the embedding application, hashed into the
    /// namespace id. Usually the main module URL.
    pub identity: String,

    /// Base cache directory. When unset it is resolved from the environment.
    pub base_dir: Option<PathBuf>,

    /// Subdirectory holding localStorage files
    pub kv_subsystem: String,

    /// Subdirectory holding CacheStorage namespaces
    pub cache_subsystem: String,

    /// Virtual filesystem prefixes of embedded module URLs
    pub embedded_roots: Vec<String>,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            identity: String::new(),
            base_dir: None,
            kv_subsystem: DEFAULT_KV_SUBSYSTEM.to_string(),
            cache_subsystem: DEFAULT_CACHE_SUBSYSTEM.to_string(),
            embedded_roots: Vec::new(),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct ConfigFile {
    #[serde(default)]
    storage: StorageConfig,
}

impl StorageConfig {
    /// Config for the application identified by `identity`
    pub fn new(identity: impl Into<String>) -> Self {
        Self {
            identity: identity.into(),
            ..Default::default()
        }
    }

    /// Override the base cache directory.
    pub fn base_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.base_dir = Some(dir.into());
        self
    }

    pub fn kv_subsystem(mut self, name: impl Into<String>) -> Self {
        self.kv_subsystem = name.into();
        self
    }

    pub fn cache_subsystem(mut self, name: impl Into<String>) -> Self {
        self.cache_subsystem = name.into();
        self
    }

    pub fn embedded_roots<I, S>(mut self, roots: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.embedded_roots = roots.into_iter().map(Into::into).collect();
        self
    }

    /// Parse the `[storage]` table of a TOML document
    pub fn from_toml_str(content: &str) -> StorageResult<Self> {
        let file: ConfigFile = toml::from_str(content)
            .map_err(|e| StorageError::config(format!("Failed to parse config: {}", e)))?;
        Ok(file.storage)
    }

    /// Load from a TOML file
    pub fn load(path: &Path) -> StorageResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| StorageError::io(path, e))?;
        Self::from_toml_str(&content).map_err(|e| match e {
            StorageError::Config(msg) => {
                StorageError::config(format!("{}: {}", path.display(), msg))
            }
            other => other,
        })
    }

    /// Reject settings that would escape the base directory
    pub fn validate(&self) -> StorageResult<()> {
        for (field, value) in [
            ("kv_subsystem", &self.kv_subsystem),
            ("cache_subsystem", &self.cache_subsystem),
        ] {
            let bad = value.is_empty()
                || value == "."
                || value == ".."
                || value.contains(['/', '\\']);
            if bad {
                return Err(StorageError::config(format!(
                    "{} must be a single directory name, got {:?}",
                    field, value
                )));
            }
        }
        Ok(())
    }
}
