//! Otter WebStorage - persistent `localStorage` and `caches` for standalone
//! executables
//!
//! Compiled standalone binaries have no browser-style persistence of their
//! own. This crate stores both APIs as JSON files under the user's cache
//! directory, one isolated namespace per embedding application.
//!
//! # Usage
//!
//! ```no_run
//! use otter_webstorage::{StorageConfig, WebStorage};
//!
//! # async fn demo() -> otter_webstorage::StorageResult<()> {
//! // The roots are whatever virtual filesystem prefix the bundler gives
//! // embedded modules
//! let config = StorageConfig::new("file:///$bunfs/root/app.js")
//!     .embedded_roots(["file:///$bunfs/"]);
//!
//! // No-op (returns None) unless the identity is under an embedded root
//! if let Some(storage) = WebStorage::setup_default(&config).await? {
//!     let ls = storage.local_storage();
//!     ls.set_item("theme", "dark").await?;
//!     assert_eq!(ls.get_item("theme").await?.as_deref(), Some("dark"));
//!
//!     let cache = storage.caches().open("v1").await?;
//!     cache.add("https://example.com/data.json").await?;
//!     let hit = cache.match_request("https://example.com/data.json").await?;
//!     assert!(hit.is_some());
//! }
//! # Ok(())
//! # }
//! ```
//!
//! # Layout
//!
//! ```text
//! <cache dir>/otter-localstorage/<namespace>.json
//! <cache dir>/otter-cachestorage/<namespace>/<cache name>.json
//! ```
//!
//! Files are not locked. Two processes writing the same store race and the
//! last write wins.

pub mod cache;
pub mod cache_dir;
pub mod config;
mod error;
mod extension;
pub mod fetch;
pub mod local_storage;
pub mod namespace;
pub mod request;
pub mod standalone;
pub mod store;

pub use cache::{Cache, CacheStorage, EntryRecord};
pub use cache_dir::{EnvSource, OsFamily, ProcessEnv, resolve_cache_dir};
pub use config::StorageConfig;
pub use error::{StorageError, StorageResult};
pub use extension::{
    StorageLayout, WebStorage, install, installed, setup_cache_storage, setup_local_storage,
};
pub use fetch::{Fetcher, HttpFetcher};
pub use local_storage::LocalStorage;
pub use namespace::namespace_id;
pub use request::{Headers, Request, RequestInfo, Response};
pub use standalone::{EmbeddedPathDetector, ModeDetector};
pub use store::{JsonStore, LoadState};
