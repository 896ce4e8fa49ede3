//! Error types for otter-webstorage

use std::path::{Path, PathBuf};
use thiserror::Error;

/// Storage error type
#[derive(Debug, Error)]
pub enum StorageError {
    /// No usable cache directory, or an unreadable config file
    #[error("Configuration error: {0}")]
    Config(String),

    /// Filesystem failure other than a missing file
    #[error("IO error at {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Document could not be encoded or decoded
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Stored body is not valid base64
    #[error("Invalid stored body for {url}: {message}")]
    InvalidBody { url: String, message: String },

    /// Cache names map to file names, so separators are rejected
    #[error("Invalid cache name: {0:?}")]
    InvalidCacheName(String),

    /// Upstream answered with a non-success status during add/addAll
    #[error("Request for {url} failed with status {status}")]
    Fetch { url: String, status: u16 },

    /// Transport-level fetch failure
    #[error("HTTP error: {0}")]
    Http(String),
}

impl StorageError {
    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Attach a path to an IO error
    pub fn io(path: impl AsRef<Path>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.as_ref().to_path_buf(),
            source,
        }
    }
}

impl From<reqwest::Error> for StorageError {
    fn from(err: reqwest::Error) -> Self {
        StorageError::Http(err.to_string())
    }
}

/// Result type using StorageError
pub type StorageResult<T> = Result<T, StorageError>;
