//! Base cache directory resolution.
//!
//! Picks the per-user cache root from environment variables, following the
//! platform conventions:
//!
//! - Linux and other Unix: `$XDG_CACHE_HOME`, else `$HOME/.cache`
//! - macOS: `$XDG_CACHE_HOME`, else `$HOME/Library/Caches`
//! - Windows: `%LOCALAPPDATA%`, else `%APPDATA%`
//!
//! Resolution never touches the filesystem. Directories are created lazily by
//! the stores on their first write.

use std::collections::HashMap;
use std::path::PathBuf;

/// Read-only view of environment variables.
pub trait EnvSource {
    /// Get a variable, or `None` if it is unset.
    fn var(&self, key: &str) -> Option<String>;
}

/// The real process environment.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessEnv;

impl EnvSource for ProcessEnv {
    fn var(&self, key: &str) -> Option<String> {
        std::env::var(key).ok()
    }
}

impl EnvSource for HashMap<String, String> {
    fn var(&self, key: &str) -> Option<String> {
        self.get(key).cloned()
    }
}

/// Operating system family, as far as cache placement is concerned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OsFamily {
    Linux,
    MacOs,
    Windows,
    /// BSDs and other Unix-likes, treated like Linux
    OtherUnix,
}

impl OsFamily {
    /// Family of the host this binary was built for
    pub fn current() -> Self {
        if cfg!(target_os = "windows") {
            OsFamily::Windows
        } else if cfg!(target_os = "macos") {
            OsFamily::MacOs
        } else if cfg!(target_os = "linux") {
            OsFamily::Linux
        } else {
            OsFamily::OtherUnix
        }
    }

    /// Check if this is a Unix-like family
    pub fn is_unix(&self) -> bool {
        !matches!(self, OsFamily::Windows)
    }
}

/// Non-empty variable lookup; an empty value counts as unset.
fn non_empty(env: &dyn EnvSource, key: &str) -> Option<String> {
    env.var(key).filter(|v| !v.is_empty())
}

/// Resolve the base cache directory for `os` from `env`.
///
/// Returns `None` when no applicable variable is set. Callers must treat that
/// as a configuration error rather than falling back to some default location.
pub fn resolve_cache_dir(os: OsFamily, env: &dyn EnvSource) -> Option<PathBuf> {
    match os {
        OsFamily::Windows => non_empty(env, "LOCALAPPDATA")
            .or_else(|| non_empty(env, "APPDATA"))
            .map(PathBuf::from),
        OsFamily::MacOs => non_empty(env, "XDG_CACHE_HOME")
            .map(PathBuf::from)
            .or_else(|| {
                non_empty(env, "HOME")
                    .map(|home| PathBuf::from(home).join("Library").join("Caches"))
            }),
        OsFamily::Linux | OsFamily::OtherUnix => non_empty(env, "XDG_CACHE_HOME")
            .map(PathBuf::from)
            .or_else(|| non_empty(env, "HOME").map(|home| PathBuf::from(home).join(".cache"))),
    }
}
