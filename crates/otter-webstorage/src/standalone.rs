//! Standalone-executable detection.
//!
//! The shims only make sense inside a compiled standalone binary, where the
//! application's modules are served from a virtual filesystem embedded in
//! the executable. Everywhere else setup must do nothing at all.

/// Answers whether the current process is a standalone executable.
pub trait ModeDetector: Send + Sync {
    fn is_running_embedded(&self) -> bool;
}

/// Fixed answer, for hosts that already know their mode.
impl ModeDetector for bool {
    fn is_running_embedded(&self) -> bool {
        *self
    }
}

/// Detects standalone mode from the application's own module identity: an
/// embedded module lives under one of the virtual roots. The roots belong to
/// whichever bundler produced the executable, so the caller supplies them.
/// With no roots nothing counts as embedded.
#[derive(Debug, Clone)]
pub struct EmbeddedPathDetector {
    identity: String,
    roots: Vec<String>,
}

impl EmbeddedPathDetector {
    pub fn new<I, S>(identity: impl Into<String>, roots: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            identity: identity.into(),
            roots: roots.into_iter().map(Into::into).collect(),
        }
    }

    /// Replace the recognized roots
    pub fn with_roots<I, S>(mut self, roots: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.roots = roots.into_iter().map(Into::into).collect();
        self
    }
}

impl ModeDetector for EmbeddedPathDetector {
    fn is_running_embedded(&self) -> bool {
        // Windows paths may come through with either separator
        let identity = self.identity.replace('\\', "/");
        self.roots
            .iter()
            .map(|root| root.replace('\\', "/"))
            .any(|root| !root.is_empty() && identity.starts_with(&root))
    }
}
