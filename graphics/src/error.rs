//! Graphics error types.

use std::fmt;

/// Errors that can occur in the graphics system.
///
/// Backend diagnostic text is carried verbatim so operators see the driver's
/// own wording in the logs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GraphicsError {
    /// A context could not become current on the calling thread.
    ///
    /// Fatal for the caller's current frame; retrying next frame is allowed.
    ActivationFailed(String),
    /// A mandatory backend entry point or capability is absent.
    ///
    /// Fatal at initialization: the engine cannot use this backend.
    MissingCapability(String),
    /// A shader variant failed to compile or link.
    ///
    /// Fatal for that material configuration only; other configurations
    /// remain usable.
    VariantCompilationFailed(String),
    /// A pipeline build failed inside a cache.
    ///
    /// Leaves the cache consistent; no prior entries are removed.
    CacheBuildFailed(String),
    /// Failed to initialize the graphics system.
    InitializationFailed(String),
    /// An invalid parameter was provided.
    InvalidParameter(String),
    /// An internal error occurred.
    Internal(String),
}

impl fmt::Display for GraphicsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ActivationFailed(msg) => write!(f, "context activation failed: {msg}"),
            Self::MissingCapability(msg) => write!(f, "missing capability: {msg}"),
            Self::VariantCompilationFailed(msg) => {
                write!(f, "shader variant compilation failed: {msg}")
            }
            Self::CacheBuildFailed(msg) => write!(f, "pipeline build failed: {msg}"),
            Self::InitializationFailed(msg) => write!(f, "initialization failed: {msg}"),
            Self::InvalidParameter(msg) => write!(f, "invalid parameter: {msg}"),
            Self::Internal(msg) => write!(f, "internal error: {msg}"),
        }
    }
}

impl std::error::Error for GraphicsError {}
