//! Error types for fruitscan

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// Result type alias using fruitscan's Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for fruitscan operations
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Weight artifact missing at the resolved path
    #[error("model weights not found: {}", path.display())]
    ModelNotFound { path: PathBuf },

    /// Deserialized parameters do not fit the declared architecture
    #[error("architecture mismatch for {architecture}: {reason}")]
    ArchitectureMismatch { architecture: String, reason: String },

    /// Input could not be decoded as an image
    #[error("image decode error: {0}")]
    ImageDecode(String),

    /// Configuration errors
    #[error("configuration error: {0}")]
    Config(String),

    /// Filesystem/IO errors
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic internal errors
    #[error("internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Create a new model-not-found error
    pub fn model_not_found(path: impl Into<PathBuf>) -> Self {
        Self::ModelNotFound { path: path.into() }
    }

    /// Create a new architecture mismatch error
    pub fn architecture_mismatch(architecture: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::ArchitectureMismatch {
            architecture: architecture.into(),
            reason: reason.into(),
        }
    }

    /// Create a new image decode error
    pub fn image_decode(msg: impl Into<String>) -> Self {
        Self::ImageDecode(msg.into())
    }

    /// Create a new configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a new internal error
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Public taxonomy bucket for this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::ModelNotFound { .. } => ErrorKind::ModelNotFound,
            Self::ArchitectureMismatch { .. } => ErrorKind::ArchitectureMismatch,
            Self::ImageDecode(_) => ErrorKind::ImageDecodeError,
            Self::Config(_) | Self::Io(_) | Self::Internal(_) => ErrorKind::UnexpectedError,
        }
    }
}

/// Failure categories reported in prediction envelopes.
///
/// Serialized by variant name (`"ModelNotFound"`, ...), which is what callers
/// match on in the `error` field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
    ModelNotFound,
    ArchitectureMismatch,
    ImageDecodeError,
    UnexpectedError,
}

impl ErrorKind {
    /// Name as it appears in the envelope
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ModelNotFound => "ModelNotFound",
            Self::ArchitectureMismatch => "ArchitectureMismatch",
            Self::ImageDecodeError => "ImageDecodeError",
            Self::UnexpectedError => "UnexpectedError",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
