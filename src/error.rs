//! Error types for language detection

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Errors raised by configuration, model lifecycle and inference
#[derive(Debug, Error)]
pub enum Error {
    /// Invalid configuration value
    #[error("Configuration error: {0}")]
    Config(String),

    /// Explicitly configured cache directory does not exist
    #[error("Cache directory does not exist: {}", .0.display())]
    CacheDirNotFound(PathBuf),

    /// Invalid call argument (e.g. `k == 0`)
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Model file is missing (bundled, custom or downloaded)
    #[error("Model file not found: {}", .0.display())]
    ModelNotFound(PathBuf),

    /// Filesystem failure while touching a model artifact
    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Transport failure while downloading the full model
    #[error("Failed to download {url}: {source}")]
    Download {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    /// Connection dropped or failed while the response body was streaming
    #[error("Download of {url} was interrupted: {source}")]
    Transfer {
        url: String,
        #[source]
        source: io::Error,
    },

    /// Download answered with a non-success HTTP status
    #[error("Download of {url} failed with HTTP status {status}")]
    HttpStatus { url: String, status: u16 },

    /// Downloaded model does not match the expected checksum
    #[error("Checksum mismatch for {}: expected {expected}, got {actual}", path.display())]
    Integrity {
        path: PathBuf,
        expected: String,
        actual: String,
    },

    /// Allocation failed while loading a model
    #[error("Out of memory while loading model {}: {message}", path.display())]
    OutOfMemory { path: PathBuf, message: String },

    /// Model bytes could not be interpreted
    #[error("Invalid model file {}: {reason}", path.display())]
    InvalidModel { path: PathBuf, reason: String },

    /// Loaded model failed during prediction
    #[error("Inference failed: {0}")]
    Inference(String),
}

/// Result type alias using our Error type
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Wrap an I/O error, classifying allocation failures as [`Error::OutOfMemory`]
    pub(crate) fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        let path = path.into();
        match source.kind() {
            io::ErrorKind::NotFound => Error::ModelNotFound(path),
            io::ErrorKind::OutOfMemory => Error::OutOfMemory {
                path,
                message: source.to_string(),
            },
            _ => Error::Io { path, source },
        }
    }

    /// The only failure class that allows the auto tier to fall back
    pub fn is_out_of_memory(&self) -> bool {
        matches!(self, Error::OutOfMemory { .. })
    }

    /// Configuration or argument problem, raised before any model work
    pub fn is_config_error(&self) -> bool {
        matches!(
            self,
            Error::Config(_) | Error::CacheDirNotFound(_) | Error::InvalidInput(_)
        )
    }

    /// Failure inside this library rather than the environment
    pub fn is_library_error(&self) -> bool {
        matches!(self, Error::InvalidModel { .. } | Error::Inference(_))
    }

    /// Kind of the underlying I/O error, if any
    pub fn io_kind(&self) -> Option<io::ErrorKind> {
        match self {
            Error::Io { source, .. } => Some(source.kind()),
            Error::ModelNotFound(_) => Some(io::ErrorKind::NotFound),
            _ => None,
        }
    }
}
