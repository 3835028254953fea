//! Inference backend seam
//!
//! The detector only needs two capabilities from a text classifier: load a
//! model (from a file, or from bytes embedded in the binary), and rank labels
//! for one line of text. Production code uses
//! [`FastTextBackend`](crate::fasttext::FastTextBackend); tests plug in stubs.

use crate::error::{Error, Result};
use std::path::Path;

/// Label prefix used by fastText supervised models
pub const LABEL_PREFIX: &str = "__label__";

/// One ranked candidate as produced by a model
#[derive(Debug, Clone, PartialEq)]
pub struct RawPrediction {
    /// Model label, possibly carrying [`LABEL_PREFIX`]
    pub label: String,
    /// Probability estimate
    pub probability: f32,
}

impl RawPrediction {
    pub fn new(label: impl Into<String>, probability: f32) -> Self {
        Self {
            label: label.into(),
            probability,
        }
    }
}

/// Loads model files into ready-to-use classifiers
pub trait ModelBackend: Send + Sync {
    /// Load the model stored at `path`
    ///
    /// Allocation failures must be reported as
    /// [`Error::OutOfMemory`](crate::Error::OutOfMemory); the auto tier relies
    /// on that to fall back to the lite model.
    fn load(&self, path: &Path) -> Result<Box<dyn LanguageModel>>;

    /// Load a model image held in memory; `name` identifies it in errors
    ///
    /// Used for the lite model embedded at build time. Backends that only
    /// read files keep the default, which rejects the request.
    fn load_bytes(&self, name: &Path, _bytes: &'static [u8]) -> Result<Box<dyn LanguageModel>> {
        Err(Error::InvalidModel {
            path: name.to_path_buf(),
            reason: "backend cannot load in-memory models".to_string(),
        })
    }
}

/// A loaded classifier
pub trait LanguageModel: Send + Sync {
    /// Return up to `k` candidates with probability >= `threshold`, best first
    fn predict(&self, text: &str, k: usize, threshold: f32) -> Result<Vec<RawPrediction>>;
}
