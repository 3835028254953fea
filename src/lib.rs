//! fast-langdetect - Language identification on fastText `lid.176` models
//!
//! Picks between a bundled low-memory model and the downloaded full model,
//! caches loaded models per detector, normalizes input text and falls back
//! from the full to the lite model when the full one does not fit in memory.
//!
//! ```no_run
//! use fast_langdetect::{ModelTier, detect};
//!
//! let langs = detect("Hello, world!", Some(ModelTier::Lite), 1)?;
//! assert_eq!(langs[0].lang, "en");
//! # Ok::<(), fast_langdetect::Error>(())
//! ```

pub mod backend;
pub mod config;
pub mod detector;
pub mod error;
pub mod fasttext;
pub mod metrics;
pub mod models;
pub mod normalize;

pub use backend::{LanguageModel, ModelBackend, RawPrediction};
pub use config::{DEFAULT_MAX_INPUT_LENGTH, LangDetectConfig, LangDetectConfigBuilder, ModelTier};
pub use detector::{LangDetector, LangPrediction};
pub use error::{Error, Result};
pub use fasttext::{FastTextBackend, FastTextModel};
pub use models::{IdentityKind, ModelCache, ModelIdentity, ModelSource};

use std::sync::OnceLock;

static DEFAULT_DETECTOR: OnceLock<LangDetector> = OnceLock::new();

/// Process-wide detector with the default configuration, created on first use
pub fn default_detector() -> &'static LangDetector {
    DEFAULT_DETECTOR.get_or_init(LangDetector::default)
}

/// Detect up to `k` languages with the default detector
pub fn detect(text: &str, tier: Option<ModelTier>, k: usize) -> Result<Vec<LangPrediction>> {
    default_detector().detect(text, tier, k)
}

/// Detect with the default detector, dropping candidates below `threshold`
pub fn detect_with_threshold(
    text: &str,
    tier: Option<ModelTier>,
    k: usize,
    threshold: f32,
) -> Result<Vec<LangPrediction>> {
    default_detector().detect_with_threshold(text, tier, k, threshold)
}

/// Detect with a one-off detector bound to `config`
///
/// Models are loaded for this call only; keep a [`LangDetector`] around when
/// detecting repeatedly with the same configuration.
pub fn detect_with_config(
    text: &str,
    tier: Option<ModelTier>,
    k: usize,
    config: LangDetectConfig,
) -> Result<Vec<LangPrediction>> {
    LangDetector::new(config).detect(text, tier, k)
}

/// Uppercase code of the most likely language according to the lite model
///
/// See [`LangDetector::detect_language`].
pub fn detect_language(text: &str) -> Result<String> {
    default_detector().detect_language(text)
}
