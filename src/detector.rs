//! Language detector
//!
//! Ties normalization, model selection, inference and the fallback policy
//! together. A detector owns its model cache; models are loaded lazily on
//! first use and kept for the detector's lifetime.

use crate::backend::{LABEL_PREFIX, ModelBackend, RawPrediction};
use crate::config::{LangDetectConfig, ModelTier};
use crate::error::{Error, Result};
use crate::fasttext::FastTextBackend;
use crate::models::{LoadedModel, ModelCache, ModelData, ModelIdentity, ModelSource};
use crate::normalize::normalize;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{trace, warn};

/// One detected language
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LangPrediction {
    /// Language code as emitted by the model (e.g. `en`, `zh`)
    pub lang: String,
    /// Confidence in `[0, 1]`
    pub score: f32,
}

impl From<RawPrediction> for LangPrediction {
    fn from(raw: RawPrediction) -> Self {
        let lang = match raw.label.strip_prefix(LABEL_PREFIX) {
            Some(code) => code.to_string(),
            None => raw.label,
        };
        let score = if raw.probability.is_nan() {
            0.0
        } else {
            raw.probability.clamp(0.0, 1.0)
        };
        Self { lang, score }
    }
}

/// Detects the language of text using lazily loaded fastText models
pub struct LangDetector {
    source: ModelSource,
    backend: Arc<dyn ModelBackend>,
    cache: ModelCache,
}

impl LangDetector {
    /// Detector using the built-in fastText backend
    pub fn new(config: LangDetectConfig) -> Self {
        Self::with_backend(config, Arc::new(FastTextBackend))
    }

    /// Detector with a custom inference backend
    pub fn with_backend(config: LangDetectConfig, backend: Arc<dyn ModelBackend>) -> Self {
        Self::with_source(ModelSource::new(Arc::new(config)), backend)
    }

    /// Detector with a preconfigured model source
    pub fn with_source(source: ModelSource, backend: Arc<dyn ModelBackend>) -> Self {
        Self {
            source,
            backend,
            cache: ModelCache::new(),
        }
    }

    pub fn config(&self) -> &LangDetectConfig {
        self.source.config()
    }

    pub fn source(&self) -> &ModelSource {
        &self.source
    }

    pub fn cache(&self) -> &ModelCache {
        &self.cache
    }

    /// Detect up to `k` languages, best first
    ///
    /// `tier` overrides the configured model tier for this call. A configured
    /// custom model always wins over the tier.
    pub fn detect(
        &self,
        text: &str,
        tier: Option<ModelTier>,
        k: usize,
    ) -> Result<Vec<LangPrediction>> {
        self.detect_with_threshold(text, tier, k, 0.0)
    }

    /// Like [`LangDetector::detect`], dropping candidates scored below
    /// `threshold`
    pub fn detect_with_threshold(
        &self,
        text: &str,
        tier: Option<ModelTier>,
        k: usize,
        threshold: f32,
    ) -> Result<Vec<LangPrediction>> {
        if k == 0 {
            return Err(Error::InvalidInput("k must be at least 1".to_string()));
        }
        if !(0.0..=1.0).contains(&threshold) {
            return Err(Error::InvalidInput(format!(
                "threshold must be within [0, 1], got {}",
                threshold
            )));
        }

        let tier = tier.unwrap_or(self.config().model());
        let text = normalize(text, self.config());
        trace!(tier = %tier, k, chars = text.chars().count(), "Detecting language");

        let model = self.model_for(tier)?;
        let raw = model.predict(&text, k, threshold)?;
        crate::metrics::record_detection(model.identity().kind());

        Ok(raw.into_iter().take(k).map(LangPrediction::from).collect())
    }

    /// Uppercase code of the most likely language according to the lite model
    ///
    /// Returns `"EN"` when the model yields nothing. The lite model tends to
    /// label kana-free CJK text as Japanese, so `JA` becomes `ZH` unless the
    /// text contains hiragana or katakana.
    pub fn detect_language(&self, text: &str) -> Result<String> {
        let langs = self.detect(text, Some(ModelTier::Lite), 1)?;
        Ok(language_code(text, langs.first()))
    }

    /// Run [`LangDetector::detect`] on tokio's blocking pool
    pub async fn detect_async(
        self: Arc<Self>,
        text: String,
        tier: Option<ModelTier>,
        k: usize,
    ) -> Result<Vec<LangPrediction>> {
        tokio::task::spawn_blocking(move || self.detect(&text, tier, k))
            .await
            .map_err(|e| Error::Inference(format!("detection task failed: {}", e)))?
    }

    /// Resolve the model for a call, applying the auto-tier fallback
    fn model_for(&self, tier: ModelTier) -> Result<Arc<LoadedModel>> {
        if let Some(custom) = self.source.custom_identity() {
            return self.load(&custom);
        }

        match tier {
            ModelTier::Lite | ModelTier::Full => self.load(&self.source.identity(tier)),
            ModelTier::Auto => match self.load(&self.source.identity(ModelTier::Full)) {
                Ok(model) => Ok(model),
                Err(e) if e.is_out_of_memory() => {
                    warn!(error = %e, "Not enough memory for the full model, falling back to lite");
                    crate::metrics::record_fallback();
                    self.load(&self.source.identity(ModelTier::Lite))
                }
                Err(e) => Err(e),
            },
        }
    }

    fn load(&self, identity: &ModelIdentity) -> Result<Arc<LoadedModel>> {
        self.cache.get_or_load(identity, |identity| {
            match self.source.materialize(identity)? {
                ModelData::File(path) => self.backend.load(&path),
                ModelData::Embedded(bytes) => self.backend.load_bytes(identity.path(), bytes),
            }
        })
    }
}

impl Default for LangDetector {
    fn default() -> Self {
        Self::new(LangDetectConfig::default())
    }
}

impl std::fmt::Debug for LangDetector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LangDetector")
            .field("source", &self.source)
            .field("cache", &self.cache)
            .finish_non_exhaustive()
    }
}

fn language_code(text: &str, top: Option<&LangPrediction>) -> String {
    let code = top.map_or_else(|| "EN".to_string(), |p| p.lang.to_uppercase());
    if code == "JA" && !contains_kana(text) {
        return "ZH".to_string();
    }
    code
}

fn contains_kana(text: &str) -> bool {
    text.chars().any(|c| ('\u{3041}'..='\u{30FE}').contains(&c))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pred(lang: &str) -> LangPrediction {
        LangPrediction {
            lang: lang.to_string(),
            score: 0.9,
        }
    }

    #[test]
    fn test_language_code_uppercases() {
        assert_eq!(language_code("bonjour", Some(&pred("fr"))), "FR");
    }

    #[test]
    fn test_language_code_defaults_to_en() {
        assert_eq!(language_code("", None), "EN");
    }

    #[test]
    fn test_japanese_without_kana_is_chinese() {
        assert_eq!(language_code("你好世界", Some(&pred("ja"))), "ZH");
    }

    #[test]
    fn test_japanese_with_kana_kept() {
        assert_eq!(language_code("こんにちは世界", Some(&pred("ja"))), "JA");
        assert_eq!(language_code("カタカナ", Some(&pred("ja"))), "JA");
    }

    #[test]
    fn test_kana_range_bounds() {
        assert!(!contains_kana("\u{3040}"));
        assert!(contains_kana("\u{3041}"));
        assert!(contains_kana("\u{30FE}"));
        assert!(!contains_kana("\u{30FF}"));
    }

    #[test]
    fn test_label_prefix_stripped() {
        let pred = LangPrediction::from(RawPrediction::new("__label__en", 0.98));
        assert_eq!(pred.lang, "en");
        assert_eq!(pred.score, 0.98);
    }

    #[test]
    fn test_unprefixed_label_kept() {
        let pred = LangPrediction::from(RawPrediction::new("fr", 0.5));
        assert_eq!(pred.lang, "fr");
    }

    #[test]
    fn test_scores_clamped() {
        assert_eq!(
            LangPrediction::from(RawPrediction::new("__label__en", 1.00001)).score,
            1.0
        );
        assert_eq!(
            LangPrediction::from(RawPrediction::new("__label__en", -0.1)).score,
            0.0
        );
        assert_eq!(
            LangPrediction::from(RawPrediction::new("__label__en", f32::NAN)).score,
            0.0
        );
    }

    #[test]
    fn test_zero_k_rejected() {
        let err = LangDetector::default().detect("hello", None, 0).unwrap_err();
        assert!(matches!(err, Error::InvalidInput(_)));
    }

    #[test]
    fn test_threshold_out_of_range_rejected() {
        let err = LangDetector::default()
            .detect_with_threshold("hello", None, 1, 1.5)
            .unwrap_err();
        assert!(matches!(err, Error::InvalidInput(_)));
    }

    #[test]
    fn test_serializes_as_lang_and_score() {
        let json = serde_json::to_string(&LangPrediction {
            lang: "en".to_string(),
            score: 0.5,
        })
        .unwrap();
        assert_eq!(json, r#"{"lang":"en","score":0.5}"#);
    }

    #[test]
    fn test_detector_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<LangDetector>();
    }
}
