//! Configuration structures and validation

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Default truncation length in characters
pub const DEFAULT_MAX_INPUT_LENGTH: usize = 80;

/// Which model a detection call should use
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModelTier {
    /// Bundled compressed model, always available offline
    Lite,
    /// Downloaded full-size model
    Full,
    /// Full model, falling back to lite when it cannot be loaded for lack of memory
    #[default]
    Auto,
}

impl fmt::Display for ModelTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Lite => write!(f, "lite"),
            Self::Full => write!(f, "full"),
            Self::Auto => write!(f, "auto"),
        }
    }
}

impl FromStr for ModelTier {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "lite" => Ok(Self::Lite),
            "full" => Ok(Self::Full),
            "auto" => Ok(Self::Auto),
            other => Err(Error::Config(format!(
                "unknown model tier '{}' (expected lite, full or auto)",
                other
            ))),
        }
    }
}

/// Immutable detector configuration
///
/// Built through [`LangDetectConfig::builder`] (or parsed from TOML), which
/// validates every field before handing out a value.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LangDetectConfig {
    cache_dir: Option<PathBuf>,
    model: ModelTier,
    custom_model_path: Option<PathBuf>,
    lite_model_path: Option<PathBuf>,
    max_input_length: Option<usize>,
    proxy: Option<String>,
    normalize_input: bool,
    disable_verify: bool,
    verify_hash: Option<String>,
}

impl Default for LangDetectConfig {
    fn default() -> Self {
        Self {
            cache_dir: None,
            model: ModelTier::default(),
            custom_model_path: None,
            lite_model_path: None,
            max_input_length: Some(DEFAULT_MAX_INPUT_LENGTH),
            proxy: None,
            normalize_input: true,
            disable_verify: false,
            verify_hash: None,
        }
    }
}

impl LangDetectConfig {
    /// Start building a configuration from defaults
    pub fn builder() -> LangDetectConfigBuilder {
        LangDetectConfigBuilder::default()
    }

    /// Parse and validate a TOML configuration
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let builder: LangDetectConfigBuilder = toml::from_str(content)
            .map_err(|e| Error::Config(format!("failed to parse TOML config: {}", e)))?;
        builder.build()
    }

    /// Load and validate a TOML configuration file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| Error::Io {
            path: path.to_path_buf(),
            source: e,
        })?;
        Self::from_toml_str(&content)
    }

    /// Explicitly configured cache directory
    pub fn cache_dir(&self) -> Option<&Path> {
        self.cache_dir.as_deref()
    }

    /// Tier used when a call does not name one
    pub fn model(&self) -> ModelTier {
        self.model
    }

    /// Custom model path that overrides tier selection
    pub fn custom_model_path(&self) -> Option<&Path> {
        self.custom_model_path.as_deref()
    }

    /// Lite model file to use instead of the one embedded in the library
    pub fn lite_model_path(&self) -> Option<&Path> {
        self.lite_model_path.as_deref()
    }

    /// Truncation limit in characters, `None` when disabled
    pub fn max_input_length(&self) -> Option<usize> {
        self.max_input_length
    }

    pub fn proxy(&self) -> Option<&str> {
        self.proxy.as_deref()
    }

    pub fn normalize_input(&self) -> bool {
        self.normalize_input
    }

    pub fn disable_verify(&self) -> bool {
        self.disable_verify
    }

    /// Expected MD5 of the full model, overriding the built-in checksum
    pub fn verify_hash(&self) -> Option<&str> {
        self.verify_hash.as_deref()
    }

    /// Builder pre-filled with this configuration's values
    pub fn to_builder(&self) -> LangDetectConfigBuilder {
        LangDetectConfigBuilder {
            cache_dir: self.cache_dir.clone(),
            model: self.model,
            custom_model_path: self.custom_model_path.clone(),
            lite_model_path: self.lite_model_path.clone(),
            max_input_length: self.max_input_length,
            proxy: self.proxy.clone(),
            normalize_input: self.normalize_input,
            disable_verify: self.disable_verify,
            verify_hash: self.verify_hash.clone(),
        }
    }
}

/// Builder for [`LangDetectConfig`], also the TOML file schema
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LangDetectConfigBuilder {
    cache_dir: Option<PathBuf>,
    model: ModelTier,
    custom_model_path: Option<PathBuf>,
    lite_model_path: Option<PathBuf>,
    #[serde(deserialize_with = "deserialize_max_input_length")]
    max_input_length: Option<usize>,
    proxy: Option<String>,
    normalize_input: bool,
    disable_verify: bool,
    verify_hash: Option<String>,
}

impl Default for LangDetectConfigBuilder {
    fn default() -> Self {
        LangDetectConfig::default().to_builder()
    }
}

impl LangDetectConfigBuilder {
    pub fn cache_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cache_dir = Some(dir.into());
        self
    }

    pub fn model(mut self, tier: ModelTier) -> Self {
        self.model = tier;
        self
    }

    pub fn custom_model_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.custom_model_path = Some(path.into());
        self
    }

    pub fn lite_model_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.lite_model_path = Some(path.into());
        self
    }

    /// Set the truncation limit; `None` disables truncation
    pub fn max_input_length(mut self, length: Option<usize>) -> Self {
        self.max_input_length = length;
        self
    }

    pub fn proxy(mut self, proxy: impl Into<String>) -> Self {
        self.proxy = Some(proxy.into());
        self
    }

    pub fn normalize_input(mut self, enabled: bool) -> Self {
        self.normalize_input = enabled;
        self
    }

    pub fn disable_verify(mut self, disabled: bool) -> Self {
        self.disable_verify = disabled;
        self
    }

    pub fn verify_hash(mut self, md5: impl Into<String>) -> Self {
        self.verify_hash = Some(md5.into());
        self
    }

    /// Validate and freeze the configuration
    pub fn build(self) -> Result<LangDetectConfig> {
        if let Some(dir) = &self.cache_dir
            && !dir.is_dir()
        {
            return Err(Error::CacheDirNotFound(dir.clone()));
        }

        if self.max_input_length == Some(0) {
            return Err(Error::Config(
                "max_input_length must be a positive number of characters".to_string(),
            ));
        }

        for path in [&self.custom_model_path, &self.lite_model_path]
            .into_iter()
            .flatten()
        {
            if !path.is_file() {
                return Err(Error::ModelNotFound(path.clone()));
            }
        }

        if let Some(hash) = &self.verify_hash
            && (hash.len() != 32 || !hash.chars().all(|c| c.is_ascii_hexdigit()))
        {
            return Err(Error::Config(format!(
                "verify_hash must be a 32 character hex MD5 digest (got '{}')",
                hash
            )));
        }

        let proxy = self.proxy.filter(|p| !p.trim().is_empty());

        Ok(LangDetectConfig {
            cache_dir: self.cache_dir,
            model: self.model,
            custom_model_path: self.custom_model_path,
            lite_model_path: self.lite_model_path,
            max_input_length: self.max_input_length,
            proxy,
            normalize_input: self.normalize_input,
            disable_verify: self.disable_verify,
            verify_hash: self.verify_hash.map(|h| h.to_ascii_lowercase()),
        })
    }
}

/// TOML has no null, so `max_input_length = 0` is rejected by validation and
/// `max_input_length = false` disables truncation.
fn deserialize_max_input_length<'de, D>(deserializer: D) -> std::result::Result<Option<usize>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Length(usize),
        Enabled(bool),
    }

    match Raw::deserialize(deserializer)? {
        Raw::Length(n) => Ok(Some(n)),
        Raw::Enabled(true) => Ok(Some(DEFAULT_MAX_INPUT_LENGTH)),
        Raw::Enabled(false) => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_default_config() {
        let config = LangDetectConfig::default();
        assert_eq!(config.model(), ModelTier::Auto);
        assert_eq!(config.max_input_length(), Some(80));
        assert!(config.normalize_input());
        assert!(!config.disable_verify());
        assert!(config.cache_dir().is_none());
        assert!(config.custom_model_path().is_none());
    }

    #[test]
    fn test_builder_defaults_match_default() {
        let config = LangDetectConfig::builder().build().unwrap();
        assert_eq!(config, LangDetectConfig::default());
    }

    #[test]
    fn test_missing_cache_dir_rejected() {
        let result = LangDetectConfig::builder()
            .cache_dir("/does/not/exist")
            .build();
        assert!(matches!(result, Err(Error::CacheDirNotFound(_))));
    }

    #[test]
    fn test_existing_cache_dir_accepted() {
        let dir = TempDir::new().unwrap();
        let config = LangDetectConfig::builder()
            .cache_dir(dir.path())
            .build()
            .unwrap();
        assert_eq!(config.cache_dir(), Some(dir.path()));
    }

    #[test]
    fn test_zero_max_input_length_rejected() {
        let result = LangDetectConfig::builder()
            .max_input_length(Some(0))
            .build();
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn test_disabled_truncation_accepted() {
        let config = LangDetectConfig::builder()
            .max_input_length(None)
            .build()
            .unwrap();
        assert_eq!(config.max_input_length(), None);
    }

    #[test]
    fn test_missing_custom_model_rejected() {
        let result = LangDetectConfig::builder()
            .custom_model_path("/nonexistent/model.bin")
            .build();
        assert!(matches!(result, Err(Error::ModelNotFound(_))));
    }

    #[test]
    fn test_lite_model_path_must_exist() {
        let result = LangDetectConfig::builder()
            .lite_model_path("/nonexistent/lid.176.ftz")
            .build();
        assert!(matches!(result, Err(Error::ModelNotFound(_))));

        let dir = TempDir::new().unwrap();
        let model = dir.path().join("lid.176.ftz");
        std::fs::write(&model, b"model").unwrap();
        let config = LangDetectConfig::builder()
            .lite_model_path(&model)
            .build()
            .unwrap();
        assert_eq!(config.lite_model_path(), Some(model.as_path()));
    }

    #[test]
    fn test_verify_hash_validation() {
        assert!(
            LangDetectConfig::builder()
                .verify_hash("not-a-hash")
                .build()
                .is_err()
        );
        let config = LangDetectConfig::builder()
            .verify_hash("01810BC59C6A3D2B79C79E6336612F65")
            .build()
            .unwrap();
        assert_eq!(config.verify_hash(), Some("01810bc59c6a3d2b79c79e6336612f65"));
    }

    #[test]
    fn test_blank_proxy_dropped() {
        let config = LangDetectConfig::builder().proxy("  ").build().unwrap();
        assert!(config.proxy().is_none());
    }

    #[test]
    fn test_model_tier_parse() {
        assert_eq!("lite".parse::<ModelTier>().unwrap(), ModelTier::Lite);
        assert_eq!("FULL".parse::<ModelTier>().unwrap(), ModelTier::Full);
        assert_eq!(" auto ".parse::<ModelTier>().unwrap(), ModelTier::Auto);
        assert!("medium".parse::<ModelTier>().is_err());
    }

    #[test]
    fn test_model_tier_display() {
        assert_eq!(ModelTier::Lite.to_string(), "lite");
        assert_eq!(ModelTier::Full.to_string(), "full");
        assert_eq!(ModelTier::Auto.to_string(), "auto");
    }

    #[test]
    fn test_from_toml() {
        let dir = TempDir::new().unwrap();
        let content = format!(
            r#"
            cache_dir = "{}"
            model = "full"
            max_input_length = 120
            normalize_input = false
            proxy = "http://proxy.local:3128"
            "#,
            dir.path().display()
        );
        let config = LangDetectConfig::from_toml_str(&content).unwrap();
        assert_eq!(config.model(), ModelTier::Full);
        assert_eq!(config.max_input_length(), Some(120));
        assert!(!config.normalize_input());
        assert_eq!(config.proxy(), Some("http://proxy.local:3128"));
    }

    #[test]
    fn test_from_toml_disables_truncation() {
        let config = LangDetectConfig::from_toml_str("max_input_length = false").unwrap();
        assert_eq!(config.max_input_length(), None);
    }

    #[test]
    fn test_from_toml_rejects_unknown_keys() {
        assert!(LangDetectConfig::from_toml_str("allow_fallback = true").is_err());
    }

    #[test]
    fn test_from_toml_validates() {
        let result = LangDetectConfig::from_toml_str(r#"cache_dir = "/does/not/exist""#);
        assert!(matches!(result, Err(Error::CacheDirNotFound(_))));
    }

    #[test]
    fn test_from_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("langdetect.toml");
        std::fs::write(&path, "model = \"lite\"\n").unwrap();
        let config = LangDetectConfig::from_file(&path).unwrap();
        assert_eq!(config.model(), ModelTier::Lite);
    }

    #[test]
    fn test_to_builder_roundtrip() {
        let config = LangDetectConfig::builder()
            .model(ModelTier::Lite)
            .max_input_length(Some(10))
            .disable_verify(true)
            .build()
            .unwrap();
        assert_eq!(config.to_builder().build().unwrap(), config);
    }
}
