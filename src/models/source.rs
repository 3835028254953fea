//! Model artifact resolution
//!
//! Maps a tier (or the configured custom path) to model bytes:
//! - lite: `lite_model_path`, else `$FTLANG_LITE_MODEL`, else the
//!   `lid.176.ftz` embedded into the library at build time
//! - full: `lid.176.bin` in the cache directory, downloaded on first use
//! - custom: the configured path, used verbatim
//!
//! Cache directory resolution order:
//! 1. `cache_dir` from the config (must already exist)
//! 2. `$FTLANG_CACHE`
//! 3. `<system temp>/fasttext-langdetect`

use crate::config::{LangDetectConfig, ModelTier};
use crate::error::{Error, Result};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use super::download;

/// File name of the lite model
pub const LITE_MODEL_NAME: &str = "lid.176.ftz";

/// Path reported for the embedded lite model in identities, logs and errors
pub const BUNDLED_LITE_MODEL: &str = "<bundled>/lid.176.ftz";

/// File name of the full model inside the cache directory
pub const FULL_MODEL_NAME: &str = "lid.176.bin";

/// Where the full model is fetched from
pub const FULL_MODEL_URL: &str =
    "https://dl.fbaipublicfiles.com/fasttext/supervised-models/lid.176.bin";

/// MD5 of the published full model
pub const FULL_MODEL_MD5: &str = "01810bc59c6a3d2b79c79e6336612f65";

/// Environment variable overriding the default cache directory
pub const CACHE_DIR_ENV: &str = "FTLANG_CACHE";

/// Environment variable pointing at a lite model file on disk
pub const LITE_MODEL_ENV: &str = "FTLANG_LITE_MODEL";

const DEFAULT_CACHE_SUBDIR: &str = "fasttext-langdetect";

#[cfg(bundled_lite_model)]
static BUNDLED_LITE_BYTES: Option<&[u8]> =
    Some(include_bytes!(concat!(env!("OUT_DIR"), "/lid.176.ftz")));
#[cfg(not(bundled_lite_model))]
static BUNDLED_LITE_BYTES: Option<&[u8]> = None;

/// The lite model embedded at build time, if the build found one
pub fn bundled_lite_model() -> Option<&'static [u8]> {
    BUNDLED_LITE_BYTES
}

/// Which artifact an identity refers to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IdentityKind {
    Lite,
    Full,
    Custom,
}

impl IdentityKind {
    pub fn as_str(self) -> &'static str {
        match self {
            IdentityKind::Lite => "lite",
            IdentityKind::Full => "full",
            IdentityKind::Custom => "custom",
        }
    }
}

impl fmt::Display for IdentityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Cache key for a loaded model: artifact kind plus absolute path
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ModelIdentity {
    kind: IdentityKind,
    path: PathBuf,
}

impl ModelIdentity {
    /// Build an identity; relative paths are made absolute without touching
    /// the filesystem
    pub fn new(kind: IdentityKind, path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let path = std::path::absolute(&path).unwrap_or(path);
        Self { kind, path }
    }

    /// Identity of the embedded lite model
    fn bundled_lite() -> Self {
        Self {
            kind: IdentityKind::Lite,
            path: PathBuf::from(BUNDLED_LITE_MODEL),
        }
    }

    pub fn kind(&self) -> IdentityKind {
        self.kind
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl fmt::Display for ModelIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.kind, self.path.display())
    }
}

/// Model bytes ready to hand to a backend
#[derive(Clone, PartialEq)]
pub enum ModelData {
    /// A model file on disk
    File(PathBuf),
    /// A model image compiled into the binary
    Embedded(&'static [u8]),
}

impl fmt::Debug for ModelData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ModelData::File(path) => f.debug_tuple("File").field(path).finish(),
            ModelData::Embedded(bytes) => write!(f, "Embedded({} bytes)", bytes.len()),
        }
    }
}

#[derive(Debug, Clone)]
enum CacheDir {
    /// Set in the config; never created by us
    Configured(PathBuf),
    /// From the environment or the default; created on demand
    Managed(PathBuf),
}

impl CacheDir {
    fn path(&self) -> &Path {
        match self {
            CacheDir::Configured(p) | CacheDir::Managed(p) => p,
        }
    }
}

#[derive(Debug, Clone)]
enum LiteModel {
    File(PathBuf),
    Bundled,
}

/// Resolves tiers to model data and fetches the full model when needed
#[derive(Debug, Clone)]
pub struct ModelSource {
    config: Arc<LangDetectConfig>,
    cache_dir: CacheDir,
    lite_model: LiteModel,
    full_model_url: String,
}

impl ModelSource {
    pub fn new(config: Arc<LangDetectConfig>) -> Self {
        let cache_dir = match config.cache_dir() {
            Some(dir) => CacheDir::Configured(dir.to_path_buf()),
            None => CacheDir::Managed(default_cache_dir()),
        };
        let lite_model = match config.lite_model_path() {
            Some(path) => LiteModel::File(path.to_path_buf()),
            None => env_path(LITE_MODEL_ENV).map_or(LiteModel::Bundled, LiteModel::File),
        };
        Self {
            config,
            cache_dir,
            lite_model,
            full_model_url: FULL_MODEL_URL.to_string(),
        }
    }

    /// Use a different file as the lite model
    pub fn with_lite_model(mut self, path: impl Into<PathBuf>) -> Self {
        self.lite_model = LiteModel::File(path.into());
        self
    }

    /// Fetch the full model from a different location (mirrors, tests)
    pub fn with_full_model_url(mut self, url: impl Into<String>) -> Self {
        self.full_model_url = url.into();
        self
    }

    pub fn config(&self) -> &LangDetectConfig {
        &self.config
    }

    /// Directory the full model is stored in
    pub fn cache_dir(&self) -> &Path {
        self.cache_dir.path()
    }

    pub fn full_model_url(&self) -> &str {
        &self.full_model_url
    }

    /// Identity for a tier; `Auto` resolves to the full model
    pub fn identity(&self, tier: ModelTier) -> ModelIdentity {
        match tier {
            ModelTier::Lite => match &self.lite_model {
                LiteModel::File(path) => ModelIdentity::new(IdentityKind::Lite, path),
                LiteModel::Bundled => ModelIdentity::bundled_lite(),
            },
            ModelTier::Full | ModelTier::Auto => ModelIdentity::new(
                IdentityKind::Full,
                self.cache_dir.path().join(FULL_MODEL_NAME),
            ),
        }
    }

    /// Identity of the configured custom model, if any
    pub fn custom_identity(&self) -> Option<ModelIdentity> {
        self.config
            .custom_model_path()
            .map(|path| ModelIdentity::new(IdentityKind::Custom, path))
    }

    /// Make the identity's model available, downloading the full model if
    /// necessary
    pub fn materialize(&self, identity: &ModelIdentity) -> Result<ModelData> {
        match identity.kind() {
            IdentityKind::Lite if *identity == ModelIdentity::bundled_lite() => {
                match bundled_lite_model() {
                    Some(bytes) => Ok(ModelData::Embedded(bytes)),
                    None => {
                        tracing::warn!(
                            "Built without an embedded lite model; set lite_model_path or ${}",
                            LITE_MODEL_ENV
                        );
                        Err(Error::ModelNotFound(identity.path().to_path_buf()))
                    }
                }
            }
            IdentityKind::Lite | IdentityKind::Custom => {
                if identity.path().is_file() {
                    Ok(ModelData::File(identity.path().to_path_buf()))
                } else {
                    Err(Error::ModelNotFound(identity.path().to_path_buf()))
                }
            }
            IdentityKind::Full => {
                self.ensure_cache_dir()?;
                let path = identity.path();
                if path.is_file() {
                    tracing::debug!(path = %path.display(), "Full model already cached");
                    self.check_cached(path);
                    return Ok(ModelData::File(path.to_path_buf()));
                }
                download::download_model(
                    &self.full_model_url,
                    path,
                    self.config.proxy(),
                    self.expected_md5(),
                )?;
                Ok(ModelData::File(path.to_path_buf()))
            }
        }
    }

    /// Checksum the downloaded full model must match, if verification is on
    fn expected_md5(&self) -> Option<&str> {
        if self.config.disable_verify() {
            None
        } else {
            Some(self.config.verify_hash().unwrap_or(FULL_MODEL_MD5))
        }
    }

    /// A cached file that fails verification is still used; it may be a
    /// deliberately replaced model
    fn check_cached(&self, path: &Path) {
        let Some(expected) = self.expected_md5() else {
            return;
        };
        match download::file_md5(path) {
            Ok(actual) if actual == expected => {}
            Ok(actual) => tracing::warn!(
                path = %path.display(),
                expected = %expected,
                actual = %actual,
                "Cached model does not match the expected checksum"
            ),
            Err(e) => tracing::warn!(path = %path.display(), error = %e, "Could not checksum cached model"),
        }
    }

    fn ensure_cache_dir(&self) -> Result<()> {
        match &self.cache_dir {
            CacheDir::Configured(dir) => {
                if dir.is_dir() {
                    Ok(())
                } else {
                    Err(Error::CacheDirNotFound(dir.clone()))
                }
            }
            CacheDir::Managed(dir) => fs::create_dir_all(dir).map_err(|source| Error::Io {
                path: dir.clone(),
                source,
            }),
        }
    }
}

/// `$FTLANG_CACHE`, or a directory under the system temp dir
pub fn default_cache_dir() -> PathBuf {
    env_path(CACHE_DIR_ENV).unwrap_or_else(|| std::env::temp_dir().join(DEFAULT_CACHE_SUBDIR))
}

fn env_path(var: &str) -> Option<PathBuf> {
    std::env::var(var)
        .ok()
        .filter(|value| !value.trim().is_empty())
        .map(PathBuf::from)
}
