//! Model lifecycle
//!
//! Provides functionality for:
//! - Resolving tiers and custom paths to model files
//! - Downloading and verifying the full model
//! - Caching loaded models per identity

pub mod cache;
pub mod download;
pub mod source;

pub use cache::{LoadedModel, ModelCache};
pub use download::{download_model, file_md5};
pub use source::{
    BUNDLED_LITE_MODEL, CACHE_DIR_ENV, FULL_MODEL_MD5, FULL_MODEL_NAME, FULL_MODEL_URL,
    IdentityKind, LITE_MODEL_ENV, LITE_MODEL_NAME, ModelData, ModelIdentity, ModelSource,
    bundled_lite_model, default_cache_dir,
};
