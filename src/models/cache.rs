//! In-memory model cache
//!
//! Each [`ModelIdentity`] owns a slot guarded by its own mutex. The first
//! caller for an identity loads the model while holding the slot lock, so
//! concurrent callers for the same identity wait and then share the result,
//! while different identities load in parallel. A failed load leaves the
//! slot empty and the next caller retries.

use super::source::ModelIdentity;
use crate::backend::{LanguageModel, RawPrediction};
use crate::error::Result;
use dashmap::DashMap;
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Instant;
use tracing::{debug, info, warn};

/// A model loaded into memory together with the identity it was loaded from
pub struct LoadedModel {
    identity: ModelIdentity,
    model: Box<dyn LanguageModel>,
}

impl LoadedModel {
    pub fn new(identity: ModelIdentity, model: Box<dyn LanguageModel>) -> Self {
        Self { identity, model }
    }

    pub fn identity(&self) -> &ModelIdentity {
        &self.identity
    }

    pub fn predict(&self, text: &str, k: usize, threshold: f32) -> Result<Vec<RawPrediction>> {
        self.model.predict(text, k, threshold)
    }
}

impl fmt::Debug for LoadedModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoadedModel")
            .field("identity", &self.identity)
            .finish_non_exhaustive()
    }
}

type Slot = Arc<Mutex<Option<Arc<LoadedModel>>>>;

/// Identity-keyed store of loaded models; entries live as long as the cache
#[derive(Default)]
pub struct ModelCache {
    slots: DashMap<ModelIdentity, Slot>,
}

impl ModelCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the model for `identity`, running `load` on a miss
    ///
    /// Errors from `load` are returned untouched and nothing is cached.
    pub fn get_or_load<F>(&self, identity: &ModelIdentity, load: F) -> Result<Arc<LoadedModel>>
    where
        F: FnOnce(&ModelIdentity) -> Result<Box<dyn LanguageModel>>,
    {
        // Clone the slot out so the map shard is not locked during the load
        let slot: Slot = Arc::clone(&self.slots.entry(identity.clone()).or_default());
        let mut guard = slot.lock().unwrap_or_else(PoisonError::into_inner);

        if let Some(model) = guard.as_ref() {
            debug!(identity = %identity, "Model cache hit");
            return Ok(Arc::clone(model));
        }

        let kind = identity.kind();
        let start = Instant::now();
        match load(identity) {
            Ok(model) => {
                let loaded = Arc::new(LoadedModel::new(identity.clone(), model));
                *guard = Some(Arc::clone(&loaded));
                crate::metrics::record_model_load(kind);
                info!(
                    kind = %kind,
                    path = %identity.path().display(),
                    elapsed_ms = start.elapsed().as_millis() as u64,
                    "Model loaded"
                );
                Ok(loaded)
            }
            Err(e) => {
                crate::metrics::record_model_load_failure(kind);
                warn!(kind = %kind, path = %identity.path().display(), error = %e, "Model load failed");
                Err(e)
            }
        }
    }

    /// Loaded model for `identity`, if any; never loads
    pub fn get(&self, identity: &ModelIdentity) -> Option<Arc<LoadedModel>> {
        let slot = self.slots.get(identity).map(|s| Arc::clone(&s))?;
        let guard = slot.lock().unwrap_or_else(PoisonError::into_inner);
        guard.as_ref().map(Arc::clone)
    }

    pub fn contains(&self, identity: &ModelIdentity) -> bool {
        self.get(identity).is_some()
    }

    /// Number of loaded models
    pub fn len(&self) -> usize {
        let slots: Vec<Slot> = self.slots.iter().map(|s| Arc::clone(s.value())).collect();
        slots
            .iter()
            .filter(|s| s.lock().unwrap_or_else(PoisonError::into_inner).is_some())
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl fmt::Debug for ModelCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModelCache")
            .field("identities", &self.slots.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::models::IdentityKind;
    use std::path::PathBuf;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Barrier;
    use std::thread;
    use std::time::Duration;

    struct FixedModel(&'static str);

    impl LanguageModel for FixedModel {
        fn predict(&self, _text: &str, _k: usize, _threshold: f32) -> Result<Vec<RawPrediction>> {
            Ok(vec![RawPrediction::new(self.0, 0.9)])
        }
    }

    fn identity(name: &str) -> ModelIdentity {
        ModelIdentity::new(IdentityKind::Custom, PathBuf::from("/models").join(name))
    }

    #[test]
    fn test_load_once_per_identity() {
        let cache = ModelCache::new();
        let loads = AtomicUsize::new(0);
        let id = identity("a.bin");

        for _ in 0..3 {
            let model = cache
                .get_or_load(&id, |_| {
                    loads.fetch_add(1, Ordering::SeqCst);
                    Ok(Box::new(FixedModel("__label__en")))
                })
                .unwrap();
            assert_eq!(model.identity(), &id);
        }

        assert_eq!(loads.load(Ordering::SeqCst), 1);
        assert_eq!(cache.len(), 1);
        assert!(cache.contains(&id));
    }

    #[test]
    fn test_failed_load_is_not_cached() {
        let cache = ModelCache::new();
        let id = identity("broken.bin");

        let err = cache
            .get_or_load(&id, |id| Err(Error::ModelNotFound(id.path().to_path_buf())))
            .unwrap_err();
        assert!(matches!(err, Error::ModelNotFound(_)));
        assert!(cache.is_empty());
        assert!(cache.get(&id).is_none());

        cache
            .get_or_load(&id, |_| Ok(Box::new(FixedModel("__label__fr"))))
            .unwrap();
        assert!(cache.contains(&id));
    }

    #[test]
    fn test_distinct_identities() {
        let cache = ModelCache::new();
        let en = cache
            .get_or_load(&identity("en.bin"), |_| Ok(Box::new(FixedModel("__label__en"))))
            .unwrap();
        let fr = cache
            .get_or_load(&identity("fr.bin"), |_| Ok(Box::new(FixedModel("__label__fr"))))
            .unwrap();
        assert_eq!(en.predict("x", 1, 0.0).unwrap()[0].label, "__label__en");
        assert_eq!(fr.predict("x", 1, 0.0).unwrap()[0].label, "__label__fr");
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn test_concurrent_callers_share_one_load() {
        let cache = Arc::new(ModelCache::new());
        let loads = Arc::new(AtomicUsize::new(0));
        let barrier = Arc::new(Barrier::new(8));
        let id = identity("shared.bin");

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let cache = Arc::clone(&cache);
                let loads = Arc::clone(&loads);
                let barrier = Arc::clone(&barrier);
                let id = id.clone();
                thread::spawn(move || {
                    barrier.wait();
                    cache
                        .get_or_load(&id, |_| {
                            loads.fetch_add(1, Ordering::SeqCst);
                            thread::sleep(Duration::from_millis(50));
                            Ok(Box::new(FixedModel("__label__en")))
                        })
                        .unwrap()
                })
            })
            .collect();

        let models: Vec<Arc<LoadedModel>> =
            handles.into_iter().map(|h| h.join().unwrap()).collect();
        assert_eq!(loads.load(Ordering::SeqCst), 1);
        assert!(models.iter().all(|m| Arc::ptr_eq(m, &models[0])));
    }
}
