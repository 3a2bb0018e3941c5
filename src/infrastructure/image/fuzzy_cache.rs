//! Memory cache wrapper that keeps a single decoded size per image id.

use std::sync::Arc;

use crate::domain::entities::CacheKey;
use crate::domain::ports::MemoryCache;

/// Wraps a memory cache so that storing a key evicts every other size of the
/// same image. Keys are grouped with `CacheKey::fuzzy_cmp`.
pub struct FuzzyKeyMemoryCache {
    inner: Arc<dyn MemoryCache>,
}

impl FuzzyKeyMemoryCache {
    /// Wraps `inner`.
    #[must_use]
    pub fn new(inner: Arc<dyn MemoryCache>) -> Self {
        Self { inner }
    }
}

impl MemoryCache for FuzzyKeyMemoryCache {
    fn get(&self, key: &CacheKey) -> Option<Arc<image::DynamicImage>> {
        self.inner.get(key)
    }

    fn put(&self, key: CacheKey, image: Arc<image::DynamicImage>) {
        self.inner.put_exclusive(key, image);
    }

    fn put_exclusive(&self, key: CacheKey, image: Arc<image::DynamicImage>) {
        self.inner.put_exclusive(key, image);
    }

    fn remove(&self, key: &CacheKey) -> Option<Arc<image::DynamicImage>> {
        self.inner.remove(key)
    }

    fn keys(&self) -> Vec<CacheKey> {
        self.inner.keys()
    }

    fn len(&self) -> usize {
        self.inner.len()
    }

    fn clear(&self) {
        self.inner.clear();
    }

    fn reclaim(&self) {
        self.inner.reclaim();
    }
}
