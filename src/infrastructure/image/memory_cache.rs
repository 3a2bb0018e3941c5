//! In-memory LRU image cache implementation.

use std::num::NonZeroUsize;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use lru::LruCache;
use parking_lot::Mutex;
use tracing::{debug, trace};

use crate::domain::entities::CacheKey;
use crate::domain::ports::MemoryCache;

/// Default maximum number of images to cache in memory.
pub const DEFAULT_CACHE_SIZE: usize = 64;

/// In-memory LRU cache for decoded images.
/// Thread-safe; the lock is never held across an await point.
pub struct LruMemoryCache {
    cache: Mutex<LruCache<CacheKey, Arc<image::DynamicImage>>>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl LruMemoryCache {
    /// Creates a new cache with the specified capacity.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let cap = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            cache: Mutex::new(LruCache::new(cap)),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    /// Creates a new cache with the default capacity.
    #[must_use]
    pub fn with_default_capacity() -> Self {
        Self::new(DEFAULT_CACHE_SIZE)
    }

    /// Returns cache statistics.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn stats(&self) -> CacheStats {
        let hits = self.hits.load(Ordering::Relaxed);
        let misses = self.misses.load(Ordering::Relaxed);
        let total = hits + misses;
        let hit_rate = if total > 0 {
            (hits as f64 / total as f64) * 100.0
        } else {
            0.0
        };
        CacheStats {
            hits,
            misses,
            hit_rate,
            size: self.len(),
        }
    }

    /// Peeks at an image without promoting it in the LRU.
    pub fn peek(&self, key: &CacheKey) -> Option<Arc<image::DynamicImage>> {
        self.cache.lock().peek(key).cloned()
    }
}

impl Default for LruMemoryCache {
    fn default() -> Self {
        Self::with_default_capacity()
    }
}

/// Statistics about cache performance.
#[derive(Debug, Clone)]
pub struct CacheStats {
    /// Number of cache hits.
    pub hits: u64,
    /// Number of cache misses.
    pub misses: u64,
    /// Hit rate as a percentage.
    pub hit_rate: f64,
    /// Current number of cached images.
    pub size: usize,
}

impl std::fmt::Display for CacheStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Cache: {} images, {:.1}% hit rate ({} hits, {} misses)",
            self.size, self.hit_rate, self.hits, self.misses
        )
    }
}

impl MemoryCache for LruMemoryCache {
    fn get(&self, key: &CacheKey) -> Option<Arc<image::DynamicImage>> {
        let mut cache = self.cache.lock();
        if let Some(img) = cache.get(key) {
            self.hits.fetch_add(1, Ordering::Relaxed);
            trace!(key = %key, "Memory cache hit");
            Some(img.clone())
        } else {
            self.misses.fetch_add(1, Ordering::Relaxed);
            trace!(key = %key, "Memory cache miss");
            None
        }
    }

    fn put(&self, key: CacheKey, image: Arc<image::DynamicImage>) {
        debug!(key = %key, "Storing image in memory cache");
        self.cache.lock().put(key, image);
    }

    fn put_exclusive(&self, key: CacheKey, image: Arc<image::DynamicImage>) {
        let mut cache = self.cache.lock();
        let others: Vec<CacheKey> = cache
            .iter()
            .filter(|(existing, _)| **existing != key && existing.same_image(&key))
            .map(|(existing, _)| existing.clone())
            .collect();
        for existing in &others {
            cache.pop(existing);
        }
        cache.put(key.clone(), image);
        drop(cache);
        debug!(key = %key, replaced = others.len(), "Stored single size in memory cache");
    }

    fn remove(&self, key: &CacheKey) -> Option<Arc<image::DynamicImage>> {
        let removed = self.cache.lock().pop(key);
        if removed.is_some() {
            debug!(key = %key, "Evicted image from memory cache");
        }
        removed
    }

    fn keys(&self) -> Vec<CacheKey> {
        self.cache.lock().iter().map(|(k, _)| k.clone()).collect()
    }

    fn len(&self) -> usize {
        self.cache.lock().len()
    }

    fn clear(&self) {
        self.cache.lock().clear();
        debug!("Cleared memory image cache");
    }
}
