//! Port definitions for the two cache tiers.

use std::path::PathBuf;
use std::sync::Arc;

use tokio::io::AsyncRead;

use crate::domain::entities::{CacheKey, ImageId};

/// Result type for cache operations.
pub type CacheResult<T> = std::result::Result<T, CacheError>;

/// Errors that can occur during cache operations.
#[derive(Debug, Clone, thiserror::Error)]
pub enum CacheError {
    /// I/O error during cache operation.
    #[error("IO error: {0}")]
    IoError(String),
    /// The source stream failed while being copied into the cache.
    #[error("Source read error: {0}")]
    SourceError(String),
}

impl From<CacheError> for crate::domain::errors::LoadError {
    fn from(err: CacheError) -> Self {
        Self::io(err.to_string())
    }
}

/// In-memory cache of decoded images keyed by `CacheKey`.
/// Implementations must be thread-safe and must never hold a lock across an
/// await point, so `clear` cannot deadlock with a concurrent `put`.
pub trait MemoryCache: Send + Sync {
    /// Returns the image for `key`, or None if absent or evicted.
    fn get(&self, key: &CacheKey) -> Option<Arc<image::DynamicImage>>;

    /// Stores an image.
    fn put(&self, key: CacheKey, image: Arc<image::DynamicImage>);

    /// Stores an image after removing every other size of the same id.
    ///
    /// The default works from a `keys` snapshot; implementations holding a
    /// single lock should override it so the eviction and the store happen
    /// together.
    fn put_exclusive(&self, key: CacheKey, image: Arc<image::DynamicImage>) {
        for existing in self.keys() {
            if existing != key && existing.same_image(&key) {
                self.remove(&existing);
            }
        }
        self.put(key, image);
    }

    /// Removes an image, returning it if it was cached.
    fn remove(&self, key: &CacheKey) -> Option<Arc<image::DynamicImage>>;

    /// Returns a snapshot of the cached keys.
    fn keys(&self) -> Vec<CacheKey>;

    /// Returns the current number of cached images.
    fn len(&self) -> usize;

    /// Returns true if the cache is empty.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Clears all images from the cache.
    fn clear(&self);

    /// Best-effort hint to release memory ahead of a retried decode.
    /// Cached entries stay; only `clear` drops them.
    fn reclaim(&self) {}
}

/// Persistent cache holding one full-resolution copy of the raw bytes per id.
#[async_trait::async_trait]
pub trait PersistentCache: Send + Sync {
    /// Checks cheaply whether `id` is cached. Used for routing on the caller's thread.
    fn contains(&self, id: &ImageId) -> bool;

    /// Returns the local file holding the bytes for `id`, if cached.
    async fn path_for(&self, id: &ImageId) -> Option<PathBuf>;

    /// Copies `reader` into the cache under `id` and returns the bytes written.
    ///
    /// # Errors
    /// Returns error if reading or writing fails. No partial file is left behind.
    async fn put_stream(
        &self,
        id: &ImageId,
        reader: &mut (dyn AsyncRead + Send + Unpin),
    ) -> CacheResult<u64>;

    /// Stores `bytes` under `id`.
    ///
    /// # Errors
    /// Returns error if the file cannot be written.
    async fn put_bytes(&self, id: &ImageId, bytes: &[u8]) -> CacheResult<u64> {
        let mut reader = bytes;
        self.put_stream(id, &mut reader).await
    }

    /// Removes the entry for `id`, if any.
    async fn remove(&self, id: &ImageId);

    /// Clears the entire cache.
    ///
    /// # Errors
    /// Returns error if the cache storage cannot be enumerated.
    async fn clear(&self) -> CacheResult<()>;
}
