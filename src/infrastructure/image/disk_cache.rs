//! Disk-based image cache for persistence across sessions.
//!
//! Files are named after a digest of the image id and written through a
//! `.part` file that is renamed into place once complete, so a failed copy
//! never leaves a readable entry behind.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

use async_trait::async_trait;
use tokio::fs;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::sync::Mutex;
use tracing::{debug, trace, warn};

use crate::domain::entities::ImageId;
use crate::domain::ports::{CacheError, CacheResult, PersistentCache};

/// Maximum disk cache size in bytes (200 MB default).
pub const DEFAULT_MAX_CACHE_SIZE: u64 = 200 * 1024 * 1024;

const ENTRY_EXTENSION: &str = "img";
const PARTIAL_EXTENSION: &str = "part";
const COPY_BUFFER_SIZE: usize = 8 * 1024;

/// Disk-based image cache that persists raw image bytes.
pub struct DiskImageCache {
    cache_dir: PathBuf,
    max_size: u64,
    current_size: AtomicU64,
    item_count: AtomicUsize,
    write_seq: AtomicU64,
    /// Serializes renames, removals and the counter updates that go with them.
    commit_lock: Mutex<()>,
}

impl DiskImageCache {
    /// Creates a new disk cache in the specified directory.
    ///
    /// Leftover `.part` files from interrupted writes are removed.
    ///
    /// # Errors
    /// Returns error if cache directory cannot be created.
    pub async fn new(cache_dir: PathBuf, max_size: u64) -> CacheResult<Self> {
        fs::create_dir_all(&cache_dir)
            .await
            .map_err(|e| CacheError::IoError(format!("Failed to create cache dir: {e}")))?;
        let mut total_size = 0u64;
        let mut count = 0usize;

        let mut entries = fs::read_dir(&cache_dir)
            .await
            .map_err(|e| CacheError::IoError(format!("Failed to read cache dir: {e}")))?;

        while let Ok(Some(entry)) = entries.next_entry().await {
            let path = entry.path();
            if has_extension(&path, PARTIAL_EXTENSION) {
                if let Err(e) = fs::remove_file(&path).await {
                    warn!(path = %path.display(), error = %e, "Failed to remove stale partial file");
                }
            } else if has_extension(&path, ENTRY_EXTENSION)
                && let Ok(meta) = entry.metadata().await
            {
                total_size += meta.len();
                count += 1;
            }
        }

        let cache = Self {
            cache_dir,
            max_size,
            current_size: AtomicU64::new(total_size),
            item_count: AtomicUsize::new(count),
            write_seq: AtomicU64::new(0),
            commit_lock: Mutex::new(()),
        };

        cache.cleanup_if_needed(None).await;

        Ok(cache)
    }

    /// Returns the directory holding the cache files.
    #[must_use]
    pub fn cache_dir(&self) -> &Path {
        &self.cache_dir
    }

    /// Returns the path for a cached image.
    fn cache_path(&self, id: &ImageId) -> PathBuf {
        self.cache_dir
            .join(format!("{}.{ENTRY_EXTENSION}", id.digest()))
    }

    fn partial_path(&self, id: &ImageId) -> PathBuf {
        let seq = self.write_seq.fetch_add(1, Ordering::Relaxed);
        self.cache_dir
            .join(format!("{}.{seq}.{PARTIAL_EXTENSION}", id.digest()))
    }

    /// Gets raw image bytes from disk cache.
    pub async fn get_bytes(&self, id: &ImageId) -> Option<Vec<u8>> {
        let path = self.cache_path(id);
        if let Ok(bytes) = fs::read(&path).await {
            trace!(id = %id, path = %path.display(), "Disk cache hit");
            Some(bytes)
        } else {
            trace!(id = %id, "Disk cache miss");
            None
        }
    }

    /// Returns the current cache size in bytes.
    #[must_use]
    pub fn current_size(&self) -> u64 {
        self.current_size.load(Ordering::Relaxed)
    }

    /// Returns the number of cached files.
    #[must_use]
    pub fn len(&self) -> usize {
        self.item_count.load(Ordering::Relaxed)
    }

    /// Returns true if the cache is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    async fn copy_into(
        path: &Path,
        reader: &mut (dyn AsyncRead + Send + Unpin),
    ) -> CacheResult<u64> {
        let mut file = fs::File::create(path)
            .await
            .map_err(|e| CacheError::IoError(format!("Failed to create cache file: {e}")))?;

        let mut buf = vec![0u8; COPY_BUFFER_SIZE];
        let mut written = 0u64;
        loop {
            let n = reader
                .read(&mut buf)
                .await
                .map_err(|e| CacheError::SourceError(format!("Failed to read source: {e}")))?;
            if n == 0 {
                break;
            }
            file.write_all(&buf[..n])
                .await
                .map_err(|e| CacheError::IoError(format!("Failed to write cache file: {e}")))?;
            written += n as u64;
        }

        file.flush()
            .await
            .map_err(|e| CacheError::IoError(format!("Failed to flush cache file: {e}")))?;
        Ok(written)
    }

    /// Cleans up old cache entries if over size limit. `keep` is never
    /// evicted, even when it alone exceeds the limit.
    async fn cleanup_if_needed(&self, keep: Option<&Path>) {
        let _commit = self.commit_lock.lock().await;
        let current_size = self.current_size();
        if current_size <= self.max_size {
            return;
        }

        debug!(
            current_size = current_size,
            max_size = self.max_size,
            "Disk cache over limit, cleaning up"
        );

        let Ok(mut entries) = fs::read_dir(&self.cache_dir).await else {
            return;
        };

        let mut files: Vec<(PathBuf, std::time::SystemTime, u64)> = Vec::new();

        while let Ok(Some(entry)) = entries.next_entry().await {
            let path = entry.path();
            if !has_extension(&path, ENTRY_EXTENSION) || Some(path.as_path()) == keep {
                continue;
            }

            if let Ok(meta) = entry.metadata().await {
                let accessed = meta
                    .accessed()
                    .or_else(|_| meta.modified())
                    .unwrap_or(std::time::SystemTime::UNIX_EPOCH);
                files.push((path, accessed, meta.len()));
            }
        }

        files.sort_by_key(|(_, time, _)| *time);

        let mut freed_size = 0u64;
        let mut freed_count = 0usize;
        let target = current_size - self.max_size + (self.max_size / 10);

        for (path, _, size) in files {
            if freed_size >= target {
                break;
            }

            if let Err(e) = fs::remove_file(&path).await {
                warn!(path = %path.display(), error = %e, "Failed to remove old cache file");
            } else {
                debug!(path = %path.display(), "Removed old cache file");
                freed_size += size;
                freed_count += 1;
            }
        }
        self.current_size.fetch_sub(
            freed_size.min(self.current_size.load(Ordering::Relaxed)),
            Ordering::Relaxed,
        );
        self.item_count.fetch_sub(
            freed_count.min(self.item_count.load(Ordering::Relaxed)),
            Ordering::Relaxed,
        );

        debug!(
            freed_size = freed_size,
            freed_count = freed_count,
            "Disk cache cleanup complete"
        );
    }
}

#[async_trait]
impl PersistentCache for DiskImageCache {
    fn contains(&self, id: &ImageId) -> bool {
        self.cache_path(id).is_file()
    }

    async fn path_for(&self, id: &ImageId) -> Option<PathBuf> {
        let path = self.cache_path(id);
        if fs::try_exists(&path).await.unwrap_or(false) {
            Some(path)
        } else {
            None
        }
    }

    async fn put_stream(
        &self,
        id: &ImageId,
        reader: &mut (dyn AsyncRead + Send + Unpin),
    ) -> CacheResult<u64> {
        let partial = self.partial_path(id);

        let new_size = match Self::copy_into(&partial, reader).await {
            Ok(written) => written,
            Err(e) => {
                if let Err(rm) = fs::remove_file(&partial).await
                    && rm.kind() != std::io::ErrorKind::NotFound
                {
                    warn!(path = %partial.display(), error = %rm, "Failed to remove partial cache file");
                }
                warn!(id = %id, error = %e, "Discarded partial disk cache write");
                return Err(e);
            }
        };

        let path = self.cache_path(id);
        let commit = self.commit_lock.lock().await;
        let old_size = fs::metadata(&path).await.map(|m| m.len()).ok();

        if let Err(e) = fs::rename(&partial, &path).await {
            drop(commit);
            let _ = fs::remove_file(&partial).await;
            return Err(CacheError::IoError(format!(
                "Failed to move cache file into place: {e}"
            )));
        }

        if let Some(old) = old_size {
            if new_size > old {
                self.current_size
                    .fetch_add(new_size - old, Ordering::Relaxed);
            } else {
                self.current_size
                    .fetch_sub(old - new_size, Ordering::Relaxed);
            }
        } else {
            self.current_size.fetch_add(new_size, Ordering::Relaxed);
            self.item_count.fetch_add(1, Ordering::Relaxed);
        }
        drop(commit);

        debug!(id = %id, path = %path.display(), size = new_size, "Stored image in disk cache");

        self.cleanup_if_needed(Some(&path)).await;

        Ok(new_size)
    }

    async fn remove(&self, id: &ImageId) {
        let path = self.cache_path(id);
        let _commit = self.commit_lock.lock().await;
        let size = fs::metadata(&path).await.map(|m| m.len()).ok();
        if let Err(e) = fs::remove_file(&path).await {
            if e.kind() != std::io::ErrorKind::NotFound {
                warn!(id = %id, error = %e, "Failed to evict from disk cache");
            }
        } else if let Some(s) = size {
            self.current_size.fetch_sub(s, Ordering::Relaxed);
            self.item_count.fetch_sub(1, Ordering::Relaxed);
            debug!(id = %id, "Evicted from disk cache");
        }
    }

    async fn clear(&self) -> CacheResult<()> {
        let _commit = self.commit_lock.lock().await;
        let mut entries = fs::read_dir(&self.cache_dir)
            .await
            .map_err(|e| CacheError::IoError(format!("Failed to read cache dir: {e}")))?;

        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| CacheError::IoError(format!("Failed to read entry: {e}")))?
        {
            let path = entry.path();
            if has_extension(&path, ENTRY_EXTENSION) && fs::remove_file(&path).await.is_err() {
                warn!(path = %path.display(), "Failed to remove cache file");
            }
        }
        self.current_size.store(0, Ordering::Relaxed);
        self.item_count.store(0, Ordering::Relaxed);
        debug!("Cleared disk cache");
        Ok(())
    }
}

fn has_extension(path: &Path, ext: &str) -> bool {
    path.extension().is_some_and(|e| e == ext)
}

/// Returns the default cache directory path.
#[must_use]
pub fn default_cache_dir() -> PathBuf {
    directories::ProjectDirs::from("com", "linuxmobile", "pixload").map_or_else(
        || {
            std::env::temp_dir()
                .join("pixload")
                .join("cache")
                .join("images")
        },
        |dirs| dirs.cache_dir().join("images"),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ports::mock::FailingReader;
    use tempfile::TempDir;

    async fn create_test_cache() -> (DiskImageCache, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let cache = DiskImageCache::new(temp_dir.path().to_path_buf(), 1024 * 1024)
            .await
            .unwrap();
        (cache, temp_dir)
    }

    fn dir_entries(dir: &Path) -> Vec<PathBuf> {
        std::fs::read_dir(dir)
            .unwrap()
            .map(|e| e.unwrap().path())
            .collect()
    }

    #[tokio::test]
    async fn test_put_and_get_bytes() {
        let (cache, _temp) = create_test_cache().await;
        let id = ImageId::new("https://example.com/a.png");
        let data = b"test image data";

        cache.put_bytes(&id, data).await.unwrap();
        let retrieved = cache.get_bytes(&id).await;

        assert_eq!(retrieved.as_deref(), Some(&data[..]));
        assert!(cache.contains(&id));
        assert!(cache.path_for(&id).await.is_some());
    }

    #[tokio::test]
    async fn test_cache_miss() {
        let (cache, _temp) = create_test_cache().await;
        let id = ImageId::new("nonexistent");

        assert!(cache.get_bytes(&id).await.is_none());
        assert!(!cache.contains(&id));
        assert!(cache.path_for(&id).await.is_none());
    }

    #[tokio::test]
    async fn test_failed_stream_leaves_no_file() {
        let (cache, temp) = create_test_cache().await;
        let id = ImageId::new("broken");

        let mut reader = FailingReader::new(b"partial bytes");
        let result = cache.put_stream(&id, &mut reader).await;

        assert!(matches!(result, Err(CacheError::SourceError(_))));
        assert!(!cache.contains(&id));
        assert!(dir_entries(temp.path()).is_empty());
        assert_eq!(cache.len(), 0);
        assert_eq!(cache.current_size(), 0);
    }

    #[tokio::test]
    async fn test_failed_overwrite_keeps_previous_copy() {
        let (cache, _temp) = create_test_cache().await;
        let id = ImageId::new("img");
        cache.put_bytes(&id, b"good").await.unwrap();

        let mut reader = FailingReader::new(b"bad");
        assert!(cache.put_stream(&id, &mut reader).await.is_err());

        assert_eq!(cache.get_bytes(&id).await.as_deref(), Some(&b"good"[..]));
    }

    #[tokio::test]
    async fn test_stale_partial_files_removed_on_open() {
        let temp = TempDir::new().unwrap();
        std::fs::write(temp.path().join("abc.0.part"), b"junk").unwrap();
        std::fs::write(temp.path().join("abc.img"), b"data").unwrap();

        let cache = DiskImageCache::new(temp.path().to_path_buf(), 1024)
            .await
            .unwrap();

        assert_eq!(dir_entries(temp.path()).len(), 1);
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.current_size(), 4);
    }

    #[tokio::test]
    async fn test_evict() {
        let (cache, _temp) = create_test_cache().await;
        let id = ImageId::new("test1");

        cache.put_bytes(&id, b"test").await.unwrap();
        assert!(cache.contains(&id));

        cache.remove(&id).await;
        assert!(!cache.contains(&id));
    }

    #[tokio::test]
    async fn test_clear() {
        let (cache, _temp) = create_test_cache().await;

        cache
            .put_bytes(&ImageId::new("test1"), b"data1")
            .await
            .unwrap();
        cache
            .put_bytes(&ImageId::new("test2"), b"data2")
            .await
            .unwrap();

        assert_eq!(cache.len(), 2);

        cache.clear().await.unwrap();
        assert_eq!(cache.len(), 0);
        assert!(!cache.contains(&ImageId::new("test1")));
    }

    #[tokio::test]
    async fn test_atomic_counters_sync() {
        let (cache, _temp) = create_test_cache().await;

        assert_eq!(cache.current_size(), 0);
        assert_eq!(cache.len(), 0);

        cache
            .put_bytes(&ImageId::new("test1"), b"hello")
            .await
            .unwrap();
        cache
            .put_bytes(&ImageId::new("test2"), b"world!")
            .await
            .unwrap();

        assert_eq!(cache.len(), 2);
        assert_eq!(cache.current_size(), 11);

        cache
            .put_bytes(&ImageId::new("test1"), b"hey")
            .await
            .unwrap();
        assert_eq!(cache.len(), 2);
        assert_eq!(cache.current_size(), 9);

        cache.remove(&ImageId::new("test2")).await;
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.current_size(), 3);

        cache.clear().await.unwrap();
        assert_eq!(cache.len(), 0);
        assert_eq!(cache.current_size(), 0);
    }

    #[tokio::test]
    async fn test_cleanup_updates_counters() {
        let temp_dir = TempDir::new().unwrap();
        let cache = DiskImageCache::new(temp_dir.path().to_path_buf(), 10)
            .await
            .unwrap();

        cache
            .put_bytes(&ImageId::new("test1"), b"123456")
            .await
            .unwrap();

        tokio::time::sleep(std::time::Duration::from_millis(10)).await;

        cache
            .put_bytes(&ImageId::new("test2"), b"123456")
            .await
            .unwrap();

        assert_eq!(cache.len(), 1);
        assert_eq!(cache.current_size(), 6);
    }

    #[tokio::test]
    async fn test_oversized_entry_survives_its_own_cleanup() {
        let temp_dir = TempDir::new().unwrap();
        let cache = DiskImageCache::new(temp_dir.path().to_path_buf(), 64)
            .await
            .unwrap();
        let small = ImageId::new("small");
        let big = ImageId::new("big");

        cache.put_bytes(&small, &[1u8; 10]).await.unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        cache.put_bytes(&big, &[7u8; 200]).await.unwrap();

        assert!(cache.path_for(&big).await.is_some());
        assert!(!cache.contains(&small));
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.current_size(), 200);
    }

    #[tokio::test]
    async fn test_concurrent_first_writes_count_once() {
        let (cache, _temp) = create_test_cache().await;
        let id = ImageId::new("same");

        let (a, b) = tokio::join!(
            cache.put_bytes(&id, b"first"),
            cache.put_bytes(&id, b"other")
        );
        a.unwrap();
        b.unwrap();

        assert_eq!(cache.len(), 1);
        assert_eq!(cache.current_size(), 5);
    }
}
