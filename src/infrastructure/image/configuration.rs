//! Settings plus the collaborators a loader runs with.

use std::sync::Arc;

use crate::domain::errors::LoadError;
use crate::domain::ports::{ImageDecoder, MemoryCache, PersistentCache, SizeResolver};
use crate::infrastructure::config::LoaderSettings;

use super::decoder::ScaledDecoder;
use super::disk_cache::DiskImageCache;
use super::fuzzy_cache::FuzzyKeyMemoryCache;
use super::memory_cache::LruMemoryCache;
use super::size::FallbackSizeResolver;
use super::source::RemoteFetcher;

/// Everything `ImageLoader::init` needs.
pub struct ImageLoaderConfiguration {
    pub(super) settings: LoaderSettings,
    pub(super) memory_cache: Arc<dyn MemoryCache>,
    pub(super) memory_stats: Option<Arc<LruMemoryCache>>,
    pub(super) persistent_cache: Arc<dyn PersistentCache>,
    pub(super) decoder: Arc<dyn ImageDecoder>,
    pub(super) size_resolver: Arc<dyn SizeResolver>,
    pub(super) fetcher: RemoteFetcher,
}

impl ImageLoaderConfiguration {
    /// Builds a configuration with the default collaborators.
    ///
    /// # Errors
    /// Returns error if the disc cache or HTTP client cannot be created.
    pub async fn from_settings(settings: LoaderSettings) -> Result<Self, LoadError> {
        Self::builder(settings).build().await
    }

    /// Starts a builder for overriding individual collaborators.
    #[must_use]
    pub fn builder(settings: LoaderSettings) -> ConfigurationBuilder {
        ConfigurationBuilder {
            settings,
            memory_cache: None,
            persistent_cache: None,
            decoder: None,
            size_resolver: None,
        }
    }

    /// Returns the settings.
    #[must_use]
    pub const fn settings(&self) -> &LoaderSettings {
        &self.settings
    }
}

impl std::fmt::Debug for ImageLoaderConfiguration {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ImageLoaderConfiguration")
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}

/// Builder for `ImageLoaderConfiguration`. Unset collaborators get defaults.
pub struct ConfigurationBuilder {
    settings: LoaderSettings,
    memory_cache: Option<Arc<dyn MemoryCache>>,
    persistent_cache: Option<Arc<dyn PersistentCache>>,
    decoder: Option<Arc<dyn ImageDecoder>>,
    size_resolver: Option<Arc<dyn SizeResolver>>,
}

impl ConfigurationBuilder {
    /// Uses the given memory cache.
    #[must_use]
    pub fn memory_cache(mut self, cache: Arc<dyn MemoryCache>) -> Self {
        self.memory_cache = Some(cache);
        self
    }

    /// Uses the given persistent cache.
    #[must_use]
    pub fn persistent_cache(mut self, cache: Arc<dyn PersistentCache>) -> Self {
        self.persistent_cache = Some(cache);
        self
    }

    /// Uses the given decoder.
    #[must_use]
    pub fn decoder(mut self, decoder: Arc<dyn ImageDecoder>) -> Self {
        self.decoder = Some(decoder);
        self
    }

    /// Uses the given size resolver.
    #[must_use]
    pub fn size_resolver(mut self, resolver: Arc<dyn SizeResolver>) -> Self {
        self.size_resolver = Some(resolver);
        self
    }

    /// Finishes the configuration.
    ///
    /// # Errors
    /// Returns error if the disc cache or HTTP client cannot be created.
    pub async fn build(self) -> Result<ImageLoaderConfiguration, LoadError> {
        let settings = self.settings;

        let (memory_cache, memory_stats) = match self.memory_cache {
            Some(cache) => (cache, None),
            None => {
                let lru = Arc::new(LruMemoryCache::new(settings.memory_cache_size));
                let cache: Arc<dyn MemoryCache> = if settings.deny_multiple_sizes_in_memory {
                    Arc::new(FuzzyKeyMemoryCache::new(lru.clone()))
                } else {
                    lru.clone()
                };
                (cache, Some(lru))
            }
        };

        let persistent_cache: Arc<dyn PersistentCache> = match self.persistent_cache {
            Some(cache) => cache,
            None => Arc::new(
                DiskImageCache::new(settings.disc_cache_dir.clone(), settings.disc_cache_size)
                    .await?,
            ),
        };

        let decoder: Arc<dyn ImageDecoder> = match self.decoder {
            Some(decoder) => decoder,
            None => Arc::new(ScaledDecoder::new(settings.decode_memory_limit)),
        };
        let size_resolver: Arc<dyn SizeResolver> = match self.size_resolver {
            Some(resolver) => resolver,
            None => Arc::new(FallbackSizeResolver::new(settings.max_image_size())),
        };
        let fetcher = RemoteFetcher::new(settings.connect_timeout(), settings.read_timeout())?;

        Ok(ImageLoaderConfiguration {
            settings,
            memory_cache,
            memory_stats,
            persistent_cache,
            decoder,
            size_resolver,
            fetcher,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::entities::{CacheKey, ImageId, ImageSize};

    fn settings(dir: &tempfile::TempDir) -> LoaderSettings {
        LoaderSettings {
            disc_cache_dir: dir.path().to_path_buf(),
            ..LoaderSettings::default()
        }
    }

    #[tokio::test]
    async fn test_defaults_expose_memory_stats() {
        let dir = tempfile::TempDir::new().unwrap();
        let config = ImageLoaderConfiguration::from_settings(settings(&dir))
            .await
            .unwrap();

        assert!(config.memory_stats.is_some());
        assert_eq!(config.settings().general_pool_size, 3);
    }

    #[tokio::test]
    async fn test_custom_memory_cache_has_no_stats() {
        let dir = tempfile::TempDir::new().unwrap();
        let config = ImageLoaderConfiguration::builder(settings(&dir))
            .memory_cache(Arc::new(LruMemoryCache::new(4)))
            .build()
            .await
            .unwrap();

        assert!(config.memory_stats.is_none());
    }

    #[tokio::test]
    async fn test_deny_multiple_sizes_wraps_cache() {
        let dir = tempfile::TempDir::new().unwrap();
        let config = ImageLoaderConfiguration::from_settings(LoaderSettings {
            deny_multiple_sizes_in_memory: true,
            ..settings(&dir)
        })
        .await
        .unwrap();

        let id = ImageId::new("a");
        let image = Arc::new(image::DynamicImage::new_rgb8(1, 1));
        config
            .memory_cache
            .put(CacheKey::generate(&id, ImageSize::new(10, 10)), image.clone());
        config
            .memory_cache
            .put(CacheKey::generate(&id, ImageSize::new(20, 20)), image);

        assert_eq!(config.memory_cache.len(), 1);
    }
}
