//! Async image loading orchestrator.
//!
//! Requests are served from the memory cache when possible. Otherwise the
//! target is bound to the request and a task runs on one of two pools: the
//! fast pool when the bytes are already on disc, the general pool when the
//! source provider has to be asked. A task re-checks its binding before it
//! fetches, after it decodes, and right before the image is applied, so a
//! target that was reassigned in the meantime is never overwritten.

use std::sync::{Arc, OnceLock, Weak};

use bytes::Bytes;
use futures_util::FutureExt;
use image::DynamicImage;
use tokio::io::AsyncReadExt;
use tokio::runtime::Handle;
use tracing::{debug, info, trace, warn};

use crate::domain::entities::{CacheKey, DisplayOptions, ImageId, ImageOrigin, ImageSize};
use crate::domain::errors::LoadError;
use crate::domain::ports::{
    DecodeSource, DisplayTarget, ImageDecoder, ImageLoadingListener, ImageSource, MemoryCache,
    NoopListener, PersistentCache, SizeResolver, SourceProvider,
};
use crate::infrastructure::config::LoaderSettings;

use super::configuration::ImageLoaderConfiguration;
use super::memory_cache::{CacheStats, LruMemoryCache};
use super::registry::{BindingTicket, TargetBindingRegistry};
use super::scheduler::{DualPoolScheduler, PoolKind, PoolStats};
use super::source::RemoteFetcher;

/// Attempts made to decode one image when memory runs out.
pub const DECODE_ATTEMPTS: u32 = 3;

/// Loads images into display targets. Must be initialized once before use.
#[derive(Default)]
pub struct ImageLoader {
    engine: OnceLock<Arc<Engine>>,
}

impl std::fmt::Debug for ImageLoader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ImageLoader")
            .field("initialized", &self.is_initialized())
            .finish_non_exhaustive()
    }
}

/// Shared state behind an initialized loader.
struct Engine {
    settings: LoaderSettings,
    memory_cache: Arc<dyn MemoryCache>,
    memory_stats: Option<Arc<LruMemoryCache>>,
    persistent_cache: Arc<dyn PersistentCache>,
    decoder: Arc<dyn ImageDecoder>,
    size_resolver: Arc<dyn SizeResolver>,
    fetcher: RemoteFetcher,
    registry: TargetBindingRegistry,
    scheduler: DualPoolScheduler,
}

impl ImageLoader {
    /// Creates an uninitialized loader.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Initializes the loader. Only the first call has an effect.
    ///
    /// Returns true if this call initialized the loader. Must be called from
    /// within a tokio runtime; tasks are spawned onto it.
    ///
    /// # Errors
    /// Returns `NoRuntime` if called outside a tokio runtime.
    pub fn init(&self, configuration: ImageLoaderConfiguration) -> Result<bool, LoadError> {
        if self.is_initialized() {
            debug!("Image loader already initialized");
            return Ok(false);
        }

        let runtime = Handle::try_current().map_err(|e| LoadError::NoRuntime {
            message: e.to_string(),
        })?;

        let ImageLoaderConfiguration {
            settings,
            memory_cache,
            memory_stats,
            persistent_cache,
            decoder,
            size_resolver,
            fetcher,
        } = configuration;

        let engine = Engine {
            scheduler: DualPoolScheduler::new(runtime, settings.general_pool_size),
            registry: TargetBindingRegistry::new(),
            settings,
            memory_cache,
            memory_stats,
            persistent_cache,
            decoder,
            size_resolver,
            fetcher,
        };

        let initialized = self.engine.set(Arc::new(engine)).is_ok();
        if initialized {
            info!("Image loader initialized");
        }
        Ok(initialized)
    }

    /// Returns true once `init` has succeeded.
    #[must_use]
    pub fn is_initialized(&self) -> bool {
        self.engine.get().is_some()
    }

    fn engine(&self) -> Result<&Arc<Engine>, LoadError> {
        self.engine.get().ok_or(LoadError::NotInitialized)
    }

    /// Displays the image `id` in `target`.
    ///
    /// A memory cache hit is applied before this returns. Otherwise the stub
    /// (or nothing) is shown and the image is applied later on the target's
    /// owning context. Any earlier request for `target` is superseded.
    ///
    /// # Errors
    /// Returns `NotInitialized` if `init` was not called, `InvalidTarget` if
    /// no usable decode size can be resolved for `target`.
    pub fn display_image(
        &self,
        id: ImageId,
        provider: Arc<dyn SourceProvider>,
        target: Arc<dyn DisplayTarget>,
        options: Option<DisplayOptions>,
        listener: Option<Arc<dyn ImageLoadingListener>>,
    ) -> Result<(), LoadError> {
        let engine = self.engine()?;
        let options = options.unwrap_or_else(|| engine.settings.default_display_options.clone());
        let listener: Arc<dyn ImageLoadingListener> = match listener {
            Some(listener) => listener,
            None => Arc::new(NoopListener),
        };

        if id.is_empty() {
            engine.registry.unbind(&target);
            if options.show_placeholder_for_empty_id {
                target.apply_placeholder(&options.empty_placeholder);
            } else {
                target.clear_image();
            }
            return Ok(());
        }

        let size = engine.size_resolver.resolve(target.as_ref());
        if size.width == 0 || size.height == 0 {
            return Err(LoadError::invalid_target(format!(
                "decode size {size} has a zero dimension"
            )));
        }
        let key = CacheKey::generate(&id, size);
        let ticket = engine.registry.bind(&target, key.clone());

        if let Some(image) = engine.memory_cache.get(&key) {
            debug!(key = %key, origin = %ImageOrigin::MemoryCache, "Loaded image");
            listener.on_loading_started(&id);
            target.apply_image(image.clone());
            listener.on_loading_complete(&id, &image);
            return Ok(());
        }

        listener.on_loading_started(&id);
        if options.show_stub_while_loading {
            target.apply_placeholder(&options.stub_placeholder);
        } else {
            target.clear_image();
        }

        let pool = if engine.persistent_cache.contains(&id) {
            PoolKind::Fast
        } else {
            PoolKind::General
        };

        let task = LoadTask {
            engine: engine.clone(),
            id,
            provider,
            target: Arc::downgrade(&target),
            ticket,
            size,
            options,
            listener,
        };

        trace!(key = %key, pool = %pool, "Submitting load task");
        let job = async move {
            let outcome = task.run().await;
            debug!(key = %key, outcome = %outcome, "Load task finished");
        }
        .boxed();

        if engine.scheduler.submit(pool, job) {
            Ok(())
        } else {
            Err(LoadError::io(format!("{pool} pool rejected the task")))
        }
    }

    /// Cancels the pending request for `target`. Running tasks notice at
    /// their next check and drop their result.
    pub fn cancel(&self, target: &Arc<dyn DisplayTarget>) {
        if let Ok(engine) = self.engine()
            && engine.registry.unbind(target)
        {
            debug!("Cancelled display task");
        }
    }

    /// Drops everything the loader remembers about `target`, plus the
    /// bindings of targets that no longer exist.
    pub fn forget_target(&self, target: &Arc<dyn DisplayTarget>) {
        if let Ok(engine) = self.engine() {
            engine.registry.unbind(target);
            let pruned = engine.registry.prune();
            if pruned > 0 {
                trace!(count = pruned, "Pruned bindings of destroyed targets");
            }
        }
    }

    /// Clears the memory cache. Does nothing before `init`.
    pub fn clear_memory_cache(&self) {
        if let Ok(engine) = self.engine() {
            engine.memory_cache.clear();
        }
    }

    /// Clears the disc cache. Does nothing before `init`.
    ///
    /// # Errors
    /// Returns error if the cache storage cannot be enumerated.
    pub async fn clear_disc_cache(&self) -> Result<(), LoadError> {
        if let Ok(engine) = self.engine() {
            engine.persistent_cache.clear().await?;
            info!("Cleared disc cache");
        }
        Ok(())
    }

    /// Stops accepting tasks. Submitted tasks still finish; the next
    /// `display_image` restarts the pools.
    pub fn stop(&self) {
        if let Ok(engine) = self.engine() {
            engine.scheduler.stop();
        }
    }

    /// Returns scheduler counters.
    #[must_use]
    pub fn pool_stats(&self) -> PoolStats {
        self.engine()
            .map(|engine| engine.scheduler.stats())
            .unwrap_or_default()
    }

    /// Returns memory cache statistics when the default cache is in use.
    #[must_use]
    pub fn memory_cache_stats(&self) -> Option<CacheStats> {
        self.engine()
            .ok()
            .and_then(|engine| engine.memory_stats.as_ref())
            .map(|lru| lru.stats())
    }

    /// Waits until every submitted task has finished.
    pub async fn wait_idle(&self) {
        if let Ok(engine) = self.engine() {
            engine.scheduler.wait_idle().await;
        }
    }
}

/// How a load task ended.
#[derive(Debug)]
enum TaskOutcome {
    /// The binding moved on; nothing was reported.
    Stale { stage: &'static str },
    /// The image was handed to the owning context.
    Posted { origin: ImageOrigin },
    /// The listener was told about the failure.
    Failed(LoadError),
}

impl std::fmt::Display for TaskOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Stale { stage } => write!(f, "stale at {stage}"),
            Self::Posted { origin } => write!(f, "posted ({origin})"),
            Self::Failed(e) => write!(f, "failed: {e}"),
        }
    }
}

/// One request, from fetch to apply.
struct LoadTask {
    engine: Arc<Engine>,
    id: ImageId,
    provider: Arc<dyn SourceProvider>,
    target: Weak<dyn DisplayTarget>,
    ticket: BindingTicket,
    size: ImageSize,
    options: DisplayOptions,
    listener: Arc<dyn ImageLoadingListener>,
}

impl LoadTask {
    async fn run(self) -> TaskOutcome {
        if !self.is_current() {
            return TaskOutcome::Stale { stage: "pre-check" };
        }

        let (image, origin) = match self.load().await {
            Ok(loaded) => loaded,
            Err(e) => {
                warn!(id = %self.id, error = %e, "Failed to load image");
                self.report_failure(&e);
                return TaskOutcome::Failed(e);
            }
        };

        if !self.is_current() {
            return TaskOutcome::Stale { stage: "post-check" };
        }

        if self.options.cache_in_memory {
            self.engine
                .memory_cache
                .put(self.ticket.key().clone(), image.clone());
        }

        self.post_apply(image, origin)
    }

    fn is_current(&self) -> bool {
        self.engine.registry.is_current(&self.ticket)
    }

    async fn load(&self) -> Result<(Arc<DynamicImage>, ImageOrigin), LoadError> {
        let cache = &self.engine.persistent_cache;

        if let Some(path) = cache.path_for(&self.id).await {
            debug!(key = %self.ticket.key(), "Loading image from disc cache");
            match self.decode_with_retry(DecodeSource::File(path)).await {
                Ok(image) => return Ok((Arc::new(image), ImageOrigin::DiscCache)),
                Err(e @ LoadError::DecodeExhausted { .. }) => return Err(e),
                Err(e) => {
                    warn!(id = %self.id, error = %e, "Discarding unreadable disc cache copy");
                    cache.remove(&self.id).await;
                }
            }
        }

        debug!(key = %self.ticket.key(), "Loading image from source provider");
        let source = self.provider.fetch(&self.id).await?;
        trace!(id = %self.id, kind = source.kind(), "Source provider answered");

        let decode_source = if self.options.cache_on_disc {
            self.store_on_disc(source).await?
        } else {
            self.materialize(source).await?
        };

        let image = self.decode_with_retry(decode_source).await?;
        Ok((Arc::new(image), ImageOrigin::Provider))
    }

    /// Copies the source into the persistent cache and returns the cached file.
    async fn store_on_disc(&self, source: ImageSource) -> Result<DecodeSource, LoadError> {
        let cache = &self.engine.persistent_cache;
        debug!(key = %self.ticket.key(), "Caching image on disc");

        match source {
            ImageSource::Stream(mut reader) => {
                cache.put_stream(&self.id, &mut *reader).await?;
            }
            ImageSource::Remote(locator) => {
                let mut reader = self.engine.fetcher.open(&locator).await?;
                cache.put_stream(&self.id, &mut *reader).await?;
            }
            ImageSource::Decoded(image) => {
                let bytes = encode_png(image).await?;
                cache.put_bytes(&self.id, &bytes).await?;
            }
        }

        cache
            .path_for(&self.id)
            .await
            .map(DecodeSource::File)
            .ok_or_else(|| LoadError::io(format!("disc cache copy of '{}' vanished", self.id)))
    }

    /// Turns the source into something the decoder can read twice.
    async fn materialize(&self, source: ImageSource) -> Result<DecodeSource, LoadError> {
        let mut reader = match source {
            ImageSource::Decoded(image) => return Ok(DecodeSource::Image(image)),
            ImageSource::Stream(reader) => reader,
            ImageSource::Remote(locator) => self.engine.fetcher.open(&locator).await?,
        };

        let mut buf = Vec::new();
        reader
            .read_to_end(&mut buf)
            .await
            .map_err(|e| LoadError::io(format!("Failed to read image source: {e}")))?;
        Ok(DecodeSource::Bytes(Bytes::from(buf)))
    }

    /// Decodes on a blocking thread. Out-of-memory failures free what they
    /// can, back off and try again; anything else fails at once.
    async fn decode_with_retry(&self, source: DecodeSource) -> Result<DynamicImage, LoadError> {
        let engine = &self.engine;
        let backoff = engine.settings.retry_backoff();
        let (size, policy) = (self.size, self.options.decoding_policy);

        let mut attempt = 1;
        loop {
            let decoder = engine.decoder.clone();
            let source = source.clone();
            let result = tokio::task::spawn_blocking(move || decoder.decode(&source, size, policy))
                .await
                .map_err(|e| LoadError::decode(format!("Decode task panicked: {e}")))?;

            let error = match result {
                Ok(image) => return Ok(image),
                Err(e) if !e.is_out_of_memory() => return Err(e.into()),
                Err(e) => e,
            };

            warn!(id = %self.id, attempt = attempt, error = %error, "Ran out of memory while decoding");
            if attempt >= DECODE_ATTEMPTS {
                return Err(LoadError::DecodeExhausted {
                    attempts: attempt,
                    message: error.to_string(),
                });
            }
            if attempt == 2 {
                engine.memory_cache.clear();
            }
            engine.memory_cache.reclaim();
            tokio::time::sleep(backoff * attempt).await;
            attempt += 1;
        }
    }

    /// Posts the apply step to the target's owning context.
    fn post_apply(self, image: Arc<DynamicImage>, origin: ImageOrigin) -> TaskOutcome {
        let Some(target) = self.target.upgrade() else {
            return TaskOutcome::Stale { stage: "post-check" };
        };
        let Some(context) = target.owner_context() else {
            let error = LoadError::UnsupportedTargetOwner;
            warn!(id = %self.id, error = %error, "Cannot apply image");
            self.listener.on_loading_failed(&self.id, &error);
            return TaskOutcome::Failed(error);
        };
        drop(target);

        let Self {
            engine,
            id,
            target,
            ticket,
            listener,
            ..
        } = self;

        context.post(Box::new(move || {
            if !engine.registry.is_current(&ticket) {
                trace!(key = %ticket.key(), "Target was reassigned before apply");
                return;
            }
            let Some(target) = target.upgrade() else {
                return;
            };
            trace!(key = %ticket.key(), origin = %origin, "Applying image");
            target.apply_image(image.clone());
            listener.on_loading_complete(&id, &image);
        }));

        TaskOutcome::Posted { origin }
    }

    /// Reports `error` on the owning context, or directly if there is none.
    fn report_failure(&self, error: &LoadError) {
        let context = self.target.upgrade().and_then(|t| t.owner_context());
        let listener = self.listener.clone();
        let id = self.id.clone();
        let error = error.clone();

        match context {
            Some(context) => context.post(Box::new(move || listener.on_loading_failed(&id, &error))),
            None => listener.on_loading_failed(&id, &error),
        }
    }
}

/// Encodes an already decoded image so it can be stored on disc.
async fn encode_png(decoded: Arc<DynamicImage>) -> Result<Vec<u8>, LoadError> {
    tokio::task::spawn_blocking(move || {
        let mut out = std::io::Cursor::new(Vec::new());
        decoded
            .write_to(&mut out, image::ImageFormat::Png)
            .map(|()| out.into_inner())
            .map_err(|e| LoadError::io(format!("Failed to encode image: {e}")))
    })
    .await
    .map_err(|e| LoadError::io(format!("Encode task panicked: {e}")))?
}
