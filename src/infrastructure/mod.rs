//! Infrastructure layer with cache, decoder and transport adapters.

/// Loader configuration.
pub mod config;
/// Image handling (caching, decoding, scheduling, loading).
pub mod image;

pub use config::{CliArgs, ConfigStore, LoaderSettings, LogLevel};
pub use self::image::{
    CacheStats, ChannelContext, DiskImageCache, ImageLoader, ImageLoaderConfiguration,
    LruMemoryCache, MainLoop, PoolStats, UrlSourceProvider,
};
