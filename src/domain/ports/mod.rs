//! Port definitions for caches, sources, decoding and display.

mod decoder_port;
mod display_port;
mod image_cache_port;
mod source_port;

pub use decoder_port::{DecodeSource, ImageDecoder};
pub use display_port::{
    ContextJob, DisplayTarget, ExecutionContext, ImageLoadingListener, NoopListener, SizeResolver,
};
pub use image_cache_port::{CacheError, CacheResult, MemoryCache, PersistentCache};
pub use source_port::{ImageSource, SourceProvider};

#[cfg(test)]
pub mod mock;
