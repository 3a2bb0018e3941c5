//! Domain layer with core entities and port definitions.

/// Entity definitions.
pub mod entities;
/// Error types.
pub mod errors;
/// Port definitions.
pub mod ports;

pub use entities::{CacheKey, DecodingPolicy, DisplayOptions, ImageId, ImageSize};
pub use errors::{DecodeError, LoadError};
pub use ports::{DisplayTarget, ImageLoadingListener, MemoryCache, PersistentCache, SourceProvider};
