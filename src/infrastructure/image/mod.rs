//! Image loading infrastructure.
//!
//! This module provides:
//! - Memory caching with LRU eviction
//! - Disc caching for persistence
//! - Scaled decoding
//! - Dual worker pools and target bindings
//! - The async loading orchestrator

pub mod configuration;
pub mod context;
pub mod decoder;
pub mod disk_cache;
pub mod fuzzy_cache;
pub mod loader;
pub mod memory_cache;
pub mod registry;
pub mod scheduler;
pub mod size;
pub mod source;

pub use configuration::{ConfigurationBuilder, ImageLoaderConfiguration};
pub use context::{ChannelContext, InlineContext, MainLoop};
pub use decoder::{ScaledDecoder, compute_scale};
pub use disk_cache::DiskImageCache;
pub use fuzzy_cache::FuzzyKeyMemoryCache;
pub use loader::ImageLoader;
pub use memory_cache::{CacheStats, LruMemoryCache};
pub use registry::{BindingTicket, TargetBindingRegistry, TargetKey};
pub use scheduler::{DualPoolScheduler, PoolKind, PoolStats};
pub use size::FallbackSizeResolver;
pub use source::{RemoteFetcher, UrlSourceProvider};
