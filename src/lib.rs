//! Pixload - asynchronous image loading with two-tier caching.
//!
//! Images are fetched by id, decoded at a size suited to their display
//! target, cached in memory and on disc, and applied to targets whose
//! binding may change while the fetch is still running.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

/// Domain layer containing entities, errors, and port definitions.
pub mod domain;
/// Infrastructure layer containing caches, decoder, scheduler and loader.
pub mod infrastructure;
/// Presentation layer containing headless targets and listeners.
pub mod presentation;

/// Current version of the application.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Application name.
pub const NAME: &str = "pixload";
