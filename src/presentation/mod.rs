//! Presentation layer with headless display targets.

/// File-writing targets and logging listeners.
pub mod headless;

pub use headless::{FileTarget, LoggingListener};
