//! Port for scaled image decoding.

use std::path::PathBuf;
use std::sync::Arc;

use bytes::Bytes;

use crate::domain::entities::{DecodingPolicy, ImageSize};
use crate::domain::errors::DecodeError;

/// A re-readable source for the decoder.
///
/// The decoder reads bounds in one pass and decodes in a second, so every
/// variant must be cheap to open more than once.
#[derive(Debug, Clone)]
pub enum DecodeSource {
    /// A file in the persistent cache.
    File(PathBuf),
    /// Encoded bytes held in memory.
    Bytes(Bytes),
    /// An image that only needs scaling.
    Image(Arc<image::DynamicImage>),
}

/// Decodes an image scaled close to a target size.
///
/// Decoding is CPU bound and synchronous; callers run it on a blocking thread.
pub trait ImageDecoder: Send + Sync {
    /// Decodes `source`, downscaled towards `target` according to `policy`.
    ///
    /// # Errors
    /// Returns `DecodeError::OutOfMemory` when the attempt may be retried,
    /// any other variant when the source cannot be decoded at all.
    fn decode(
        &self,
        source: &DecodeSource,
        target: ImageSize,
        policy: DecodingPolicy,
    ) -> Result<image::DynamicImage, DecodeError>;
}
