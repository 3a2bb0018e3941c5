//! Port for retrieving image sources.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::io::AsyncRead;

use crate::domain::entities::ImageId;
use crate::domain::errors::LoadError;

/// What a source provider hands back for an id.
pub enum ImageSource {
    /// Raw encoded bytes, readable once.
    Stream(Box<dyn AsyncRead + Send + Unpin>),
    /// Locator to fetch the bytes from (`http`, `https` or `file` URL).
    Remote(String),
    /// An image that is already decoded.
    Decoded(Arc<image::DynamicImage>),
}

impl ImageSource {
    /// Wraps in-memory bytes as a stream source.
    #[must_use]
    pub fn from_bytes(bytes: impl Into<bytes::Bytes>) -> Self {
        Self::Stream(Box::new(std::io::Cursor::new(bytes.into())))
    }

    /// Short name of the source kind, for logs.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Stream(_) => "stream",
            Self::Remote(_) => "remote",
            Self::Decoded(_) => "decoded",
        }
    }
}

impl std::fmt::Debug for ImageSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Stream(_) => f.debug_tuple("Stream").finish_non_exhaustive(),
            Self::Remote(url) => f.debug_tuple("Remote").field(url).finish(),
            Self::Decoded(img) => f
                .debug_struct("Decoded")
                .field("width", &img.width())
                .field("height", &img.height())
                .finish(),
        }
    }
}

/// Port for retrieving the source of an image by id.
#[async_trait]
pub trait SourceProvider: Send + Sync {
    /// Fetches the source for `id`.
    ///
    /// Called at most once per task, off the caller's thread.
    async fn fetch(&self, id: &ImageId) -> Result<ImageSource, LoadError>;
}
