//! Decoder error types.

use thiserror::Error;

use super::LoadError;

/// Outcome of a failed decode attempt.
///
/// Only `OutOfMemory` is retryable; everything else ends the attempt for good.
#[derive(Debug, Clone, Error)]
#[allow(missing_docs)]
pub enum DecodeError {
    #[error("out of memory: {message}")]
    OutOfMemory { message: String },

    #[error("malformed image data: {message}")]
    Malformed { message: String },

    #[error("unsupported image format: {message}")]
    Unsupported { message: String },

    #[error("io error while decoding: {message}")]
    Io { message: String },
}

impl DecodeError {
    /// Returns whether the attempt may be retried after freeing memory.
    #[must_use]
    pub const fn is_out_of_memory(&self) -> bool {
        matches!(self, Self::OutOfMemory { .. })
    }

    /// Creates malformed error.
    #[must_use]
    pub fn malformed(message: impl Into<String>) -> Self {
        Self::Malformed {
            message: message.into(),
        }
    }

    /// Creates out of memory error.
    #[must_use]
    pub fn out_of_memory(message: impl Into<String>) -> Self {
        Self::OutOfMemory {
            message: message.into(),
        }
    }
}

impl From<image::ImageError> for DecodeError {
    fn from(err: image::ImageError) -> Self {
        use image::ImageError;
        match err {
            ImageError::Limits(e) => Self::OutOfMemory {
                message: e.to_string(),
            },
            ImageError::IoError(e) => Self::Io {
                message: e.to_string(),
            },
            ImageError::Unsupported(e) => Self::Unsupported {
                message: e.to_string(),
            },
            other => Self::Malformed {
                message: other.to_string(),
            },
        }
    }
}

impl From<std::io::Error> for DecodeError {
    fn from(err: std::io::Error) -> Self {
        Self::Io {
            message: err.to_string(),
        }
    }
}

impl From<DecodeError> for LoadError {
    fn from(err: DecodeError) -> Self {
        match err {
            DecodeError::Io { message } => Self::Io { message },
            other => Self::decode(other.to_string()),
        }
    }
}
