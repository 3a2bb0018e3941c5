//! Image loading error types.

use thiserror::Error;

/// Errors reported by the loader, synchronously or through the listener.
#[derive(Debug, Clone, Error)]
#[allow(missing_docs)]
pub enum LoadError {
    #[error("image loader must be initialized with a configuration before use")]
    NotInitialized,

    #[error("image loader requires a tokio runtime: {message}")]
    NoRuntime { message: String },

    #[error("display target is invalid: {reason}")]
    InvalidTarget { reason: String },

    #[error("unsupported image source: {kind}")]
    UnsupportedSourceType { kind: String },

    #[error("io failure: {message}")]
    Io { message: String },

    #[error("decoding failed: {message}")]
    Decode { message: String },

    #[error("decoding ran out of memory after {attempts} attempts: {message}")]
    DecodeExhausted { attempts: u32, message: String },

    #[error("display target has no owning execution context")]
    UnsupportedTargetOwner,
}

impl LoadError {
    /// Creates io error.
    #[must_use]
    pub fn io(message: impl Into<String>) -> Self {
        Self::Io {
            message: message.into(),
        }
    }

    /// Creates unsupported source error.
    #[must_use]
    pub fn unsupported_source(kind: impl Into<String>) -> Self {
        Self::UnsupportedSourceType { kind: kind.into() }
    }

    /// Creates invalid target error.
    #[must_use]
    pub fn invalid_target(reason: impl Into<String>) -> Self {
        Self::InvalidTarget {
            reason: reason.into(),
        }
    }

    /// Creates decode error.
    #[must_use]
    pub fn decode(message: impl Into<String>) -> Self {
        Self::Decode {
            message: message.into(),
        }
    }

    /// Returns whether retrying the same request later may succeed.
    #[must_use]
    pub const fn is_recoverable(&self) -> bool {
        matches!(self, Self::Io { .. } | Self::DecodeExhausted { .. })
    }

    /// Returns whether the error is a caller precondition violation.
    #[must_use]
    pub const fn is_precondition(&self) -> bool {
        matches!(
            self,
            Self::NotInitialized | Self::NoRuntime { .. } | Self::InvalidTarget { .. }
        )
    }
}

impl From<std::io::Error> for LoadError {
    fn from(err: std::io::Error) -> Self {
        Self::io(err.to_string())
    }
}
