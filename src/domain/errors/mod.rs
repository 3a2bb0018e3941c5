//! Domain error types.

mod decode_error;
mod load_error;

pub use decode_error::DecodeError;
pub use load_error::LoadError;
