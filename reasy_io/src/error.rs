use std::io;

use reasy_types::RegistryError;
use thiserror::Error;

/// Result type alias for codec operations
pub type Result<T> = std::result::Result<T, CodecError>;

#[derive(Error, Debug)]
pub enum CodecError {
    /// Truncated or self-contradictory binary. The message is the user-facing diagnostic.
    #[error("{0}")]
    Format(String),

    #[error("type lookup failed: {0}")]
    TypeLookup(#[from] RegistryError),

    #[error("field `{field}` holds a value that cannot be written as {expected}")]
    ValueMismatch { field: String, expected: &'static str },

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl CodecError {
    pub(crate) fn format(msg: impl Into<String>) -> Self {
        CodecError::Format(msg.into())
    }
}
