//! Decode errors

use thiserror::Error;

/// Fatal errors for a single PCD file
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    #[error("Malformed header: {0}")]
    MalformedHeader(String),

    #[error("Truncated binary data: {available} bytes cannot hold one {stride}-byte record")]
    TruncatedBinaryData { stride: usize, available: usize },

    #[error("Invalid compression header: {0}")]
    InvalidCompressionHeader(String),

    #[error("Size mismatch: expected {expected} bytes, produced {actual}")]
    SizeMismatch { expected: usize, actual: usize },

    #[error("Invalid back-reference at output position {position} with offset {offset}")]
    InvalidBackReference { position: usize, offset: usize },

    #[error("Point cloud contains no valid points")]
    EmptyPointCloud,
}

/// Result type for decode operations
pub type DecodeResult<T> = Result<T, DecodeError>;

impl DecodeError {
    pub(crate) fn header(message: impl Into<String>) -> Self {
        Self::MalformedHeader(message.into())
    }
}
