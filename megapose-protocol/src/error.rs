//! Protocol error types.

use thiserror::Error;

/// Errors raised while encoding, decoding or framing protocol values.
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("truncated payload: need {needed} bytes, {remaining} remaining")]
    Truncated { needed: usize, remaining: usize },

    #[error("negative length prefix: {0}")]
    NegativeLength(i32),

    #[error("invalid UTF-8 in string payload")]
    InvalidUtf8,

    #[error("unsupported channel count: {0} (expected 3 or 4)")]
    UnsupportedChannels(i32),

    #[error("invalid depth endianness marker: {0:#04x}")]
    InvalidEndianMarker(u8),

    #[error("invalid image dimensions: {height}x{width}")]
    InvalidDimensions { height: i32, width: i32 },

    #[error("pixel buffer holds {actual} values, image shape needs {expected}")]
    PixelCountMismatch { expected: usize, actual: usize },

    #[error("transform must have 16 coefficients, got {0}")]
    InvalidMatrixLength(usize),

    #[error("message code UNKNOWN has no wire tag")]
    UnencodableCode,

    #[error("frame too large: {size} bytes (max {max})")]
    FrameTooLarge { size: u64, max: u64 },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}
