//! Error types for veles-common.

use thiserror::Error;

/// Common error type for cursor and unpacking operations.
#[derive(Debug, Error)]
pub enum Error {
    /// Read past the end of the buffer.
    #[error("truncated read: needed {needed} bytes but only {available} available")]
    Truncated { needed: usize, available: usize },

    /// Seek target outside the buffer.
    #[error("seek out of range: target {target}, buffer length {len}")]
    OutOfRange { target: i64, len: usize },

    /// String data missing its NUL terminator.
    #[error("string missing NUL terminator")]
    MissingNulTerminator,

    /// Declared length of a bit-packed blob does not cover the declared item count.
    #[error("bit-packed data too short: {count} items of {bit_size} bits in {len} bytes")]
    PackedOverflow {
        count: usize,
        bit_size: u8,
        len: usize,
    },

    /// UTF-8 decoding error.
    #[error("UTF-8 error: {0}")]
    Utf8(#[from] std::str::Utf8Error),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias using the common Error type.
pub type Result<T> = std::result::Result<T, Error>;
