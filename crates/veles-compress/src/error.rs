//! Error types for the compression codec.

use thiserror::Error;

use crate::Scheme;

/// Errors that can occur while decompressing a storage block.
#[derive(Debug, Error)]
pub enum Error {
    /// The compression method is not implemented (e.g. LZHAM, Brotli).
    #[error("unsupported compression scheme tag {0}")]
    UnsupportedScheme(u32),

    /// The declared uncompressed size does not match what the stream produced.
    #[error("{scheme:?} block produced {actual} bytes, expected {expected}")]
    SizeMismatch {
        scheme: Scheme,
        expected: usize,
        actual: usize,
    },

    /// The compressed stream itself is malformed.
    #[error("{scheme:?} decompression failed: {message}")]
    Corrupt { scheme: Scheme, message: String },

    /// LZMA properties byte outside the valid lc/lp/pb range.
    #[error("invalid LZMA properties byte {0:#04x}")]
    BadLzmaProperties(u8),
}

/// Result type for codec operations.
pub type Result<T> = std::result::Result<T, Error>;
