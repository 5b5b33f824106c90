//! Error types for the FSB5 reader.

use thiserror::Error;

/// Errors that can occur while parsing an FSB5 sound bank.
#[derive(Debug, Error)]
pub enum Error {
    /// Cursor-level error.
    #[error("{0}")]
    Common(#[from] veles_common::Error),

    /// Not an FSB5 file.
    #[error("invalid magic: expected \"FSB5\", got {0:?}")]
    BadMagic(String),

    /// Bank version outside the supported range.
    #[error("unsupported FSB version {0}")]
    UnsupportedVersion(u32),

    /// Frequency index outside the known table.
    #[error("unknown frequency index {0}")]
    UnknownFrequency(u32),

    /// Declared sizes do not fit the buffer.
    #[error("structural invariant violated: {0}")]
    StructuralInvariant(String),
}

/// Result type for FSB5 operations.
pub type Result<T> = std::result::Result<T, Error>;
