//! Error types for the Godot readers.

use thiserror::Error;

/// Errors that can occur while parsing Godot packages and resources.
#[derive(Debug, Error)]
pub enum Error {
    /// Cursor-level error.
    #[error("{0}")]
    Common(#[from] veles_common::Error),

    /// Block decompression error.
    #[error("{0}")]
    Compress(#[from] veles_compress::Error),

    /// Wrong magic bytes for the expected container.
    #[error("invalid magic: expected {expected:?}, got {actual:?}")]
    BadMagic { expected: String, actual: String },

    /// The package directory or an entry is encrypted; decryption is
    /// unsupported, so this is a hard failure rather than a silent skip.
    #[error("encrypted package {0}")]
    Encrypted(String),

    /// A variant tag outside the known set.
    #[error("unknown variant tag {0}")]
    BadVariantTag(i32),

    /// A declared size or offset is structurally impossible.
    #[error("structural invariant violated: {0}")]
    StructuralInvariant(String),

    /// A string-table index outside the table.
    #[error("string table index {index} out of range ({len} entries)")]
    BadStringIndex { index: i32, len: usize },

    /// Entry lookup miss.
    #[error("no such entry: {0}")]
    EntryNotFound(String),
}

/// Result type for Godot operations.
pub type Result<T> = std::result::Result<T, Error>;
