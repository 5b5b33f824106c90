//! Error types for the Unity readers.

use thiserror::Error;

/// Errors that can occur while parsing Unity bundles and serialized files.
#[derive(Debug, Error)]
pub enum Error {
    /// Cursor-level error.
    #[error("{0}")]
    Common(#[from] veles_common::Error),

    /// Block decompression error.
    #[error("{0}")]
    Compress(#[from] veles_compress::Error),

    /// Unknown bundle magic string.
    #[error("unrecognized bundle magic {0:?}")]
    BadMagic(String),

    /// Bundle format too old or too new to parse.
    #[error("unsupported bundle version {version} for magic {magic:?}")]
    UnsupportedBundle { magic: String, version: u32 },

    /// Reconstructed body length differs from the block table's declared total.
    #[error("reconstructed body is {actual} bytes, block table declares {expected}")]
    BodySizeMismatch { expected: u64, actual: u64 },

    /// A node's range falls outside the reconstructed body.
    #[error("node {path:?} [{offset}..+{size}] exceeds body length {body_len}")]
    NodeOutOfBounds {
        path: String,
        offset: u64,
        size: u64,
        body_len: u64,
    },

    /// An object row references a type-table index that does not exist.
    #[error("object references missing type table entry {type_id}")]
    TypeMissing { type_id: i32 },

    /// An object's declared range falls outside the file.
    #[error("object {path_id} [{offset}..+{size}] exceeds file length {file_len}")]
    ObjectOutOfBounds {
        path_id: i64,
        offset: u64,
        size: u32,
        file_len: u64,
    },

    /// A type tree leaf names a primitive the walker does not know.
    #[error("unknown primitive type {0:?} in type tree")]
    UnknownPrimitive(String),

    /// A type tree node is structurally malformed (e.g. an array node without
    /// its count/element children).
    #[error("malformed type tree: {0}")]
    MalformedTree(String),
}

/// Result type for Unity operations.
pub type Result<T> = std::result::Result<T, Error>;
