//! Common utilities for Veles.
//!
//! This crate provides the foundational types used across all Veles crates:
//!
//! - [`ByteCursor`] - Seekable, endian-configurable binary reading
//! - [`ByteWriter`] - The matching binary writer
//! - [`packed`] - Bit-packed integer/float/quaternion vector decoding
//! - Vector, quaternion, color, and matrix value types

mod error;
mod reader;
mod types;
mod writer;

pub mod packed;

pub use error::{Error, Result};
pub use reader::{f16_to_f32, ByteCursor, Endian, Whence};
pub use types::{Color, Matrix4x4, Quaternion, Vector2, Vector3, Vector4};
pub use writer::ByteWriter;

/// Re-export zerocopy traits for convenience
pub use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout};

/// Re-export memchr for byte searching
pub use memchr;
