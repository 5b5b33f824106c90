//! Godot container readers.
//!
//! - [`PckFile`] parses `.pck` package directories, including packages
//!   embedded in a host executable.
//! - [`ResourceFile`] parses binary resources (`RSRC`), transparently
//!   unwrapping the block-compressed `RSCC` form, with property values
//!   decoded as [`Variant`]s.
//! - [`StreamTexture`] / [`CompressedTexture`] are shallow header probes for
//!   the texture containers.

mod error;
mod pck;
mod resource;
mod texture;
mod variant;

pub use error::{Error, Result};
pub use pck::{PckEntry, PckFile};
pub use resource::{ExternalResource, InternalResource, Property, ResourceFile};
pub use texture::{CompressedTexture, StreamTexture};
pub use variant::{read_string_ref, NodePath, ObjectRef, Variant};
