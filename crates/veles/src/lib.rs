//! Veles - multi-format game asset container decoding.
//!
//! Given an opaque byte buffer from a shipped game, Veles identifies the
//! container format, parses its structural metadata, decompresses payloads,
//! and decodes typed object records.
//!
//! # Crates
//!
//! - [`veles_common`] - Binary cursor, writer, packed bit-stream vectors
//! - [`veles_sniff`] - Container format identification
//! - [`veles_compress`] - Shared compression block codec
//! - [`veles_unity`] - UnityFS bundles and serialized files
//! - [`veles_godot`] - Godot packages and binary resources
//! - [`veles_fsb`] - FSB5 sound banks
//!
//! # Example
//!
//! ```no_run
//! use veles::prelude::*;
//!
//! let data = std::fs::read("game.bundle")?;
//! let container = Container::open(data, "game.bundle")?;
//! for entry in container.entries() {
//!     println!("{} ({} bytes)", entry.name, entry.size);
//! }
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

mod container;
mod error;
mod workspace;

pub use container::{Container, ContainerKind, Entry};
pub use error::{Error, Result};
pub use workspace::Workspace;

// Re-export all sub-crates
pub use veles_common as common;
pub use veles_compress as compress;
pub use veles_fsb as fsb;
pub use veles_godot as godot;
pub use veles_sniff as sniff;
pub use veles_unity as unity;

/// Prelude module for convenient imports.
pub mod prelude {
    pub use crate::{Container, ContainerKind, Entry, Workspace};
    pub use veles_common::{ByteCursor, ByteWriter, Endian, Whence};
    pub use veles_fsb::Fsb5File;
    pub use veles_godot::{PckFile, ResourceFile, Variant};
    pub use veles_sniff::ContainerFormat;
    pub use veles_unity::{AssetFile, BundleFile, ObjectData, ObjectValue};
}

/// Version information.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
