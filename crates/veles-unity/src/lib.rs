//! Unity container readers.
//!
//! Two entry points:
//!
//! - [`BundleFile`] parses a `UnityFS` bundle: block decompression, body
//!   reconstruction, and named node extraction. Nodes re-enter format
//!   sniffing, since bundles nest bundles and serialized files.
//! - [`AssetFile`] parses a serialized file: the version-gated header and
//!   tables, self-describing type trees, and lazy memoized object decoding
//!   through [`walker`].

mod bundle;
mod error;
mod external;
mod serialized;
mod strings;
mod typetree;
mod value;
pub mod walker;

pub use bundle::{BlockFlags, BundleFile, BundleFlags, BundleNode, NodeFile, StorageBlock};
pub use error::{Error, Result};
pub use external::{ExternalResolver, NoExternalData, StreamingInfo};
pub use serialized::{
    AssetFile, FileIdentifier, ObjectData, ObjectInfo, ScriptIdentifier, SerializedType,
};
pub use strings::COMMON_STRINGS;
pub use typetree::{TypeTree, TypeTreeNode, META_FLAG_ALIGN, TYPE_FLAG_ARRAY};
pub use value::{Field, ObjectValue};
