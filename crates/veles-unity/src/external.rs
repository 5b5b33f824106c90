//! External data resolution.
//!
//! Some object kinds (streamed textures and meshes, video and audio clips)
//! keep their bulk bytes in a different file than the one being parsed — a
//! `.resource` sidecar or another bundle node. The core never does I/O, so it
//! asks outward through this interface and the surrounding application
//! decides where the bytes come from.

/// A reference to bytes living outside the current file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamingInfo {
    /// Path of the sidecar file, as stored in the object.
    pub path: String,
    /// Byte offset within that file.
    pub offset: u64,
    /// Byte count; `None` means "to the end of the file".
    pub size: Option<u64>,
}

/// Supplies bytes for [`StreamingInfo`] references.
pub trait ExternalResolver: Send + Sync {
    /// Return the requested range, or `None` when the file is unknown.
    fn resolve(&self, path: &str, offset: u64, size: Option<u64>) -> Option<Vec<u8>>;
}

/// A resolver that knows nothing; every lookup misses.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoExternalData;

impl ExternalResolver for NoExternalData {
    fn resolve(&self, _path: &str, _offset: u64, _size: Option<u64>) -> Option<Vec<u8>> {
        None
    }
}
