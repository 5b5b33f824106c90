//! Godot `.pck` package parsing.
//!
//! A PCK is a flat directory: a `GDPC` header followed by one entry per
//! packed file, each carrying its `res://` path, offset, size, and content
//! hash. Packages can be appended to a host executable, in which case stored
//! offsets are relative to the original package base; the caller passes that
//! base so entry offsets can be rebased into the buffer at hand.
//!
//! Encrypted directories are a hard failure: there is no key handling here,
//! and silently skipping entries would misrepresent the package.

use hashbrown::HashMap;
use rustc_hash::FxHasher;
use tracing::debug;
use veles_common::{ByteCursor, Endian};

use crate::{Error, Result};

type FxHashMap<K, V> = HashMap<K, V, std::hash::BuildHasherDefault<FxHasher>>;

/// Directory flag: the index is encrypted.
const PACK_DIR_ENCRYPTED: u32 = 1 << 0;

/// Entry flag: the file contents are encrypted.
const PACK_FILE_ENCRYPTED: u32 = 1 << 0;

/// One packed file.
#[derive(Debug, Clone)]
pub struct PckEntry {
    /// Normalized path, always `res://`-prefixed.
    pub path: String,
    /// Absolute offset into the buffer, after rebasing.
    pub offset: u64,
    pub size: u64,
    /// MD5 of the contents as stored; not verified here.
    pub hash: String,
    pub flags: u32,
}

impl PckEntry {
    pub fn is_encrypted(&self) -> bool {
        self.flags & PACK_FILE_ENCRYPTED != 0
    }
}

/// A parsed Godot package.
#[derive(Debug)]
pub struct PckFile {
    pub format_version: u32,
    pub engine_version: (u32, u32, u32),
    pub file_flags: u32,
    pub file_base: u64,
    pub entries: Vec<PckEntry>,
    path_index: FxHashMap<String, usize>,
}

/// Prefix a bare path with `res://`.
fn normalize_path(path: &str) -> String {
    if path.starts_with("res://") {
        path.to_string()
    } else {
        format!("res://{path}")
    }
}

impl PckFile {
    /// Parse a package. `orig_offset` is the package's base offset in its
    /// original file, nonzero when the PCK was carved out of a host
    /// executable's section.
    pub fn parse(data: &[u8], orig_offset: u64) -> Result<Self> {
        let mut cursor = ByteCursor::new(data, Endian::Little);

        let magic = cursor.read_chars(4)?;
        if magic != "GDPC" {
            return Err(Error::BadMagic {
                expected: "GDPC".into(),
                actual: magic,
            });
        }
        let format_version = cursor.read_u32()?;
        let major = cursor.read_u32()?;
        let minor = cursor.read_u32()?;
        let patch = cursor.read_u32()?;

        let mut file_flags = 0;
        let mut file_base = 0;
        if format_version >= 2 {
            file_flags = cursor.read_u32()?;
            file_base = cursor.read_u64()?;
        }
        if file_flags & PACK_DIR_ENCRYPTED != 0 {
            return Err(Error::Encrypted("directory".into()));
        }

        cursor.read(64)?; // reserved

        let file_count = cursor.read_u32()? as usize;
        debug!(format_version, file_count, file_base, "parsed PCK header");

        let mut entries = Vec::with_capacity(file_count.min(data.len()));
        let mut path_index =
            FxHashMap::with_capacity_and_hasher(file_count.min(data.len()), Default::default());
        for _ in 0..file_count {
            let path = normalize_path(&cursor.read_string()?);
            // Stored offsets are relative to the original package base.
            // Saturate rather than trust arithmetic on hostile values; an
            // impossible offset is caught when the entry is read.
            let offset = file_base
                .saturating_add(cursor.read_u64()?)
                .saturating_sub(orig_offset);
            let size = cursor.read_u64()?;
            let hash = cursor.read_guid()?;
            let flags = if format_version >= 2 {
                cursor.read_u32()?
            } else {
                0
            };
            path_index.insert(path.clone(), entries.len());
            entries.push(PckEntry {
                path,
                offset,
                size,
                hash,
                flags,
            });
        }

        Ok(Self {
            format_version,
            engine_version: (major, minor, patch),
            file_flags,
            file_base,
            entries,
            path_index,
        })
    }

    /// Look up an entry; bare paths get the `res://` prefix first.
    pub fn entry(&self, path: &str) -> Option<&PckEntry> {
        let normalized = normalize_path(path);
        self.path_index.get(&normalized).map(|&i| &self.entries[i])
    }

    /// Slice an entry's bytes out of the package buffer.
    pub fn read_entry<'a>(&self, data: &'a [u8], entry: &PckEntry) -> Result<&'a [u8]> {
        if entry.is_encrypted() {
            return Err(Error::Encrypted(entry.path.clone()));
        }
        let start = entry.offset as usize;
        let end = start.checked_add(entry.size as usize);
        match end {
            Some(end) if end <= data.len() => Ok(&data[start..end]),
            _ => Err(Error::StructuralInvariant(format!(
                "entry {} [{}..+{}] exceeds package length {}",
                entry.path,
                entry.offset,
                entry.size,
                data.len()
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use veles_common::ByteWriter;

    pub(crate) fn build_pck(entries: &[(&str, &[u8])], file_flags: u32) -> Vec<u8> {
        let mut w = ByteWriter::new(Endian::Little);
        w.write(b"GDPC");
        w.write_u32(2);
        w.write_u32(4);
        w.write_u32(2);
        w.write_u32(0);
        w.write_u32(file_flags);
        w.write_u64(0); // file base
        w.write(&[0u8; 64]);
        w.write_u32(entries.len() as u32);

        // Directory size depends on path lengths; lay out payloads after a
        // first pass over the entry records.
        let mut dir = ByteWriter::new(Endian::Little);
        let mut payload_sizes = Vec::new();
        for &(path, data) in entries {
            dir.write_string(path);
            dir.write_u64(0); // patched below
            dir.write_u64(data.len() as u64);
            dir.write(&[0u8; 16]);
            dir.write_u32(0);
            payload_sizes.push(data.len());
        }
        let data_start = w.len() + dir.len();

        // Second pass with real offsets.
        let mut dir = ByteWriter::new(Endian::Little);
        let mut offset = data_start as u64;
        for &(path, data) in entries {
            dir.write_string(path);
            dir.write_u64(offset);
            dir.write_u64(data.len() as u64);
            dir.write(&[0u8; 16]);
            dir.write_u32(0);
            offset += data.len() as u64;
        }

        w.write(dir.data());
        for &(_, data) in entries {
            w.write(data);
        }
        w.into_bytes()
    }

    #[test]
    fn test_parse_and_read() {
        let data = build_pck(&[("res://icon.png", b"PNGDATA"), ("res://main.tscn", b"scene")], 0);
        let pck = PckFile::parse(&data, 0).unwrap();
        assert_eq!(pck.entries.len(), 2);
        assert_eq!(pck.engine_version, (4, 2, 0));

        let entry = pck.entry("res://icon.png").unwrap();
        assert_eq!(pck.read_entry(&data, entry).unwrap(), b"PNGDATA");
    }

    #[test]
    fn test_path_normalization() {
        let data = build_pck(&[("res://icon.png", b"PNGDATA")], 0);
        let pck = PckFile::parse(&data, 0).unwrap();

        let bare = pck.entry("icon.png").unwrap();
        let prefixed = pck.entry("res://icon.png").unwrap();
        assert_eq!(bare.path, prefixed.path);
        assert_eq!(bare.offset, prefixed.offset);
        assert!(pck.entry("missing.png").is_none());
    }

    #[test]
    fn test_encrypted_directory_is_fatal() {
        let data = build_pck(&[("res://icon.png", b"PNGDATA")], PACK_DIR_ENCRYPTED);
        assert!(matches!(
            PckFile::parse(&data, 0),
            Err(Error::Encrypted(_))
        ));
    }

    #[test]
    fn test_encrypted_entry_refuses_read() {
        let data = build_pck(&[("res://secret.bin", b"????")], 0);
        let pck = PckFile::parse(&data, 0).unwrap();
        let mut entry = pck.entry("secret.bin").unwrap().clone();
        entry.flags = PACK_FILE_ENCRYPTED;
        assert!(matches!(
            pck.read_entry(&data, &entry),
            Err(Error::Encrypted(_))
        ));
    }

    #[test]
    fn test_entry_out_of_bounds() {
        let data = build_pck(&[("res://a.bin", b"abc")], 0);
        let pck = PckFile::parse(&data, 0).unwrap();
        let mut entry = pck.entry("a.bin").unwrap().clone();
        entry.size = 1 << 40;
        assert!(matches!(
            pck.read_entry(&data, &entry),
            Err(Error::StructuralInvariant(_))
        ));
    }
}
