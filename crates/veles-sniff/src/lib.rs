//! Container format identification.
//!
//! Given an opaque byte buffer (plus an optional filename hint), decide which
//! container format it holds. Identification is driven by magic bytes where
//! formats have them, and by structural probing for the two that do not:
//! Unity serialized files (validated by their declared sizes) and Unreal pak
//! archives (located by a reverse scan for the footer magic, gated on the
//! `.pak` extension).
//!
//! gzip-wrapped buffers are transparent: the payload is inflated and
//! re-identified, bounded to a fixed recursion depth.

use std::io::Read;

use serde::Serialize;
use thiserror::Error;
use tracing::debug;
use veles_common::{ByteCursor, Endian, Whence};

/// Magic of an Unreal pak footer, little-endian.
const PAK_MAGIC: u32 = 0x9E2A_83C1;

/// How many 5-byte steps backwards to try when hunting the pak footer.
const PAK_SCAN_LIMIT: usize = 2048;

/// Maximum depth of transparent gzip unwrapping.
const MAX_GZIP_DEPTH: usize = 8;

/// Errors raised by transparent decompression during sniffing.
#[derive(Debug, Error)]
pub enum Error {
    /// The gzip payload could not be inflated.
    #[error("gzip inflate failed: {0}")]
    Inflate(#[from] std::io::Error),

    /// More than [`MAX_GZIP_DEPTH`] nested gzip layers.
    #[error("gzip nesting exceeds {MAX_GZIP_DEPTH} layers")]
    TooDeep,
}

pub type Result<T> = std::result::Result<T, Error>;

/// The closed set of container formats Veles recognizes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum ContainerFormat {
    UnityBundle,
    UnityAsset,
    GodotPck,
    GodotResource,
    GodotStreamTexture,
    GodotCompressedTexture,
    GodotScene,
    Fsb5,
    UnrealPak,
    UnrealPackage,
    Xnb,
    Pe,
    Elf,
    /// Unknown or opaque payload, possibly referenced by another file.
    Resource,
}

impl std::fmt::Display for ContainerFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::UnityBundle => "Unity bundle",
            Self::UnityAsset => "Unity serialized file",
            Self::GodotPck => "Godot package",
            Self::GodotResource => "Godot binary resource",
            Self::GodotStreamTexture => "Godot stream texture",
            Self::GodotCompressedTexture => "Godot compressed texture",
            Self::GodotScene => "Godot compiled scene",
            Self::Fsb5 => "FSB5 sound bank",
            Self::UnrealPak => "Unreal pak archive",
            Self::UnrealPackage => "Unreal package",
            Self::Xnb => "XNB asset",
            Self::Pe => "PE executable",
            Self::Elf => "ELF executable",
            Self::Resource => "resource",
        };
        f.write_str(name)
    }
}

/// Identify the container format of `data`.
///
/// `name_hint` is only consulted for the `.pak` extension heuristic. Nested
/// gzip is unwrapped transparently for identification; use [`sniff`] to also
/// get the inflated payload.
pub fn identify(data: &[u8], name_hint: Option<&str>) -> ContainerFormat {
    identify_at_depth(data, name_hint, 0)
}

/// The result of [`sniff`]: the identified format and the buffer it applies
/// to (inflated when the input was gzip-wrapped, untouched otherwise).
pub struct Sniffed {
    pub format: ContainerFormat,
    pub data: Vec<u8>,
}

/// Identify `data`, transparently inflating gzip wrappers, and return the
/// buffer the verdict applies to.
pub fn sniff(data: Vec<u8>, name_hint: Option<&str>) -> Result<Sniffed> {
    let mut data = data;
    for _ in 0..MAX_GZIP_DEPTH {
        if !has_magic(&data, &[0x1F, 0x8B]) {
            let format = identify_at_depth(&data, name_hint, MAX_GZIP_DEPTH);
            return Ok(Sniffed { format, data });
        }
        data = inflate_gzip(&data)?;
    }
    Err(Error::TooDeep)
}

fn identify_at_depth(data: &[u8], name_hint: Option<&str>, depth: usize) -> ContainerFormat {
    // Unity bundle: "Unity" prefix covers UnityFS, UnityWeb, UnityRaw and
    // UnityArchive alike.
    if has_magic(data, b"Unity") {
        return ContainerFormat::UnityBundle;
    }
    // Unity serialized file: no magic at all, validated structurally.
    if looks_like_unity_asset(data) {
        return ContainerFormat::UnityAsset;
    }
    if has_magic(data, b"GDPC") {
        return ContainerFormat::GodotPck;
    }
    // RSCC is the block-compressed encoding of the same resource format.
    if has_magic(data, b"RSRC") || has_magic(data, b"RSCC") {
        return ContainerFormat::GodotResource;
    }
    if has_magic(data, b"GDST") {
        return ContainerFormat::GodotStreamTexture;
    }
    if has_magic(data, b"GST2") {
        return ContainerFormat::GodotCompressedTexture;
    }
    if has_magic(data, b"GDSC") {
        return ContainerFormat::GodotScene;
    }
    if has_magic(data, b"FSB5") {
        return ContainerFormat::Fsb5;
    }
    // Unreal paks have a variable-length trailer, so the magic is hunted
    // backwards from EOF; only worth attempting when the name says .pak.
    if name_hint.is_some_and(|n| n.ends_with(".pak")) && looks_like_unreal_pak(data) {
        return ContainerFormat::UnrealPak;
    }
    if has_magic(data, &[0xC1, 0x83, 0x2A, 0x9E]) {
        return ContainerFormat::UnrealPackage;
    }
    if has_magic(data, b"XNB") {
        return ContainerFormat::Xnb;
    }
    if has_magic(data, b"MZ") {
        return ContainerFormat::Pe;
    }
    if has_magic(data, &[0x7F, b'E', b'L', b'F']) {
        return ContainerFormat::Elf;
    }

    // gzip wrapper: inflate and look again.
    if has_magic(data, &[0x1F, 0x8B]) && depth < MAX_GZIP_DEPTH {
        match inflate_gzip(data) {
            Ok(inflated) => return identify_at_depth(&inflated, name_hint, depth + 1),
            Err(e) => {
                debug!("gzip candidate failed to inflate: {e}");
            }
        }
    }

    ContainerFormat::Resource
}

#[inline]
fn has_magic(data: &[u8], magic: &[u8]) -> bool {
    data.len() >= magic.len() && &data[..magic.len()] == magic
}

/// Structural probe for a Unity serialized file.
///
/// Reads the big-endian header (64-bit fields when version >= 22) and
/// requires both that the declared file size equals the buffer length and
/// that the data offset lies within it.
fn looks_like_unity_asset(data: &[u8]) -> bool {
    if data.len() < 20 {
        return false;
    }
    let mut cursor = ByteCursor::new(data, Endian::Big);
    let probe = (|| -> veles_common::Result<(u64, u64)> {
        let _metadata_size = cursor.read_u32()?;
        let mut file_size = cursor.read_u32()? as u64;
        let version = cursor.read_u32()?;
        let mut data_offset = cursor.read_u32()? as u64;
        if version >= 22 {
            if data.len() < 48 {
                return Ok((u64::MAX, u64::MAX));
            }
            data_offset = cursor.read_u64()?;
            file_size = cursor.read_u64()?;
        }
        Ok((file_size, data_offset))
    })();
    match probe {
        Ok((file_size, data_offset)) => {
            file_size == data.len() as u64 && data_offset <= data.len() as u64
        }
        Err(_) => false,
    }
}

/// Hunt backwards from EOF for the pak footer magic, stepping 5 bytes at a
/// time for a bounded number of iterations.
fn looks_like_unreal_pak(data: &[u8]) -> bool {
    if data.len() < 4 {
        return false;
    }
    let mut cursor = ByteCursor::new(data, Endian::Little);
    if cursor.seek(-4, Whence::End).is_err() {
        return false;
    }
    for _ in 0..PAK_SCAN_LIMIT {
        let Ok(value) = cursor.read_u32() else {
            return false;
        };
        if value == PAK_MAGIC {
            return true;
        }
        if cursor.seek(-5, Whence::Cur).is_err() {
            return false;
        }
    }
    false
}

fn inflate_gzip(data: &[u8]) -> Result<Vec<u8>> {
    let mut out = Vec::new();
    flate2::read::GzDecoder::new(data).read_to_end(&mut out)?;
    Ok(out)
}
