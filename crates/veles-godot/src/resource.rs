//! Godot binary resource parsing (`RSRC` / `RSCC`).
//!
//! A binary resource is a header (endianness flag, engine and format
//! versions, type name, UID), a string table, external and internal resource
//! tables, and finally the main resource's property list, each value a
//! [`Variant`]. The `RSCC` form is the same stream wrapped in block
//! compression: a mode tag, a block size, per-block compressed sizes, and
//! blocks that decompress and concatenate back into an `RSRC` stream.

use tracing::debug;
use veles_common::{ByteCursor, Endian};
use veles_compress::Scheme;

use crate::variant::{read_string_ref, Variant};
use crate::{Error, Result};

/// Resource flag: external resources carry 64-bit UIDs.
const FORMAT_FLAG_UIDS: i32 = 2;

/// An entry of the external resource table.
#[derive(Debug, Clone)]
pub struct ExternalResource {
    pub type_name: String,
    pub path: String,
    pub uid: i64,
}

/// An entry of the internal resource table.
#[derive(Debug, Clone)]
pub struct InternalResource {
    pub path: String,
    pub offset: i64,
}

/// One named property of the main resource.
#[derive(Debug, Clone)]
pub struct Property {
    pub name: String,
    pub value: Variant,
}

/// A parsed binary resource.
#[derive(Debug)]
pub struct ResourceFile {
    pub big_endian: bool,
    pub use_real64: bool,
    pub engine_version: (i32, i32),
    pub format_version: i32,
    pub type_name: String,
    pub import_offset: i64,
    pub flags: i32,
    pub uid: i64,
    pub string_table: Vec<String>,
    pub external_resources: Vec<ExternalResource>,
    pub internal_resources: Vec<InternalResource>,
    /// Type name of the main resource record.
    pub resource_type: String,
    pub properties: Vec<Property>,
}

/// Map a Godot compression mode tag to a codec scheme.
fn scheme_for(mode: i32) -> Result<Scheme> {
    match mode {
        0 => Ok(Scheme::Lz4),
        1 => Ok(Scheme::Deflate),
        2 => Ok(Scheme::Zstd),
        3 => Ok(Scheme::Gzip),
        // 4 is Brotli, which has no supported decoder here.
        other => Err(Error::Compress(veles_compress::Error::UnsupportedScheme(
            other as u32,
        ))),
    }
}

impl ResourceFile {
    /// Parse a resource from its raw bytes, transparently unwrapping the
    /// compressed `RSCC` form.
    pub fn parse(data: &[u8]) -> Result<Self> {
        let mut cursor = ByteCursor::new(data, Endian::Little);
        let magic = cursor.read_chars(4)?;
        match magic.as_str() {
            "RSRC" => Self::parse_rsrc(&mut cursor),
            "RSCC" => {
                let payload = decompress_blocks(&mut cursor)?;
                let mut inner = ByteCursor::new(&payload, Endian::Little);
                let inner_magic = inner.read_chars(4)?;
                if inner_magic != "RSRC" {
                    return Err(Error::BadMagic {
                        expected: "RSRC".into(),
                        actual: inner_magic,
                    });
                }
                Self::parse_rsrc(&mut inner)
            }
            other => Err(Error::BadMagic {
                expected: "RSRC".into(),
                actual: other.to_string(),
            }),
        }
    }

    /// Parse the body following an `RSRC` magic.
    fn parse_rsrc(cursor: &mut ByteCursor<'_>) -> Result<Self> {
        let big_endian = cursor.read_i32()? != 0;
        if big_endian {
            cursor.set_endian(Endian::Big);
        }
        let use_real64 = cursor.read_i32()? != 0;
        let ver_major = cursor.read_i32()?;
        let ver_minor = cursor.read_i32()?;
        let format_version = cursor.read_i32()?;
        let type_name = cursor.read_string()?;
        let import_offset = cursor.read_i64()?;
        let flags = cursor.read_i32()?;
        let uid = cursor.read_i64()?;
        cursor.read(44)?; // reserved

        debug!(
            type_name,
            format_version, ver_major, ver_minor, "parsed resource header"
        );

        let string_count = cursor.read_i32()?.max(0) as usize;
        let mut string_table = Vec::with_capacity(string_count.min(cursor.len()));
        for _ in 0..string_count {
            string_table.push(cursor.read_string()?);
        }

        let external_count = cursor.read_i32()?.max(0) as usize;
        let mut external_resources = Vec::with_capacity(external_count.min(cursor.len()));
        for _ in 0..external_count {
            external_resources.push(ExternalResource {
                type_name: cursor.read_string()?,
                path: cursor.read_string()?,
                uid: if flags & FORMAT_FLAG_UIDS != 0 {
                    cursor.read_i64()?
                } else {
                    0
                },
            });
        }

        let internal_count = cursor.read_i32()?.max(0) as usize;
        let mut internal_resources = Vec::with_capacity(internal_count.min(cursor.len()));
        for _ in 0..internal_count {
            internal_resources.push(InternalResource {
                path: cursor.read_string()?,
                offset: cursor.read_i64()?,
            });
        }

        let resource_type = cursor.read_string()?;
        let property_count = cursor.read_i32()?.max(0) as usize;
        let mut properties = Vec::with_capacity(property_count.min(cursor.len()));
        for _ in 0..property_count {
            properties.push(Property {
                name: read_string_ref(cursor, &string_table)?,
                value: Variant::decode(cursor, format_version, &string_table)?,
            });
        }

        Ok(Self {
            big_endian,
            use_real64,
            engine_version: (ver_major, ver_minor),
            format_version,
            type_name,
            import_offset,
            flags,
            uid,
            string_table,
            external_resources,
            internal_resources,
            resource_type,
            properties,
        })
    }

    /// Look up a property by name.
    pub fn property(&self, name: &str) -> Option<&Variant> {
        self.properties
            .iter()
            .find(|p| p.name == name)
            .map(|p| &p.value)
    }
}

/// Decompress an `RSCC` block stream back into the logical file bytes.
fn decompress_blocks(cursor: &mut ByteCursor<'_>) -> Result<Vec<u8>> {
    let scheme = scheme_for(cursor.read_i32()?)?;
    let block_size = cursor.read_i32()?;
    if block_size <= 0 {
        return Err(Error::StructuralInvariant(format!(
            "compressed resource block size {block_size}"
        )));
    }
    let block_size = block_size as usize;
    let total = cursor.read_u32()? as usize;
    let block_count = total.div_ceil(block_size);
    if block_count > cursor.remaining() {
        return Err(Error::StructuralInvariant(format!(
            "{block_count} compressed blocks cannot fit in {} remaining bytes",
            cursor.remaining()
        )));
    }

    let mut sizes = Vec::with_capacity(block_count);
    for _ in 0..block_count {
        sizes.push(cursor.read_u32()? as usize);
    }

    let mut out = Vec::with_capacity(total);
    let mut remaining = total;
    for size in sizes {
        let expected = remaining.min(block_size);
        let raw = cursor.read(size)?;
        out.extend_from_slice(&veles_compress::decompress(scheme, raw, expected)?);
        remaining -= expected;
    }
    Ok(out)
}
