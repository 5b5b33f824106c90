//! Unity serialized-file (`AssetFile`) parsing.
//!
//! A serialized file is a header, a type table (each entry optionally
//! carrying a self-describing type tree), an object directory, script-type
//! and external-file tables, and a data region holding the object payloads.
//! Nearly every field's presence is gated on the file format version, which
//! is read once at the top and threaded through the whole parse.
//!
//! Objects are decoded lazily: the directory parse records offsets and
//! sizes, and the payload is only walked on first access, memoized behind a
//! thread-safe once-cell. A failure decoding one object is recorded on that
//! object alone — real files routinely contain a few objects in unsupported
//! sub-formats, and they must not take the other N-1 down with them.

use std::sync::OnceLock;

use hashbrown::HashMap;
use rustc_hash::FxHasher;
use tracing::{debug, warn};
use veles_common::{ByteCursor, Endian};

use crate::typetree::TypeTree;
use crate::value::ObjectValue;
use crate::walker;
use crate::{Error, Result};

type FxHashMap<K, V> = HashMap<K, V, std::hash::BuildHasherDefault<FxHasher>>;

/// MonoBehaviour's class ID; its type entries carry a script hash.
const MONO_BEHAVIOUR: i32 = 114;

/// One entry of the type table.
#[derive(Debug)]
pub struct SerializedType {
    pub class_id: i32,
    pub is_stripped: bool,
    pub script_type_index: i16,
    pub script_id: Option<[u8; 16]>,
    pub old_type_hash: Option<[u8; 16]>,
    /// The self-describing layout, when the file carries type trees.
    pub tree: Option<TypeTree>,
    pub type_dependencies: Vec<i32>,
    /// Reference types name the managed class they stand for.
    pub class_name: Option<String>,
    pub name_space: Option<String>,
    pub asm_name: Option<String>,
}

/// A script reference from the script-type table.
#[derive(Debug, Clone)]
pub struct ScriptIdentifier {
    pub local_file_index: i32,
    pub local_identifier: i64,
}

/// An external file dependency.
#[derive(Debug, Clone)]
pub struct FileIdentifier {
    pub guid: Option<String>,
    pub kind: i32,
    pub path: String,
}

/// The decode outcome memoized per object.
#[derive(Debug)]
pub enum ObjectData {
    /// Fully decoded through the type tree.
    Parsed(ObjectValue),
    /// No tree available; the payload verbatim.
    Raw(Vec<u8>),
    /// Decoding failed; siblings are unaffected. Carries whatever prefix
    /// decoded cleanly, if any.
    Failed {
        message: String,
        partial: Option<ObjectValue>,
    },
}

/// One row of the object directory.
#[derive(Debug)]
pub struct ObjectInfo {
    /// Unique (per file) signed 64-bit identifier.
    pub path_id: i64,
    /// Absolute payload offset, already rebased by the header's data offset.
    pub offset: u64,
    pub size: u32,
    pub type_id: i32,
    pub class_id: i32,
    pub is_destroyed: bool,
    pub script_type_index: i16,
    pub stripped: bool,
    cache: OnceLock<ObjectData>,
}

/// A parsed Unity serialized file.
#[derive(Debug)]
pub struct AssetFile {
    pub metadata_size: u32,
    pub file_size: u64,
    pub version: u32,
    pub data_offset: u64,
    pub endian: Endian,
    pub unity_version: String,
    pub target_platform: u32,
    pub enable_type_trees: bool,
    pub types: Vec<SerializedType>,
    pub objects: Vec<ObjectInfo>,
    pub script_types: Vec<ScriptIdentifier>,
    pub externals: Vec<FileIdentifier>,
    pub ref_types: Vec<SerializedType>,
    pub user_information: String,
    path_index: FxHashMap<i64, usize>,
    data: Vec<u8>,
}

impl AssetFile {
    /// Parse a serialized file, taking ownership of its bytes for later lazy
    /// object decoding.
    pub fn parse(data: Vec<u8>) -> Result<Self> {
        let mut parsed = Self::parse_metadata(&data)?;
        parsed.data = data;
        Ok(parsed)
    }

    fn parse_metadata(data: &[u8]) -> Result<AssetFile> {
        let mut cursor = ByteCursor::new(data, Endian::Big);

        let mut metadata_size = cursor.read_u32()?;
        let mut file_size = cursor.read_u32()? as u64;
        let version = cursor.read_u32()?;
        let mut data_offset = cursor.read_u32()? as u64;
        let endian = if version >= 9 {
            if cursor.read_u32()? % 2 == 0 {
                Endian::Little
            } else {
                Endian::Big
            }
        } else {
            Endian::Big
        };
        if version >= 22 {
            metadata_size = cursor.read_u32()?;
            file_size = cursor.read_i64()? as u64;
            data_offset = cursor.read_i64()? as u64;
            let _reserved = cursor.read_i64()?;
        }
        cursor.set_endian(endian);

        let unity_version = if version >= 7 {
            cursor.read_cstring()?
        } else {
            "2.5.0f5".to_string()
        };
        let target_platform = if version >= 8 { cursor.read_u32()? } else { 0 };
        let enable_type_trees = if version >= 13 {
            cursor.read_bool()?
        } else {
            true
        };

        debug!(
            version,
            unity_version,
            enable_type_trees,
            data_offset,
            "parsed serialized file header"
        );

        let type_count = cursor.read_u32()? as usize;
        let mut types = Vec::with_capacity(type_count.min(data.len()));
        for _ in 0..type_count {
            types.push(read_serialized_type(
                &mut cursor,
                version,
                enable_type_trees,
                false,
            )?);
        }

        let has_long_ids = if (7..14).contains(&version) {
            cursor.read_i32()? != 0
        } else {
            false
        };

        let object_count = cursor.read_i32()?.max(0) as usize;
        let mut objects = Vec::with_capacity(object_count.min(data.len()));
        let mut path_index =
            FxHashMap::with_capacity_and_hasher(object_count.min(data.len()), Default::default());
        for _ in 0..object_count {
            let path_id = if has_long_ids {
                cursor.read_i64()?
            } else if version < 14 {
                cursor.read_i32()? as i64
            } else {
                cursor.align(4)?;
                cursor.read_i64()?
            };
            let raw_offset = if version >= 22 {
                cursor.read_i64()? as u64
            } else {
                cursor.read_u32()? as u64
            };
            let offset = raw_offset.saturating_add(data_offset);
            let size = cursor.read_u32()?;
            let type_id = cursor.read_i32()?;
            let class_id = if version < 16 {
                cursor.read_u16()? as i32
            } else {
                types
                    .get(type_id as usize)
                    .ok_or(Error::TypeMissing { type_id })?
                    .class_id
            };
            let is_destroyed = if version < 11 {
                cursor.read_u16()? != 0
            } else {
                false
            };
            let script_type_index = if (11..17).contains(&version) {
                cursor.read_i16()?
            } else {
                -1
            };
            let stripped = if version == 15 || version == 16 {
                cursor.read_u8()? != 0
            } else {
                false
            };

            if path_index.insert(path_id, objects.len()).is_some() {
                warn!(path_id, "duplicate path ID in object directory");
            }
            objects.push(ObjectInfo {
                path_id,
                offset,
                size,
                type_id,
                class_id,
                is_destroyed,
                script_type_index,
                stripped,
                cache: OnceLock::new(),
            });
        }

        let mut script_types = Vec::new();
        if version >= 11 {
            let count = cursor.read_i32()?.max(0);
            for _ in 0..count {
                let local_file_index = cursor.read_i32()?;
                let local_identifier = if version < 14 {
                    cursor.read_i32()? as i64
                } else {
                    cursor.align(4)?;
                    cursor.read_i64()?
                };
                script_types.push(ScriptIdentifier {
                    local_file_index,
                    local_identifier,
                });
            }
        }

        let externals_count = cursor.read_i32()?.max(0);
        let mut externals = Vec::new();
        for _ in 0..externals_count {
            if version >= 6 {
                let _empty = cursor.read_cstring()?;
            }
            let (guid, kind) = if version >= 5 {
                (Some(cursor.read_guid()?), cursor.read_i32()?)
            } else {
                (None, 0)
            };
            externals.push(FileIdentifier {
                guid,
                kind,
                path: cursor.read_cstring()?,
            });
        }

        let mut ref_types = Vec::new();
        if version >= 20 {
            let count = cursor.read_i32()?.max(0);
            for _ in 0..count {
                ref_types.push(read_serialized_type(
                    &mut cursor,
                    version,
                    enable_type_trees,
                    true,
                )?);
            }
        }

        let user_information = if version >= 5 {
            cursor.read_cstring()?
        } else {
            String::new()
        };

        Ok(AssetFile {
            metadata_size,
            file_size,
            version,
            data_offset,
            endian,
            unity_version,
            target_platform,
            enable_type_trees,
            types,
            objects,
            script_types,
            externals,
            ref_types,
            user_information,
            path_index,
            data: Vec::new(),
        })
    }

    /// All object directory rows.
    pub fn objects(&self) -> &[ObjectInfo] {
        &self.objects
    }

    /// Look up an object by its path ID.
    pub fn object_by_path_id(&self, path_id: i64) -> Option<&ObjectInfo> {
        self.path_index.get(&path_id).map(|&i| &self.objects[i])
    }

    /// The type table entry (and thus the type tree) for a class ID.
    pub fn type_for_class(&self, class_id: i32) -> Option<&SerializedType> {
        self.types.iter().find(|t| t.class_id == class_id)
    }

    /// The type tree used to decode objects of `class_id`, when present.
    pub fn type_tree_for(&self, class_id: i32) -> Option<&TypeTree> {
        self.type_for_class(class_id).and_then(|t| t.tree.as_ref())
    }

    /// An object's payload bytes, unparsed.
    pub fn object_bytes(&self, info: &ObjectInfo) -> Result<&[u8]> {
        let offset = info.offset as usize;
        let end = offset.checked_add(info.size as usize);
        match end {
            Some(end) if end <= self.data.len() => Ok(&self.data[offset..end]),
            _ => Err(Error::ObjectOutOfBounds {
                path_id: info.path_id,
                offset: info.offset,
                size: info.size,
                file_len: self.data.len() as u64,
            }),
        }
    }

    /// Decode an object through its type tree, memoized per object.
    ///
    /// Safe to call from multiple threads: the first caller decodes, everyone
    /// else gets the cached outcome.
    pub fn decode_object<'a>(&'a self, info: &'a ObjectInfo) -> &'a ObjectData {
        info.cache.get_or_init(|| self.decode_uncached(info))
    }

    fn decode_uncached(&self, info: &ObjectInfo) -> ObjectData {
        let payload = match self.object_bytes(info) {
            Ok(p) => p,
            Err(e) => {
                return ObjectData::Failed {
                    message: e.to_string(),
                    partial: None,
                }
            }
        };

        let Some(tree) = self.type_tree_for(info.class_id) else {
            // No schema: hand back the raw bytes rather than guessing.
            return ObjectData::Raw(payload.to_vec());
        };

        let mut cursor = ByteCursor::new(payload, self.endian);
        match walker::decode(tree, &mut cursor, payload.len()) {
            Ok(walked) if walked.interrupted => {
                warn!(
                    path_id = info.path_id,
                    class_id = info.class_id,
                    "object decode stopped at its declared boundary"
                );
                ObjectData::Failed {
                    message: format!(
                        "decode of object {} stopped at its declared boundary",
                        info.path_id
                    ),
                    partial: Some(walked.value),
                }
            }
            Ok(walked) => ObjectData::Parsed(walked.value),
            Err(e) => ObjectData::Failed {
                message: e.to_string(),
                partial: None,
            },
        }
    }
}

fn read_serialized_type(
    cursor: &mut ByteCursor<'_>,
    version: u32,
    enable_type_trees: bool,
    is_ref: bool,
) -> Result<SerializedType> {
    let class_id = cursor.read_i32()?;
    let is_stripped = if version >= 16 {
        cursor.read_bool()?
    } else {
        false
    };
    let script_type_index = if version >= 17 { cursor.read_i16()? } else { 0 };

    let mut script_id = None;
    let mut old_type_hash = None;
    if version >= 13 {
        let needs_script_id = (is_ref && script_type_index >= 0)
            || (version < 16 && class_id < 0)
            || (version >= 16 && class_id == MONO_BEHAVIOUR);
        if needs_script_id {
            script_id = Some(read_hash(cursor)?);
        }
        old_type_hash = Some(read_hash(cursor)?);
    }

    let tree = if enable_type_trees {
        let tree = if version >= 12 || version == 10 {
            TypeTree::parse_blob(cursor, version)?
        } else {
            TypeTree::parse_legacy(cursor, version)?
        };
        Some(tree)
    } else {
        None
    };

    let mut type_dependencies = Vec::new();
    let mut class_name = None;
    let mut name_space = None;
    let mut asm_name = None;
    if enable_type_trees && version >= 21 {
        if is_ref {
            class_name = Some(cursor.read_cstring()?);
            name_space = Some(cursor.read_cstring()?);
            asm_name = Some(cursor.read_cstring()?);
        } else {
            let count = cursor.read_u32()? as usize;
            for _ in 0..count {
                type_dependencies.push(cursor.read_i32()?);
            }
        }
    }

    Ok(SerializedType {
        class_id,
        is_stripped,
        script_type_index,
        script_id,
        old_type_hash,
        tree,
        type_dependencies,
        class_name,
        name_space,
        asm_name,
    })
}

fn read_hash(cursor: &mut ByteCursor<'_>) -> Result<[u8; 16]> {
    Ok(cursor.read_struct::<[u8; 16]>()?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::typetree::tests::write_blob_tree;
    use veles_common::ByteWriter;

    struct ObjectSpec {
        path_id: i64,
        offset: u32,
        size: u32,
        type_id: i32,
        class_id: u16,
    }

    /// Build a synthetic serialized file at `version` with no type trees and
    /// the given object rows. Payload bytes live at `data_offset` 4096.
    fn build_asset(version: u32, objects: &[ObjectSpec], payload: &[u8]) -> Vec<u8> {
        let data_offset = 4096u32;
        let mut w = ByteWriter::new(Endian::Big);
        w.write_u32(0); // metadata size (not validated)
        w.write_u32(0); // file size, fixed up below
        w.write_u32(version);
        w.write_u32(data_offset);
        if version >= 9 {
            w.write_u32(0); // little-endian
            w.set_endian(Endian::Little);
        }

        if version >= 7 {
            w.write_cstring("2019.4.0f1");
        }
        if version >= 8 {
            w.write_u32(5); // target platform
        }
        if version >= 13 {
            w.write_bool(false); // type trees disabled
        }

        // One type entry so that version >= 16 rows can resolve class IDs.
        w.write_u32(1);
        w.write_i32(1); // class_id: GameObject
        if version >= 16 {
            w.write_bool(false);
        }
        if version >= 17 {
            w.write_i16(0);
        }
        if version >= 13 {
            w.write(&[0u8; 16]); // old type hash
        }
        if version < 13 {
            // Type trees are implicitly enabled before the flag existed.
            if version >= 12 || version == 10 {
                write_blob_tree(&mut w, version, &[(0, "Base", "Base", -1, 0, 0)]);
            } else {
                // Legacy recursive encoding, single childless node.
                w.write_cstring("Base");
                w.write_cstring("Base");
                w.write_i32(-1);
                w.write_i32(0); // index
                w.write_i32(0); // type flags
                w.write_i32(1); // node version
                w.write_i32(0); // meta flags
                w.write_i32(0); // child count
            }
        }

        if (7..14).contains(&version) {
            w.write_i32(0); // hasLongIDs
        }

        w.write_i32(objects.len() as i32);
        for obj in objects {
            if version < 14 {
                w.write_i32(obj.path_id as i32);
            } else {
                w.align(4);
                w.write_i64(obj.path_id);
            }
            w.write_u32(obj.offset);
            w.write_u32(obj.size);
            w.write_i32(obj.type_id);
            if version < 16 {
                w.write_u16(obj.class_id);
            }
            if version < 11 {
                w.write_u16(0); // isDestroyed
            }
            if (11..17).contains(&version) {
                w.write_i16(7); // scriptTypeIndex
            }
            if version == 15 || version == 16 {
                w.write_u8(1); // stripped
            }
        }

        if version >= 11 {
            w.write_i32(0); // script types
        }
        w.write_i32(0); // externals
        if version >= 20 {
            w.write_i32(0); // ref types
        }
        if version >= 5 {
            w.write_cstring("");
        }

        while w.len() < data_offset as usize {
            w.write_u8(0);
        }
        w.write(payload);

        // Fix up the declared file size (big-endian header field).
        let total = w.len() as u32;
        w.set_endian(Endian::Big);
        w.seek(4, veles_common::Whence::Set).unwrap();
        w.write_u32(total);
        w.into_bytes()
    }

    fn one_object() -> Vec<ObjectSpec> {
        vec![ObjectSpec {
            path_id: 42,
            offset: 0,
            size: 4,
            type_id: 0,
            class_id: 1,
        }]
    }

    #[test]
    fn test_version_15_has_stripped_and_script_type_index() {
        let data = build_asset(15, &one_object(), &[0u8; 4]);
        let asset = AssetFile::parse(data).unwrap();
        let obj = asset.object_by_path_id(42).unwrap();
        assert!(obj.stripped);
        assert_eq!(obj.script_type_index, 7);
        assert!(!obj.is_destroyed);
    }

    #[test]
    fn test_version_16_has_stripped() {
        let data = build_asset(16, &one_object(), &[0u8; 4]);
        let asset = AssetFile::parse(data).unwrap();
        let obj = asset.object_by_path_id(42).unwrap();
        assert!(obj.stripped);
        // Class ID comes from the type table at version 16.
        assert_eq!(obj.class_id, 1);
    }

    #[test]
    fn test_version_17_stripped_absent() {
        let data = build_asset(17, &one_object(), &[0u8; 4]);
        let asset = AssetFile::parse(data).unwrap();
        let obj = asset.object_by_path_id(42).unwrap();
        assert!(!obj.stripped);
        assert_eq!(obj.script_type_index, -1);
    }

    #[test]
    fn test_version_11_script_type_index_present() {
        let data = build_asset(11, &one_object(), &[0u8; 4]);
        let asset = AssetFile::parse(data).unwrap();
        let obj = asset.object_by_path_id(42).unwrap();
        assert_eq!(obj.script_type_index, 7);
        assert!(!obj.is_destroyed);
    }

    #[test]
    fn test_version_10_script_type_index_defaults() {
        let data = build_asset(10, &one_object(), &[0u8; 4]);
        let asset = AssetFile::parse(data).unwrap();
        let obj = asset.object_by_path_id(42).unwrap();
        assert_eq!(obj.script_type_index, -1);
        // Version 10 still reads the destroyed flag.
        assert!(!obj.is_destroyed);
        // Class ID is stored directly on the row before version 16.
        assert_eq!(obj.class_id, 1);
    }

    /// Build a version-17 file with one tree-described type (two ints) and
    /// three objects, the second deliberately truncated.
    fn build_asset_with_tree() -> Vec<u8> {
        let data_offset = 512u32;
        let mut w = ByteWriter::new(Endian::Big);
        w.write_u32(0);
        w.write_u32(0); // fixed up below
        w.write_u32(17);
        w.write_u32(data_offset);
        w.write_u32(0); // little-endian
        w.set_endian(Endian::Little);

        w.write_cstring("2019.4.0f1");
        w.write_u32(5);
        w.write_bool(true); // type trees enabled

        w.write_u32(1);
        w.write_i32(1); // class_id
        w.write_bool(false);
        w.write_i16(0);
        w.write(&[0u8; 16]);
        write_blob_tree(
            &mut w,
            17,
            &[
                (0, "Base", "Base", -1, 0, 0),
                (1, "int", "m_First", 4, 0, 0),
                (1, "int", "m_Second", 4, 0, 0),
            ],
        );

        w.write_i32(3);
        for (path_id, offset, size) in [(1i64, 0u32, 8u32), (2, 8, 2), (3, 10, 8)] {
            w.align(4);
            w.write_i64(path_id);
            w.write_u32(offset);
            w.write_u32(size);
            w.write_i32(0);
        }

        w.write_i32(0); // script types
        w.write_i32(0); // externals
        w.write_cstring("");

        while w.len() < data_offset as usize {
            w.write_u8(0);
        }
        // Object 1: complete. Object 2: only 2 of 8 bytes. Object 3: complete.
        w.write_i32(100);
        w.write_i32(200);
        w.write_u16(0xFFFF);
        w.write_i32(300);
        w.write_i32(400);

        let total = w.len() as u32;
        w.set_endian(Endian::Big);
        w.seek(4, veles_common::Whence::Set).unwrap();
        w.write_u32(total);
        w.into_bytes()
    }

    #[test]
    fn test_lazy_decode_through_tree() {
        let asset = AssetFile::parse(build_asset_with_tree()).unwrap();
        let obj = asset.object_by_path_id(1).unwrap();
        match asset.decode_object(obj) {
            ObjectData::Parsed(value) => {
                assert_eq!(value.field("m_First"), Some(&ObjectValue::Int32(100)));
                assert_eq!(value.field("m_Second"), Some(&ObjectValue::Int32(200)));
            }
            other => panic!("expected parsed object, got {other:?}"),
        }
        // Second access hits the cache and returns the same allocation.
        let first = asset.decode_object(obj) as *const _;
        let second = asset.decode_object(obj) as *const _;
        assert_eq!(first, second);
    }

    #[test]
    fn test_partial_failure_isolation() {
        let asset = AssetFile::parse(build_asset_with_tree()).unwrap();

        let ok1 = asset.decode_object(asset.object_by_path_id(1).unwrap());
        let bad = asset.decode_object(asset.object_by_path_id(2).unwrap());
        let ok3 = asset.decode_object(asset.object_by_path_id(3).unwrap());

        assert!(matches!(ok1, ObjectData::Parsed(_)));
        assert!(matches!(bad, ObjectData::Failed { .. }));
        match ok3 {
            ObjectData::Parsed(value) => {
                assert_eq!(value.field("m_First"), Some(&ObjectValue::Int32(300)));
                assert_eq!(value.field("m_Second"), Some(&ObjectValue::Int32(400)));
            }
            other => panic!("expected parsed object, got {other:?}"),
        }
    }

    #[test]
    fn test_type_tree_lookup() {
        let asset = AssetFile::parse(build_asset_with_tree()).unwrap();
        let tree = asset.type_tree_for(1).unwrap();
        assert_eq!(tree.root().unwrap().type_name, "Base");
        assert!(asset.type_tree_for(999).is_none());
    }

    #[test]
    fn test_raw_fallback_without_trees() {
        let data = build_asset(17, &one_object(), &[1, 2, 3, 4]);
        let asset = AssetFile::parse(data).unwrap();
        let obj = asset.object_by_path_id(42).unwrap();
        match asset.decode_object(obj) {
            ObjectData::Raw(bytes) => assert_eq!(bytes, &[1, 2, 3, 4]),
            other => panic!("expected raw bytes, got {other:?}"),
        }
    }

    #[test]
    fn test_missing_type_entry_is_container_error() {
        let objects = vec![ObjectSpec {
            path_id: 1,
            offset: 0,
            size: 4,
            type_id: 9, // no such type
            class_id: 0,
        }];
        let data = build_asset(17, &objects, &[0u8; 4]);
        assert!(matches!(
            AssetFile::parse(data),
            Err(Error::TypeMissing { type_id: 9 })
        ));
    }
}
