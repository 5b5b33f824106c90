//! Self-describing type trees.
//!
//! A serialized file embeds, per type, a schema describing the binary layout
//! of its objects: field names, type names, sizes, nesting, and per-node
//! flags. Two physical encodings exist in the wild — a legacy recursive
//! C-string encoding and the newer flat blob encoding with a string table —
//! and both normalize into the same arena representation here: every node of
//! one tree lives in a flat vector, children referenced by index, root at
//! index 0.

use serde::Serialize;
use veles_common::ByteCursor;

use crate::strings::{string_at, COMMON_STRINGS};
use crate::{Error, Result};

/// Type-flags bit 0: the node describes an array (count child + element child).
pub const TYPE_FLAG_ARRAY: u32 = 1;

/// Meta-flags bit 14: align the cursor to 4 bytes after reading the value.
pub const META_FLAG_ALIGN: u32 = 0x4000;

/// One node of a type tree.
#[derive(Debug, Clone, Serialize)]
pub struct TypeTreeNode {
    /// Node format version.
    pub version: u16,
    /// Depth in the tree; root is 0.
    pub level: u8,
    /// Type name, e.g. `int`, `string`, `Vector3f`.
    pub type_name: String,
    /// Field name, e.g. `m_Name`.
    pub name: String,
    /// Declared byte size; -1 means computed while parsing.
    pub size: i32,
    pub index: i32,
    pub type_flags: u32,
    pub meta_flags: u32,
    /// Indices of child nodes, in declared order.
    pub children: Vec<usize>,
}

/// A complete type tree in arena form.
#[derive(Debug, Clone, Serialize)]
pub struct TypeTree {
    pub nodes: Vec<TypeTreeNode>,
}

impl TypeTree {
    /// The root node, when the tree is non-empty.
    pub fn root(&self) -> Option<&TypeTreeNode> {
        self.nodes.first()
    }

    /// Parse the flat blob encoding: a node array followed by a local string
    /// table. `format_version` is the serialized file's version (node records
    /// widen to 32 bytes at version 19).
    pub fn parse_blob(cursor: &mut ByteCursor<'_>, format_version: u32) -> Result<Self> {
        let num_nodes = cursor.read_i32()?;
        let string_table_size = cursor.read_i32()?;
        if num_nodes < 0 || string_table_size < 0 {
            return Err(Error::MalformedTree(format!(
                "negative blob counts: {num_nodes} nodes, {string_table_size} table bytes"
            )));
        }
        let node_size = if format_version >= 19 { 32 } else { 24 };
        let node_blob = cursor.read(node_size * num_nodes as usize)?;
        let string_table = cursor.read(string_table_size as usize)?;

        let mut nodes: Vec<TypeTreeNode> = Vec::with_capacity(num_nodes as usize);
        // Stack of node indices along the current path, one per level.
        let mut parents: Vec<usize> = Vec::new();

        let mut node_cursor = ByteCursor::new(node_blob, cursor.endian());
        for i in 0..num_nodes as usize {
            let version = node_cursor.read_u16()?;
            let level = node_cursor.read_u8()?;
            let type_flags = node_cursor.read_u8()? as u32;
            let type_offset = node_cursor.read_u32()?;
            let name_offset = node_cursor.read_u32()?;
            let size = node_cursor.read_i32()?;
            let index = node_cursor.read_i32()?;
            let meta_flags = node_cursor.read_u32()?;
            if format_version >= 19 {
                let _ref_type_hash = node_cursor.read_u64()?;
            }

            if level == 0 {
                parents.clear();
            } else {
                parents.truncate(level as usize);
                let parent = *parents.last().ok_or_else(|| {
                    Error::MalformedTree(format!("node {i} at level {level} has no parent"))
                })?;
                nodes[parent].children.push(i);
            }
            parents.push(i);

            nodes.push(TypeTreeNode {
                version,
                level,
                type_name: resolve_string(string_table, type_offset)?,
                name: resolve_string(string_table, name_offset)?,
                size,
                index,
                type_flags,
                meta_flags,
                children: Vec::new(),
            });
        }

        Ok(TypeTree { nodes })
    }

    /// Skip over a blob-encoded tree without building it.
    pub fn skip_blob(cursor: &mut ByteCursor<'_>, format_version: u32) -> Result<()> {
        let num_nodes = cursor.read_u32()? as usize;
        let string_table_size = cursor.read_u32()? as usize;
        let node_size = if format_version >= 19 { 32 } else { 24 };
        cursor.read(node_size * num_nodes + string_table_size)?;
        Ok(())
    }

    /// Parse the legacy recursive encoding used before the blob format.
    pub fn parse_legacy(cursor: &mut ByteCursor<'_>, format_version: u32) -> Result<Self> {
        let mut nodes = Vec::new();
        read_legacy_node(cursor, format_version, 0, &mut nodes)?;
        Ok(TypeTree { nodes })
    }
}

fn read_legacy_node(
    cursor: &mut ByteCursor<'_>,
    format_version: u32,
    level: u8,
    nodes: &mut Vec<TypeTreeNode>,
) -> Result<usize> {
    if level > 64 {
        return Err(Error::MalformedTree("legacy tree nests deeper than 64".into()));
    }
    let type_name = cursor.read_cstring()?;
    let name = cursor.read_cstring()?;
    let size = cursor.read_i32()?;
    if format_version == 2 {
        let _variable_count = cursor.read_i32()?;
    }
    let index = if format_version != 3 {
        cursor.read_i32()?
    } else {
        -1
    };
    let type_flags = cursor.read_i32()? as u32;
    let version = cursor.read_i32()? as u16;
    let meta_flags = if format_version != 3 {
        cursor.read_i32()? as u32
    } else {
        0
    };

    let this = nodes.len();
    nodes.push(TypeTreeNode {
        version,
        level,
        type_name,
        name,
        size,
        index,
        type_flags,
        meta_flags,
        children: Vec::new(),
    });

    let child_count = cursor.read_i32()?;
    if child_count < 0 {
        return Err(Error::MalformedTree(format!(
            "negative child count {child_count}"
        )));
    }
    for _ in 0..child_count {
        let child = read_legacy_node(cursor, format_version, level + 1, nodes)?;
        nodes[this].children.push(child);
    }
    Ok(this)
}

/// Resolve a string reference: bit 31 clear addresses the local table, set
/// addresses the shared table at the masked offset.
fn resolve_string(local_table: &[u8], offset: u32) -> Result<String> {
    let (table, offset) = if offset & 0x8000_0000 == 0 {
        (local_table, offset as usize)
    } else {
        (COMMON_STRINGS, (offset & 0x7FFF_FFFF) as usize)
    };
    string_at(table, offset).ok_or_else(|| {
        Error::MalformedTree(format!("string offset {offset} outside table"))
    })
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use veles_common::{ByteWriter, Endian};

    /// Serialize a blob tree with a local string table.
    pub(crate) fn write_blob_tree(
        w: &mut ByteWriter,
        format_version: u32,
        nodes: &[(u8, &str, &str, i32, u32, u32)],
    ) {
        // Build the local string table.
        let mut table: Vec<u8> = Vec::new();
        let mut offset_of = |table: &mut Vec<u8>, s: &str| -> u32 {
            let pos = table
                .windows(s.len() + 1)
                .position(|win| &win[..s.len()] == s.as_bytes() && win[s.len()] == 0);
            match pos {
                Some(p) => p as u32,
                None => {
                    let at = table.len() as u32;
                    table.extend_from_slice(s.as_bytes());
                    table.push(0);
                    at
                }
            }
        };

        let mut records = Vec::new();
        for &(level, type_name, name, size, type_flags, meta_flags) in nodes {
            let t = offset_of(&mut table, type_name);
            let n = offset_of(&mut table, name);
            records.push((level, t, n, size, type_flags, meta_flags));
        }

        w.write_i32(nodes.len() as i32);
        w.write_i32(table.len() as i32);
        for (i, &(level, t, n, size, type_flags, meta_flags)) in records.iter().enumerate() {
            w.write_u16(1); // node version
            w.write_u8(level);
            w.write_u8(type_flags as u8);
            w.write_u32(t);
            w.write_u32(n);
            w.write_i32(size);
            w.write_i32(i as i32);
            w.write_u32(meta_flags);
            if format_version >= 19 {
                w.write_u64(0);
            }
        }
        w.write(&table);
    }

    #[test]
    fn test_parse_blob() {
        let mut w = ByteWriter::new(Endian::Little);
        write_blob_tree(
            &mut w,
            17,
            &[
                (0, "MonoBehaviour", "Base", -1, 0, 0),
                (1, "int", "m_Value", 4, 0, 0),
                (1, "string", "m_Name", -1, 0, 0),
            ],
        );
        let data = w.into_bytes();
        let mut cursor = ByteCursor::new(&data, Endian::Little);
        let tree = TypeTree::parse_blob(&mut cursor, 17).unwrap();

        assert_eq!(tree.nodes.len(), 3);
        let root = tree.root().unwrap();
        assert_eq!(root.type_name, "MonoBehaviour");
        assert_eq!(root.children, vec![1, 2]);
        assert_eq!(tree.nodes[1].name, "m_Value");
        assert_eq!(tree.nodes[2].type_name, "string");
        assert!(cursor.is_empty());
    }

    #[test]
    fn test_parse_blob_shared_string() {
        // Reference "AABB" (offset 0) and "Base" from the shared table.
        let mut w = ByteWriter::new(Endian::Little);
        w.write_i32(1);
        w.write_i32(0); // empty local table
        w.write_u16(1);
        w.write_u8(0);
        w.write_u8(0);
        w.write_u32(0x8000_0000); // "AABB"
        w.write_u32(0x8000_0000 | 55); // "Base"
        w.write_i32(-1);
        w.write_i32(0);
        w.write_u32(0);

        let data = w.into_bytes();
        let mut cursor = ByteCursor::new(&data, Endian::Little);
        let tree = TypeTree::parse_blob(&mut cursor, 17).unwrap();
        assert_eq!(tree.root().unwrap().type_name, "AABB");
        assert_eq!(tree.root().unwrap().name, "Base");
    }

    #[test]
    fn test_parse_blob_deep_nesting() {
        let mut w = ByteWriter::new(Endian::Little);
        write_blob_tree(
            &mut w,
            17,
            &[
                (0, "Base", "Base", -1, 0, 0),
                (1, "vector", "m_List", -1, 0, 0),
                (2, "Array", "Array", -1, 1, 0),
                (3, "int", "size", 4, 0, 0),
                (3, "int", "data", 4, 0, 0),
                (1, "int", "m_After", 4, 0, 0),
            ],
        );
        let data = w.into_bytes();
        let mut cursor = ByteCursor::new(&data, Endian::Little);
        let tree = TypeTree::parse_blob(&mut cursor, 17).unwrap();

        assert_eq!(tree.root().unwrap().children, vec![1, 5]);
        assert_eq!(tree.nodes[1].children, vec![2]);
        assert_eq!(tree.nodes[2].children, vec![3, 4]);
        assert_eq!(tree.nodes[5].name, "m_After");
    }

    #[test]
    fn test_parse_legacy() {
        let mut w = ByteWriter::new(Endian::Little);
        // Root with one child, format version 10 field order.
        w.write_cstring("GameObject");
        w.write_cstring("Base");
        w.write_i32(-1);
        w.write_i32(0); // index
        w.write_i32(0); // type flags
        w.write_i32(1); // node version
        w.write_i32(0); // meta flags
        w.write_i32(1); // child count
        {
            w.write_cstring("int");
            w.write_cstring("m_Value");
            w.write_i32(4);
            w.write_i32(1);
            w.write_i32(0);
            w.write_i32(1);
            w.write_i32(0x4000);
            w.write_i32(0);
        }

        let data = w.into_bytes();
        let mut cursor = ByteCursor::new(&data, Endian::Little);
        let tree = TypeTree::parse_legacy(&mut cursor, 10).unwrap();
        assert_eq!(tree.nodes.len(), 2);
        assert_eq!(tree.root().unwrap().children, vec![1]);
        assert_eq!(tree.nodes[1].meta_flags, 0x4000);
    }

    #[test]
    fn test_skip_blob_matches_parse() {
        let mut w = ByteWriter::new(Endian::Little);
        write_blob_tree(
            &mut w,
            19,
            &[(0, "Base", "Base", -1, 0, 0), (1, "int", "m_A", 4, 0, 0)],
        );
        w.write_u32(0xDDCCBBAA);

        let data = w.into_bytes();
        let mut cursor = ByteCursor::new(&data, Endian::Little);
        TypeTree::skip_blob(&mut cursor, 19).unwrap();
        assert_eq!(cursor.read_u32().unwrap(), 0xDDCCBBAA);
    }
}
