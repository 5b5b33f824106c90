//! Recursive type-tree decoding.
//!
//! Drives a [`TypeTree`] over an object's bytes, producing an
//! [`ObjectValue`]. Dispatch is keyed on node shape rather than a fixed
//! table: leaves read primitives by type name, array-flagged nodes read a
//! count and then their element subtree, everything else assembles an ordered
//! record of its children.
//!
//! The walker never reads past the object's declared end: crossing the
//! boundary stops the decode and surfaces a partial result, so a corrupt tree
//! cannot make one object consume its siblings' bytes.

use tracing::warn;
use veles_common::ByteCursor;

use crate::typetree::{TypeTree, TypeTreeNode, META_FLAG_ALIGN, TYPE_FLAG_ARRAY};
use crate::value::{Field, ObjectValue};
use crate::{Error, Result};

/// Arrays larger than this are suspicious enough to log.
const HUGE_ARRAY_WARN: i64 = 10_000_000;

/// Result of a walk: the decoded value plus whether the boundary guard fired.
pub struct Walked {
    pub value: ObjectValue,
    pub interrupted: bool,
}

/// Decode `cursor`'s bytes through `tree`, stopping at absolute offset `end`.
pub fn decode(tree: &TypeTree, cursor: &mut ByteCursor<'_>, end: usize) -> Result<Walked> {
    if tree.nodes.is_empty() {
        return Err(Error::MalformedTree("empty type tree".into()));
    }
    let mut walker = Walker {
        tree,
        end,
        interrupted: false,
    };
    let value = walker.decode_node(0, cursor)?;
    Ok(Walked {
        value,
        interrupted: walker.interrupted,
    })
}

struct Walker<'a> {
    tree: &'a TypeTree,
    end: usize,
    interrupted: bool,
}

impl Walker<'_> {
    fn decode_node(&mut self, index: usize, cursor: &mut ByteCursor<'_>) -> Result<ObjectValue> {
        if cursor.tell() > self.end {
            warn!(
                offset = cursor.tell(),
                end = self.end,
                "interrupting decode at object boundary"
            );
            self.interrupted = true;
            return Ok(ObjectValue::Interrupted);
        }
        let node = &self.tree.nodes[index];

        let value = if node.children.is_empty() || is_directly_parseable(&node.type_name) {
            match self.read_primitive(&node.type_name, cursor, node.size) {
                Ok(v) => v,
                Err(Error::Common(veles_common::Error::Truncated { .. })) => {
                    self.interrupted = true;
                    ObjectValue::Interrupted
                }
                Err(e) => return Err(e),
            }
        } else if node.type_flags & TYPE_FLAG_ARRAY != 0 {
            self.decode_array(node, cursor)?
        } else {
            let mut fields = Vec::with_capacity(node.children.len());
            for &child in &node.children {
                let child_node = &self.tree.nodes[child];
                let name = child_node.name.clone();
                let type_name = child_node.type_name.clone();
                let value = self.decode_node(child, cursor)?;
                fields.push(Field {
                    name,
                    type_name,
                    value,
                });
                if self.interrupted {
                    break;
                }
            }
            ObjectValue::Record(fields)
        };

        if node.meta_flags & META_FLAG_ALIGN != 0 && !self.interrupted && cursor.align(4).is_err()
        {
            self.interrupted = true;
        }
        Ok(value)
    }

    fn decode_array(
        &mut self,
        node: &TypeTreeNode,
        cursor: &mut ByteCursor<'_>,
    ) -> Result<ObjectValue> {
        if node.children.len() < 2 {
            return Err(Error::MalformedTree(format!(
                "array node {:?} lacks count/element children",
                node.name
            )));
        }
        let count_node = &self.tree.nodes[node.children[0]];
        let element_index = node.children[1];
        let element_node = &self.tree.nodes[element_index];

        let count_value = match self.read_primitive(&count_node.type_name, cursor, count_node.size)
        {
            Ok(v) => v,
            Err(Error::Common(veles_common::Error::Truncated { .. })) => {
                self.interrupted = true;
                return Ok(ObjectValue::Interrupted);
            }
            Err(e) => return Err(e),
        };
        let count = count_value.as_i64().ok_or_else(|| {
            Error::MalformedTree(format!(
                "array count has non-integer type {:?}",
                count_node.type_name
            ))
        })?;
        if count < 0 {
            return Err(Error::MalformedTree(format!("negative array count {count}")));
        }
        if count >= HUGE_ARRAY_WARN {
            warn!(count, offset = cursor.tell(), "unusually large array");
        }

        // Byte-element arrays are read as one raw run instead of element by
        // element.
        if element_node.type_name == "UInt8" || element_node.type_name == "SInt8" {
            return match cursor.read(count as usize) {
                Ok(bytes) => Ok(ObjectValue::Bytes(bytes.to_vec())),
                Err(veles_common::Error::Truncated { .. }) => {
                    self.interrupted = true;
                    Ok(ObjectValue::Interrupted)
                }
                Err(e) => Err(e.into()),
            };
        }

        let mut items = Vec::new();
        for _ in 0..count {
            let item = self.decode_node(element_index, cursor)?;
            items.push(item);
            if self.interrupted {
                break;
            }
        }
        Ok(ObjectValue::Array(items))
    }

    fn read_primitive(
        &mut self,
        type_name: &str,
        cursor: &mut ByteCursor<'_>,
        size: i32,
    ) -> Result<ObjectValue> {
        let value = match type_name {
            "bool" => ObjectValue::Bool(cursor.read_bool()?),
            "SInt8" => ObjectValue::Int8(cursor.read_i8()?),
            "UInt8" => ObjectValue::UInt8(cursor.read_u8()?),
            "char" => {
                let bytes = cursor.read(2)?;
                let unit = u16::from_le_bytes([bytes[0], bytes[1]]);
                ObjectValue::Char(String::from_utf16_lossy(&[unit]))
            }
            "short" | "SInt16" => ObjectValue::Int16(cursor.read_i16()?),
            "unsigned short" | "UInt16" => ObjectValue::UInt16(cursor.read_u16()?),
            "SInt32" | "int" => ObjectValue::Int32(cursor.read_i32()?),
            "UInt32" | "unsigned int" | "Type*" => ObjectValue::UInt32(cursor.read_u32()?),
            "long long" | "SInt64" => ObjectValue::Int64(cursor.read_i64()?),
            "unsigned long long" | "UInt64" | "FileSize" => {
                ObjectValue::UInt64(cursor.read_u64()?)
            }
            "float" => ObjectValue::Float(cursor.read_f32()?),
            "double" => ObjectValue::Double(cursor.read_f64()?),
            "string" => {
                let len = if size < 0 {
                    cursor.read_u32()? as usize
                } else {
                    size as usize
                };
                let text = cursor.read_chars(len)?;
                cursor.align(4)?;
                ObjectValue::String(text)
            }
            "TypelessData" => {
                let len = cursor.read_u32()? as usize;
                ObjectValue::Bytes(cursor.read(len)?.to_vec())
            }
            other => return Err(Error::UnknownPrimitive(other.to_string())),
        };
        Ok(value)
    }
}

/// Composite types the primitive reader handles directly even though their
/// tree nodes have children.
fn is_directly_parseable(type_name: &str) -> bool {
    matches!(type_name, "string" | "TypelessData")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::typetree::TypeTreeNode;
    use veles_common::{ByteWriter, Endian};

    fn node(
        level: u8,
        type_name: &str,
        name: &str,
        size: i32,
        type_flags: u32,
        meta_flags: u32,
        children: Vec<usize>,
    ) -> TypeTreeNode {
        TypeTreeNode {
            version: 1,
            level,
            type_name: type_name.into(),
            name: name.into(),
            size,
            index: 0,
            type_flags,
            meta_flags,
            children,
        }
    }

    #[test]
    fn test_decode_record_with_alignment() {
        let tree = TypeTree {
            nodes: vec![
                node(0, "Base", "Base", -1, 0, 0, vec![1, 2, 3]),
                node(1, "bool", "m_Flag", 1, 0, META_FLAG_ALIGN, vec![]),
                node(1, "int", "m_Count", 4, 0, 0, vec![]),
                node(1, "string", "m_Name", -1, 0, 0, vec![]),
            ],
        };

        let mut w = ByteWriter::new(Endian::Little);
        w.write_bool(true);
        w.align(4);
        w.write_i32(42);
        w.write_u32(2);
        w.write(b"hi");
        w.align(4);

        let data = w.into_bytes();
        let mut cursor = ByteCursor::new(&data, Endian::Little);
        let walked = decode(&tree, &mut cursor, data.len()).unwrap();
        assert!(!walked.interrupted);

        assert_eq!(walked.value.field("m_Flag"), Some(&ObjectValue::Bool(true)));
        assert_eq!(walked.value.field("m_Count"), Some(&ObjectValue::Int32(42)));
        assert_eq!(
            walked.value.field("m_Name"),
            Some(&ObjectValue::String("hi".into()))
        );
    }

    #[test]
    fn test_decode_int_array() {
        let tree = TypeTree {
            nodes: vec![
                node(0, "Base", "Base", -1, 0, 0, vec![1]),
                node(1, "vector", "m_Values", -1, 0, 0, vec![2]),
                node(2, "Array", "Array", -1, TYPE_FLAG_ARRAY, 0, vec![3, 4]),
                node(3, "int", "size", 4, 0, 0, vec![]),
                node(4, "int", "data", 4, 0, 0, vec![]),
            ],
        };

        let mut w = ByteWriter::new(Endian::Little);
        w.write_i32(3);
        w.write_i32(10);
        w.write_i32(20);
        w.write_i32(30);

        let data = w.into_bytes();
        let mut cursor = ByteCursor::new(&data, Endian::Little);
        let walked = decode(&tree, &mut cursor, data.len()).unwrap();
        assert!(!walked.interrupted);

        let list = walked.value.field("m_Values").unwrap();
        let items = list.field("Array").unwrap().as_array().unwrap();
        assert_eq!(
            items,
            &[
                ObjectValue::Int32(10),
                ObjectValue::Int32(20),
                ObjectValue::Int32(30)
            ]
        );
    }

    #[test]
    fn test_byte_array_fast_path() {
        let tree = TypeTree {
            nodes: vec![
                node(0, "Base", "Base", -1, 0, 0, vec![1]),
                node(1, "vector", "m_Data", -1, 0, 0, vec![2]),
                node(2, "Array", "Array", -1, TYPE_FLAG_ARRAY, 0, vec![3, 4]),
                node(3, "int", "size", 4, 0, 0, vec![]),
                node(4, "UInt8", "data", 1, 0, 0, vec![]),
            ],
        };

        let mut w = ByteWriter::new(Endian::Little);
        w.write_i32(4);
        w.write(&[9, 8, 7, 6]);

        let data = w.into_bytes();
        let mut cursor = ByteCursor::new(&data, Endian::Little);
        let walked = decode(&tree, &mut cursor, data.len()).unwrap();
        let run = walked.value.field("m_Data").unwrap().field("Array").unwrap();
        assert_eq!(run, &ObjectValue::Bytes(vec![9, 8, 7, 6]));
    }

    #[test]
    fn test_typeless_data_leaf() {
        let tree = TypeTree {
            nodes: vec![
                node(0, "TypelessData", "image data", -1, TYPE_FLAG_ARRAY, 0, vec![1, 2]),
                node(1, "int", "size", 4, 0, 0, vec![]),
                node(2, "UInt8", "data", 1, 0, 0, vec![]),
            ],
        };

        let mut w = ByteWriter::new(Endian::Little);
        w.write_u32(3);
        w.write(&[1, 2, 3]);

        let data = w.into_bytes();
        let mut cursor = ByteCursor::new(&data, Endian::Little);
        let walked = decode(&tree, &mut cursor, data.len()).unwrap();
        assert_eq!(walked.value, ObjectValue::Bytes(vec![1, 2, 3]));
    }

    #[test]
    fn test_overread_interrupts() {
        let tree = TypeTree {
            nodes: vec![
                node(0, "Base", "Base", -1, 0, 0, vec![1, 2]),
                node(1, "int", "m_A", 4, 0, 0, vec![]),
                node(1, "int", "m_B", 4, 0, 0, vec![]),
            ],
        };

        // Only 4 of the 8 needed bytes are available.
        let data = 7i32.to_le_bytes();
        let mut cursor = ByteCursor::new(&data, Endian::Little);
        let walked = decode(&tree, &mut cursor, data.len()).unwrap();
        assert!(walked.interrupted);
        assert_eq!(walked.value.field("m_A"), Some(&ObjectValue::Int32(7)));
        assert_eq!(walked.value.field("m_B"), Some(&ObjectValue::Interrupted));
        assert!(walked.value.is_partial());
    }

    #[test]
    fn test_unknown_primitive_is_an_error() {
        let tree = TypeTree {
            nodes: vec![node(0, "FancyNewType", "Base", 4, 0, 0, vec![])],
        };
        let data = [0u8; 4];
        let mut cursor = ByteCursor::new(&data, Endian::Little);
        assert!(matches!(
            decode(&tree, &mut cursor, 4),
            Err(Error::UnknownPrimitive(_))
        ));
    }
}
