//! Godot `Variant` decoding.
//!
//! Every property value in a binary resource is a variant: a type tag
//! followed by tag-determined payload bytes. The tag fully determines how
//! many bytes follow; a tag outside the known set is an error, never a
//! silently defaulted value.
//!
//! Dictionaries preserve insertion order — Godot dictionaries are ordered,
//! so they decode into a pair list, not a hash map.

use serde::Serialize;
use veles_common::{ByteCursor, Color, Quaternion, Vector2, Vector3, Vector4};

use crate::{Error, Result};

const VARIANT_NIL: i32 = 1;
const VARIANT_BOOL: i32 = 2;
const VARIANT_INT: i32 = 3;
const VARIANT_FLOAT: i32 = 4;
const VARIANT_STRING: i32 = 5;
const VARIANT_VECTOR2: i32 = 10;
const VARIANT_RECT2: i32 = 11;
const VARIANT_VECTOR3: i32 = 12;
const VARIANT_PLANE: i32 = 13;
const VARIANT_QUATERNION: i32 = 14;
const VARIANT_AABB: i32 = 15;
const VARIANT_BASIS: i32 = 16;
const VARIANT_TRANSFORM3D: i32 = 17;
const VARIANT_TRANSFORM2D: i32 = 18;
const VARIANT_COLOR: i32 = 20;
const VARIANT_NODE_PATH: i32 = 22;
const VARIANT_RID: i32 = 23;
const VARIANT_OBJECT: i32 = 24;
const VARIANT_DICTIONARY: i32 = 26;
const VARIANT_ARRAY: i32 = 30;
const VARIANT_PACKED_BYTE_ARRAY: i32 = 31;
const VARIANT_PACKED_INT32_ARRAY: i32 = 32;
const VARIANT_PACKED_FLOAT32_ARRAY: i32 = 33;
const VARIANT_PACKED_STRING_ARRAY: i32 = 34;
const VARIANT_PACKED_VECTOR3_ARRAY: i32 = 35;
const VARIANT_PACKED_COLOR_ARRAY: i32 = 36;
const VARIANT_PACKED_VECTOR2_ARRAY: i32 = 37;
const VARIANT_INT64: i32 = 40;
const VARIANT_DOUBLE: i32 = 41;
const VARIANT_CALLABLE: i32 = 42;
const VARIANT_SIGNAL: i32 = 43;
const VARIANT_STRING_NAME: i32 = 44;
const VARIANT_VECTOR2I: i32 = 45;
const VARIANT_RECT2I: i32 = 46;
const VARIANT_VECTOR3I: i32 = 47;
const VARIANT_PACKED_INT64_ARRAY: i32 = 48;
const VARIANT_PACKED_FLOAT64_ARRAY: i32 = 49;
const VARIANT_VECTOR4: i32 = 50;
const VARIANT_VECTOR4I: i32 = 51;
const VARIANT_PROJECTION: i32 = 52;

const OBJECT_EMPTY: i32 = 0;
const OBJECT_EXTERNAL_RESOURCE: i32 = 1;
const OBJECT_INTERNAL_RESOURCE: i32 = 2;
const OBJECT_EXTERNAL_RESOURCE_INDEX: i32 = 3;

/// Resources older than this format bake an extra node-path sub-name.
const FORMAT_VERSION_NO_NODEPATH_PROPERTY: i32 = 3;

/// Dictionaries and arrays deeper than this are treated as corrupt.
const MAX_DEPTH: u32 = 256;

/// A node path value: name segments, sub-name segments, absolute flag.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NodePath {
    pub names: Vec<String>,
    pub subnames: Vec<String>,
    pub absolute: bool,
}

/// An object reference value.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum ObjectRef {
    Empty,
    /// Index into the internal resource table.
    Internal(i32),
    /// Inline external resource descriptor.
    External { type_name: String, path: String },
    /// Index into the external resource table.
    ExternalIndex(i32),
}

/// A decoded variant value.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum Variant {
    Nil,
    Bool(bool),
    Int(i32),
    Int64(i64),
    Float(f32),
    Double(f64),
    String(String),
    StringName(String),
    Vector2(Vector2),
    Vector2i(Vector2),
    Vector3(Vector3),
    Vector3i(Vector3),
    Vector4(Vector4),
    Vector4i(Vector4),
    Rect2 { position: Vector2, size: Vector2 },
    Rect2i { position: Vector2, size: Vector2 },
    Plane { normal: Vector3, d: f32 },
    Quaternion(Quaternion),
    Aabb { position: Vector3, size: Vector3 },
    Basis { rows: [Vector3; 3] },
    Transform2d { columns: [Vector2; 3] },
    Transform3d { rows: [Vector3; 3], origin: Vector3 },
    Projection { columns: [Vector4; 4] },
    Color(Color),
    NodePath(NodePath),
    Rid(i32),
    Object(ObjectRef),
    Callable,
    Signal,
    /// Ordered key/value pairs; insertion order is part of the value.
    Dictionary(Vec<(Variant, Variant)>),
    Array(Vec<Variant>),
    PackedByteArray(Vec<u8>),
    PackedInt32Array(Vec<i32>),
    PackedInt64Array(Vec<i64>),
    PackedFloat32Array(Vec<f32>),
    PackedFloat64Array(Vec<f64>),
    PackedStringArray(Vec<String>),
    PackedVector2Array(Vec<Vector2>),
    PackedVector3Array(Vec<Vector3>),
    PackedColorArray(Vec<Color>),
}

/// Read a string reference: bit 31 set means an inline string of the masked
/// length, otherwise an index into the resource's string table.
pub fn read_string_ref(cursor: &mut ByteCursor<'_>, string_table: &[String]) -> Result<String> {
    let id = cursor.read_i32()?;
    if id as u32 & 0x8000_0000 != 0 {
        let len = (id as u32 & 0x7FFF_FFFF) as usize;
        Ok(cursor.read_chars(len)?)
    } else {
        string_table
            .get(id as usize)
            .cloned()
            .ok_or(Error::BadStringIndex {
                index: id,
                len: string_table.len(),
            })
    }
}

/// Skip padding after a byte run to realign to 4 bytes.
fn pad_to_len(cursor: &mut ByteCursor<'_>, len: usize) -> Result<()> {
    let extra = 4 - (len % 4);
    if extra < 4 {
        cursor.read(extra)?;
    }
    Ok(())
}

impl Variant {
    /// Decode one variant.
    pub fn decode(
        cursor: &mut ByteCursor<'_>,
        format_version: i32,
        string_table: &[String],
    ) -> Result<Variant> {
        Self::decode_at_depth(cursor, format_version, string_table, 0)
    }

    fn decode_at_depth(
        cursor: &mut ByteCursor<'_>,
        format_version: i32,
        string_table: &[String],
        depth: u32,
    ) -> Result<Variant> {
        if depth > MAX_DEPTH {
            return Err(Error::StructuralInvariant(format!(
                "variant nesting exceeds {MAX_DEPTH}"
            )));
        }
        let tag = cursor.read_i32()?;
        let value = match tag {
            VARIANT_NIL => Variant::Nil,
            VARIANT_BOOL => Variant::Bool(cursor.read_u32()? != 0),
            VARIANT_INT => Variant::Int(cursor.read_i32()?),
            VARIANT_INT64 => Variant::Int64(cursor.read_i64()?),
            VARIANT_FLOAT => Variant::Float(cursor.read_f32()?),
            VARIANT_DOUBLE => Variant::Double(cursor.read_f64()?),
            VARIANT_STRING => Variant::String(cursor.read_string()?),
            VARIANT_STRING_NAME => Variant::StringName(cursor.read_string()?),
            VARIANT_VECTOR2 => Variant::Vector2(cursor.read_vector2()?),
            VARIANT_VECTOR2I => Variant::Vector2i(cursor.read_ivector2()?),
            VARIANT_RECT2 => Variant::Rect2 {
                position: cursor.read_vector2()?,
                size: cursor.read_vector2()?,
            },
            VARIANT_RECT2I => Variant::Rect2i {
                position: cursor.read_ivector2()?,
                size: cursor.read_ivector2()?,
            },
            VARIANT_VECTOR3 => Variant::Vector3(cursor.read_vector3()?),
            VARIANT_VECTOR3I => Variant::Vector3i(cursor.read_ivector3()?),
            VARIANT_VECTOR4 => Variant::Vector4(cursor.read_vector4()?),
            VARIANT_VECTOR4I => Variant::Vector4i(cursor.read_ivector4()?),
            VARIANT_PLANE => Variant::Plane {
                normal: cursor.read_vector3()?,
                d: cursor.read_f32()?,
            },
            VARIANT_QUATERNION => Variant::Quaternion(cursor.read_quaternion()?),
            VARIANT_AABB => Variant::Aabb {
                position: cursor.read_vector3()?,
                size: cursor.read_vector3()?,
            },
            VARIANT_BASIS => Variant::Basis {
                rows: [
                    cursor.read_vector3()?,
                    cursor.read_vector3()?,
                    cursor.read_vector3()?,
                ],
            },
            VARIANT_TRANSFORM2D => Variant::Transform2d {
                columns: [
                    cursor.read_vector2()?,
                    cursor.read_vector2()?,
                    cursor.read_vector2()?,
                ],
            },
            VARIANT_TRANSFORM3D => Variant::Transform3d {
                rows: [
                    cursor.read_vector3()?,
                    cursor.read_vector3()?,
                    cursor.read_vector3()?,
                ],
                origin: cursor.read_vector3()?,
            },
            VARIANT_PROJECTION => Variant::Projection {
                columns: [
                    cursor.read_vector4()?,
                    cursor.read_vector4()?,
                    cursor.read_vector4()?,
                    cursor.read_vector4()?,
                ],
            },
            VARIANT_COLOR => Variant::Color(cursor.read_color()?),
            VARIANT_NODE_PATH => {
                let num_names = cursor.read_i16()? as i32;
                let raw_subnames = cursor.read_i16()? as u16;
                let absolute = raw_subnames & 0x8000 != 0;
                let mut num_subnames = (raw_subnames & 0x7FFF) as i32;
                if format_version < FORMAT_VERSION_NO_NODEPATH_PROPERTY {
                    num_subnames += 1;
                }
                let mut names = Vec::new();
                for _ in 0..num_names {
                    names.push(read_string_ref(cursor, string_table)?);
                }
                let mut subnames = Vec::new();
                for _ in 0..num_subnames {
                    subnames.push(read_string_ref(cursor, string_table)?);
                }
                Variant::NodePath(NodePath {
                    names,
                    subnames,
                    absolute,
                })
            }
            VARIANT_RID => Variant::Rid(cursor.read_i32()?),
            VARIANT_OBJECT => {
                let kind = cursor.read_i32()?;
                let object = match kind {
                    OBJECT_EMPTY => ObjectRef::Empty,
                    OBJECT_EXTERNAL_RESOURCE => ObjectRef::External {
                        type_name: cursor.read_string()?,
                        path: cursor.read_string()?,
                    },
                    OBJECT_INTERNAL_RESOURCE => ObjectRef::Internal(cursor.read_i32()?),
                    OBJECT_EXTERNAL_RESOURCE_INDEX => {
                        ObjectRef::ExternalIndex(cursor.read_i32()?)
                    }
                    other => return Err(Error::BadVariantTag(other)),
                };
                Variant::Object(object)
            }
            VARIANT_CALLABLE => Variant::Callable,
            VARIANT_SIGNAL => Variant::Signal,
            VARIANT_DICTIONARY => {
                let len = cursor.read_i32()? & 0x7FFF_FFFF;
                let mut pairs = Vec::new();
                for _ in 0..len {
                    let key =
                        Self::decode_at_depth(cursor, format_version, string_table, depth + 1)?;
                    let value =
                        Self::decode_at_depth(cursor, format_version, string_table, depth + 1)?;
                    pairs.push((key, value));
                }
                Variant::Dictionary(pairs)
            }
            VARIANT_ARRAY => {
                let len = cursor.read_i32()? & 0x7FFF_FFFF;
                let mut items = Vec::new();
                for _ in 0..len {
                    items.push(Self::decode_at_depth(
                        cursor,
                        format_version,
                        string_table,
                        depth + 1,
                    )?);
                }
                Variant::Array(items)
            }
            VARIANT_PACKED_BYTE_ARRAY => {
                let len = cursor.read_i32()?.max(0) as usize;
                let bytes = cursor.read(len)?.to_vec();
                pad_to_len(cursor, len)?;
                Variant::PackedByteArray(bytes)
            }
            VARIANT_PACKED_INT32_ARRAY => {
                let len = cursor.read_i32()?.max(0) as usize;
                Variant::PackedInt32Array(cursor.read_array(Some(len), |c| c.read_i32())?)
            }
            VARIANT_PACKED_INT64_ARRAY => {
                let len = cursor.read_i32()?.max(0) as usize;
                Variant::PackedInt64Array(cursor.read_array(Some(len), |c| c.read_i64())?)
            }
            VARIANT_PACKED_FLOAT32_ARRAY => {
                let len = cursor.read_i32()?.max(0) as usize;
                Variant::PackedFloat32Array(cursor.read_array(Some(len), |c| c.read_f32())?)
            }
            VARIANT_PACKED_FLOAT64_ARRAY => {
                let len = cursor.read_i32()?.max(0) as usize;
                Variant::PackedFloat64Array(cursor.read_array(Some(len), |c| c.read_f64())?)
            }
            VARIANT_PACKED_STRING_ARRAY => {
                let len = cursor.read_i32()?.max(0) as usize;
                Variant::PackedStringArray(cursor.read_array(Some(len), |c| c.read_string())?)
            }
            VARIANT_PACKED_VECTOR2_ARRAY => {
                let len = cursor.read_i32()?.max(0) as usize;
                Variant::PackedVector2Array(cursor.read_array(Some(len), |c| c.read_vector2())?)
            }
            VARIANT_PACKED_VECTOR3_ARRAY => {
                let len = cursor.read_i32()?.max(0) as usize;
                Variant::PackedVector3Array(cursor.read_array(Some(len), |c| c.read_vector3())?)
            }
            VARIANT_PACKED_COLOR_ARRAY => {
                let len = cursor.read_i32()?.max(0) as usize;
                Variant::PackedColorArray(cursor.read_array(Some(len), |c| c.read_color())?)
            }
            other => return Err(Error::BadVariantTag(other)),
        };
        Ok(value)
    }
}
