//! Decoded object values.
//!
//! The tree walker produces a structured, self-describing value for each
//! object: primitives at the leaves, arrays and ordered field records above
//! them. Field order matters (it mirrors the type tree), so records are kept
//! as ordered vectors rather than maps.

use serde::Serialize;

/// A named, typed field of a decoded record.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Field {
    pub name: String,
    pub type_name: String,
    pub value: ObjectValue,
}

/// A decoded object value.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum ObjectValue {
    Bool(bool),
    Int8(i8),
    UInt8(u8),
    Int16(i16),
    UInt16(u16),
    Int32(i32),
    UInt32(u32),
    Int64(i64),
    UInt64(u64),
    Float(f32),
    Double(f64),
    /// A single UTF-16 code unit, decoded to text.
    Char(String),
    String(String),
    /// A raw byte run: `TypelessData` or a byte-element array.
    Bytes(Vec<u8>),
    Array(Vec<ObjectValue>),
    /// An ordered record of child fields.
    Record(Vec<Field>),
    /// Decoding stopped at the object boundary; what precedes this marker is
    /// valid, the rest of the object could not be read.
    Interrupted,
}

impl ObjectValue {
    /// Try to get this value as a boolean.
    #[inline]
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            ObjectValue::Bool(v) => Some(*v),
            _ => None,
        }
    }

    /// Try to get this value as a signed integer, widening as needed.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            ObjectValue::Int8(v) => Some(*v as i64),
            ObjectValue::Int16(v) => Some(*v as i64),
            ObjectValue::Int32(v) => Some(*v as i64),
            ObjectValue::Int64(v) => Some(*v),
            ObjectValue::UInt8(v) => Some(*v as i64),
            ObjectValue::UInt16(v) => Some(*v as i64),
            ObjectValue::UInt32(v) => Some(*v as i64),
            ObjectValue::UInt64(v) => i64::try_from(*v).ok(),
            _ => None,
        }
    }

    /// Try to get this value as a float, widening as needed.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            ObjectValue::Float(v) => Some(*v as f64),
            ObjectValue::Double(v) => Some(*v),
            _ => None,
        }
    }

    /// Try to get this value as a string.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            ObjectValue::String(s) | ObjectValue::Char(s) => Some(s),
            _ => None,
        }
    }

    /// Try to get this value as raw bytes.
    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            ObjectValue::Bytes(b) => Some(b),
            _ => None,
        }
    }

    /// Try to get this value as an array.
    pub fn as_array(&self) -> Option<&[ObjectValue]> {
        match self {
            ObjectValue::Array(items) => Some(items),
            _ => None,
        }
    }

    /// Look up a record field by name.
    pub fn field(&self, name: &str) -> Option<&ObjectValue> {
        match self {
            ObjectValue::Record(fields) => fields
                .iter()
                .find(|f| f.name == name)
                .map(|f| &f.value),
            _ => None,
        }
    }

    /// True when this value or any nested value carries the interrupt marker.
    pub fn is_partial(&self) -> bool {
        match self {
            ObjectValue::Interrupted => true,
            ObjectValue::Array(items) => items.iter().any(|v| v.is_partial()),
            ObjectValue::Record(fields) => fields.iter().any(|f| f.value.is_partial()),
            _ => false,
        }
    }
}

impl std::fmt::Display for ObjectValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ObjectValue::Bool(v) => write!(f, "{v}"),
            ObjectValue::Int8(v) => write!(f, "{v}"),
            ObjectValue::UInt8(v) => write!(f, "{v}"),
            ObjectValue::Int16(v) => write!(f, "{v}"),
            ObjectValue::UInt16(v) => write!(f, "{v}"),
            ObjectValue::Int32(v) => write!(f, "{v}"),
            ObjectValue::UInt32(v) => write!(f, "{v}"),
            ObjectValue::Int64(v) => write!(f, "{v}"),
            ObjectValue::UInt64(v) => write!(f, "{v}"),
            ObjectValue::Float(v) => write!(f, "{v}"),
            ObjectValue::Double(v) => write!(f, "{v}"),
            ObjectValue::Char(s) | ObjectValue::String(s) => write!(f, "{s}"),
            ObjectValue::Bytes(b) => write!(f, "<{} bytes>", b.len()),
            ObjectValue::Array(items) => write!(f, "[{} items]", items.len()),
            ObjectValue::Record(fields) => write!(f, "{{{} fields}}", fields.len()),
            ObjectValue::Interrupted => write!(f, "<interrupted>"),
        }
    }
}
