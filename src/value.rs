//! Runtime field values and declared type descriptors.

use serde::{Deserialize, Serialize};

/// A dynamically typed field value.
///
/// `Value::None` is the null value: writing it to a scalar field deletes the
/// backing key, and reading an absent key yields the field's default.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    None,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    Bytes(Vec<u8>),
    /// Entries of a map field. Snapshots are ordered by encoded key.
    Map(Vec<(Value, Value)>),
}

impl Value {
    pub fn is_none(&self) -> bool {
        matches!(self, Value::None)
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_float(&self) -> Option<f64> {
        match self {
            Value::Float(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Value::Bytes(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_map(&self) -> Option<&[(Value, Value)]> {
        match self {
            Value::Map(v) => Some(v),
            _ => None,
        }
    }

    pub(crate) fn kind_name(&self) -> &'static str {
        match self {
            Value::None => "none",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::Str(_) => "str",
            Value::Bytes(_) => "bytes",
            Value::Map(_) => "map",
        }
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Int(v as i64)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Str(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Str(v)
    }
}

impl From<Vec<u8>> for Value {
    fn from(v: Vec<u8>) -> Self {
        Value::Bytes(v)
    }
}

impl From<Vec<(Value, Value)>> for Value {
    fn from(v: Vec<(Value, Value)>) -> Self {
        Value::Map(v)
    }
}

/// The declared type of a field, resolved to a codec when the schema is
/// built.
///
/// `Optional` reduces to the codec of its inner type: null is stored as key
/// absence, never as a serialized marker. `Map` binds a key codec and a value
/// codec and is only valid as a top-level field type.
#[derive(Debug, Clone, PartialEq)]
pub enum TypeDesc {
    Bool,
    Int { width: usize, signed: bool },
    Float,
    Str,
    Bytes,
    /// Any value, stored with the generic binary encoding.
    Opaque,
    Optional(Box<TypeDesc>),
    Map(Box<TypeDesc>, Box<TypeDesc>),
}

impl TypeDesc {
    /// The default integer encoding: 4 bytes, signed, big-endian.
    pub const INT: TypeDesc = TypeDesc::Int {
        width: 4,
        signed: true,
    };

    pub fn optional(inner: TypeDesc) -> TypeDesc {
        TypeDesc::Optional(Box::new(inner))
    }

    pub fn map(key: TypeDesc, value: TypeDesc) -> TypeDesc {
        TypeDesc::Map(Box::new(key), Box::new(value))
    }
}
