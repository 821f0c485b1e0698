//! Field specifications: one declared field bound to a codec, a default
//! value, and a remote key.

use crate::codec::Codec;
use crate::error::{Error, Result};
use crate::value::{TypeDesc, Value};

/// How a field is stored: one scalar key, or one remote hash with a codec
/// for keys and another for values.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum FieldKind {
    Scalar(Codec),
    Map { key: Codec, value: Codec },
}

/// Binds a codec, a default value, and a remote key to one named field.
///
/// The remote key is `{record-qualified-name}.{field-name}`, so distinct
/// record types never collide. Immutable once the schema is built.
#[derive(Debug, Clone)]
pub struct FieldSpec {
    name: String,
    kind: FieldKind,
    default: Value,
    key: String,
}

impl FieldSpec {
    pub(crate) fn new(
        prefix: &str,
        name: &str,
        desc: &TypeDesc,
        default: Value,
    ) -> Result<FieldSpec> {
        let kind = resolve(name, desc, true)?;
        Ok(FieldSpec {
            name: name.to_string(),
            kind,
            default,
            key: format!("{prefix}.{name}"),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// The remote key (or hash key, for map fields) backing this field.
    pub fn remote_key(&self) -> &str {
        &self.key
    }

    pub fn default_value(&self) -> &Value {
        &self.default
    }

    pub fn is_map(&self) -> bool {
        matches!(self.kind, FieldKind::Map { .. })
    }

    pub(crate) fn kind(&self) -> &FieldKind {
        &self.kind
    }

    /// Canonical text form of the field for the schema signature.
    pub(crate) fn signature(&self) -> String {
        match &self.kind {
            FieldKind::Scalar(codec) => format!("{}:{}", self.name, codec.signature()),
            FieldKind::Map { key, value } => {
                format!("{}:map<{},{}>", self.name, key.signature(), value.signature())
            }
        }
    }
}

/// Resolves a declared type into its storage kind, once, at registration
/// time. `allow_container` is cleared while resolving map type arguments:
/// map fields may only appear at the top level of a field declaration.
fn resolve(field: &str, desc: &TypeDesc, allow_container: bool) -> Result<FieldKind> {
    match desc {
        TypeDesc::Optional(inner) => resolve(field, inner, allow_container),
        TypeDesc::Map(key, value) => {
            if !allow_container {
                return Err(Error::NestedContainer(field.to_string()));
            }
            let key = scalar_codec(field, key)?;
            let value = scalar_codec(field, value)?;
            Ok(FieldKind::Map { key, value })
        }
        scalar => Ok(FieldKind::Scalar(scalar_codec(field, scalar)?)),
    }
}

fn scalar_codec(field: &str, desc: &TypeDesc) -> Result<Codec> {
    match desc {
        TypeDesc::Bool => Ok(Codec::Bool),
        TypeDesc::Int { width, signed } => {
            if !(1..=8).contains(width) {
                return Err(Error::InvalidIntWidth {
                    field: field.to_string(),
                    width: *width,
                });
            }
            Ok(Codec::Int {
                width: *width,
                signed: *signed,
            })
        }
        TypeDesc::Float => Ok(Codec::Float),
        TypeDesc::Str => Ok(Codec::Str),
        TypeDesc::Bytes => Ok(Codec::Bytes),
        TypeDesc::Opaque => Ok(Codec::Opaque),
        TypeDesc::Optional(inner) => scalar_codec(field, inner),
        TypeDesc::Map(..) => Err(Error::NestedContainer(field.to_string())),
    }
}
