//! Byte encodings for scalar field values.

use crate::error::{Error, Result};
use crate::value::Value;

/// Encodes one logical value to and from its stored byte form.
///
/// Each codec accepts only values of its own kind and within its configured
/// range; a mismatched value or byte layout is a serialization error, never a
/// silent coercion. `decode` accepts exactly the layout its own `encode`
/// produces.
#[derive(Debug, Clone, PartialEq)]
pub enum Codec {
    /// One byte: `0xFF` for true, `0x00` for false.
    Bool,
    /// Big-endian two's-complement integer at a fixed byte width.
    Int { width: usize, signed: bool },
    /// IEEE-754 double, big-endian.
    Float,
    /// UTF-8 bytes.
    Str,
    /// Identity.
    Bytes,
    /// Generic binary encoding for values with no dedicated codec.
    Opaque,
}

impl Codec {
    pub fn encode(&self, value: &Value) -> Result<Vec<u8>> {
        match (self, value) {
            (Codec::Bool, Value::Bool(v)) => Ok(vec![if *v { 0xFF } else { 0x00 }]),
            (Codec::Int { width, signed }, Value::Int(v)) => encode_int(*v, *width, *signed),
            (Codec::Float, Value::Float(v)) => Ok(v.to_be_bytes().to_vec()),
            (Codec::Str, Value::Str(v)) => Ok(v.as_bytes().to_vec()),
            (Codec::Bytes, Value::Bytes(v)) => Ok(v.clone()),
            (Codec::Opaque, v) => {
                bincode::serialize(v).map_err(|e| Error::Serialization(e.to_string()))
            }
            (codec, v) => Err(Error::Serialization(format!(
                "{} codec cannot encode a {} value",
                codec.name(),
                v.kind_name()
            ))),
        }
    }

    pub fn decode(&self, raw: &[u8]) -> Result<Value> {
        match self {
            Codec::Bool => match raw {
                [0xFF] => Ok(Value::Bool(true)),
                [0x00] => Ok(Value::Bool(false)),
                _ => Err(Error::Serialization(format!(
                    "invalid bool encoding: {raw:?}"
                ))),
            },
            Codec::Int { width, signed } => decode_int(raw, *width, *signed),
            Codec::Float => {
                let bytes: [u8; 8] = raw.try_into().map_err(|_| {
                    Error::Serialization(format!("expected 8 float bytes, got {}", raw.len()))
                })?;
                Ok(Value::Float(f64::from_be_bytes(bytes)))
            }
            Codec::Str => String::from_utf8(raw.to_vec())
                .map(Value::Str)
                .map_err(|e| Error::Serialization(e.to_string())),
            Codec::Bytes => Ok(Value::Bytes(raw.to_vec())),
            Codec::Opaque => {
                bincode::deserialize(raw).map_err(|e| Error::Serialization(e.to_string()))
            }
        }
    }

    /// Canonical text form used in the schema signature.
    pub(crate) fn signature(&self) -> String {
        match self {
            Codec::Bool => "bool".to_string(),
            Codec::Int { width, signed } => {
                format!("int:{}:{}", width, if *signed { "signed" } else { "unsigned" })
            }
            Codec::Float => "float".to_string(),
            Codec::Str => "str".to_string(),
            Codec::Bytes => "bytes".to_string(),
            Codec::Opaque => "opaque".to_string(),
        }
    }

    fn name(&self) -> &'static str {
        match self {
            Codec::Bool => "bool",
            Codec::Int { .. } => "int",
            Codec::Float => "float",
            Codec::Str => "str",
            Codec::Bytes => "bytes",
            Codec::Opaque => "opaque",
        }
    }
}

fn encode_int(value: i64, width: usize, signed: bool) -> Result<Vec<u8>> {
    let bits = (width * 8) as u32;
    let (min, max): (i128, i128) = if signed {
        (-(1i128 << (bits - 1)), (1i128 << (bits - 1)) - 1)
    } else if width >= 8 {
        (0, i64::MAX as i128)
    } else {
        (0, (1i128 << bits) - 1)
    };
    let v = value as i128;
    if v < min || v > max {
        return Err(Error::Serialization(format!(
            "{value} does not fit a {width}-byte {} integer",
            if signed { "signed" } else { "unsigned" }
        )));
    }
    Ok(value.to_be_bytes()[8 - width..].to_vec())
}

fn decode_int(raw: &[u8], width: usize, signed: bool) -> Result<Value> {
    if raw.len() != width {
        return Err(Error::Serialization(format!(
            "expected {width} integer bytes, got {}",
            raw.len()
        )));
    }
    let fill = if signed && raw[0] & 0x80 != 0 { 0xFF } else { 0x00 };
    let mut buf = [fill; 8];
    buf[8 - width..].copy_from_slice(raw);
    let value = i64::from_be_bytes(buf);
    if !signed && value < 0 {
        return Err(Error::Serialization(
            "unsigned value exceeds the representable integer range".to_string(),
        ));
    }
    Ok(Value::Int(value))
}
