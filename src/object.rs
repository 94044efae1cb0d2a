//! Typed payload encoding/decoding and the descriptor cache entry shape.
//!
//! Inline types carry their value directly in the tree node's 16-byte
//! payload slot. External types (tag >= `Blob`) store `[data_offset:8]
//! [data_size:8]` in that same slot, pointing at a separately allocated data
//! extent holding the encoded content.

use uuid::Uuid;

use crate::error::{ParcelError, Result};
use crate::types::ObjectType;

/// A decoded object value, one variant per `ObjectType` tag.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Bool(bool),
    Uint(u64),
    Sint(i64),
    Float(f64),
    Uuid(Uuid),
    Blob(Vec<u8>),
    String(String),
    List(Vec<Uuid>),
    /// `(name_uuid, data_uuid)` — the two pointers stored in a file node's
    /// data extent.
    File(Uuid, Uuid),
}

impl Value {
    pub fn object_type(&self) -> ObjectType {
        match self {
            Value::Null => ObjectType::Null,
            Value::Bool(_) => ObjectType::Bool,
            Value::Uint(_) => ObjectType::Uint,
            Value::Sint(_) => ObjectType::Sint,
            Value::Float(_) => ObjectType::Float,
            Value::Uuid(_) => ObjectType::Uuid,
            Value::Blob(_) => ObjectType::Blob,
            Value::String(_) => ObjectType::String,
            Value::List(_) => ObjectType::List,
            Value::File(..) => ObjectType::File,
        }
    }
}

/// Cached view of a tree node, keyed by UUID in `Parcel`'s in-memory cache.
#[derive(Debug, Clone)]
pub struct ObjectInfo {
    pub offset: u64,
    pub parent: Option<u64>,
    pub lnode: u64,
    pub rnode: u64,
    pub object_type: ObjectType,
    pub extra: u8,
    pub inline_payload: [u8; 16],
    pub data_offset: Option<u64>,
    pub data_size: Option<u64>,
}

/// Encodes an inline value (tag < `Blob`) into the tree node's 16-byte slot.
pub fn encode_inline(value: &Value) -> [u8; 16] {
    let mut buf = [0u8; 16];
    match value {
        Value::Null => {}
        Value::Bool(b) => buf[0] = if *b { 1 } else { 0 },
        Value::Uint(v) => buf[0..8].copy_from_slice(&v.to_be_bytes()),
        Value::Sint(v) => buf[0..8].copy_from_slice(&v.to_be_bytes()),
        Value::Float(v) => buf[0..8].copy_from_slice(&v.to_be_bytes()),
        Value::Uuid(u) => buf.copy_from_slice(u.as_bytes()),
        _ => unreachable!("encode_inline called on an external type"),
    }
    buf
}

pub fn decode_inline(object_type: ObjectType, payload: &[u8; 16]) -> Result<Value> {
    Ok(match object_type {
        ObjectType::Null => Value::Null,
        ObjectType::Bool => Value::Bool(payload[0] != 0),
        ObjectType::Uint => Value::Uint(u64::from_be_bytes(payload[0..8].try_into().unwrap())),
        ObjectType::Sint => Value::Sint(i64::from_be_bytes(payload[0..8].try_into().unwrap())),
        ObjectType::Float => Value::Float(f64::from_be_bytes(payload[0..8].try_into().unwrap())),
        ObjectType::Uuid => Value::Uuid(Uuid::from_slice(payload).map_err(|_| ParcelError::Trunc)?),
        _ => return Err(ParcelError::TypeMismatch),
    })
}

/// Encodes the bytes to be written into an external type's data extent
/// (everything after the tree node's offset/size pointer).
pub fn encode_external(value: &Value) -> Vec<u8> {
    match value {
        Value::Blob(bytes) => {
            let mut out = Vec::with_capacity(8 + bytes.len());
            out.extend_from_slice(&(bytes.len() as u64).to_be_bytes());
            out.extend_from_slice(bytes);
            out
        }
        Value::String(s) => {
            let bytes = s.as_bytes();
            let mut out = Vec::with_capacity(8 + bytes.len());
            out.extend_from_slice(&(bytes.len() as u64).to_be_bytes());
            out.extend_from_slice(bytes);
            out
        }
        Value::List(items) => {
            let mut out = Vec::with_capacity(8 + items.len() * 16);
            out.extend_from_slice(&(items.len() as u64).to_be_bytes());
            for item in items {
                out.extend_from_slice(item.as_bytes());
            }
            out
        }
        Value::File(name, data) => {
            let mut out = Vec::with_capacity(32);
            out.extend_from_slice(name.as_bytes());
            out.extend_from_slice(data.as_bytes());
            out
        }
        _ => unreachable!("encode_external called on an inline type"),
    }
}

pub fn decode_external(object_type: ObjectType, bytes: &[u8]) -> Result<Value> {
    match object_type {
        ObjectType::Blob => {
            let len = u64::from_be_bytes(bytes.get(0..8).ok_or(ParcelError::Trunc)?.try_into().unwrap()) as usize;
            let content = bytes.get(8..8 + len).ok_or(ParcelError::Trunc)?;
            Ok(Value::Blob(content.to_vec()))
        }
        ObjectType::String => {
            let len = u64::from_be_bytes(bytes.get(0..8).ok_or(ParcelError::Trunc)?.try_into().unwrap()) as usize;
            let content = bytes.get(8..8 + len).ok_or(ParcelError::Trunc)?;
            let s = std::str::from_utf8(content).map_err(|_| ParcelError::Trunc)?;
            Ok(Value::String(s.to_string()))
        }
        ObjectType::List => {
            let count = u64::from_be_bytes(bytes.get(0..8).ok_or(ParcelError::Trunc)?.try_into().unwrap()) as usize;
            let mut items = Vec::with_capacity(count);
            for i in 0..count {
                let start = 8 + i * 16;
                let slice = bytes.get(start..start + 16).ok_or(ParcelError::Trunc)?;
                items.push(Uuid::from_slice(slice).map_err(|_| ParcelError::Trunc)?);
            }
            Ok(Value::List(items))
        }
        ObjectType::File => {
            let name = Uuid::from_slice(bytes.get(0..16).ok_or(ParcelError::Trunc)?).map_err(|_| ParcelError::Trunc)?;
            let data = Uuid::from_slice(bytes.get(16..32).ok_or(ParcelError::Trunc)?).map_err(|_| ParcelError::Trunc)?;
            Ok(Value::File(name, data))
        }
        _ => Err(ParcelError::TypeMismatch),
    }
}

/// Packs `(data_offset, data_size)` into a tree node's inline payload slot
/// for an external type.
pub fn encode_data_ptr(offset: u64, size: u64) -> [u8; 16] {
    let mut buf = [0u8; 16];
    buf[0..8].copy_from_slice(&offset.to_be_bytes());
    buf[8..16].copy_from_slice(&size.to_be_bytes());
    buf
}

pub fn decode_data_ptr(payload: &[u8; 16]) -> (u64, u64) {
    let offset = u64::from_be_bytes(payload[0..8].try_into().unwrap());
    let size = u64::from_be_bytes(payload[8..16].try_into().unwrap());
    (offset, size)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn inline_uint_roundtrip() {
        let v = Value::Uint(0x1122334455667788);
        let buf = encode_inline(&v);
        assert_eq!(decode_inline(ObjectType::Uint, &buf).unwrap(), v);
    }

    #[test]
    fn external_string_roundtrip() {
        let v = Value::String("hello parcel".to_string());
        let bytes = encode_external(&v);
        assert_eq!(decode_external(ObjectType::String, &bytes).unwrap(), v);
    }

    #[test]
    fn external_list_roundtrip() {
        let v = Value::List(vec![Uuid::from_u128(1), Uuid::from_u128(2)]);
        let bytes = encode_external(&v);
        assert_eq!(decode_external(ObjectType::List, &bytes).unwrap(), v);
    }

    #[test]
    fn data_ptr_roundtrip() {
        let buf = encode_data_ptr(4096, 128);
        assert_eq!(decode_data_ptr(&buf), (4096, 128));
    }
}
