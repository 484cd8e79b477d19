//! MessagePack documents.
//!
//! Variable values are stored as raw MessagePack. A *document* is a map with
//! string keys whose values stay encoded; readers index the top-level entries
//! without decoding them, and writers splice the raw value bytes back in.

pub mod editor;
pub mod reader;

use serde_json::{Map, Value};
use thiserror::Error;

/// Encoded `nil`.
pub const NIL: u8 = 0xc0;

/// Encoded empty map.
pub const EMPTY_DOCUMENT: [u8; 1] = [0x80];

#[derive(Debug, Clone, PartialEq, Error)]
pub enum DocumentError {
    #[error("document is truncated at byte {0}")]
    Truncated(usize),

    #[error("reserved marker at byte {0}")]
    ReservedMarker(usize),

    #[error("expected a document (map) but found {0}")]
    NotAMap(&'static str),

    #[error("expected document keys to be strings, found {found} at byte {at}")]
    NonStringKey { at: usize, found: &'static str },

    #[error("expected an array but found {0}")]
    NotAnArray(&'static str),

    #[error("index {index} is out of bounds for an array of size {size}")]
    IndexOutOfBounds { index: usize, size: usize },

    #[error("expected exactly one value, found {0} trailing bytes")]
    TrailingBytes(usize),

    #[error("failed to encode value: {0}")]
    Encode(String),

    #[error("failed to decode value: {0}")]
    Decode(String),
}

pub type Result<T> = std::result::Result<T, DocumentError>;

/// One top-level entry of a document; the value is still encoded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DocumentEntry<'a> {
    pub name: &'a str,
    pub value: &'a [u8],
}

pub fn empty_document() -> Vec<u8> {
    EMPTY_DOCUMENT.to_vec()
}

pub fn encode(value: &Value) -> Result<Vec<u8>> {
    rmp_serde::to_vec(value).map_err(|e| DocumentError::Encode(e.to_string()))
}

pub fn decode(bytes: &[u8]) -> Result<Value> {
    rmp_serde::from_slice(bytes).map_err(|e| DocumentError::Decode(e.to_string()))
}

/// Encodes a JSON object as a document. `null` is treated as empty.
pub fn from_json(value: &Value) -> Result<Vec<u8>> {
    match value {
        Value::Null => Ok(empty_document()),
        Value::Object(_) => encode(value),
        Value::Bool(_) => Err(DocumentError::NotAMap("boolean")),
        Value::Number(_) => Err(DocumentError::NotAMap("number")),
        Value::String(_) => Err(DocumentError::NotAMap("string")),
        Value::Array(_) => Err(DocumentError::NotAMap("array")),
    }
}

/// Decodes a document into a JSON object. Empty input is an empty object.
pub fn to_json_map(bytes: &[u8]) -> Result<Map<String, Value>> {
    if bytes.is_empty() {
        return Ok(Map::new());
    }
    match decode(bytes)? {
        Value::Object(map) => Ok(map),
        Value::Null => Ok(Map::new()),
        _ => Err(DocumentError::NotAMap(reader::type_name(bytes, 0)?)),
    }
}

/// Indexes the top-level entries of a document without decoding values.
/// Empty input and `nil` are treated as an empty document.
pub fn entries(bytes: &[u8]) -> Result<Vec<DocumentEntry<'_>>> {
    if bytes.is_empty() || bytes == [NIL] {
        return Ok(Vec::new());
    }
    let header = reader::read_map_header(bytes)?;
    let mut entries = Vec::with_capacity(header.len);
    let mut cursor = header.header_len;
    for _ in 0..header.len {
        let (name, value_start) = reader::read_str(bytes, cursor)?;
        let value_end = reader::skip_value(bytes, value_start)?;
        entries.push(DocumentEntry {
            name,
            value: &bytes[value_start..value_end],
        });
        cursor = value_end;
    }
    if cursor != bytes.len() {
        return Err(DocumentError::TrailingBytes(bytes.len() - cursor));
    }
    Ok(entries)
}

/// Writes a document from already encoded values.
pub fn write_document<N: AsRef<str>, V: AsRef<[u8]>>(fields: &[(N, V)]) -> Result<Vec<u8>> {
    let len = u32::try_from(fields.len())
        .map_err(|_| DocumentError::Encode(format!("{} entries exceed a map", fields.len())))?;
    let capacity = fields
        .iter()
        .map(|(name, value)| name.as_ref().len() + value.as_ref().len() + 5)
        .sum::<usize>()
        + 5;
    let mut buf = Vec::with_capacity(capacity);
    rmp::encode::write_map_len(&mut buf, len).map_err(|e| DocumentError::Encode(e.to_string()))?;
    for (name, value) in fields {
        rmp::encode::write_str(&mut buf, name.as_ref())
            .map_err(|e| DocumentError::Encode(e.to_string()))?;
        buf.extend_from_slice(value.as_ref());
    }
    Ok(buf)
}

/// Checks that `bytes` holds exactly one well-formed value.
pub fn validate_value(bytes: &[u8]) -> Result<()> {
    let end = reader::skip_value(bytes, 0)?;
    if end != bytes.len() {
        return Err(DocumentError::TrailingBytes(bytes.len() - end));
    }
    Ok(())
}
