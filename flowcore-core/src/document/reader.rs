//! Offset-based MessagePack scanning. Nothing here allocates or decodes values.

use super::{DocumentError, Result};
use rmp::Marker;

/// Length prefix of a container.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    pub len: usize,
    pub header_len: usize,
}

fn marker_at(bytes: &[u8], at: usize) -> Result<Marker> {
    bytes
        .get(at)
        .map(|b| Marker::from_u8(*b))
        .ok_or(DocumentError::Truncated(at))
}

fn read_be(bytes: &[u8], at: usize, width: usize) -> Result<usize> {
    let end = at + width;
    let slice = bytes.get(at..end).ok_or(DocumentError::Truncated(bytes.len()))?;
    Ok(slice.iter().fold(0usize, |acc, b| (acc << 8) | *b as usize))
}

/// Human-readable type of the value starting at `at`.
pub fn type_name(bytes: &[u8], at: usize) -> Result<&'static str> {
    let name = match marker_at(bytes, at)? {
        Marker::Null => "nil",
        Marker::True | Marker::False => "boolean",
        Marker::FixPos(_)
        | Marker::FixNeg(_)
        | Marker::U8
        | Marker::U16
        | Marker::U32
        | Marker::U64
        | Marker::I8
        | Marker::I16
        | Marker::I32
        | Marker::I64 => "integer",
        Marker::F32 | Marker::F64 => "float",
        Marker::FixStr(_) | Marker::Str8 | Marker::Str16 | Marker::Str32 => "string",
        Marker::Bin8 | Marker::Bin16 | Marker::Bin32 => "binary",
        Marker::FixArray(_) | Marker::Array16 | Marker::Array32 => "array",
        Marker::FixMap(_) | Marker::Map16 | Marker::Map32 => "map",
        Marker::Reserved => return Err(DocumentError::ReservedMarker(at)),
        _ => "extension",
    };
    Ok(name)
}

pub fn read_array_header(bytes: &[u8]) -> Result<Header> {
    match marker_at(bytes, 0)? {
        Marker::FixArray(len) => Ok(Header {
            len: len as usize,
            header_len: 1,
        }),
        Marker::Array16 => Ok(Header {
            len: read_be(bytes, 1, 2)?,
            header_len: 3,
        }),
        Marker::Array32 => Ok(Header {
            len: read_be(bytes, 1, 4)?,
            header_len: 5,
        }),
        _ => Err(DocumentError::NotAnArray(type_name(bytes, 0)?)),
    }
}

pub fn read_map_header(bytes: &[u8]) -> Result<Header> {
    match marker_at(bytes, 0)? {
        Marker::FixMap(len) => Ok(Header {
            len: len as usize,
            header_len: 1,
        }),
        Marker::Map16 => Ok(Header {
            len: read_be(bytes, 1, 2)?,
            header_len: 3,
        }),
        Marker::Map32 => Ok(Header {
            len: read_be(bytes, 1, 4)?,
            header_len: 5,
        }),
        _ => Err(DocumentError::NotAMap(type_name(bytes, 0)?)),
    }
}

/// Reads a string at `at`; returns it and the offset just past it.
pub fn read_str(bytes: &[u8], at: usize) -> Result<(&str, usize)> {
    let (len, start) = match marker_at(bytes, at)? {
        Marker::FixStr(len) => (len as usize, at + 1),
        Marker::Str8 => (read_be(bytes, at + 1, 1)?, at + 2),
        Marker::Str16 => (read_be(bytes, at + 1, 2)?, at + 3),
        Marker::Str32 => (read_be(bytes, at + 1, 4)?, at + 5),
        _ => {
            return Err(DocumentError::NonStringKey {
                at,
                found: type_name(bytes, at)?,
            })
        }
    };
    let end = start + len;
    let raw = bytes.get(start..end).ok_or(DocumentError::Truncated(bytes.len()))?;
    let s = std::str::from_utf8(raw).map_err(|e| DocumentError::Decode(e.to_string()))?;
    Ok((s, end))
}

/// Returns the offset just past the value starting at `at`.
///
/// Nested containers are walked with a pending-value counter instead of
/// recursion, so arbitrarily deep documents cannot exhaust the stack.
pub fn skip_value(bytes: &[u8], at: usize) -> Result<usize> {
    let mut cursor = at;
    let mut pending: usize = 1;
    while pending > 0 {
        pending -= 1;
        let marker = marker_at(bytes, cursor)?;
        cursor += 1;
        match marker {
            Marker::Null
            | Marker::True
            | Marker::False
            | Marker::FixPos(_)
            | Marker::FixNeg(_) => {}
            Marker::U8 | Marker::I8 => cursor += 1,
            Marker::U16 | Marker::I16 => cursor += 2,
            Marker::U32 | Marker::I32 | Marker::F32 => cursor += 4,
            Marker::U64 | Marker::I64 | Marker::F64 => cursor += 8,
            Marker::FixStr(len) => cursor += len as usize,
            Marker::Str8 | Marker::Bin8 => cursor += 1 + read_be(bytes, cursor, 1)?,
            Marker::Str16 | Marker::Bin16 => cursor += 2 + read_be(bytes, cursor, 2)?,
            Marker::Str32 | Marker::Bin32 => cursor += 4 + read_be(bytes, cursor, 4)?,
            Marker::FixArray(len) => pending += len as usize,
            Marker::Array16 => {
                pending += read_be(bytes, cursor, 2)?;
                cursor += 2;
            }
            Marker::Array32 => {
                pending += read_be(bytes, cursor, 4)?;
                cursor += 4;
            }
            Marker::FixMap(len) => pending += 2 * len as usize,
            Marker::Map16 => {
                pending += 2 * read_be(bytes, cursor, 2)?;
                cursor += 2;
            }
            Marker::Map32 => {
                pending += 2 * read_be(bytes, cursor, 4)?;
                cursor += 4;
            }
            Marker::FixExt1 => cursor += 2,
            Marker::FixExt2 => cursor += 3,
            Marker::FixExt4 => cursor += 5,
            Marker::FixExt8 => cursor += 9,
            Marker::FixExt16 => cursor += 17,
            Marker::Ext8 => cursor += 2 + read_be(bytes, cursor, 1)?,
            Marker::Ext16 => cursor += 3 + read_be(bytes, cursor, 2)?,
            Marker::Ext32 => cursor += 5 + read_be(bytes, cursor, 4)?,
            Marker::Reserved => return Err(DocumentError::ReservedMarker(cursor - 1)),
        }
        if cursor > bytes.len() {
            return Err(DocumentError::Truncated(bytes.len()));
        }
    }
    Ok(cursor)
}
