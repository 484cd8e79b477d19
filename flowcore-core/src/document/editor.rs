//! In-place structural edits of encoded arrays.

use super::reader::{read_array_header, skip_value};
use super::{validate_value, DocumentError, Result, NIL};

/// An array of `size` nils.
pub fn nil_array(size: usize) -> Result<Vec<u8>> {
    let len = u32::try_from(size)
        .map_err(|_| DocumentError::Encode(format!("array of {size} elements is too large")))?;
    let mut buf = Vec::with_capacity(size + 5);
    rmp::encode::write_array_len(&mut buf, len)
        .map_err(|e| DocumentError::Encode(e.to_string()))?;
    buf.resize(buf.len() + size, NIL);
    Ok(buf)
}

/// Replaces the element at `index` (1-based) of the encoded array
/// `collection` with the encoded value `element`.
///
/// The result is written to `out`, which is cleared first. Only the bytes of
/// the replaced element differ between input and output.
pub fn replace_array_element(
    collection: &[u8],
    index: usize,
    element: &[u8],
    out: &mut Vec<u8>,
) -> Result<()> {
    let header = read_array_header(collection)?;
    if index == 0 || index > header.len {
        return Err(DocumentError::IndexOutOfBounds {
            index,
            size: header.len,
        });
    }
    validate_value(element)?;

    let mut start = header.header_len;
    for _ in 1..index {
        start = skip_value(collection, start)?;
    }
    let end = skip_value(collection, start)?;

    out.clear();
    out.reserve(collection.len() - (end - start) + element.len());
    out.extend_from_slice(&collection[..start]);
    out.extend_from_slice(element);
    out.extend_from_slice(&collection[end..]);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::{decode, encode};
    use serde_json::json;

    #[test]
    fn nil_array_decodes_to_nulls() {
        assert_eq!(decode(&nil_array(3).unwrap()).unwrap(), json!([null, null, null]));
        assert_eq!(nil_array(0).unwrap(), vec![0x90]);
        assert_eq!(decode(&nil_array(40).unwrap()).unwrap().as_array().unwrap().len(), 40);
    }

    #[test]
    fn replaces_only_the_target_element() {
        let collection = encode(&json!(["a", {"k": [1, 2]}, 3])).unwrap();
        let element = encode(&json!({"replaced": true})).unwrap();
        let mut out = Vec::new();

        replace_array_element(&collection, 2, &element, &mut out).unwrap();

        assert_eq!(decode(&out).unwrap(), json!(["a", {"replaced": true}, 3]));
        let prefix = 1 + 2;
        assert_eq!(out[..prefix], collection[..prefix]);
        assert!(out.ends_with(&[0x03]));
    }

    #[test]
    fn fills_a_nil_array_in_any_order() {
        let mut collection = nil_array(3).unwrap();
        let mut scratch = Vec::new();
        for (index, value) in [(3, json!(30)), (1, json!(10)), (2, json!(20))] {
            let element = encode(&value).unwrap();
            replace_array_element(&collection, index, &element, &mut scratch).unwrap();
            std::mem::swap(&mut collection, &mut scratch);
        }
        assert_eq!(decode(&collection).unwrap(), json!([10, 20, 30]));
    }

    #[test]
    fn index_must_be_in_range() {
        let collection = nil_array(2).unwrap();
        let mut out = Vec::new();
        assert_eq!(
            replace_array_element(&collection, 0, &[NIL], &mut out),
            Err(DocumentError::IndexOutOfBounds { index: 0, size: 2 })
        );
        assert_eq!(
            replace_array_element(&collection, 3, &[NIL], &mut out),
            Err(DocumentError::IndexOutOfBounds { index: 3, size: 2 })
        );
    }

    #[test]
    fn collection_must_be_an_array() {
        let not_array = encode(&json!({"a": 1})).unwrap();
        let mut out = Vec::new();
        assert_eq!(
            replace_array_element(&not_array, 1, &[NIL], &mut out),
            Err(DocumentError::NotAnArray("map"))
        );
    }
}
