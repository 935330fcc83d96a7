//! BSON documents in either byte order.
//!
//! The `bson` crate always produces little-endian documents. A big-endian
//! server expects every multi-byte number inside the document (lengths,
//! int32/int64/double/date/timestamp values) byte-swapped, so after encoding
//! we walk the element tree and reverse each numeric field in place. The walk
//! reads every length in the byte order of the source buffer before swapping
//! it, which makes the same traversal work in both directions.

use crate::error::ProtocolError;
use bson::Document;

const TYPE_DOUBLE: u8 = 0x01;
const TYPE_STRING: u8 = 0x02;
const TYPE_DOCUMENT: u8 = 0x03;
const TYPE_ARRAY: u8 = 0x04;
const TYPE_BINARY: u8 = 0x05;
const TYPE_UNDEFINED: u8 = 0x06;
const TYPE_OBJECT_ID: u8 = 0x07;
const TYPE_BOOLEAN: u8 = 0x08;
const TYPE_DATETIME: u8 = 0x09;
const TYPE_NULL: u8 = 0x0A;
const TYPE_REGEX: u8 = 0x0B;
const TYPE_DB_POINTER: u8 = 0x0C;
const TYPE_CODE: u8 = 0x0D;
const TYPE_SYMBOL: u8 = 0x0E;
const TYPE_CODE_WITH_SCOPE: u8 = 0x0F;
const TYPE_INT32: u8 = 0x10;
const TYPE_TIMESTAMP: u8 = 0x11;
const TYPE_INT64: u8 = 0x12;
const TYPE_DECIMAL128: u8 = 0x13;
const TYPE_MIN_KEY: u8 = 0xFF;
const TYPE_MAX_KEY: u8 = 0x7F;

const OBJECT_ID_LENGTH: usize = 12;
const MIN_DOCUMENT_LENGTH: i32 = 5;

/// Encodes `doc`, converting it to big-endian when requested.
pub fn serialize(doc: &Document, big_endian: bool) -> Result<Vec<u8>, ProtocolError> {
    let mut bytes = bson::to_vec(doc)?;
    if big_endian {
        to_big_endian(&mut bytes)?;
    }
    Ok(bytes)
}

/// Decodes a single document that was encoded in the given byte order.
///
/// `bytes` must hold exactly one document; trailing padding is the caller's
/// business.
pub fn deserialize(bytes: &[u8], big_endian: bool) -> Result<Document, ProtocolError> {
    if big_endian {
        let mut native = bytes.to_vec();
        to_little_endian(&mut native)?;
        Ok(Document::from_reader(&mut native.as_slice())?)
    } else {
        Ok(Document::from_reader(&mut &bytes[..])?)
    }
}

/// Reads the declared length of the document starting at `offset`.
pub fn document_length(bytes: &[u8], offset: usize, big_endian: bool) -> Result<usize, ProtocolError> {
    let length = read_i32(bytes, offset, big_endian)?;
    if length < MIN_DOCUMENT_LENGTH {
        return Err(ProtocolError::InvalidDocumentLength {
            offset,
            length: length as i64,
        });
    }
    Ok(length as usize)
}

/// Converts a little-endian document to big-endian in place.
pub fn to_big_endian(bytes: &mut [u8]) -> Result<(), ProtocolError> {
    convert(bytes, false)
}

/// Converts a big-endian document to little-endian in place.
pub fn to_little_endian(bytes: &mut [u8]) -> Result<(), ProtocolError> {
    convert(bytes, true)
}

fn convert(bytes: &mut [u8], source_big_endian: bool) -> Result<(), ProtocolError> {
    let end = convert_document(bytes, 0, source_big_endian)?;
    if end != bytes.len() {
        return Err(ProtocolError::LengthMismatch {
            consumed: end,
            declared: bytes.len(),
        });
    }
    Ok(())
}

/// Swaps one document starting at `start`; returns the offset just past it.
fn convert_document(
    bytes: &mut [u8],
    start: usize,
    source_big_endian: bool,
) -> Result<usize, ProtocolError> {
    let declared = read_i32(bytes, start, source_big_endian)?;
    if declared < MIN_DOCUMENT_LENGTH || start + declared as usize > bytes.len() {
        return Err(ProtocolError::InvalidDocumentLength {
            offset: start,
            length: declared as i64,
        });
    }
    let declared = declared as usize;
    let end = start + declared;
    swap(bytes, start, 4)?;

    let mut offset = start + 4;
    loop {
        if offset >= end {
            return Err(ProtocolError::LengthMismatch {
                consumed: offset - start,
                declared,
            });
        }
        let tag_offset = offset;
        let tag = bytes[offset];
        offset += 1;
        if tag == 0 {
            break;
        }
        offset = skip_cstring(bytes, offset)?;
        offset = convert_element(bytes, tag, tag_offset, offset, source_big_endian)?;
    }

    if offset != end {
        return Err(ProtocolError::LengthMismatch {
            consumed: offset - start,
            declared,
        });
    }
    Ok(end)
}

fn convert_element(
    bytes: &mut [u8],
    tag: u8,
    tag_offset: usize,
    offset: usize,
    source_big_endian: bool,
) -> Result<usize, ProtocolError> {
    match tag {
        TYPE_DOUBLE | TYPE_DATETIME | TYPE_INT64 => {
            swap(bytes, offset, 8)?;
            Ok(offset + 8)
        }
        TYPE_TIMESTAMP => {
            swap(bytes, offset, 4)?;
            swap(bytes, offset + 4, 4)?;
            Ok(offset + 8)
        }
        TYPE_INT32 => {
            swap(bytes, offset, 4)?;
            Ok(offset + 4)
        }
        TYPE_STRING | TYPE_CODE | TYPE_SYMBOL => convert_string(bytes, offset, source_big_endian),
        TYPE_DOCUMENT | TYPE_ARRAY => convert_document(bytes, offset, source_big_endian),
        TYPE_BINARY => {
            let length = read_length(bytes, offset, source_big_endian)?;
            swap(bytes, offset, 4)?;
            checked_end(bytes, offset, 4 + 1 + length)
        }
        TYPE_UNDEFINED | TYPE_NULL | TYPE_MIN_KEY | TYPE_MAX_KEY => Ok(offset),
        TYPE_OBJECT_ID => checked_end(bytes, offset, OBJECT_ID_LENGTH),
        TYPE_BOOLEAN => checked_end(bytes, offset, 1),
        TYPE_DECIMAL128 => checked_end(bytes, offset, 16),
        TYPE_REGEX => {
            let offset = skip_cstring(bytes, offset)?;
            skip_cstring(bytes, offset)
        }
        TYPE_DB_POINTER => {
            let offset = convert_string(bytes, offset, source_big_endian)?;
            checked_end(bytes, offset, OBJECT_ID_LENGTH)
        }
        TYPE_CODE_WITH_SCOPE => {
            let total = read_length(bytes, offset, source_big_endian)?;
            swap(bytes, offset, 4)?;
            let scope = convert_string(bytes, offset + 4, source_big_endian)?;
            let end = convert_document(bytes, scope, source_big_endian)?;
            if end != offset + total {
                return Err(ProtocolError::LengthMismatch {
                    consumed: end - offset,
                    declared: total,
                });
            }
            Ok(end)
        }
        _ => Err(ProtocolError::UnknownElementType {
            tag,
            offset: tag_offset,
        }),
    }
}

/// Length-prefixed string: swap the prefix, skip the payload and its NUL.
fn convert_string(bytes: &mut [u8], offset: usize, source_big_endian: bool) -> Result<usize, ProtocolError> {
    let length = read_length(bytes, offset, source_big_endian)?;
    if length == 0 {
        return Err(ProtocolError::InvalidDocumentLength { offset, length: 0 });
    }
    swap(bytes, offset, 4)?;
    checked_end(bytes, offset, 4 + length)
}

fn read_i32(bytes: &[u8], offset: usize, big_endian: bool) -> Result<i32, ProtocolError> {
    let raw: [u8; 4] = offset
        .checked_add(4)
        .and_then(|end| bytes.get(offset..end))
        .and_then(|slice| slice.try_into().ok())
        .ok_or(ProtocolError::OffsetOutOfRange {
            offset,
            size: 4,
            len: bytes.len(),
        })?;
    Ok(if big_endian {
        i32::from_be_bytes(raw)
    } else {
        i32::from_le_bytes(raw)
    })
}

fn read_length(bytes: &[u8], offset: usize, big_endian: bool) -> Result<usize, ProtocolError> {
    let length = read_i32(bytes, offset, big_endian)?;
    usize::try_from(length).map_err(|_| ProtocolError::InvalidDocumentLength {
        offset,
        length: length as i64,
    })
}

fn swap(bytes: &mut [u8], offset: usize, width: usize) -> Result<(), ProtocolError> {
    let len = bytes.len();
    let field = offset
        .checked_add(width)
        .and_then(|end| bytes.get_mut(offset..end))
        .ok_or(ProtocolError::OffsetOutOfRange {
            offset,
            size: width,
            len,
        })?;
    field.reverse();
    Ok(())
}

fn checked_end(bytes: &[u8], offset: usize, size: usize) -> Result<usize, ProtocolError> {
    match offset.checked_add(size) {
        Some(end) if end <= bytes.len() => Ok(end),
        _ => Err(ProtocolError::OffsetOutOfRange {
            offset,
            size,
            len: bytes.len(),
        }),
    }
}

fn skip_cstring(bytes: &[u8], offset: usize) -> Result<usize, ProtocolError> {
    bytes
        .get(offset..)
        .and_then(|rest| rest.iter().position(|b| *b == 0))
        .map(|nul| offset + nul + 1)
        .ok_or(ProtocolError::UnterminatedString(offset))
}

#[cfg(test)]
mod tests {
    use super::*;
    use bson::oid::ObjectId;
    use bson::spec::BinarySubtype;
    use bson::{doc, Binary, Bson, DateTime, JavaScriptCodeWithScope, Regex, Timestamp};
    use proptest::prelude::*;

    fn every_type() -> Document {
        doc! {
            "string": "hello",
            "double": 3.5,
            "int32": 42i32,
            "int64": 1_099_511_627_776i64,
            "bool": true,
            "date": DateTime::from_millis(1_600_000_000_000),
            "binary": Binary { subtype: BinarySubtype::Generic, bytes: vec![1, 2, 3, 4, 5] },
            "null": Bson::Null,
            "array": [1i32, "two", { "three": 3i64 }],
            "nested": { "a": { "b": -7i32, "c": 2.0 } },
            "oid": ObjectId::parse_str("5f1a2b3c4d5e6f7081920a1b").unwrap(),
            "regex": Regex { pattern: "^ab+c$".to_string(), options: "i".to_string() },
            "timestamp": Timestamp { time: 0x0102_0304, increment: 0x0506_0708 },
            "code_with_scope": JavaScriptCodeWithScope {
                code: "function() { return x; }".to_string(),
                scope: doc! { "x": 99i32, "inner": { "y": 1i64 } },
            },
            "code": Bson::JavaScriptCode("1 + 1".to_string()),
            "symbol": Bson::Symbol("sym".to_string()),
            "undefined": Bson::Undefined,
            "min": Bson::MinKey,
            "max": Bson::MaxKey,
        }
    }

    #[test]
    fn test_known_encoding() {
        let doc = doc! { "ok": 1i32 };
        assert_eq!(
            serialize(&doc, false).unwrap(),
            vec![0x0d, 0, 0, 0, 0x10, b'o', b'k', 0, 1, 0, 0, 0, 0]
        );
        assert_eq!(
            serialize(&doc, true).unwrap(),
            vec![0, 0, 0, 0x0d, 0x10, b'o', b'k', 0, 0, 0, 0, 1, 0]
        );
    }

    #[test]
    fn test_roundtrip_every_type() {
        let doc = every_type();
        for big_endian in [false, true] {
            let bytes = serialize(&doc, big_endian).unwrap();
            assert_eq!(deserialize(&bytes, big_endian).unwrap(), doc);
        }
    }

    #[test]
    fn test_double_swap_restores_bytes() {
        let original = bson::to_vec(&every_type()).unwrap();
        let mut bytes = original.clone();
        to_big_endian(&mut bytes).unwrap();
        assert_ne!(bytes, original);
        to_little_endian(&mut bytes).unwrap();
        assert_eq!(bytes, original);
    }

    #[test]
    fn test_big_endian_lengths() {
        let doc = doc! { "s": "abc", "n": { "x": 1i32 } };
        let bytes = serialize(&doc, true).unwrap();
        assert_eq!(document_length(&bytes, 0, true).unwrap(), bytes.len());
        // outer length, tag, "s\0", then the string length prefix
        assert_eq!(&bytes[7..11], &[0, 0, 0, 4]);
    }

    #[test]
    fn test_decimal128_is_opaque() {
        let raw = [7u8; 16];
        let doc = doc! { "d": Bson::Decimal128(bson::Decimal128::from_bytes(raw)) };
        let le = bson::to_vec(&doc).unwrap();
        let be = serialize(&doc, true).unwrap();
        assert_eq!(&be[4..], &le[4..]);
        assert_eq!(deserialize(&be, true).unwrap(), doc);
    }

    #[test]
    fn test_db_pointer_layout() {
        // {"p": DBPointer("ns", oid)} built by hand
        let mut bytes = vec![0u8; 4];
        bytes.push(TYPE_DB_POINTER);
        bytes.extend_from_slice(b"p\0");
        bytes.extend_from_slice(&3i32.to_le_bytes());
        bytes.extend_from_slice(b"ns\0");
        bytes.extend_from_slice(&[0xAB; 12]);
        bytes.push(0);
        let len = bytes.len() as i32;
        bytes[..4].copy_from_slice(&len.to_le_bytes());

        let original = bytes.clone();
        to_big_endian(&mut bytes).unwrap();
        assert_eq!(&bytes[7..11], &[0, 0, 0, 3]);
        to_little_endian(&mut bytes).unwrap();
        assert_eq!(bytes, original);
    }

    #[test]
    fn test_unknown_tag() {
        let mut bytes = vec![0x0a, 0, 0, 0, 0x42, b'x', 0, 0, 0, 0];
        let result = to_big_endian(&mut bytes);
        assert!(matches!(
            result,
            Err(ProtocolError::UnknownElementType { tag: 0x42, offset: 4 })
        ));
    }

    #[test]
    fn test_declared_length_mismatch() {
        // declared 9 bytes, but the element runs past the declared end
        let mut bytes = bson::to_vec(&doc! { "ok": 1i32 }).unwrap();
        bytes[0] = 9;
        assert!(to_big_endian(&mut bytes).is_err());

        // declared length shorter than the buffer
        let mut bytes = bson::to_vec(&doc! { "ok": 1i32 }).unwrap();
        bytes.extend_from_slice(&[0, 0, 0]);
        assert!(matches!(
            to_big_endian(&mut bytes),
            Err(ProtocolError::LengthMismatch { consumed: 13, declared: 16 })
        ));
    }

    #[test]
    fn test_truncated_document() {
        let bytes = serialize(&doc! { "name": "value" }, true).unwrap();
        assert!(deserialize(&bytes[..bytes.len() - 3], true).is_err());
        assert!(matches!(
            document_length(&[1, 0, 0, 0], 0, false),
            Err(ProtocolError::InvalidDocumentLength { length: 1, .. })
        ));
        assert!(document_length(&[0, 0], 0, false).is_err());
    }

    #[test]
    fn test_empty_document() {
        let doc = Document::new();
        let bytes = serialize(&doc, true).unwrap();
        assert_eq!(bytes, vec![0, 0, 0, 5, 0]);
        assert_eq!(deserialize(&bytes, true).unwrap(), doc);
    }

    proptest! {
        #[test]
        fn prop_roundtrip_scalars(
            name in "[a-z]{1,8}",
            text in ".{0,32}",
            int32 in any::<i32>(),
            int64 in any::<i64>(),
            double in -1e300f64..1e300f64,
            big_endian in any::<bool>(),
        ) {
            let doc = doc! {
                "name": name,
                "text": text,
                "int32": int32,
                "int64": int64,
                "double": double,
                "list": [int32, int64],
            };
            let bytes = serialize(&doc, big_endian).unwrap();
            prop_assert_eq!(document_length(&bytes, 0, big_endian).unwrap(), bytes.len());
            prop_assert_eq!(deserialize(&bytes, big_endian).unwrap(), doc);
        }

        #[test]
        fn prop_swap_is_involution(values in proptest::collection::vec(any::<i64>(), 0..16)) {
            let doc = doc! { "values": values, "meta": { "n": 1i32 } };
            let original = bson::to_vec(&doc).unwrap();
            let mut bytes = original.clone();
            to_big_endian(&mut bytes).unwrap();
            to_little_endian(&mut bytes).unwrap();
            prop_assert_eq!(bytes, original);
        }
    }
}
