//! Message header and alignment primitives.
//!
//! Every frame starts with a 28-byte header whose integers use the byte order
//! negotiated for the connection:
//!
//! ```text
//! +----------+---------+-----------+------------+
//! |  length  | opcode  |  node id  | request id |
//! |  4 bytes | 4 bytes |  12 bytes |   8 bytes  |
//! +----------+---------+-----------+------------+
//! ```
//!
//! Variable-length sections that follow the header (collection names,
//! documents, LOB payloads) are each zero-padded to a 4-byte boundary.

use crate::buffer::XBuffer;
use crate::error::ProtocolError;
use crate::long::Long;
use bytes::BytesMut;

/// Size of the fixed message header in bytes (4+4+12+8 = 28).
pub const MESSAGE_HEADER_LENGTH: usize = 28;

/// Byte offset of the request id inside the header.
pub const REQUEST_ID_OFFSET: usize = 20;

/// Alignment of every variable-length section.
pub const SECTION_ALIGNMENT: usize = 4;

/// Node id sent by clients.
pub const ZERO_NODE_ID: [u8; 12] = [0; 12];

/// Rounds `len` up to the next multiple of `multiple`. A multiple of zero is
/// the identity.
pub fn pad_length(len: usize, multiple: usize) -> usize {
    if multiple == 0 {
        return len;
    }
    len.div_ceil(multiple) * multiple
}

/// Appends zero bytes until the length of `buf` is a multiple of `multiple`.
pub fn pad_bytes(buf: &mut BytesMut, multiple: usize) {
    let padded = pad_length(buf.len(), multiple);
    buf.resize(padded, 0);
}

/// The fixed header of every frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MessageHeader {
    pub length: i32,
    pub opcode: i32,
    pub node_id: [u8; 12],
    pub request_id: Long,
}

impl MessageHeader {
    pub fn new(length: usize, opcode: i32, request_id: Long) -> Self {
        Self {
            length: length as i32,
            opcode,
            node_id: ZERO_NODE_ID,
            request_id,
        }
    }

    /// Writes the header at the start of `buf`.
    pub fn write_to(&self, buf: &mut XBuffer) -> Result<(), ProtocolError> {
        buf.write(self.length, 0)?;
        buf.write(self.opcode, 4)?;
        buf.write_buffer(&self.node_id, 8)?;
        buf.write_long(self.request_id, REQUEST_ID_OFFSET)
    }

    /// Parses the header at the start of `buf`.
    pub fn read_from(buf: &XBuffer) -> Result<Self, ProtocolError> {
        let length = buf.read::<i32>(0)?;
        let opcode = buf.read::<i32>(4)?;
        let mut node_id = [0u8; 12];
        node_id.copy_from_slice(buf.slice(8, 20)?.as_bytes());
        let request_id = buf.read_long(REQUEST_ID_OFFSET)?;
        Ok(Self {
            length,
            opcode,
            node_id,
            request_id,
        })
    }
}

/// Rewrites the request id of an already built frame.
pub fn stamp_request_id(
    frame: &mut [u8],
    request_id: Long,
    big_endian: bool,
) -> Result<(), ProtocolError> {
    if big_endian {
        request_id.write_be(frame, REQUEST_ID_OFFSET)
    } else {
        request_id.write_le(frame, REQUEST_ID_OFFSET)
    }
}

/// Reads the declared total length of a frame, if four bytes are present.
pub fn peek_length(buf: &[u8], big_endian: bool) -> Option<i32> {
    let raw: [u8; 4] = buf.get(..4)?.try_into().ok()?;
    Some(if big_endian {
        i32::from_be_bytes(raw)
    } else {
        i32::from_le_bytes(raw)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pad_length_boundaries() {
        assert_eq!(pad_length(0, 4), 0);
        assert_eq!(pad_length(1, 4), 4);
        assert_eq!(pad_length(2, 4), 4);
        assert_eq!(pad_length(3, 4), 4);
        assert_eq!(pad_length(4, 4), 4);
        assert_eq!(pad_length(5, 4), 8);
        assert_eq!(pad_length(13, 8), 16);
    }

    #[test]
    fn test_pad_length_zero_multiple() {
        assert_eq!(pad_length(7, 0), 7);
        assert_eq!(pad_length(0, 0), 0);
    }

    #[test]
    fn test_pad_bytes() {
        let mut buf = BytesMut::from(&b"abcde"[..]);
        pad_bytes(&mut buf, 4);
        assert_eq!(&buf[..], b"abcde\0\0\0");

        let mut aligned = BytesMut::from(&b"abcd"[..]);
        pad_bytes(&mut aligned, 4);
        assert_eq!(aligned.len(), 4);
    }

    #[test]
    fn test_header_layout() {
        let header = MessageHeader::new(0x30, 2004, Long::ONE);

        let mut be = XBuffer::with_size(MESSAGE_HEADER_LENGTH, true);
        header.write_to(&mut be).unwrap();
        assert_eq!(&be.as_bytes()[..8], &[0, 0, 0, 0x30, 0, 0, 0x07, 0xd4]);
        assert_eq!(&be.as_bytes()[8..20], &[0u8; 12]);
        assert_eq!(&be.as_bytes()[20..], &[0, 0, 0, 0, 0, 0, 0, 1]);

        let mut le = XBuffer::with_size(MESSAGE_HEADER_LENGTH, false);
        header.write_to(&mut le).unwrap();
        assert_eq!(&le.as_bytes()[..8], &[0x30, 0, 0, 0, 0xd4, 0x07, 0, 0]);
        assert_eq!(MessageHeader::read_from(&le).unwrap(), header);
    }

    #[test]
    fn test_header_too_short() {
        let buf = XBuffer::with_size(20, false);
        assert!(MessageHeader::read_from(&buf).is_err());
    }

    #[test]
    fn test_stamp_request_id() {
        let mut frame = vec![0u8; MESSAGE_HEADER_LENGTH];
        stamp_request_id(&mut frame, Long::from(0x0102_i64), false).unwrap();
        assert_eq!(&frame[20..], &[0x02, 0x01, 0, 0, 0, 0, 0, 0]);

        stamp_request_id(&mut frame, Long::from(0x0102_i64), true).unwrap();
        assert_eq!(&frame[20..], &[0, 0, 0, 0, 0, 0, 0x01, 0x02]);

        let mut short = vec![0u8; 24];
        assert!(stamp_request_id(&mut short, Long::ONE, true).is_err());
    }

    #[test]
    fn test_peek_length() {
        assert_eq!(peek_length(&[0x1c, 0, 0, 0, 9], false), Some(28));
        assert_eq!(peek_length(&[0, 0, 0, 0x1c], true), Some(28));
        assert_eq!(peek_length(&[0, 0, 0], true), None);
    }
}
