//! Streaming reply parser.
//!
//! The transport may hand over any chunk boundary, down to single bytes split
//! mid-header. [`Parser`] buffers whatever arrives and only moves to the next
//! state once enough bytes are present:
//!
//! ```text
//! SystemInfo --(128 bytes)--> Idle        emits the server byte order
//! Request    --(4 bytes)----> RequestBody --(length bytes)--> Idle
//! LobRequest --(4 bytes)----> LobRequestBody --(length bytes)--> Idle
//! ```
//!
//! The owner tells the parser what to expect before each request is written.

use crate::buffer::XBuffer;
use crate::document;
use crate::error::ProtocolError;
use crate::frame::{pad_length, peek_length, MessageHeader, MESSAGE_HEADER_LENGTH, SECTION_ALIGNMENT};
use crate::message::{LobTuple, Reply};
use crate::{
    MAX_MESSAGE_LENGTH, SYSTEM_INFO_EYECATCHER, SYSTEM_INFO_EYECATCHER_REVERSED,
    SYSTEM_INFO_REPLY_LENGTH,
};
use bytes::{Buf, Bytes, BytesMut};
use tracing::trace;

/// Offset of the first document in a regular reply.
const REPLY_BODY_OFFSET: usize = MESSAGE_HEADER_LENGTH + 20;

/// What the next frame is decoded as.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplyKind {
    Regular,
    Lob,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParserState {
    /// Nothing expected; incoming bytes are only buffered.
    Idle,
    SystemInfo,
    Request,
    RequestBody,
    LobRequest,
    LobRequestBody,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ParserEvent {
    /// The handshake answer arrived; carries the server's byte order.
    SystemInfo { big_endian: bool },
    Reply(Reply),
}

/// Reassembles replies from a byte stream.
#[derive(Debug)]
pub struct Parser {
    buffer: BytesMut,
    state: ParserState,
    expect: usize,
    big_endian: bool,
}

impl Parser {
    pub fn new() -> Self {
        Self {
            buffer: BytesMut::with_capacity(8192),
            state: ParserState::Idle,
            expect: 0,
            big_endian: false,
        }
    }

    pub fn state(&self) -> ParserState {
        self.state
    }

    pub fn is_big_endian(&self) -> bool {
        self.big_endian
    }

    pub fn set_big_endian(&mut self, big_endian: bool) {
        self.big_endian = big_endian;
    }

    pub fn expect_system_info(&mut self) {
        self.state = ParserState::SystemInfo;
    }

    pub fn expect_reply(&mut self, kind: ReplyKind) {
        self.state = match kind {
            ReplyKind::Regular => ParserState::Request,
            ReplyKind::Lob => ParserState::LobRequest,
        };
        self.expect = 0;
    }

    /// Appends data to the internal buffer.
    pub fn extend(&mut self, data: &[u8]) {
        self.buffer.extend_from_slice(data);
    }

    /// Returns the number of bytes currently buffered.
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    /// Drops buffered bytes and returns to idle.
    pub fn clear(&mut self) {
        self.buffer.clear();
        self.state = ParserState::Idle;
        self.expect = 0;
    }

    /// Advances the state machine as far as the buffered bytes allow.
    ///
    /// Returns `Ok(None)` when more data is needed.
    pub fn next_event(&mut self) -> Result<Option<ParserEvent>, ProtocolError> {
        loop {
            match self.state {
                ParserState::Idle => return Ok(None),
                ParserState::SystemInfo => {
                    if self.buffer.len() < SYSTEM_INFO_REPLY_LENGTH {
                        return Ok(None);
                    }
                    let big_endian = decode_system_info(&self.buffer[..SYSTEM_INFO_REPLY_LENGTH])?;
                    self.buffer.advance(SYSTEM_INFO_REPLY_LENGTH);
                    self.big_endian = big_endian;
                    self.state = ParserState::Idle;
                    trace!(big_endian, "system info reply parsed");
                    return Ok(Some(ParserEvent::SystemInfo { big_endian }));
                }
                ParserState::Request | ParserState::LobRequest => {
                    let Some(length) = peek_length(&self.buffer, self.big_endian) else {
                        return Ok(None);
                    };
                    let length = usize::try_from(length)
                        .ok()
                        .filter(|len| (MESSAGE_HEADER_LENGTH..=MAX_MESSAGE_LENGTH).contains(len))
                        .ok_or(ProtocolError::InvalidMessageLength(length as i64))?;
                    self.expect = length;
                    self.state = if self.state == ParserState::Request {
                        ParserState::RequestBody
                    } else {
                        ParserState::LobRequestBody
                    };
                    trace!(length, state = ?self.state, "reply length read");
                }
                ParserState::RequestBody | ParserState::LobRequestBody => {
                    if self.buffer.len() < self.expect {
                        return Ok(None);
                    }
                    let frame = self.buffer.split_to(self.expect).freeze();
                    let lob = self.state == ParserState::LobRequestBody;
                    self.state = ParserState::Idle;
                    self.expect = 0;
                    let reply = if lob {
                        decode_lob_reply(&frame, self.big_endian)?
                    } else {
                        decode_reply(&frame, self.big_endian)?
                    };
                    return Ok(Some(ParserEvent::Reply(reply)));
                }
            }
        }
    }
}

impl Default for Parser {
    fn default() -> Self {
        Self::new()
    }
}

/// Reads the eye-catcher of a handshake reply; `true` means big-endian.
pub fn decode_system_info(frame: &[u8]) -> Result<bool, ProtocolError> {
    let eye_catcher = XBuffer::from_slice(frame, false).read::<u32>(4)?;
    match eye_catcher {
        SYSTEM_INFO_EYECATCHER => Ok(false),
        SYSTEM_INFO_EYECATCHER_REVERSED => Ok(true),
        other => Err(ProtocolError::InvalidEyeCatcher(other)),
    }
}

/// Header plus the 20-byte reply prefix shared by both reply kinds.
fn decode_prefix(frame: &[u8], big_endian: bool) -> Result<(XBuffer, Reply), ProtocolError> {
    let buf = XBuffer::from_slice(frame, big_endian);
    let header = MessageHeader::read_from(&buf)?;
    let reply = Reply {
        opcode: header.opcode,
        node_id: header.node_id,
        request_id: header.request_id,
        context_id: buf.read_long(MESSAGE_HEADER_LENGTH)?,
        flags: buf.read::<i32>(MESSAGE_HEADER_LENGTH + 8)?,
        start_from: buf.read::<i32>(MESSAGE_HEADER_LENGTH + 12)?,
        num_returned: buf.read::<i32>(MESSAGE_HEADER_LENGTH + 16)?,
        documents: Vec::new(),
        lob: None,
        lob_data: Bytes::new(),
    };
    Ok((buf, reply))
}

/// Decodes a complete regular reply frame.
pub fn decode_reply(frame: &[u8], big_endian: bool) -> Result<Reply, ProtocolError> {
    let (_, mut reply) = decode_prefix(frame, big_endian)?;
    let wanted = reply.num_returned.max(0) as usize;
    let mut start = REPLY_BODY_OFFSET;
    while reply.documents.len() < wanted && start < frame.len() {
        let length = document::document_length(frame, start, big_endian)?;
        let end = start + length;
        if end > frame.len() {
            return Err(ProtocolError::InvalidDocumentLength {
                offset: start,
                length: length as i64,
            });
        }
        reply
            .documents
            .push(document::deserialize(&frame[start..end], big_endian)?);
        start += pad_length(length, SECTION_ALIGNMENT);
    }
    Ok(reply)
}

/// Decodes a complete LOB reply frame.
pub fn decode_lob_reply(frame: &[u8], big_endian: bool) -> Result<Reply, ProtocolError> {
    let (buf, mut reply) = decode_prefix(frame, big_endian)?;
    let tuple_end = REPLY_BODY_OFFSET + LobTuple::LENGTH;
    if reply.flags == 0 && frame.len() >= tuple_end {
        let tuple = LobTuple::new(
            buf.read::<u32>(REPLY_BODY_OFFSET)?,
            buf.read::<u32>(REPLY_BODY_OFFSET + 4)?,
            buf.read_long(REPLY_BODY_OFFSET + 8)?,
        );
        let data_end = (tuple_end + tuple.len as usize).min(frame.len());
        reply.lob_data = Bytes::copy_from_slice(&frame[tuple_end..data_end]);
        reply.lob = Some(tuple);
    }
    Ok(reply)
}
