//! Request frame builders.
//!
//! Each builder takes a populated [`Message`] and the negotiated byte order
//! and returns a complete frame:
//!
//! ```text
//! [28-byte header][fixed fields][name\0, padded][document, padded]...
//! ```
//!
//! The header length field always equals the returned buffer length, and
//! every variable-length section is zero-padded to a 4-byte boundary.
//!
//! The reply encoders at the bottom of the module produce server-side frames;
//! tests and benchmarks use them to stand in for a database node.

use crate::buffer::XBuffer;
use crate::document;
use crate::error::ProtocolError;
use crate::frame::{pad_length, peek_length, MessageHeader, MESSAGE_HEADER_LENGTH, SECTION_ALIGNMENT};
use crate::long::Long;
use crate::message::{LobTuple, Message, OpCode, Reply};
use crate::{SYSTEM_INFO_EYECATCHER, SYSTEM_INFO_REPLY_LENGTH};
use bson::Document;
use bytes::{BufMut, BytesMut};

/// Length of the system-info handshake request.
pub const SYSTEM_INFO_REQUEST_LENGTH: usize = 12;

/// Accumulates one frame; the header is written last, once the length is known.
struct FrameWriter {
    opcode: i32,
    request_id: Long,
    big_endian: bool,
    buf: BytesMut,
}

impl FrameWriter {
    fn new(opcode: i32, request_id: Long, big_endian: bool) -> Self {
        let mut buf = BytesMut::with_capacity(128);
        buf.resize(MESSAGE_HEADER_LENGTH, 0);
        Self {
            opcode,
            request_id,
            big_endian,
            buf,
        }
    }

    fn for_message(msg: &Message, big_endian: bool) -> Self {
        Self::new(msg.opcode.code(), msg.request_id, big_endian)
    }

    fn put_i16(&mut self, value: i16) {
        if self.big_endian {
            self.buf.put_i16(value);
        } else {
            self.buf.put_i16_le(value);
        }
    }

    fn put_i32(&mut self, value: i32) {
        if self.big_endian {
            self.buf.put_i32(value);
        } else {
            self.buf.put_i32_le(value);
        }
    }

    fn put_u32(&mut self, value: u32) {
        if self.big_endian {
            self.buf.put_u32(value);
        } else {
            self.buf.put_u32_le(value);
        }
    }

    fn put_long(&mut self, value: Long) {
        let bytes = if self.big_endian {
            value.to_be_bytes()
        } else {
            value.to_le_bytes()
        };
        self.buf.put_slice(&bytes);
    }

    /// version, w, padding, flags
    fn put_versioned(&mut self, msg: &Message) {
        self.put_i32(msg.version);
        self.put_i16(msg.w);
        self.put_i16(msg.padding);
        self.put_i32(msg.flags);
    }

    fn put_padded(&mut self, bytes: &[u8]) {
        self.buf.put_slice(bytes);
        let padded = pad_length(bytes.len(), SECTION_ALIGNMENT);
        self.buf.put_bytes(0, padded - bytes.len());
    }

    fn put_cstring(&mut self, text: &str) -> Result<(), ProtocolError> {
        if text.contains('\0') {
            return Err(ProtocolError::InvalidName(text.to_string()));
        }
        let mut bytes = Vec::with_capacity(text.len() + 1);
        bytes.extend_from_slice(text.as_bytes());
        bytes.push(0);
        self.put_padded(&bytes);
        Ok(())
    }

    fn put_document(&mut self, doc: &Document) -> Result<(), ProtocolError> {
        let bytes = document::serialize(doc, self.big_endian)?;
        self.put_padded(&bytes);
        Ok(())
    }

    /// Writes an optional document, substituting `{}` when absent.
    fn put_optional(&mut self, doc: Option<&Document>) -> Result<(), ProtocolError> {
        match doc {
            Some(doc) => self.put_document(doc),
            None => self.put_document(&Document::new()),
        }
    }

    /// i32 name length (without the NUL) followed later by the name itself.
    fn put_name_length(&mut self, name: &str) {
        self.put_i32(name.len() as i32);
    }

    fn finish(mut self) -> Result<BytesMut, ProtocolError> {
        let mut header = XBuffer::with_size(MESSAGE_HEADER_LENGTH, self.big_endian);
        MessageHeader::new(self.buf.len(), self.opcode, self.request_id).write_to(&mut header)?;
        self.buf[..MESSAGE_HEADER_LENGTH].copy_from_slice(header.as_bytes());
        Ok(self.buf)
    }
}

/// The 12-byte handshake request. Always little-endian: the byte order is
/// not known yet.
pub fn build_system_info_request() -> BytesMut {
    let mut buf = BytesMut::with_capacity(SYSTEM_INFO_REQUEST_LENGTH);
    buf.put_i32_le(-1);
    buf.put_u32_le(SYSTEM_INFO_EYECATCHER);
    buf.put_i32_le(SYSTEM_INFO_REQUEST_LENGTH as i32);
    buf
}

/// Auth-family request: header plus `{User, Passwd}`.
///
/// `msg.opcode` selects between verify, create-user and delete-user;
/// `msg.password` must already be the hex MD5 digest.
pub fn build_auth_message(msg: &Message, big_endian: bool) -> Result<BytesMut, ProtocolError> {
    let auth = bson::doc! {
        "User": msg.user.as_str(),
        "Passwd": msg.password.as_str(),
    };
    let mut writer = FrameWriter::for_message(msg, big_endian);
    writer.put_document(&auth)?;
    writer.finish()
}

pub fn build_create_user_message(
    user: &str,
    password_digest: &str,
    big_endian: bool,
) -> Result<BytesMut, ProtocolError> {
    let msg = Message::new(OpCode::CreateUser).with_credentials(user, password_digest);
    build_auth_message(&msg, big_endian)
}

pub fn build_delete_user_message(
    user: &str,
    password_digest: &str,
    big_endian: bool,
) -> Result<BytesMut, ProtocolError> {
    let msg = Message::new(OpCode::DeleteUser).with_credentials(user, password_digest);
    build_auth_message(&msg, big_endian)
}

pub fn build_disconnect_request(big_endian: bool) -> Result<BytesMut, ProtocolError> {
    FrameWriter::new(OpCode::Disconnect.code(), Long::ZERO, big_endian).finish()
}

/// Header, reserved i32, context count, then one 8-byte id per context.
pub fn build_kill_context_message(msg: &Message, big_endian: bool) -> Result<BytesMut, ProtocolError> {
    let mut writer = FrameWriter::for_message(msg, big_endian);
    writer.put_i32(0);
    writer.put_i32(msg.context_ids.len() as i32);
    for context_id in &msg.context_ids {
        writer.put_long(*context_id);
    }
    writer.finish()
}

/// Query-shaped request; admin commands use the same layout with the command
/// text in place of the collection name.
pub fn build_query_request(msg: &Message, big_endian: bool) -> Result<BytesMut, ProtocolError> {
    let mut writer = FrameWriter::for_message(msg, big_endian);
    writer.put_versioned(msg);
    writer.put_name_length(&msg.collection_full_name);
    writer.put_long(msg.skip_rows);
    writer.put_long(msg.return_rows);
    writer.put_cstring(&msg.collection_full_name)?;
    writer.put_optional(msg.matcher.as_ref())?;
    writer.put_optional(msg.selector.as_ref())?;
    writer.put_optional(msg.order_by.as_ref())?;
    writer.put_optional(msg.hint.as_ref())?;
    writer.finish()
}

/// Header, context id, and the number of rows to return (-1 for a full page).
pub fn build_get_more_request(msg: &Message, big_endian: bool) -> Result<BytesMut, ProtocolError> {
    let mut writer = FrameWriter::for_message(msg, big_endian);
    writer.put_long(msg.context_id());
    writer.put_i32(msg.return_rows.to_i64() as i32);
    writer.finish()
}

fn build_single_document_request(
    msg: &Message,
    big_endian: bool,
) -> Result<BytesMut, ProtocolError> {
    let doc = msg
        .insertor
        .as_ref()
        .ok_or(ProtocolError::MissingField("insertor"))?;
    let mut writer = FrameWriter::for_message(msg, big_endian);
    writer.put_versioned(msg);
    writer.put_name_length(&msg.collection_full_name);
    writer.put_cstring(&msg.collection_full_name)?;
    writer.put_document(doc)?;
    writer.finish()
}

pub fn build_insert_request(msg: &Message, big_endian: bool) -> Result<BytesMut, ProtocolError> {
    build_single_document_request(msg, big_endian)
}

/// Aggregate shares the insert layout; the document is the first pipeline stage.
pub fn build_aggregate_request(msg: &Message, big_endian: bool) -> Result<BytesMut, ProtocolError> {
    build_single_document_request(msg, big_endian)
}

/// Appends one more document to an insert frame and rewrites its length.
///
/// Documents already in the frame are left untouched.
pub fn append_insert_message(
    frame: &mut BytesMut,
    doc: &Document,
    big_endian: bool,
) -> Result<(), ProtocolError> {
    let declared = peek_length(frame, big_endian).ok_or(ProtocolError::OffsetOutOfRange {
        offset: 0,
        size: 4,
        len: frame.len(),
    })?;
    if declared < 0 {
        return Err(ProtocolError::InvalidMessageLength(declared as i64));
    }
    let bytes = document::serialize(doc, big_endian)?;
    let padded = pad_length(bytes.len(), SECTION_ALIGNMENT);
    let total = declared as usize + padded;
    let total = i32::try_from(total).map_err(|_| ProtocolError::InvalidMessageLength(total as i64))?;

    let length = if big_endian {
        total.to_be_bytes()
    } else {
        total.to_le_bytes()
    };
    frame[..4].copy_from_slice(&length);
    frame.put_slice(&bytes);
    frame.put_bytes(0, padded - bytes.len());
    Ok(())
}

pub fn append_aggregate_message(
    frame: &mut BytesMut,
    doc: &Document,
    big_endian: bool,
) -> Result<(), ProtocolError> {
    append_insert_message(frame, doc, big_endian)
}

pub fn build_delete_request(msg: &Message, big_endian: bool) -> Result<BytesMut, ProtocolError> {
    let mut writer = FrameWriter::for_message(msg, big_endian);
    writer.put_versioned(msg);
    writer.put_name_length(&msg.collection_full_name);
    writer.put_cstring(&msg.collection_full_name)?;
    writer.put_optional(msg.matcher.as_ref())?;
    writer.put_optional(msg.hint.as_ref())?;
    writer.finish()
}

pub fn build_update_request(msg: &Message, big_endian: bool) -> Result<BytesMut, ProtocolError> {
    let modifier = msg
        .modifier
        .as_ref()
        .ok_or(ProtocolError::MissingField("modifier"))?;
    let mut writer = FrameWriter::for_message(msg, big_endian);
    writer.put_versioned(msg);
    writer.put_name_length(&msg.collection_full_name);
    writer.put_cstring(&msg.collection_full_name)?;
    writer.put_optional(msg.matcher.as_ref())?;
    writer.put_document(modifier)?;
    writer.put_optional(msg.hint.as_ref())?;
    writer.finish()
}

/// Fixed LOB block: version, w, padding, flags, context id, bson length.
fn lob_writer(msg: &Message, bson_len: usize, big_endian: bool) -> FrameWriter {
    let mut writer = FrameWriter::for_message(msg, big_endian);
    writer.put_versioned(msg);
    writer.put_long(msg.context_id());
    writer.put_i32(bson_len as i32);
    writer
}

fn put_lob_tuple(writer: &mut FrameWriter, tuple: LobTuple) {
    writer.put_u32(tuple.len);
    writer.put_u32(tuple.sequence);
    writer.put_long(tuple.offset);
}

fn build_lob_matcher_request(msg: &Message, big_endian: bool) -> Result<BytesMut, ProtocolError> {
    let matcher = msg
        .matcher
        .as_ref()
        .ok_or(ProtocolError::MissingField("matcher"))?;
    let bytes = document::serialize(matcher, big_endian)?;
    let mut writer = lob_writer(msg, bytes.len(), big_endian);
    writer.put_padded(&bytes);
    writer.finish()
}

/// Open: matcher `{Collection, Oid, Mode}`.
pub fn build_open_lob_request(msg: &Message, big_endian: bool) -> Result<BytesMut, ProtocolError> {
    build_lob_matcher_request(msg, big_endian)
}

/// Remove: matcher `{Collection, Oid}`.
pub fn build_remove_lob_request(msg: &Message, big_endian: bool) -> Result<BytesMut, ProtocolError> {
    build_lob_matcher_request(msg, big_endian)
}

pub fn build_read_lob_request(msg: &Message, big_endian: bool) -> Result<BytesMut, ProtocolError> {
    let mut writer = lob_writer(msg, 0, big_endian);
    put_lob_tuple(
        &mut writer,
        LobTuple::new(msg.lob_len, msg.lob_sequence, msg.lob_offset),
    );
    writer.finish()
}

/// Write: tuple followed by the padded payload in `msg.lob_data`.
pub fn build_write_lob_request(msg: &Message, big_endian: bool) -> Result<BytesMut, ProtocolError> {
    let mut writer = lob_writer(msg, 0, big_endian);
    put_lob_tuple(
        &mut writer,
        LobTuple::new(msg.lob_data.len() as u32, msg.lob_sequence, msg.lob_offset),
    );
    writer.put_padded(&msg.lob_data);
    writer.finish()
}

/// Same layout as write, addressed at `msg.lob_offset`.
pub fn build_update_lob_request(msg: &Message, big_endian: bool) -> Result<BytesMut, ProtocolError> {
    build_write_lob_request(msg, big_endian)
}

pub fn build_close_lob_request(msg: &Message, big_endian: bool) -> Result<BytesMut, ProtocolError> {
    lob_writer(msg, 0, big_endian).finish()
}

/// Begin, commit and rollback carry nothing but the header.
pub fn build_transaction_request(msg: &Message, big_endian: bool) -> Result<BytesMut, ProtocolError> {
    FrameWriter::for_message(msg, big_endian).finish()
}

pub fn build_sql_message(msg: &Message, big_endian: bool) -> Result<BytesMut, ProtocolError> {
    let mut writer = FrameWriter::for_message(msg, big_endian);
    writer.put_cstring(&msg.sql)?;
    writer.finish()
}

/// Encodes a regular reply: context id, flags, start-from, count, documents.
pub fn build_reply(reply: &Reply, big_endian: bool) -> Result<BytesMut, ProtocolError> {
    let mut writer = FrameWriter::new(reply.opcode, reply.request_id, big_endian);
    writer.put_long(reply.context_id);
    writer.put_i32(reply.flags);
    writer.put_i32(reply.start_from);
    writer.put_i32(reply.documents.len() as i32);
    for doc in &reply.documents {
        writer.put_document(doc)?;
    }
    writer.finish()
}

/// Encodes a LOB reply; the tuple and raw data follow only on success.
pub fn build_lob_reply(reply: &Reply, big_endian: bool) -> Result<BytesMut, ProtocolError> {
    let mut writer = FrameWriter::new(reply.opcode, reply.request_id, big_endian);
    writer.put_long(reply.context_id);
    writer.put_i32(reply.flags);
    writer.put_i32(reply.start_from);
    writer.put_i32(reply.num_returned);
    if reply.flags == 0 {
        if let Some(tuple) = reply.lob {
            put_lob_tuple(&mut writer, tuple);
            writer.buf.put_slice(&reply.lob_data);
        }
    }
    writer.finish()
}

/// The 128-byte handshake answer of a node with the given byte order.
pub fn build_system_info_reply(big_endian: bool) -> BytesMut {
    let mut buf = BytesMut::with_capacity(SYSTEM_INFO_REPLY_LENGTH);
    if big_endian {
        buf.put_i32(-1);
        buf.put_u32(SYSTEM_INFO_EYECATCHER);
        buf.put_i32(SYSTEM_INFO_REPLY_LENGTH as i32);
    } else {
        buf.put_i32_le(-1);
        buf.put_u32_le(SYSTEM_INFO_EYECATCHER);
        buf.put_i32_le(SYSTEM_INFO_REPLY_LENGTH as i32);
    }
    buf.resize(SYSTEM_INFO_REPLY_LENGTH, 0);
    buf
}
