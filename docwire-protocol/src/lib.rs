//! # docwire-protocol
//!
//! Wire protocol implementation for the docwire document database driver.
//!
//! This crate provides:
//! - An endian-aware byte buffer (`XBuffer`) and a 64-bit integer value type (`Long`)
//! - BSON serialization with in-place byte-order conversion
//! - Builders for every request frame the driver sends
//! - A streaming parser that reassembles replies from arbitrary TCP chunks
//! - Error codes and protocol constants

pub mod buffer;
pub mod builder;
pub mod codec;
pub mod document;
pub mod error;
pub mod frame;
pub mod long;
pub mod message;

pub use buffer::{Scalar, XBuffer};
pub use codec::{decode_lob_reply, decode_reply, decode_system_info, Parser, ParserEvent, ParserState, ReplyKind};
pub use error::{ErrorCode, ProtocolError};
pub use frame::{pad_bytes, pad_length, MessageHeader, MESSAGE_HEADER_LENGTH};
pub use long::Long;
pub use message::{LobTuple, Message, OpCode, Reply};

/// Default port of a database node.
pub const DEFAULT_PORT: u16 = 11810;

/// Protocol version written into versioned request bodies.
pub const PROTOCOL_VERSION: i32 = 1;

/// Size of the system-info handshake reply.
pub const SYSTEM_INFO_REPLY_LENGTH: usize = 128;

/// Eye-catcher of the system-info handshake, as read little-endian.
pub const SYSTEM_INFO_EYECATCHER: u32 = 0xFFFE_FDFC;

/// Byte-reversed eye-catcher; a server answering with it is big-endian.
pub const SYSTEM_INFO_EYECATCHER_REVERSED: u32 = 0xFCFD_FEFF;

/// Largest frame the parser accepts (512 MiB).
pub const MAX_MESSAGE_LENGTH: usize = 512 * 1024 * 1024;
