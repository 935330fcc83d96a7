//! Protocol error types and server error codes.

use std::fmt;
use thiserror::Error;

/// Protocol-level errors raised while building, converting or parsing frames.
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("offset {offset} out of range: need {size} bytes, buffer holds {len}")]
    OffsetOutOfRange {
        offset: usize,
        size: usize,
        len: usize,
    },

    #[error("unsupported integer width: {0} bytes")]
    InvalidByteLength(usize),

    #[error("invalid message length: {0}")]
    InvalidMessageLength(i64),

    #[error("invalid document length {length} at offset {offset}")]
    InvalidDocumentLength { offset: usize, length: i64 },

    #[error("unknown BSON element type {tag:#04x} at offset {offset}")]
    UnknownElementType { tag: u8, offset: usize },

    #[error("endian conversion consumed {consumed} bytes, document declares {declared}")]
    LengthMismatch { consumed: usize, declared: usize },

    #[error("unterminated string at offset {0}")]
    UnterminatedString(usize),

    #[error("invalid system info eye-catcher: {0:#010x}")]
    InvalidEyeCatcher(u32),

    #[error("missing required field: {0}")]
    MissingField(&'static str),

    #[error("name contains an interior NUL byte: {0:?}")]
    InvalidName(String),

    #[error("BSON encode error: {0}")]
    BsonEncode(#[from] bson::ser::Error),

    #[error("BSON decode error: {0}")]
    BsonDecode(#[from] bson::de::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Error codes carried in the flags field of a reply.
///
/// Replies with a zero flags field succeeded; any other value is one of these
/// codes. Unknown codes are preserved in [`ErrorCode::Other`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    Io,
    OutOfMemory,
    PermissionDenied,
    InvalidArgument,
    InvalidSize,
    Eof,
    System,
    Timeout,
    Network,
    NetworkClosed,
    CollectionExists,
    CollectionNotFound,
    EndOfContext,
    ContextClosed,
    CollectionSpaceExists,
    CollectionSpaceNotFound,
    DuplicateKey,
    CannotConnect,
    UnexpectedResult,
    AuthFailed,
    Other(i32),
}

impl ErrorCode {
    pub fn from_flags(flags: i32) -> Self {
        match flags {
            -1 => ErrorCode::Io,
            -2 => ErrorCode::OutOfMemory,
            -3 => ErrorCode::PermissionDenied,
            -6 => ErrorCode::InvalidArgument,
            -7 => ErrorCode::InvalidSize,
            -9 => ErrorCode::Eof,
            -10 => ErrorCode::System,
            -13 => ErrorCode::Timeout,
            -15 => ErrorCode::Network,
            -16 => ErrorCode::NetworkClosed,
            -22 => ErrorCode::CollectionExists,
            -23 => ErrorCode::CollectionNotFound,
            -29 => ErrorCode::EndOfContext,
            -31 => ErrorCode::ContextClosed,
            -33 => ErrorCode::CollectionSpaceExists,
            -34 => ErrorCode::CollectionSpaceNotFound,
            -38 => ErrorCode::DuplicateKey,
            -79 => ErrorCode::CannotConnect,
            -100 => ErrorCode::UnexpectedResult,
            -179 => ErrorCode::AuthFailed,
            other => ErrorCode::Other(other),
        }
    }

    /// Returns the numeric value as it appears on the wire.
    pub fn as_flags(&self) -> i32 {
        match self {
            ErrorCode::Io => -1,
            ErrorCode::OutOfMemory => -2,
            ErrorCode::PermissionDenied => -3,
            ErrorCode::InvalidArgument => -6,
            ErrorCode::InvalidSize => -7,
            ErrorCode::Eof => -9,
            ErrorCode::System => -10,
            ErrorCode::Timeout => -13,
            ErrorCode::Network => -15,
            ErrorCode::NetworkClosed => -16,
            ErrorCode::CollectionExists => -22,
            ErrorCode::CollectionNotFound => -23,
            ErrorCode::EndOfContext => -29,
            ErrorCode::ContextClosed => -31,
            ErrorCode::CollectionSpaceExists => -33,
            ErrorCode::CollectionSpaceNotFound => -34,
            ErrorCode::DuplicateKey => -38,
            ErrorCode::CannotConnect => -79,
            ErrorCode::UnexpectedResult => -100,
            ErrorCode::AuthFailed => -179,
            ErrorCode::Other(code) => *code,
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            ErrorCode::Io => "IO Exception",
            ErrorCode::OutOfMemory => "Out of Memory",
            ErrorCode::PermissionDenied => "Permission Error",
            ErrorCode::InvalidArgument => "Invalid Argument",
            ErrorCode::InvalidSize => "Invalid size",
            ErrorCode::Eof => "Hit end of file",
            ErrorCode::System => "System error",
            ErrorCode::Timeout => "Timeout error",
            ErrorCode::Network => "Network error",
            ErrorCode::NetworkClosed => "Network is closed from remote",
            ErrorCode::CollectionExists => "Collection already exists",
            ErrorCode::CollectionNotFound => "Collection does not exist",
            ErrorCode::EndOfContext => "Hit end of context",
            ErrorCode::ContextClosed => "Context is closed",
            ErrorCode::CollectionSpaceExists => "Collection space already exists",
            ErrorCode::CollectionSpaceNotFound => "Collection space does not exist",
            ErrorCode::DuplicateKey => "Duplicate key exist",
            ErrorCode::CannotConnect => "Unable to connect to the specified address",
            ErrorCode::UnexpectedResult => "Unexpected result received",
            ErrorCode::AuthFailed => "Authentication failed",
            ErrorCode::Other(_) => "Unknown Error",
        }
    }

    /// End of context is how the server ends an iteration, not a failure.
    pub fn is_end_of_context(&self) -> bool {
        matches!(self, ErrorCode::EndOfContext)
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.description(), self.as_flags())
    }
}
