//! Client error types.

use docwire_protocol::{ErrorCode, ProtocolError};
use std::io;
use thiserror::Error;

/// Client errors.
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("not connected")]
    NotConnected,

    #[error("connection closed")]
    ConnectionClosed,

    #[error("connect timeout")]
    Timeout,

    #[error("server error: {code}")]
    Server { code: ErrorCode, flags: i32 },

    #[error("unexpected reply: {0}")]
    UnexpectedReply(String),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("context is closed")]
    ContextClosed,

    #[error("large object is not open")]
    LobNotOpen,

    #[error("large object is already open")]
    LobAlreadyOpen,

    #[error("TLS configuration error: {0}")]
    TlsConfig(String),

    #[error("TLS handshake failed: {0}")]
    TlsHandshake(String),
}

impl ClientError {
    /// Maps a non-zero reply flags field.
    pub fn from_flags(flags: i32) -> Self {
        ClientError::Server {
            code: ErrorCode::from_flags(flags),
            flags,
        }
    }

    /// Returns the server error code, if this error came from a reply.
    pub fn server_code(&self) -> Option<ErrorCode> {
        match self {
            ClientError::Server { code, .. } => Some(*code),
            _ => None,
        }
    }

    /// True for the end-of-context flag, which ends an iteration normally.
    pub fn is_end_of_context(&self) -> bool {
        self.server_code()
            .is_some_and(|code| code.is_end_of_context())
    }

    /// Returns whether this error is a transport failure.
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            ClientError::Io(_) | ClientError::ConnectionClosed | ClientError::Timeout
        )
    }

    /// Rebuilds a transport error for each request failed by the same event.
    pub(crate) fn replicate(&self) -> ClientError {
        match self {
            ClientError::Io(err) => ClientError::Io(io::Error::new(err.kind(), err.to_string())),
            ClientError::Protocol(err) => ClientError::UnexpectedReply(err.to_string()),
            ClientError::Server { code, flags } => ClientError::Server {
                code: *code,
                flags: *flags,
            },
            ClientError::Timeout => ClientError::Timeout,
            ClientError::NotConnected => ClientError::NotConnected,
            _ => ClientError::ConnectionClosed,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_flags() {
        let err = ClientError::from_flags(-29);
        assert!(err.is_end_of_context());
        assert_eq!(err.server_code(), Some(ErrorCode::EndOfContext));

        let err = ClientError::from_flags(-23);
        assert!(!err.is_end_of_context());
        assert_eq!(err.server_code(), Some(ErrorCode::CollectionNotFound));
        assert!(err.to_string().contains("-23"));
    }

    #[test]
    fn test_transport_classification() {
        assert!(ClientError::ConnectionClosed.is_transport());
        assert!(ClientError::Io(io::Error::new(io::ErrorKind::BrokenPipe, "pipe")).is_transport());
        assert!(!ClientError::ContextClosed.is_transport());
        assert!(!ClientError::from_flags(-6).is_transport());
    }

    #[test]
    fn test_replicate_keeps_kind() {
        let err = ClientError::Io(io::Error::new(io::ErrorKind::ConnectionReset, "reset"));
        match err.replicate() {
            ClientError::Io(copy) => {
                assert_eq!(copy.kind(), io::ErrorKind::ConnectionReset);
                assert!(copy.to_string().contains("reset"));
            }
            other => panic!("unexpected: {:?}", other),
        }
        assert!(matches!(
            ClientError::LobNotOpen.replicate(),
            ClientError::ConnectionClosed
        ));
    }
}
