//! docwire - async driver for document database nodes.
//!
//! Re-exports the wire protocol and the client so applications depend on a
//! single crate.

pub use docwire_client as client;
pub use docwire_protocol as protocol;

pub use docwire_client::{
    Client, ClientError, Collection, CollectionSpace, Connection, ConnectionConfig, Cursor,
    CursorOrigin, ListType, Lob, LobMode, Query, SeekWhence, SnapshotType, TlsClientConfig,
};
pub use docwire_protocol::{ErrorCode, Long, ProtocolError};
