//! # docwire-client
//!
//! Async client library for docwire document database nodes.
//!
//! This crate provides:
//! - A connection that negotiates byte order, authenticates, and keeps one
//!   request on the wire at a time
//! - Cursors over server-side result contexts
//! - Large object handles
//! - Collection space and collection operations
//! - Optional TLS support

pub mod client;
pub mod collection;
pub mod connection;
pub mod cursor;
pub mod error;
pub mod lob;
pub mod queue;
pub mod stream;
pub mod tls;

#[cfg(test)]
mod test_support;

pub use client::Client;
pub use collection::{Collection, CollectionSpace, Query};
pub use connection::{Connection, ConnectionConfig, ListType, SnapshotType};
pub use cursor::{Cursor, CursorOrigin};
pub use error::ClientError;
pub use lob::{Lob, LobMode, SeekWhence};
pub use tls::TlsClientConfig;
