//! Large object handles.

use crate::connection::Connection;
use crate::error::ClientError;
use bson::oid::ObjectId;
use bson::{doc, Bson, Document};
use bytes::Bytes;
use docwire_protocol::builder::{
    build_close_lob_request, build_open_lob_request, build_read_lob_request,
    build_write_lob_request,
};
use docwire_protocol::{Long, Message, OpCode, ReplyKind};
use std::sync::Arc;
use tracing::debug;

/// Largest payload sent in one write frame (1 MiB).
pub const MAX_LOB_WRITE_CHUNK: usize = 1024 * 1024;

const FIELD_SIZE: &str = "Size";
const FIELD_CREATE_TIME: &str = "CreateTime";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LobMode {
    /// Create a new object; an id is generated when none is given.
    CreateOnly,
    /// Read an existing object.
    Read,
}

impl LobMode {
    pub fn code(self) -> i32 {
        match self {
            LobMode::CreateOnly => 0x0000_0001,
            LobMode::Read => 0x0000_0004,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeekWhence {
    Set,
    Cur,
    End,
}

/// Integer value of a numeric field, whatever its BSON width.
pub(crate) fn number_field(doc: &Document, key: &str) -> Option<i64> {
    match doc.get(key)? {
        Bson::Int32(v) => Some(i64::from(*v)),
        Bson::Int64(v) => Some(*v),
        Bson::Double(v) => Some(Long::from_f64(*v).to_i64()),
        Bson::DateTime(v) => Some(v.timestamp_millis()),
        _ => None,
    }
}

/// An open or closed large object in one collection.
#[derive(Debug)]
pub struct Lob {
    connection: Arc<Connection>,
    collection: String,
    id: Option<ObjectId>,
    mode: Option<LobMode>,
    context_id: Long,
    size: i64,
    create_time: i64,
    read_offset: i64,
    open: bool,
}

impl Lob {
    pub fn new(connection: Arc<Connection>, collection_full_name: impl Into<String>) -> Self {
        Self {
            connection,
            collection: collection_full_name.into(),
            id: None,
            mode: None,
            context_id: Long::NEG_ONE,
            size: 0,
            create_time: 0,
            read_offset: 0,
            open: false,
        }
    }

    pub fn id(&self) -> Option<ObjectId> {
        self.id
    }

    pub fn mode(&self) -> Option<LobMode> {
        self.mode
    }

    pub fn size(&self) -> i64 {
        self.size
    }

    /// Milliseconds since the epoch, as reported by the server on open.
    pub fn create_time(&self) -> i64 {
        self.create_time
    }

    pub fn read_offset(&self) -> i64 {
        self.read_offset
    }

    pub fn is_open(&self) -> bool {
        self.open
    }

    /// Opens the object. Read mode needs an id.
    pub async fn open(&mut self, id: Option<ObjectId>, mode: LobMode) -> Result<(), ClientError> {
        if self.open {
            return Err(ClientError::LobAlreadyOpen);
        }
        let id = match (id, mode) {
            (Some(id), _) => id,
            (None, LobMode::CreateOnly) => ObjectId::new(),
            (None, LobMode::Read) => {
                return Err(ClientError::InvalidArgument(
                    "reading a lob requires its id".to_string(),
                ))
            }
        };

        let matcher = doc! {
            "Collection": self.collection.as_str(),
            "Oid": id,
            "Mode": mode.code(),
        };
        let msg = Message::new(OpCode::LobOpen)
            .with_context(Long::NEG_ONE)
            .with_matcher(matcher);
        let frame = build_open_lob_request(&msg, self.connection.is_big_endian())?;
        let reply = self
            .connection
            .send(frame, OpCode::LobOpen, ReplyKind::Regular)
            .await?;

        let meta = reply.documents.first();
        let size = meta.and_then(|doc| number_field(doc, FIELD_SIZE));
        let create_time = meta.and_then(|doc| number_field(doc, FIELD_CREATE_TIME));
        let (Some(size), Some(create_time)) = (size, create_time) else {
            return Err(ClientError::UnexpectedReply(
                "lob open reply lacks Size or CreateTime".to_string(),
            ));
        };

        self.id = Some(id);
        self.mode = Some(mode);
        self.size = size;
        self.create_time = create_time;
        self.context_id = reply.context_id;
        self.read_offset = 0;
        self.open = true;
        debug!(%id, ?mode, size, context = %self.context_id, "lob opened");
        Ok(())
    }

    fn require_mode(&self, mode: LobMode) -> Result<(), ClientError> {
        if !self.open {
            return Err(ClientError::LobNotOpen);
        }
        if self.mode != Some(mode) {
            return Err(ClientError::InvalidArgument(format!(
                "operation needs a lob opened in {:?} mode",
                mode
            )));
        }
        Ok(())
    }

    /// Appends `data`, split into frames of at most [`MAX_LOB_WRITE_CHUNK`].
    pub async fn write(&mut self, data: &[u8]) -> Result<(), ClientError> {
        self.require_mode(LobMode::CreateOnly)?;
        for chunk in data.chunks(MAX_LOB_WRITE_CHUNK) {
            let msg = Message::new(OpCode::LobWrite)
                .with_context(self.context_id)
                .with_lob_data(Bytes::copy_from_slice(chunk));
            let frame = build_write_lob_request(&msg, self.connection.is_big_endian())?;
            self.connection
                .send(frame, OpCode::LobWrite, ReplyKind::Regular)
                .await?;
            self.size += chunk.len() as i64;
        }
        Ok(())
    }

    /// Reads up to `buf.len()` bytes at the read offset.
    ///
    /// Returns `Some(0)` for an empty buffer and `None` at the end of the
    /// object.
    pub async fn read(&mut self, buf: &mut [u8]) -> Result<Option<usize>, ClientError> {
        self.require_mode(LobMode::Read)?;
        if buf.is_empty() {
            return Ok(Some(0));
        }
        let len = u32::try_from(buf.len()).unwrap_or(u32::MAX);
        let msg = Message::new(OpCode::LobRead)
            .with_context(self.context_id)
            .with_lob_range(len, Long::from(self.read_offset));
        let frame = build_read_lob_request(&msg, self.connection.is_big_endian())?;

        match self
            .connection
            .send(frame, OpCode::LobRead, ReplyKind::Lob)
            .await
        {
            Ok(reply) => {
                let n = reply.lob_data.len().min(buf.len());
                buf[..n].copy_from_slice(&reply.lob_data[..n]);
                self.read_offset += n as i64;
                Ok(Some(n))
            }
            Err(err) if err.is_end_of_context() => Ok(None),
            Err(err) => Err(err),
        }
    }

    /// Moves the read offset. The target must stay within `0..=size`.
    pub fn seek(&mut self, offset: i64, whence: SeekWhence) -> Result<(), ClientError> {
        self.require_mode(LobMode::Read)?;
        let target = match whence {
            SeekWhence::Set => offset,
            SeekWhence::Cur => self.read_offset.saturating_add(offset),
            SeekWhence::End if offset >= 0 => self.size - offset,
            SeekWhence::End => -1,
        };
        if target < 0 || target > self.size {
            return Err(ClientError::InvalidArgument(format!(
                "seek {} from {:?} leaves 0..={}",
                offset, whence, self.size
            )));
        }
        self.read_offset = target;
        Ok(())
    }

    /// Closes the handle; a second close fails with [`ClientError::LobNotOpen`].
    pub async fn close(&mut self) -> Result<(), ClientError> {
        if !self.open {
            return Err(ClientError::LobNotOpen);
        }
        let msg = Message::new(OpCode::LobClose).with_context(self.context_id);
        let frame = build_close_lob_request(&msg, self.connection.is_big_endian())?;
        self.connection
            .send(frame, OpCode::LobClose, ReplyKind::Regular)
            .await?;
        self.open = false;
        debug!(context = %self.context_id, "lob closed");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::MockServer;
    use docwire_protocol::ErrorCode;

    fn open_reply_docs(size: i64) -> Vec<Document> {
        vec![doc! { "Size": size, "CreateTime": 1_400_000_000_000i64 }]
    }

    #[test]
    fn test_number_field() {
        let doc = doc! { "a": 1, "b": 2i64, "c": 3.9, "d": "x" };
        assert_eq!(number_field(&doc, "a"), Some(1));
        assert_eq!(number_field(&doc, "b"), Some(2));
        assert_eq!(number_field(&doc, "c"), Some(3));
        assert_eq!(number_field(&doc, "d"), None);
        assert_eq!(number_field(&doc, "e"), None);
    }

    #[tokio::test]
    async fn test_create_and_write() {
        let (conn, mut server) = MockServer::start(false).await;
        let serve = tokio::spawn(async move {
            let open = server.read_request().await;
            assert_eq!(open.op(), Some(OpCode::LobOpen));
            assert_eq!(open.lob_context(), Long::NEG_ONE);
            let matcher = open.lob_matcher();
            assert_eq!(matcher.get_str("Collection").unwrap(), "foo.bar");
            assert_eq!(matcher.get_i32("Mode").unwrap(), 1);
            assert!(matcher.get_object_id("Oid").is_ok());
            server
                .reply(
                    open.reply()
                        .with_context(Long::from(11i64))
                        .with_documents(open_reply_docs(0)),
                )
                .await;

            let write = server.read_request().await;
            assert_eq!(write.op(), Some(OpCode::LobWrite));
            assert_eq!(write.lob_context(), Long::from(11i64));
            assert_eq!(write.lob_tuple(), (5, 0, Long::NEG_ONE));
            assert_eq!(write.lob_payload(), b"hello".to_vec());
            server.reply(write.reply()).await;

            let close = server.read_request().await;
            assert_eq!(close.op(), Some(OpCode::LobClose));
            assert_eq!(close.lob_context(), Long::from(11i64));
            server.reply(close.reply()).await;
        });

        let mut lob = Lob::new(conn, "foo.bar");
        lob.open(None, LobMode::CreateOnly).await.unwrap();
        assert!(lob.id().is_some());
        assert_eq!(lob.create_time(), 1_400_000_000_000);

        lob.write(b"hello").await.unwrap();
        assert_eq!(lob.size(), 5);
        assert!(matches!(
            lob.seek(0, SeekWhence::Set),
            Err(ClientError::InvalidArgument(_))
        ));

        lob.close().await.unwrap();
        assert!(matches!(lob.close().await, Err(ClientError::LobNotOpen)));
        assert!(matches!(lob.write(b"x").await, Err(ClientError::LobNotOpen)));
        serve.await.unwrap();
    }

    #[tokio::test]
    async fn test_large_write_is_chunked() {
        let (conn, mut server) = MockServer::start(true).await;
        let serve = tokio::spawn(async move {
            let open = server.read_request().await;
            server
                .reply(open.reply().with_documents(open_reply_docs(0)))
                .await;
            let mut lengths = Vec::new();
            for _ in 0..2 {
                let write = server.read_request().await;
                lengths.push(write.lob_tuple().0);
                server.reply(write.reply()).await;
            }
            lengths
        });

        let mut lob = Lob::new(conn, "foo.bar");
        lob.open(Some(ObjectId::new()), LobMode::CreateOnly)
            .await
            .unwrap();
        let data = vec![7u8; MAX_LOB_WRITE_CHUNK + 10];
        lob.write(&data).await.unwrap();
        assert_eq!(lob.size(), data.len() as i64);
        assert_eq!(serve.await.unwrap(), vec![MAX_LOB_WRITE_CHUNK as u32, 10]);
    }

    #[tokio::test]
    async fn test_read_and_seek() {
        let (conn, mut server) = MockServer::start(false).await;
        let id = ObjectId::new();
        let serve = tokio::spawn(async move {
            let open = server.read_request().await;
            assert_eq!(open.lob_matcher().get_i32("Mode").unwrap(), 4);
            assert_eq!(open.lob_matcher().get_object_id("Oid").unwrap(), id);
            server
                .reply(
                    open.reply()
                        .with_context(Long::from(3i64))
                        .with_documents(open_reply_docs(10)),
                )
                .await;

            let read = server.read_request().await;
            assert_eq!(read.op(), Some(OpCode::LobRead));
            assert_eq!(read.lob_tuple(), (4, 0, Long::ZERO));
            server
                .lob_reply(read.reply().with_lob(0, Long::ZERO, Bytes::from_static(b"abcd")))
                .await;

            let read = server.read_request().await;
            assert_eq!(read.lob_tuple(), (4, 0, Long::from(8i64)));
            server
                .lob_reply(read.reply().with_lob(0, Long::from(8i64), Bytes::from_static(b"ij")))
                .await;

            let read = server.read_request().await;
            server.lob_reply(read.reply().with_flags(-29)).await;
        });

        let mut lob = Lob::new(conn, "foo.bar");
        lob.open(Some(id), LobMode::Read).await.unwrap();
        assert_eq!(lob.size(), 10);

        let mut buf = [0u8; 4];
        assert_eq!(lob.read(&mut [0u8; 0]).await.unwrap(), Some(0));
        assert_eq!(lob.read(&mut buf).await.unwrap(), Some(4));
        assert_eq!(&buf, b"abcd");
        assert_eq!(lob.read_offset(), 4);

        lob.seek(4, SeekWhence::Cur).unwrap();
        assert_eq!(lob.read_offset(), 8);
        assert_eq!(lob.read(&mut buf).await.unwrap(), Some(2));
        assert_eq!(&buf[..2], b"ij");
        assert_eq!(lob.read(&mut buf).await.unwrap(), None);

        lob.seek(3, SeekWhence::End).unwrap();
        assert_eq!(lob.read_offset(), 7);
        lob.seek(10, SeekWhence::Set).unwrap();
        assert!(lob.seek(11, SeekWhence::Set).is_err());
        assert!(lob.seek(-1, SeekWhence::Set).is_err());
        assert!(lob.seek(1, SeekWhence::Cur).is_err());
        assert!(lob.seek(-11, SeekWhence::Cur).is_err());
        assert!(lob.seek(11, SeekWhence::End).is_err());
        assert!(lob.seek(-1, SeekWhence::End).is_err());
        assert!(matches!(lob.write(b"x").await, Err(ClientError::InvalidArgument(_))));
        serve.await.unwrap();
    }

    #[tokio::test]
    async fn test_open_requires_id_for_read() {
        let (conn, mut server) = MockServer::start(false).await;
        let mut lob = Lob::new(conn, "foo.bar");
        assert!(matches!(
            lob.open(None, LobMode::Read).await,
            Err(ClientError::InvalidArgument(_))
        ));
        assert!(server.is_quiet().await);
    }

    #[tokio::test]
    async fn test_open_twice_and_bad_reply() {
        let (conn, mut server) = MockServer::start(false).await;
        let serve = tokio::spawn(async move {
            let open = server.read_request().await;
            server
                .reply(open.reply().with_documents(vec![doc! { "Size": 1 }]))
                .await;
            let open = server.read_request().await;
            server
                .reply(open.reply().with_documents(open_reply_docs(1)))
                .await;
            let open = server.read_request().await;
            server
                .reply(open.reply().with_flags(ErrorCode::PermissionDenied.as_flags()))
                .await;
        });

        let mut lob = Lob::new(conn.clone(), "foo.bar");
        assert!(matches!(
            lob.open(None, LobMode::CreateOnly).await,
            Err(ClientError::UnexpectedReply(_))
        ));
        assert!(!lob.is_open());
        lob.open(None, LobMode::CreateOnly).await.unwrap();
        assert!(matches!(
            lob.open(None, LobMode::CreateOnly).await,
            Err(ClientError::LobAlreadyOpen)
        ));

        let mut other = Lob::new(conn, "foo.bar");
        let err = other
            .open(Some(ObjectId::new()), LobMode::Read)
            .await
            .unwrap_err();
        assert_eq!(err.server_code(), Some(ErrorCode::PermissionDenied));
        serve.await.unwrap();
    }
}
