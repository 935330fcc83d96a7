//! In-process stand-in for a database node, driven step by step by tests.

use crate::connection::{Connection, ConnectionConfig};
use bson::Document;
use docwire_protocol::builder::{
    build_lob_reply, build_reply, build_system_info_reply, SYSTEM_INFO_REQUEST_LENGTH,
};
use docwire_protocol::document::{deserialize, document_length};
use docwire_protocol::frame::pad_length;
use docwire_protocol::{Long, OpCode, Reply, XBuffer};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, DuplexStream};

/// One request frame as the server saw it.
#[derive(Debug, Clone)]
pub(crate) struct ReceivedFrame {
    pub bytes: Vec<u8>,
    pub opcode: i32,
    pub request_id: Long,
    pub big_endian: bool,
}

impl ReceivedFrame {
    /// An empty successful reply to this request.
    pub fn reply(&self) -> Reply {
        let opcode = OpCode::from_code(self.opcode).expect("known opcode");
        Reply::to_request(opcode, self.request_id)
    }

    pub fn op(&self) -> Option<OpCode> {
        OpCode::from_code(self.opcode)
    }

    pub fn read_i32(&self, offset: usize) -> i32 {
        XBuffer::from_slice(&self.bytes, self.big_endian)
            .read::<i32>(offset)
            .unwrap()
    }

    pub fn read_u32(&self, offset: usize) -> u32 {
        XBuffer::from_slice(&self.bytes, self.big_endian)
            .read::<u32>(offset)
            .unwrap()
    }

    pub fn read_long(&self, offset: usize) -> Long {
        XBuffer::from_slice(&self.bytes, self.big_endian)
            .read_long(offset)
            .unwrap()
    }

    /// Every padded document from `offset` to the end of the frame.
    pub fn documents_from(&self, mut offset: usize) -> Vec<Document> {
        let mut docs = Vec::new();
        while offset < self.bytes.len() {
            let len = document_length(&self.bytes, offset, self.big_endian).unwrap();
            docs.push(deserialize(&self.bytes[offset..offset + len], self.big_endian).unwrap());
            offset += pad_length(len, 4);
        }
        docs
    }

    fn name_and_documents(&self, name_offset: usize) -> (String, Vec<Document>) {
        let name_len = self.read_i32(40) as usize;
        let name = String::from_utf8(self.bytes[name_offset..name_offset + name_len].to_vec())
            .unwrap();
        let docs = self.documents_from(name_offset + pad_length(name_len + 1, 4));
        (name, docs)
    }

    /// Command or collection name and the four documents of a query frame.
    pub fn query_parts(&self) -> (String, Vec<Document>) {
        self.name_and_documents(60)
    }

    /// Collection name and documents of an insert, update, delete or
    /// aggregate frame.
    pub fn collection_parts(&self) -> (String, Vec<Document>) {
        self.name_and_documents(44)
    }

    /// Context id of a LOB or get-more frame.
    pub fn lob_context(&self) -> Long {
        self.read_long(40)
    }

    /// `{Collection, Oid, ...}` of a LOB open or remove frame.
    pub fn lob_matcher(&self) -> Document {
        self.documents_from(52).remove(0)
    }

    /// `(len, sequence, offset)` of a LOB read or write frame.
    pub fn lob_tuple(&self) -> (u32, u32, Long) {
        (self.read_u32(52), self.read_u32(56), self.read_long(60))
    }

    pub fn lob_payload(&self) -> Vec<u8> {
        let len = self.read_u32(52) as usize;
        self.bytes[68..68 + len].to_vec()
    }
}

pub(crate) struct MockServer<S = DuplexStream> {
    stream: S,
    pub big_endian: bool,
    pub auth_frame: Option<ReceivedFrame>,
}

impl MockServer<DuplexStream> {
    /// Connects a client to a fresh mock node as `admin`/`secret`.
    pub async fn start(big_endian: bool) -> (Arc<Connection>, MockServer) {
        let (client, server) = tokio::io::duplex(1024 * 1024);
        let accept = tokio::spawn(async move {
            let mut server = MockServer::new(server, big_endian);
            serve_handshake(&mut server).await;
            server
        });
        let config = ConnectionConfig::default().with_credentials("admin", "secret");
        let conn = Connection::from_stream(client, config).await.unwrap();
        (Arc::new(conn), accept.await.unwrap())
    }
}

impl<S> MockServer<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    pub fn new(stream: S, big_endian: bool) -> Self {
        Self {
            stream,
            big_endian,
            auth_frame: None,
        }
    }

    pub async fn expect_system_info(&mut self) {
        let mut request = [0u8; SYSTEM_INFO_REQUEST_LENGTH];
        self.stream.read_exact(&mut request).await.unwrap();
        assert_eq!(
            &request[..],
            &docwire_protocol::builder::build_system_info_request()[..]
        );
        self.stream
            .write_all(&build_system_info_reply(self.big_endian))
            .await
            .unwrap();
    }

    pub async fn read_request(&mut self) -> ReceivedFrame {
        let mut length = [0u8; 4];
        self.stream.read_exact(&mut length).await.unwrap();
        let total = if self.big_endian {
            i32::from_be_bytes(length)
        } else {
            i32::from_le_bytes(length)
        } as usize;
        let mut bytes = vec![0u8; total];
        bytes[..4].copy_from_slice(&length);
        self.stream.read_exact(&mut bytes[4..]).await.unwrap();

        let mut frame = ReceivedFrame {
            bytes,
            opcode: 0,
            request_id: Long::ZERO,
            big_endian: self.big_endian,
        };
        frame.opcode = frame.read_i32(4);
        frame.request_id = frame.read_long(20);
        frame
    }

    pub async fn reply(&mut self, reply: Reply) {
        let frame = build_reply(&reply, self.big_endian).unwrap();
        self.stream.write_all(&frame).await.unwrap();
    }

    pub async fn lob_reply(&mut self, reply: Reply) {
        let frame = build_lob_reply(&reply, self.big_endian).unwrap();
        self.stream.write_all(&frame).await.unwrap();
    }

    /// Reads the next request and answers it with `documents`.
    pub async fn respond(&mut self, documents: Vec<Document>) -> ReceivedFrame {
        let request = self.read_request().await;
        self.reply(request.reply().with_documents(documents)).await;
        request
    }

    /// True when no further byte arrives within a short window.
    pub async fn is_quiet(&mut self) -> bool {
        let mut byte = [0u8; 1];
        tokio::time::timeout(Duration::from_millis(50), self.stream.read(&mut byte))
            .await
            .is_err()
    }

    /// True once the client has shut down its side of the stream.
    pub async fn is_closed(&mut self) -> bool {
        let mut byte = [0u8; 1];
        matches!(
            tokio::time::timeout(Duration::from_secs(1), self.stream.read(&mut byte)).await,
            Ok(Ok(0))
        )
    }
}

/// Answers the system-info and auth exchange, keeping the auth frame.
pub(crate) async fn serve_handshake<S>(server: &mut MockServer<S>)
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    server.expect_system_info().await;
    let auth = server.read_request().await;
    assert_eq!(auth.op(), Some(OpCode::AuthVerify));
    server.reply(auth.reply()).await;
    server.auth_frame = Some(auth);
}
