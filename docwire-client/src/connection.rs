//! Connection management.
//!
//! A [`Connection`] owns one transport stream. After the system-info and auth
//! handshake, the stream, the reply [`Parser`] and the [`RequestQueue`] move
//! into a driver task; callers reach it through a channel and await a oneshot
//! for their reply. Only the driver touches the socket, and it never has more
//! than one request on the wire.

use crate::cursor::{Cursor, CursorOrigin};
use crate::error::ClientError;
use crate::queue::RequestQueue;
use crate::stream::ClientStream;
use crate::tls::TlsClientConfig;
use bson::Document;
use bytes::BytesMut;
use docwire_protocol::builder::{
    build_auth_message, build_create_user_message, build_delete_user_message,
    build_disconnect_request, build_kill_context_message, build_query_request, build_sql_message,
    build_system_info_request, build_transaction_request,
};
use docwire_protocol::frame::stamp_request_id;
use docwire_protocol::{
    ErrorCode, Long, Message, OpCode, Parser, ParserEvent, Reply, ReplyKind, DEFAULT_PORT,
};
use md5::{Digest, Md5};
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::{mpsc, oneshot, Mutex};
use tracing::{debug, info, trace, warn};

/// Default read buffer size (8 KiB).
pub const DEFAULT_READ_BUFFER_SIZE: usize = 8 * 1024;

/// Minimum read buffer size (1 KiB).
pub const MIN_READ_BUFFER_SIZE: usize = 1024;

/// Maximum read buffer size (1 MiB).
pub const MAX_READ_BUFFER_SIZE: usize = 1024 * 1024;

/// Connection configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionConfig {
    /// `host:port` of the database node.
    pub addr: String,
    pub user: String,
    /// Plain-text password; only its MD5 digest goes on the wire.
    pub password: String,
    /// Bounds TCP connect, TLS and the handshake together.
    pub connect_timeout: Duration,
    pub read_buffer_size: usize,
    /// Reconnect on the next request after the transport failed.
    pub auto_reconnect: bool,
    pub tls: Option<TlsClientConfig>,
}

impl ConnectionConfig {
    pub fn new(addr: impl Into<String>) -> Self {
        Self {
            addr: addr.into(),
            user: String::new(),
            password: String::new(),
            connect_timeout: Duration::from_secs(10),
            read_buffer_size: DEFAULT_READ_BUFFER_SIZE,
            auto_reconnect: false,
            tls: None,
        }
    }

    pub fn with_credentials(mut self, user: impl Into<String>, password: impl Into<String>) -> Self {
        self.user = user.into();
        self.password = password.into();
        self
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn with_read_buffer_size(mut self, size: usize) -> Self {
        self.read_buffer_size = size.clamp(MIN_READ_BUFFER_SIZE, MAX_READ_BUFFER_SIZE);
        self
    }

    pub fn with_auto_reconnect(mut self, enabled: bool) -> Self {
        self.auto_reconnect = enabled;
        self
    }

    pub fn with_tls(mut self, tls_config: TlsClientConfig) -> Self {
        self.tls = Some(tls_config);
        self
    }
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self::new(format!("localhost:{}", DEFAULT_PORT))
    }
}

/// Lower-case hex MD5 of a password, as the auth messages expect it.
pub fn password_digest(password: &str) -> String {
    hex::encode(Md5::digest(password.as_bytes()))
}

/// Monotonic request ids, starting at 1.
#[derive(Debug)]
pub struct RequestIdGenerator {
    next: AtomicI64,
}

impl RequestIdGenerator {
    pub fn new() -> Self {
        Self {
            next: AtomicI64::new(1),
        }
    }

    pub fn next_id(&self) -> Long {
        Long::from(self.next.fetch_add(1, Ordering::Relaxed))
    }
}

impl Default for RequestIdGenerator {
    fn default() -> Self {
        Self::new()
    }
}

/// Kinds accepted by [`Connection::get_list`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListType {
    Contexts,
    ContextsCurrent,
    Sessions,
    SessionsCurrent,
    Collections,
    CollectionSpaces,
    StorageUnits,
    Groups,
    StoredProcedures,
    Domains,
    Tasks,
    CollectionSpacesInDomain,
    CollectionsInDomain,
}

impl ListType {
    pub fn as_str(self) -> &'static str {
        match self {
            ListType::Contexts => "contexts",
            ListType::ContextsCurrent => "contexts current",
            ListType::Sessions => "sessions",
            ListType::SessionsCurrent => "sessions current",
            ListType::Collections => "collections",
            ListType::CollectionSpaces => "collectionspaces",
            ListType::StorageUnits => "storageunits",
            ListType::Groups => "groups",
            ListType::StoredProcedures => "procedures",
            ListType::Domains => "domains",
            ListType::Tasks => "tasks",
            ListType::CollectionSpacesInDomain => "collectionspaces in domain",
            ListType::CollectionsInDomain => "collections in domain",
        }
    }
}

/// Kinds accepted by [`Connection::get_snapshot`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SnapshotType {
    Contexts,
    ContextsCurrent,
    Sessions,
    SessionsCurrent,
    Collections,
    CollectionSpaces,
    Database,
    System,
    Catalog,
}

impl SnapshotType {
    pub fn as_str(self) -> &'static str {
        match self {
            SnapshotType::Contexts => "contexts",
            SnapshotType::ContextsCurrent => "contexts current",
            SnapshotType::Sessions => "sessions",
            SnapshotType::SessionsCurrent => "sessions current",
            SnapshotType::Collections => "collections",
            SnapshotType::CollectionSpaces => "collectionspaces",
            SnapshotType::Database => "database",
            SnapshotType::System => "system",
            SnapshotType::Catalog => "catalog",
        }
    }
}

/// Validates a reply against the request it answers.
///
/// The reply opcode must be the request opcode with the high bit set; any
/// other opcode is reported as an unexpected-result server error.
pub(crate) fn check_reply(reply: Reply, opcode: OpCode) -> Result<Reply, ClientError> {
    if !reply.is_reply_to(opcode) {
        warn!(
            expected = opcode.reply_code(),
            received = reply.opcode,
            "unexpected reply opcode"
        );
        return Err(ClientError::from_flags(ErrorCode::UnexpectedResult.as_flags()));
    }
    if reply.flags != 0 {
        debug!(flags = reply.flags, detail = ?reply.error_detail(), %opcode, "server returned an error");
        return Err(ClientError::from_flags(reply.flags));
    }
    Ok(reply)
}

/// Builds a query-shaped message; absent documents go out as `{}`.
pub(crate) fn query_message(
    name: &str,
    matcher: Option<Document>,
    selector: Option<Document>,
    order_by: Option<Document>,
    hint: Option<Document>,
) -> Message {
    let mut msg = Message::new(OpCode::Query).with_name(name);
    msg.matcher = matcher;
    msg.selector = selector;
    msg.order_by = order_by;
    msg.hint = hint;
    msg
}

struct PendingRequest {
    frame: BytesMut,
    opcode: OpCode,
    reply_kind: ReplyKind,
    reply_tx: oneshot::Sender<Result<Reply, ClientError>>,
}

enum Command {
    Send(PendingRequest),
    Disconnect(oneshot::Sender<Result<(), ClientError>>),
}

/// Owns the stream once the handshake is done.
struct Driver<S> {
    stream: S,
    parser: Parser,
    queue: RequestQueue<PendingRequest>,
    commands: mpsc::UnboundedReceiver<Command>,
    read_buffer_size: usize,
    connected: Arc<AtomicBool>,
}

impl<S> Driver<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    async fn run(mut self) {
        let mut buf = vec![0u8; self.read_buffer_size];
        let outcome = loop {
            tokio::select! {
                command = self.commands.recv() => match command {
                    Some(Command::Send(request)) => {
                        self.queue.enqueue(request);
                        if let Err(err) = self.dispatch().await {
                            break Err(err);
                        }
                    }
                    Some(Command::Disconnect(done)) => {
                        let result = self.disconnect().await;
                        let _ = done.send(result);
                        break Ok(());
                    }
                    None => {
                        let _ = self.stream.shutdown().await;
                        break Ok(());
                    }
                },
                read = self.stream.read(&mut buf) => match read {
                    Ok(0) => break Err(ClientError::ConnectionClosed),
                    Ok(n) => {
                        trace!(bytes = n, "received");
                        self.parser.extend(&buf[..n]);
                        if let Err(err) = self.deliver_replies().await {
                            break Err(err);
                        }
                    }
                    Err(err) => break Err(ClientError::Io(err)),
                },
            }
        };

        self.connected.store(false, Ordering::SeqCst);
        match outcome {
            Ok(()) => {
                debug!(pending = self.queue.len(), "driver stopped");
                self.fail_all(&ClientError::NotConnected);
            }
            Err(err) => {
                warn!(error = %err, pending = self.queue.len(), "connection lost");
                self.fail_all(&err);
            }
        }
    }

    /// Writes the queue head unless a request is already on the wire.
    async fn dispatch(&mut self) -> Result<(), ClientError> {
        if let Some(request) = self.queue.start() {
            self.parser.expect_reply(request.reply_kind);
            debug!(opcode = %request.opcode, bytes = request.frame.len(), "request sent");
            self.stream.write_all(&request.frame).await?;
        }
        Ok(())
    }

    async fn deliver_replies(&mut self) -> Result<(), ClientError> {
        while let Some(event) = self.parser.next_event()? {
            let ParserEvent::Reply(reply) = event else {
                return Err(ClientError::UnexpectedReply(
                    "system info reply outside the handshake".to_string(),
                ));
            };
            let request = self.queue.dequeue().ok_or_else(|| {
                ClientError::UnexpectedReply("reply without a pending request".to_string())
            })?;
            trace!(opcode = %request.opcode, flags = reply.flags, "reply received");
            let _ = request.reply_tx.send(check_reply(reply, request.opcode));
            self.dispatch().await?;
        }
        Ok(())
    }

    async fn disconnect(&mut self) -> Result<(), ClientError> {
        let frame = build_disconnect_request(self.parser.is_big_endian())?;
        self.stream.write_all(&frame).await?;
        self.stream.shutdown().await?;
        info!("disconnected");
        Ok(())
    }

    /// Fails queued requests and anything still in the channel. Nothing is
    /// retried.
    fn fail_all(&mut self, err: &ClientError) {
        for request in self.queue.drain() {
            let _ = request.reply_tx.send(Err(err.replicate()));
        }
        self.commands.close();
        while let Ok(command) = self.commands.try_recv() {
            match command {
                Command::Send(request) => {
                    let _ = request.reply_tx.send(Err(err.replicate()));
                }
                Command::Disconnect(done) => {
                    let _ = done.send(Ok(()));
                }
            }
        }
    }
}

/// Reads until the parser emits an event. Used only during the handshake.
async fn read_event<S>(
    stream: &mut S,
    parser: &mut Parser,
    buf: &mut [u8],
) -> Result<ParserEvent, ClientError>
where
    S: AsyncRead + Unpin,
{
    loop {
        if let Some(event) = parser.next_event()? {
            return Ok(event);
        }
        let n = stream.read(buf).await?;
        if n == 0 {
            return Err(ClientError::ConnectionClosed);
        }
        parser.extend(&buf[..n]);
    }
}

/// System info, then auth with request id 0. Returns the server byte order.
async fn handshake<S>(
    stream: &mut S,
    parser: &mut Parser,
    buf: &mut [u8],
    config: &ConnectionConfig,
) -> Result<bool, ClientError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    parser.expect_system_info();
    stream.write_all(&build_system_info_request()).await?;
    let big_endian = match read_event(stream, parser, buf).await? {
        ParserEvent::SystemInfo { big_endian } => big_endian,
        ParserEvent::Reply(reply) => {
            return Err(ClientError::UnexpectedReply(format!(
                "opcode {:#x} in place of system info",
                reply.opcode
            )))
        }
    };
    debug!(big_endian, "byte order negotiated");

    let msg = Message::new(OpCode::AuthVerify)
        .with_request_id(Long::ZERO)
        .with_credentials(config.user.as_str(), password_digest(&config.password));
    let frame = build_auth_message(&msg, big_endian)?;
    parser.expect_reply(ReplyKind::Regular);
    stream.write_all(&frame).await?;
    match read_event(stream, parser, buf).await? {
        ParserEvent::Reply(reply) => {
            check_reply(reply, OpCode::AuthVerify)?;
        }
        ParserEvent::SystemInfo { .. } => {
            return Err(ClientError::UnexpectedReply(
                "system info in place of auth reply".to_string(),
            ))
        }
    }
    debug!(user = %config.user, "authenticated");
    Ok(big_endian)
}

/// Runs the handshake and hands the stream to a new driver task.
async fn establish<S>(
    mut stream: S,
    config: &ConnectionConfig,
    connected: Arc<AtomicBool>,
) -> Result<(mpsc::UnboundedSender<Command>, bool), ClientError>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let mut parser = Parser::new();
    let mut buf = vec![0u8; config.read_buffer_size];
    let big_endian = handshake(&mut stream, &mut parser, &mut buf, config).await?;

    let (sender, commands) = mpsc::unbounded_channel();
    connected.store(true, Ordering::SeqCst);
    tokio::spawn(
        Driver {
            stream,
            parser,
            queue: RequestQueue::new(),
            commands,
            read_buffer_size: config.read_buffer_size,
            connected,
        }
        .run(),
    );
    Ok((sender, big_endian))
}

/// A connection to a database node.
pub struct Connection {
    config: ConnectionConfig,
    ids: RequestIdGenerator,
    big_endian: AtomicBool,
    connected: Arc<AtomicBool>,
    /// Set by an explicit disconnect; the connection is never reused after.
    closed: AtomicBool,
    /// Only connections opened from an address can reconnect.
    reconnectable: bool,
    driver: Mutex<Option<mpsc::UnboundedSender<Command>>>,
}

impl Connection {
    fn unconnected(config: ConnectionConfig, reconnectable: bool) -> Self {
        Self {
            config,
            ids: RequestIdGenerator::new(),
            big_endian: AtomicBool::new(false),
            connected: Arc::new(AtomicBool::new(false)),
            closed: AtomicBool::new(false),
            reconnectable,
            driver: Mutex::new(None),
        }
    }

    /// Connects to `config.addr`, negotiates byte order and authenticates.
    pub async fn connect(config: ConnectionConfig) -> Result<Self, ClientError> {
        let conn = Self::unconnected(config, true);
        let sender = conn.open().await?;
        *conn.driver.lock().await = Some(sender);
        Ok(conn)
    }

    /// Runs the handshake over an already established stream.
    ///
    /// Such a connection cannot reconnect; `auto_reconnect` is ignored.
    pub async fn from_stream<S>(stream: S, config: ConnectionConfig) -> Result<Self, ClientError>
    where
        S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    {
        let conn = Self::unconnected(config, false);
        let (sender, big_endian) = establish(stream, &conn.config, conn.connected.clone()).await?;
        conn.big_endian.store(big_endian, Ordering::SeqCst);
        *conn.driver.lock().await = Some(sender);
        Ok(conn)
    }

    async fn open(&self) -> Result<mpsc::UnboundedSender<Command>, ClientError> {
        debug!(addr = %self.config.addr, "connecting");
        let (sender, big_endian) = tokio::time::timeout(self.config.connect_timeout, async {
            let stream = ClientStream::open(&self.config.addr, self.config.tls.as_ref()).await?;
            establish(stream, &self.config, self.connected.clone()).await
        })
        .await
        .map_err(|_| ClientError::Timeout)??;
        self.big_endian.store(big_endian, Ordering::SeqCst);
        info!(addr = %self.config.addr, big_endian, "connection ready");
        Ok(sender)
    }

    /// Returns a live driver channel, reconnecting first when allowed.
    async fn sender(&self) -> Result<mpsc::UnboundedSender<Command>, ClientError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(ClientError::NotConnected);
        }
        let mut slot = self.driver.lock().await;
        if let Some(sender) = slot.as_ref().filter(|sender| !sender.is_closed()) {
            return Ok(sender.clone());
        }
        if !(self.config.auto_reconnect && self.reconnectable) {
            return Err(ClientError::NotConnected);
        }
        warn!(addr = %self.config.addr, "reconnecting");
        let sender = self.open().await?;
        *slot = Some(sender.clone());
        Ok(sender)
    }

    pub fn config(&self) -> &ConnectionConfig {
        &self.config
    }

    /// Byte order negotiated with the server.
    pub fn is_big_endian(&self) -> bool {
        self.big_endian.load(Ordering::SeqCst)
    }

    pub fn is_connected(&self) -> bool {
        !self.closed.load(Ordering::SeqCst) && self.connected.load(Ordering::SeqCst)
    }

    /// Stamps a fresh request id on `frame`, queues it and waits for the reply.
    ///
    /// Replies with the wrong opcode or a non-zero flags field come back as
    /// [`ClientError::Server`].
    pub async fn send(
        &self,
        mut frame: BytesMut,
        opcode: OpCode,
        reply_kind: ReplyKind,
    ) -> Result<Reply, ClientError> {
        let sender = self.sender().await?;
        let request_id = self.ids.next_id();
        stamp_request_id(&mut frame, request_id, self.is_big_endian())?;

        let (reply_tx, reply_rx) = oneshot::channel();
        trace!(%opcode, %request_id, "request queued");
        sender
            .send(Command::Send(PendingRequest {
                frame,
                opcode,
                reply_kind,
                reply_tx,
            }))
            .map_err(|_| ClientError::ConnectionClosed)?;
        reply_rx.await.map_err(|_| ClientError::ConnectionClosed)?
    }

    /// Sends an admin command with default paging.
    pub async fn send_admin_command(
        &self,
        command: &str,
        matcher: Option<Document>,
        selector: Option<Document>,
        order_by: Option<Document>,
        hint: Option<Document>,
    ) -> Result<Reply, ClientError> {
        self.send_admin_command2(
            command,
            matcher,
            selector,
            order_by,
            hint,
            Long::ZERO,
            Long::NEG_ONE,
            0,
        )
        .await
    }

    #[allow(clippy::too_many_arguments)]
    pub async fn send_admin_command2(
        &self,
        command: &str,
        matcher: Option<Document>,
        selector: Option<Document>,
        order_by: Option<Document>,
        hint: Option<Document>,
        skip: Long,
        limit: Long,
        flags: i32,
    ) -> Result<Reply, ClientError> {
        let msg = query_message(command, matcher, selector, order_by, hint)
            .with_rows(skip, limit)
            .with_flags(flags);
        let frame = build_query_request(&msg, self.is_big_endian())?;
        self.send(frame, OpCode::Query, ReplyKind::Regular).await
    }

    /// Wraps a reply in a cursor; end of context becomes an empty cursor.
    fn cursor_or_empty(
        self: &Arc<Self>,
        result: Result<Reply, ClientError>,
    ) -> Result<Cursor, ClientError> {
        let origin = CursorOrigin::Connection(Arc::clone(self));
        match result {
            Ok(reply) => Ok(Cursor::from_reply(reply, origin)),
            Err(err) if err.is_end_of_context() => Ok(Cursor::exhausted(origin)),
            Err(err) => Err(err),
        }
    }

    /// `$list <kind>`.
    pub async fn get_list(
        self: &Arc<Self>,
        kind: ListType,
        matcher: Option<Document>,
        selector: Option<Document>,
        order_by: Option<Document>,
    ) -> Result<Cursor, ClientError> {
        let command = format!("$list {}", kind.as_str());
        let result = self
            .send_admin_command(&command, matcher, selector, order_by, None)
            .await;
        self.cursor_or_empty(result)
    }

    /// `$snapshot <kind>`.
    pub async fn get_snapshot(
        self: &Arc<Self>,
        kind: SnapshotType,
        matcher: Option<Document>,
        selector: Option<Document>,
        order_by: Option<Document>,
    ) -> Result<Cursor, ClientError> {
        let command = format!("$snapshot {}", kind.as_str());
        let result = self
            .send_admin_command(&command, matcher, selector, order_by, None)
            .await;
        self.cursor_or_empty(result)
    }

    pub async fn reset_snapshot(&self, matcher: Option<Document>) -> Result<(), ClientError> {
        self.send_admin_command("$snapshot reset", matcher, None, None, None)
            .await?;
        Ok(())
    }

    /// Kills server contexts by id.
    pub async fn kill_contexts(&self, context_ids: Vec<Long>) -> Result<(), ClientError> {
        let msg = Message::new(OpCode::KillContext).with_contexts(context_ids);
        let frame = build_kill_context_message(&msg, self.is_big_endian())?;
        self.send(frame, OpCode::KillContext, ReplyKind::Regular)
            .await?;
        Ok(())
    }

    /// Probes the connection with a kill-context for the "no context" id.
    pub async fn is_valid(&self) -> Result<bool, ClientError> {
        match self.kill_contexts(vec![Long::NEG_ONE]).await {
            Ok(()) => Ok(true),
            Err(err) if err.is_transport() || matches!(err, ClientError::NotConnected) => Ok(false),
            Err(err) => Err(err),
        }
    }

    async fn transaction(&self, opcode: OpCode) -> Result<(), ClientError> {
        let frame = build_transaction_request(&Message::new(opcode), self.is_big_endian())?;
        self.send(frame, opcode, ReplyKind::Regular).await?;
        Ok(())
    }

    pub async fn begin_transaction(&self) -> Result<(), ClientError> {
        self.transaction(OpCode::TransactionBegin).await
    }

    pub async fn commit_transaction(&self) -> Result<(), ClientError> {
        self.transaction(OpCode::TransactionCommit).await
    }

    pub async fn rollback_transaction(&self) -> Result<(), ClientError> {
        self.transaction(OpCode::TransactionRollback).await
    }

    async fn sql(&self, sql: &str) -> Result<Reply, ClientError> {
        let msg = Message::new(OpCode::Sql).with_sql(sql);
        let frame = build_sql_message(&msg, self.is_big_endian())?;
        self.send(frame, OpCode::Sql, ReplyKind::Regular).await
    }

    /// Runs a SQL query and iterates its result.
    pub async fn exec_sql(self: &Arc<Self>, sql: &str) -> Result<Cursor, ClientError> {
        let result = self.sql(sql).await;
        self.cursor_or_empty(result)
    }

    /// Runs a SQL statement that returns no rows.
    pub async fn exec_update_sql(&self, sql: &str) -> Result<(), ClientError> {
        self.sql(sql).await?;
        Ok(())
    }

    pub async fn create_user(&self, user: &str, password: &str) -> Result<(), ClientError> {
        let frame =
            build_create_user_message(user, &password_digest(password), self.is_big_endian())?;
        self.send(frame, OpCode::CreateUser, ReplyKind::Regular)
            .await?;
        Ok(())
    }

    pub async fn remove_user(&self, user: &str, password: &str) -> Result<(), ClientError> {
        let frame =
            build_delete_user_message(user, &password_digest(password), self.is_big_endian())?;
        self.send(frame, OpCode::DeleteUser, ReplyKind::Regular)
            .await?;
        Ok(())
    }

    /// `$set session attribute`, e.g. `{PreferedInstance: "m"}`.
    pub async fn set_session_attr(&self, options: Document) -> Result<(), ClientError> {
        if options.is_empty() {
            return Err(ClientError::InvalidArgument(
                "session attributes must not be empty".to_string(),
            ));
        }
        self.send_admin_command("$set session attribute", Some(options), None, None, None)
            .await?;
        Ok(())
    }

    /// Sends the disconnect frame and closes the stream. Every later call
    /// fails with [`ClientError::NotConnected`].
    pub async fn disconnect(&self) -> Result<(), ClientError> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        let Some(sender) = self.driver.lock().await.take() else {
            return Ok(());
        };
        let (done_tx, done_rx) = oneshot::channel();
        if sender.send(Command::Disconnect(done_tx)).is_err() {
            return Ok(());
        }
        done_rx.await.unwrap_or(Ok(()))
    }
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("addr", &self.config.addr)
            .field("big_endian", &self.is_big_endian())
            .field("connected", &self.is_connected())
            .finish()
    }
}
