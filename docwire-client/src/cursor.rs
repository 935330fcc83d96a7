//! Forward-only iteration over a server-side result context.

use crate::connection::Connection;
use crate::error::ClientError;
use bson::Document;
use docwire_protocol::builder::build_get_more_request;
use docwire_protocol::{Long, Message, OpCode, Reply, ReplyKind};
use std::sync::Arc;
use tracing::debug;

/// Where a cursor came from. Collection cursors remember the collection name.
#[derive(Debug, Clone)]
pub enum CursorOrigin {
    Connection(Arc<Connection>),
    Collection {
        connection: Arc<Connection>,
        full_name: String,
    },
}

impl CursorOrigin {
    pub fn connection(&self) -> &Arc<Connection> {
        match self {
            CursorOrigin::Connection(connection) => connection,
            CursorOrigin::Collection { connection, .. } => connection,
        }
    }

    pub fn collection_name(&self) -> Option<&str> {
        match self {
            CursorOrigin::Connection(_) => None,
            CursorOrigin::Collection { full_name, .. } => Some(full_name),
        }
    }
}

/// Pages through a context, fetching the next page with get-more once the
/// current one is used up.
///
/// Dropping a cursor does not kill its context; call [`Cursor::close`].
#[derive(Debug)]
pub struct Cursor {
    origin: Option<CursorOrigin>,
    context_id: Long,
    page: Vec<Document>,
    /// Index of the current document in `page`.
    position: Option<usize>,
    has_more: bool,
    closed: bool,
}

impl Cursor {
    /// Starts at the documents of the reply that opened the context.
    pub fn from_reply(reply: Reply, origin: CursorOrigin) -> Self {
        Self {
            origin: Some(origin),
            context_id: reply.context_id,
            page: reply.documents,
            position: None,
            has_more: true,
            closed: false,
        }
    }

    /// A cursor with nothing to return.
    pub fn exhausted(origin: CursorOrigin) -> Self {
        Self {
            origin: Some(origin),
            context_id: Long::NEG_ONE,
            page: Vec::new(),
            position: None,
            has_more: false,
            closed: false,
        }
    }

    pub fn context_id(&self) -> Long {
        self.context_id
    }

    pub fn origin(&self) -> Option<&CursorOrigin> {
        self.origin.as_ref()
    }

    pub fn has_more(&self) -> bool {
        self.has_more
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Advances and returns the next document, or `None` once the context is
    /// exhausted. Exhaustion is sticky.
    pub async fn next(&mut self) -> Result<Option<Document>, ClientError> {
        if self.closed {
            return Err(ClientError::ContextClosed);
        }
        loop {
            let next = self.position.map_or(0, |pos| pos + 1);
            if next < self.page.len() {
                self.position = Some(next);
                return Ok(Some(self.page[next].clone()));
            }
            if !self.has_more {
                self.page.clear();
                self.position = None;
                return Ok(None);
            }
            self.fetch_page().await?;
        }
    }

    /// The document at the current position; advances first if iteration
    /// has not started.
    pub async fn current(&mut self) -> Result<Option<Document>, ClientError> {
        if self.closed {
            return Err(ClientError::ContextClosed);
        }
        match self.position {
            Some(pos) => Ok(self.page.get(pos).cloned()),
            None => self.next().await,
        }
    }

    /// Drains every remaining document.
    pub async fn collect_all(&mut self) -> Result<Vec<Document>, ClientError> {
        let mut docs = Vec::new();
        while let Some(doc) = self.next().await? {
            docs.push(doc);
        }
        Ok(docs)
    }

    async fn fetch_page(&mut self) -> Result<(), ClientError> {
        self.page.clear();
        self.position = None;
        if self.context_id == Long::NEG_ONE {
            self.has_more = false;
            return Ok(());
        }
        let connection = self
            .origin
            .as_ref()
            .map(|origin| Arc::clone(origin.connection()))
            .ok_or(ClientError::NotConnected)?;

        let msg = Message::new(OpCode::GetMore).with_context(self.context_id);
        let frame = build_get_more_request(&msg, connection.is_big_endian())?;
        match connection.send(frame, OpCode::GetMore, ReplyKind::Regular).await {
            Ok(reply) => {
                debug!(context = %self.context_id, docs = reply.documents.len(), "page fetched");
                self.page = reply.documents;
                Ok(())
            }
            Err(err) if err.is_end_of_context() => {
                debug!(context = %self.context_id, "context exhausted");
                self.has_more = false;
                self.context_id = Long::NEG_ONE;
                Ok(())
            }
            Err(err) => Err(err),
        }
    }

    /// Kills the server context if one is still open. Closing twice is fine;
    /// every other call on a closed cursor fails with
    /// [`ClientError::ContextClosed`].
    pub async fn close(&mut self) -> Result<(), ClientError> {
        if self.closed {
            return Ok(());
        }
        if let Some(origin) = &self.origin {
            let connection = origin.connection();
            if self.context_id != Long::NEG_ONE && connection.is_connected() {
                connection.kill_contexts(vec![self.context_id]).await?;
                debug!(context = %self.context_id, "context killed");
            }
        }
        self.origin = None;
        self.context_id = Long::NEG_ONE;
        self.page.clear();
        self.position = None;
        self.has_more = false;
        self.closed = true;
        Ok(())
    }
}
