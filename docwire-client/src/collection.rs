//! Collection spaces and collections.
//!
//! These are thin builders: each operation assembles a matcher or a frame
//! and hands it to the [`Connection`].

use crate::connection::Connection;
use crate::cursor::{Cursor, CursorOrigin};
use crate::error::ClientError;
use crate::lob::{number_field, Lob, LobMode};
use bson::oid::ObjectId;
use bson::{doc, Bson, Document};
use docwire_protocol::builder::{
    append_aggregate_message, append_insert_message, build_aggregate_request,
    build_delete_request, build_insert_request, build_remove_lob_request, build_update_request,
};
use docwire_protocol::message::{FLG_QUERY_WITH_RETURNDATA, FLG_UPDATE_UPSERT};
use docwire_protocol::{ErrorCode, Long, Message, OpCode, Reply, ReplyKind};
use std::sync::Arc;
use tracing::debug;

/// Options of [`Collection::query`].
#[derive(Debug, Clone, PartialEq)]
pub struct Query {
    pub matcher: Option<Document>,
    pub selector: Option<Document>,
    pub order_by: Option<Document>,
    pub hint: Option<Document>,
    pub skip: Long,
    /// `NEG_ONE` returns every row.
    pub limit: Long,
    pub flags: i32,
}

impl Query {
    pub fn new() -> Self {
        Self {
            matcher: None,
            selector: None,
            order_by: None,
            hint: None,
            skip: Long::ZERO,
            limit: Long::NEG_ONE,
            flags: 0,
        }
    }

    pub fn with_matcher(mut self, matcher: Document) -> Self {
        self.matcher = Some(matcher);
        self
    }

    pub fn with_selector(mut self, selector: Document) -> Self {
        self.selector = Some(selector);
        self
    }

    pub fn with_order_by(mut self, order_by: Document) -> Self {
        self.order_by = Some(order_by);
        self
    }

    pub fn with_hint(mut self, hint: Document) -> Self {
        self.hint = Some(hint);
        self
    }

    pub fn with_skip(mut self, skip: impl Into<Long>) -> Self {
        self.skip = skip.into();
        self
    }

    pub fn with_limit(mut self, limit: impl Into<Long>) -> Self {
        self.limit = limit.into();
        self
    }

    pub fn with_flags(mut self, flags: i32) -> Self {
        self.flags = flags;
        self
    }

    /// Limit and flags as sent: a zero limit means "all", and a single-row
    /// query asks for the data in the first reply.
    fn wire_limit_and_flags(&self) -> (Long, i32) {
        if self.limit.is_zero() {
            (Long::NEG_ONE, self.flags)
        } else if self.limit == Long::ONE {
            (self.limit, self.flags | FLG_QUERY_WITH_RETURNDATA)
        } else {
            (self.limit, self.flags)
        }
    }
}

impl Default for Query {
    fn default() -> Self {
        Self::new()
    }
}

fn check_name(kind: &str, name: &str) -> Result<(), ClientError> {
    if name.is_empty() || name.contains('.') {
        return Err(ClientError::InvalidArgument(format!(
            "invalid {} name: {:?}",
            kind, name
        )));
    }
    Ok(())
}

/// `false` when the server answers with `not_found`.
fn found(result: Result<Reply, ClientError>, not_found: ErrorCode) -> Result<bool, ClientError> {
    match result {
        Ok(_) => Ok(true),
        Err(err) if err.server_code() == Some(not_found) => Ok(false),
        Err(err) => Err(err),
    }
}

/// A named collection space.
#[derive(Debug, Clone)]
pub struct CollectionSpace {
    connection: Arc<Connection>,
    name: String,
}

impl CollectionSpace {
    pub fn new(connection: Arc<Connection>, name: impl Into<String>) -> Self {
        Self {
            connection,
            name: name.into(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Handle to a collection of this space, without a round trip.
    pub fn collection(&self, name: &str) -> Collection {
        Collection::new(Arc::clone(&self.connection), &self.name, name)
    }

    /// `$create collection`; `options` are merged into `{Name: "cs.cl"}`.
    pub async fn create_collection(
        &self,
        name: &str,
        options: Option<Document>,
    ) -> Result<Collection, ClientError> {
        check_name("collection", name)?;
        let collection = self.collection(name);
        let mut matcher = doc! { "Name": collection.full_name() };
        if let Some(options) = options {
            matcher.extend(options);
        }
        self.connection
            .send_admin_command("$create collection", Some(matcher), None, None, None)
            .await?;
        debug!(collection = %collection.full_name(), "collection created");
        Ok(collection)
    }

    pub async fn drop_collection(&self, name: &str) -> Result<(), ClientError> {
        check_name("collection", name)?;
        let matcher = doc! { "Name": format!("{}.{}", self.name, name) };
        self.connection
            .send_admin_command("$drop collection", Some(matcher), None, None, None)
            .await?;
        Ok(())
    }

    /// Looks the collection up with `$test collection`.
    pub async fn get_collection(&self, name: &str) -> Result<Option<Collection>, ClientError> {
        check_name("collection", name)?;
        let collection = self.collection(name);
        let matcher = doc! { "Name": collection.full_name() };
        let result = self
            .connection
            .send_admin_command("$test collection", Some(matcher), None, None, None)
            .await;
        Ok(found(result, ErrorCode::CollectionNotFound)?.then_some(collection))
    }
}

/// A collection, addressed as `space.name`.
#[derive(Debug, Clone)]
pub struct Collection {
    connection: Arc<Connection>,
    space: String,
    name: String,
    full_name: String,
}

impl Collection {
    pub fn new(connection: Arc<Connection>, space: &str, name: &str) -> Self {
        Self {
            connection,
            space: space.to_string(),
            name: name.to_string(),
            full_name: format!("{}.{}", space, name),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn space_name(&self) -> &str {
        &self.space
    }

    pub fn full_name(&self) -> &str {
        &self.full_name
    }

    fn origin(&self) -> CursorOrigin {
        CursorOrigin::Collection {
            connection: Arc::clone(&self.connection),
            full_name: self.full_name.clone(),
        }
    }

    fn cursor_or_none(
        &self,
        result: Result<Reply, ClientError>,
    ) -> Result<Option<Cursor>, ClientError> {
        match result {
            Ok(reply) => Ok(Some(Cursor::from_reply(reply, self.origin()))),
            Err(err) if err.is_end_of_context() => Ok(None),
            Err(err) => Err(err),
        }
    }

    /// Inserts one document, adding an `_id` when it has none. Returns the
    /// `_id` value.
    pub async fn insert(&self, mut doc: Document) -> Result<Bson, ClientError> {
        let id = match doc.get("_id") {
            Some(id) => id.clone(),
            None => {
                let id = Bson::ObjectId(ObjectId::new());
                doc.insert("_id", id.clone());
                id
            }
        };
        let msg = Message::new(OpCode::Insert)
            .with_name(self.full_name.as_str())
            .with_insertor(doc);
        let frame = build_insert_request(&msg, self.connection.is_big_endian())?;
        self.connection
            .send(frame, OpCode::Insert, ReplyKind::Regular)
            .await?;
        Ok(id)
    }

    /// Inserts every document in one frame.
    pub async fn bulk_insert(&self, docs: Vec<Document>, flags: i32) -> Result<(), ClientError> {
        let mut docs = docs.into_iter();
        let Some(first) = docs.next() else {
            return Err(ClientError::InvalidArgument(
                "bulk insert needs at least one document".to_string(),
            ));
        };
        let big_endian = self.connection.is_big_endian();
        let msg = Message::new(OpCode::Insert)
            .with_name(self.full_name.as_str())
            .with_flags(flags)
            .with_insertor(first);
        let mut frame = build_insert_request(&msg, big_endian)?;
        for doc in docs {
            append_insert_message(&mut frame, &doc, big_endian)?;
        }
        self.connection
            .send(frame, OpCode::Insert, ReplyKind::Regular)
            .await?;
        Ok(())
    }

    async fn send_update(
        &self,
        matcher: Option<Document>,
        modifier: Document,
        hint: Option<Document>,
        flags: i32,
    ) -> Result<(), ClientError> {
        if modifier.is_empty() {
            return Err(ClientError::InvalidArgument(
                "update needs a modifier".to_string(),
            ));
        }
        let mut msg = Message::new(OpCode::Update)
            .with_name(self.full_name.as_str())
            .with_flags(flags)
            .with_modifier(modifier);
        msg.matcher = matcher;
        msg.hint = hint;
        let frame = build_update_request(&msg, self.connection.is_big_endian())?;
        self.connection
            .send(frame, OpCode::Update, ReplyKind::Regular)
            .await?;
        Ok(())
    }

    pub async fn update(
        &self,
        matcher: Option<Document>,
        modifier: Document,
        hint: Option<Document>,
    ) -> Result<(), ClientError> {
        self.send_update(matcher, modifier, hint, 0).await
    }

    /// Like [`Collection::update`], inserting when nothing matches.
    pub async fn upsert(
        &self,
        matcher: Option<Document>,
        modifier: Document,
        hint: Option<Document>,
    ) -> Result<(), ClientError> {
        self.send_update(matcher, modifier, hint, FLG_UPDATE_UPSERT)
            .await
    }

    /// Deletes matching documents; no matcher deletes everything.
    pub async fn delete(
        &self,
        matcher: Option<Document>,
        hint: Option<Document>,
    ) -> Result<(), ClientError> {
        let mut msg = Message::new(OpCode::Delete).with_name(self.full_name.as_str());
        msg.matcher = matcher;
        msg.hint = hint;
        let frame = build_delete_request(&msg, self.connection.is_big_endian())?;
        self.connection
            .send(frame, OpCode::Delete, ReplyKind::Regular)
            .await?;
        Ok(())
    }

    /// Runs a query. `None` means the server had nothing to return.
    pub async fn query(&self, query: Query) -> Result<Option<Cursor>, ClientError> {
        let (limit, flags) = query.wire_limit_and_flags();
        let result = self
            .connection
            .send_admin_command2(
                &self.full_name,
                query.matcher,
                query.selector,
                query.order_by,
                query.hint,
                query.skip,
                limit,
                flags,
            )
            .await;
        self.cursor_or_none(result)
    }

    /// Number of documents matching `matcher`.
    pub async fn count(&self, matcher: Option<Document>) -> Result<i64, ClientError> {
        let hint = doc! { "Collection": self.full_name.as_str() };
        let result = self
            .connection
            .send_admin_command("$get count", matcher, None, None, Some(hint))
            .await;
        let Some(mut cursor) = self.cursor_or_none(result)? else {
            return Ok(0);
        };
        let first = cursor.next().await?;
        cursor.close().await?;
        first
            .as_ref()
            .and_then(|doc| number_field(doc, "Total"))
            .ok_or_else(|| ClientError::UnexpectedReply("count reply lacks Total".to_string()))
    }

    /// Runs an aggregation pipeline; each stage is one document of the frame.
    pub async fn aggregate(&self, pipeline: Vec<Document>) -> Result<Option<Cursor>, ClientError> {
        let mut stages = pipeline.into_iter();
        let Some(first) = stages.next() else {
            return Err(ClientError::InvalidArgument(
                "aggregate needs at least one stage".to_string(),
            ));
        };
        let big_endian = self.connection.is_big_endian();
        let msg = Message::new(OpCode::Aggregate)
            .with_name(self.full_name.as_str())
            .with_insertor(first);
        let mut frame = build_aggregate_request(&msg, big_endian)?;
        for stage in stages {
            append_aggregate_message(&mut frame, &stage, big_endian)?;
        }
        let result = self
            .connection
            .send(frame, OpCode::Aggregate, ReplyKind::Regular)
            .await;
        self.cursor_or_none(result)
    }

    /// Creates a large object, generating its id when none is given.
    pub async fn create_lob(&self, id: Option<ObjectId>) -> Result<Lob, ClientError> {
        let mut lob = Lob::new(Arc::clone(&self.connection), self.full_name.as_str());
        lob.open(id, LobMode::CreateOnly).await?;
        Ok(lob)
    }

    /// Opens an existing large object for reading.
    pub async fn open_lob(&self, id: ObjectId) -> Result<Lob, ClientError> {
        let mut lob = Lob::new(Arc::clone(&self.connection), self.full_name.as_str());
        lob.open(Some(id), LobMode::Read).await?;
        Ok(lob)
    }

    pub async fn remove_lob(&self, id: ObjectId) -> Result<(), ClientError> {
        let matcher = doc! { "Collection": self.full_name.as_str(), "Oid": id };
        let msg = Message::new(OpCode::LobRemove)
            .with_context(Long::NEG_ONE)
            .with_matcher(matcher);
        let frame = build_remove_lob_request(&msg, self.connection.is_big_endian())?;
        self.connection
            .send(frame, OpCode::LobRemove, ReplyKind::Regular)
            .await?;
        Ok(())
    }
}
