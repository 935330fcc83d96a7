//! Operation codes, flags and the request/reply message model.

use crate::error::ErrorCode;
use crate::frame::ZERO_NODE_ID;
use crate::long::Long;
use bson::Document;
use bytes::Bytes;
use std::fmt;

/// Bit set on the opcode of every reply.
pub const REPLY_MASK: i32 = 0x8000_0000_u32 as i32;

// Query flags.
pub const FLG_QUERY_STRINGOUT: i32 = 0x0000_0001;
pub const FLG_QUERY_FORCE_HINT: i32 = 0x0000_0080;
pub const FLG_QUERY_PARALLED: i32 = 0x0000_0100;
pub const FLG_QUERY_WITH_RETURNDATA: i32 = 0x0000_0200;
pub const FLG_QUERY_EXPLAIN: i32 = 0x0000_0400;

pub const FLG_UPDATE_UPSERT: i32 = 0x0000_0001;
/// Bulk insert keeps going past duplicate-key errors.
pub const FLG_INSERT_CONTONDUP: i32 = 0x0000_0001;

pub const FLG_REPLY_CONTEXTSORNOTFOUND: i32 = 0x0000_0001;
pub const FLG_REPLY_SHARDCONFSTALE: i32 = 0x0000_0004;

/// Request operation codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OpCode {
    Update,
    Insert,
    Sql,
    Query,
    GetMore,
    Delete,
    KillContext,
    Disconnect,
    KillAllContexts,
    TransactionBegin,
    TransactionCommit,
    TransactionRollback,
    Aggregate,
    AuthVerify,
    CreateUser,
    DeleteUser,
    LobOpen,
    LobWrite,
    LobRead,
    LobRemove,
    LobUpdate,
    LobClose,
}

impl OpCode {
    pub fn code(self) -> i32 {
        match self {
            OpCode::Update => 2001,
            OpCode::Insert => 2002,
            OpCode::Sql => 2003,
            OpCode::Query => 2004,
            OpCode::GetMore => 2005,
            OpCode::Delete => 2006,
            OpCode::KillContext => 2007,
            OpCode::Disconnect => 2008,
            OpCode::KillAllContexts => 2009,
            OpCode::TransactionBegin => 2010,
            OpCode::TransactionCommit => 2011,
            OpCode::TransactionRollback => 2012,
            OpCode::Aggregate => 2019,
            OpCode::AuthVerify => 7000,
            OpCode::CreateUser => 7001,
            OpCode::DeleteUser => 7002,
            OpCode::LobOpen => 8001,
            OpCode::LobWrite => 8002,
            OpCode::LobRead => 8003,
            OpCode::LobRemove => 8004,
            OpCode::LobUpdate => 8005,
            OpCode::LobClose => 8006,
        }
    }

    pub fn from_code(code: i32) -> Option<Self> {
        let op = match code & !REPLY_MASK {
            2001 => OpCode::Update,
            2002 => OpCode::Insert,
            2003 => OpCode::Sql,
            2004 => OpCode::Query,
            2005 => OpCode::GetMore,
            2006 => OpCode::Delete,
            2007 => OpCode::KillContext,
            2008 => OpCode::Disconnect,
            2009 => OpCode::KillAllContexts,
            2010 => OpCode::TransactionBegin,
            2011 => OpCode::TransactionCommit,
            2012 => OpCode::TransactionRollback,
            2019 => OpCode::Aggregate,
            7000 => OpCode::AuthVerify,
            7001 => OpCode::CreateUser,
            7002 => OpCode::DeleteUser,
            8001 => OpCode::LobOpen,
            8002 => OpCode::LobWrite,
            8003 => OpCode::LobRead,
            8004 => OpCode::LobRemove,
            8005 => OpCode::LobUpdate,
            8006 => OpCode::LobClose,
            _ => return None,
        };
        Some(op)
    }

    /// Opcode the server answers this request with.
    pub fn reply_code(self) -> i32 {
        self.code() | REPLY_MASK
    }

    /// Opcodes of the large-object family.
    pub fn is_lob(self) -> bool {
        matches!(
            self,
            OpCode::LobOpen
                | OpCode::LobWrite
                | OpCode::LobRead
                | OpCode::LobRemove
                | OpCode::LobUpdate
                | OpCode::LobClose
        )
    }
}

impl fmt::Display for OpCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}({})", self, self.code())
    }
}

/// The fixed-size tuple that precedes LOB payloads.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LobTuple {
    pub len: u32,
    pub sequence: u32,
    pub offset: Long,
}

impl LobTuple {
    pub const LENGTH: usize = 16;

    pub fn new(len: u32, sequence: u32, offset: Long) -> Self {
        Self {
            len,
            sequence,
            offset,
        }
    }
}

/// An outbound request.
///
/// Builders read only the fields their operation uses; everything else keeps
/// its default.
#[derive(Debug, Clone, PartialEq)]
pub struct Message {
    pub opcode: OpCode,
    pub node_id: [u8; 12],
    pub request_id: Long,
    pub version: i32,
    pub w: i16,
    pub padding: i16,
    pub flags: i32,
    pub collection_full_name: String,
    pub matcher: Option<Document>,
    pub selector: Option<Document>,
    pub order_by: Option<Document>,
    pub hint: Option<Document>,
    pub insertor: Option<Document>,
    pub modifier: Option<Document>,
    pub skip_rows: Long,
    pub return_rows: Long,
    /// Contexts addressed by get-more, kill-context and LOB requests.
    pub context_ids: Vec<Long>,
    pub sql: String,
    pub user: String,
    pub password: String,
    pub lob_sequence: u32,
    pub lob_offset: Long,
    pub lob_len: u32,
    pub lob_data: Bytes,
}

impl Message {
    pub fn new(opcode: OpCode) -> Self {
        Self {
            opcode,
            node_id: ZERO_NODE_ID,
            request_id: Long::ZERO,
            version: crate::PROTOCOL_VERSION,
            w: 0,
            padding: 0,
            flags: 0,
            collection_full_name: String::new(),
            matcher: None,
            selector: None,
            order_by: None,
            hint: None,
            insertor: None,
            modifier: None,
            skip_rows: Long::ZERO,
            return_rows: Long::NEG_ONE,
            context_ids: Vec::new(),
            sql: String::new(),
            user: String::new(),
            password: String::new(),
            lob_sequence: 0,
            lob_offset: Long::NEG_ONE,
            lob_len: 0,
            lob_data: Bytes::new(),
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.collection_full_name = name.into();
        self
    }

    pub fn with_request_id(mut self, request_id: Long) -> Self {
        self.request_id = request_id;
        self
    }

    pub fn with_flags(mut self, flags: i32) -> Self {
        self.flags = flags;
        self
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

    pub fn with_insertor(mut self, doc: Document) -> Self {
        self.insertor = Some(doc);
        self
    }

    pub fn with_modifier(mut self, modifier: Document) -> Self {
        self.modifier = Some(modifier);
        self
    }

    pub fn with_rows(mut self, skip: Long, limit: Long) -> Self {
        self.skip_rows = skip;
        self.return_rows = limit;
        self
    }

    pub fn with_context(mut self, context_id: Long) -> Self {
        self.context_ids = vec![context_id];
        self
    }

    pub fn with_contexts(mut self, context_ids: Vec<Long>) -> Self {
        self.context_ids = context_ids;
        self
    }

    pub fn with_sql(mut self, sql: impl Into<String>) -> Self {
        self.sql = sql.into();
        self
    }

    pub fn with_credentials(mut self, user: impl Into<String>, password: impl Into<String>) -> Self {
        self.user = user.into();
        self.password = password.into();
        self
    }

    pub fn with_lob_data(mut self, data: Bytes) -> Self {
        self.lob_len = data.len() as u32;
        self.lob_data = data;
        self
    }

    pub fn with_lob_range(mut self, len: u32, offset: Long) -> Self {
        self.lob_len = len;
        self.lob_offset = offset;
        self
    }

    /// First context id, or the "no context" sentinel.
    pub fn context_id(&self) -> Long {
        self.context_ids.first().copied().unwrap_or(Long::NEG_ONE)
    }
}

/// A parsed inbound reply.
#[derive(Debug, Clone, PartialEq)]
pub struct Reply {
    pub opcode: i32,
    pub node_id: [u8; 12],
    pub request_id: Long,
    pub context_id: Long,
    pub flags: i32,
    pub start_from: i32,
    pub num_returned: i32,
    pub documents: Vec<Document>,
    /// Present on successful LOB replies that carry data.
    pub lob: Option<LobTuple>,
    pub lob_data: Bytes,
}

impl Reply {
    /// A successful, empty reply to `opcode`.
    pub fn to_request(opcode: OpCode, request_id: Long) -> Self {
        Self {
            opcode: opcode.reply_code(),
            node_id: ZERO_NODE_ID,
            request_id,
            context_id: Long::NEG_ONE,
            flags: 0,
            start_from: 0,
            num_returned: 0,
            documents: Vec::new(),
            lob: None,
            lob_data: Bytes::new(),
        }
    }

    pub fn with_flags(mut self, flags: i32) -> Self {
        self.flags = flags;
        self
    }

    pub fn with_context(mut self, context_id: Long) -> Self {
        self.context_id = context_id;
        self
    }

    pub fn with_documents(mut self, documents: Vec<Document>) -> Self {
        self.num_returned = documents.len() as i32;
        self.documents = documents;
        self
    }

    pub fn with_lob(mut self, sequence: u32, offset: Long, data: Bytes) -> Self {
        self.lob = Some(LobTuple::new(data.len() as u32, sequence, offset));
        self.lob_data = data;
        self
    }

    /// Checks the reply-marker convention: reply opcode = request opcode | high bit.
    pub fn is_reply_to(&self, opcode: OpCode) -> bool {
        self.opcode == opcode.reply_code()
    }

    pub fn is_ok(&self) -> bool {
        self.flags == 0
    }

    pub fn error_code(&self) -> Option<ErrorCode> {
        if self.flags == 0 {
            None
        } else {
            Some(ErrorCode::from_flags(self.flags))
        }
    }

    pub fn is_end_of_context(&self) -> bool {
        self.error_code().is_some_and(|code| code.is_end_of_context())
    }

    /// Error message document the server attaches to failed replies.
    pub fn error_detail(&self) -> Option<&str> {
        if self.flags == 0 {
            return None;
        }
        self.documents
            .first()
            .and_then(|doc| doc.get_str("detail").ok())
            .filter(|detail| !detail.is_empty())
    }
}
