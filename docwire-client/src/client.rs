//! High-level client API.

use crate::collection::CollectionSpace;
use crate::connection::{Connection, ConnectionConfig, ListType, SnapshotType};
use crate::cursor::Cursor;
use crate::error::ClientError;
use bson::{doc, Document};
use docwire_protocol::ErrorCode;
use std::sync::Arc;
use tracing::debug;

/// High-level client for a docwire node.
#[derive(Debug, Clone)]
pub struct Client {
    conn: Arc<Connection>,
}

impl Client {
    /// Connects and authenticates with the given configuration.
    pub async fn connect(config: ConnectionConfig) -> Result<Self, ClientError> {
        let conn = Connection::connect(config).await?;
        Ok(Self::from_connection(Arc::new(conn)))
    }

    pub fn from_connection(conn: Arc<Connection>) -> Self {
        Self { conn }
    }

    /// Returns whether the client is connected.
    pub fn is_connected(&self) -> bool {
        self.conn.is_connected()
    }

    /// Returns the underlying connection.
    pub fn connection(&self) -> Arc<Connection> {
        self.conn.clone()
    }

    pub async fn disconnect(&self) -> Result<(), ClientError> {
        self.conn.disconnect().await
    }

    pub async fn is_valid(&self) -> Result<bool, ClientError> {
        self.conn.is_valid().await
    }

    // =========================================================================
    // Collection spaces
    // =========================================================================

    /// `$create collectionspace`; `page_size` is left to the server when `None`.
    pub async fn create_collection_space(
        &self,
        name: &str,
        page_size: Option<i32>,
    ) -> Result<CollectionSpace, ClientError> {
        check_space_name(name)?;
        let mut matcher = doc! { "Name": name };
        if let Some(page_size) = page_size {
            matcher.insert("PageSize", page_size);
        }
        self.conn
            .send_admin_command("$create collectionspace", Some(matcher), None, None, None)
            .await?;
        debug!(space = name, "collection space created");
        Ok(CollectionSpace::new(self.conn.clone(), name))
    }

    pub async fn drop_collection_space(&self, name: &str) -> Result<(), ClientError> {
        check_space_name(name)?;
        self.conn
            .send_admin_command(
                "$drop collectionspace",
                Some(doc! { "Name": name }),
                None,
                None,
                None,
            )
            .await?;
        Ok(())
    }

    /// Looks the space up with `$test collectionspace`.
    pub async fn get_collection_space(
        &self,
        name: &str,
    ) -> Result<Option<CollectionSpace>, ClientError> {
        check_space_name(name)?;
        let result = self
            .conn
            .send_admin_command(
                "$test collectionspace",
                Some(doc! { "Name": name }),
                None,
                None,
                None,
            )
            .await;
        match result {
            Ok(_) => Ok(Some(CollectionSpace::new(self.conn.clone(), name))),
            Err(err) if err.server_code() == Some(ErrorCode::CollectionSpaceNotFound) => Ok(None),
            Err(err) => Err(err),
        }
    }

    pub async fn list_collection_spaces(&self) -> Result<Cursor, ClientError> {
        self.conn
            .get_list(ListType::CollectionSpaces, None, None, None)
            .await
    }

    pub async fn list_collections(&self) -> Result<Cursor, ClientError> {
        self.conn
            .get_list(ListType::Collections, None, None, None)
            .await
    }

    // =========================================================================
    // Monitoring
    // =========================================================================

    pub async fn get_list(
        &self,
        kind: ListType,
        matcher: Option<Document>,
        selector: Option<Document>,
        order_by: Option<Document>,
    ) -> Result<Cursor, ClientError> {
        self.conn.get_list(kind, matcher, selector, order_by).await
    }

    pub async fn get_snapshot(
        &self,
        kind: SnapshotType,
        matcher: Option<Document>,
        selector: Option<Document>,
        order_by: Option<Document>,
    ) -> Result<Cursor, ClientError> {
        self.conn
            .get_snapshot(kind, matcher, selector, order_by)
            .await
    }

    pub async fn reset_snapshot(&self, matcher: Option<Document>) -> Result<(), ClientError> {
        self.conn.reset_snapshot(matcher).await
    }

    // =========================================================================
    // Transactions, SQL, users, session
    // =========================================================================

    pub async fn begin_transaction(&self) -> Result<(), ClientError> {
        self.conn.begin_transaction().await
    }

    pub async fn commit_transaction(&self) -> Result<(), ClientError> {
        self.conn.commit_transaction().await
    }

    pub async fn rollback_transaction(&self) -> Result<(), ClientError> {
        self.conn.rollback_transaction().await
    }

    pub async fn exec_sql(&self, sql: &str) -> Result<Cursor, ClientError> {
        self.conn.exec_sql(sql).await
    }

    pub async fn exec_update_sql(&self, sql: &str) -> Result<(), ClientError> {
        self.conn.exec_update_sql(sql).await
    }

    pub async fn create_user(&self, user: &str, password: &str) -> Result<(), ClientError> {
        self.conn.create_user(user, password).await
    }

    pub async fn remove_user(&self, user: &str, password: &str) -> Result<(), ClientError> {
        self.conn.remove_user(user, password).await
    }

    pub async fn set_session_attr(&self, options: Document) -> Result<(), ClientError> {
        self.conn.set_session_attr(options).await
    }
}

fn check_space_name(name: &str) -> Result<(), ClientError> {
    if name.is_empty() || name.contains('.') {
        return Err(ClientError::InvalidArgument(format!(
            "invalid collection space name: {:?}",
            name
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::MockServer;

    #[tokio::test]
    async fn test_collection_space_lifecycle() {
        let (conn, mut server) = MockServer::start(false).await;
        let serve = tokio::spawn(async move {
            let create = server.respond(Vec::new()).await;
            let (name, docs) = create.query_parts();
            assert_eq!(name, "$create collectionspace");
            assert_eq!(docs[0], doc! { "Name": "foo", "PageSize": 4096 });

            let test = server.respond(Vec::new()).await;
            assert_eq!(test.query_parts().0, "$test collectionspace");

            let missing = server.read_request().await;
            server.reply(missing.reply().with_flags(-34)).await;

            let drop = server.respond(Vec::new()).await;
            let (name, docs) = drop.query_parts();
            assert_eq!(name, "$drop collectionspace");
            assert_eq!(docs[0], doc! { "Name": "foo" });
        });

        let client = Client::from_connection(conn);
        let space = client
            .create_collection_space("foo", Some(4096))
            .await
            .unwrap();
        assert_eq!(space.name(), "foo");
        assert_eq!(space.collection("bar").full_name(), "foo.bar");

        assert!(client.get_collection_space("foo").await.unwrap().is_some());
        assert!(client.get_collection_space("gone").await.unwrap().is_none());
        client.drop_collection_space("foo").await.unwrap();
        serve.await.unwrap();
    }

    #[tokio::test]
    async fn test_invalid_space_name() {
        let (conn, mut server) = MockServer::start(false).await;
        let client = Client::from_connection(conn);
        assert!(matches!(
            client.create_collection_space("a.b", None).await,
            Err(ClientError::InvalidArgument(_))
        ));
        assert!(matches!(
            client.drop_collection_space("").await,
            Err(ClientError::InvalidArgument(_))
        ));
        assert!(server.is_quiet().await);
    }

    #[tokio::test]
    async fn test_list_collections() {
        let (conn, mut server) = MockServer::start(false).await;
        let serve = tokio::spawn(async move {
            let request = server
                .respond(vec![doc! { "Name": "foo.bar" }, doc! { "Name": "foo.baz" }])
                .await;
            assert_eq!(request.query_parts().0, "$list collections");
        });

        let client = Client::from_connection(conn);
        let mut cursor = client.list_collections().await.unwrap();
        let names: Vec<_> = cursor
            .collect_all()
            .await
            .unwrap()
            .iter()
            .map(|doc| doc.get_str("Name").unwrap().to_string())
            .collect();
        assert_eq!(names, vec!["foo.bar", "foo.baz"]);
        serve.await.unwrap();
    }
}
