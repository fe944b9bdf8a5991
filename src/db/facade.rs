//! Query façade.
//!
//! [`Database`] is the handle application code holds. It exposes four data
//! operations and the lifecycle calls, and routes every statement through
//! [`ConnectionManager::execute`].
//!
//! SQL text is taken as `&'static str`: only string literals (or other
//! compile-time constants) can reach a statement, so caller-supplied values
//! travel exclusively as bound parameters.
//!
//! ```ignore
//! let db = Database::from_config(config);
//! db.connect().await?;
//! let id = db
//!     .insert("INSERT INTO comments (record_id, body) VALUES (?, ?)", &params![record_id, body])
//!     .await?;
//! let rows = db
//!     .query("SELECT * FROM comments WHERE record_id = ?", &params![record_id])
//!     .await?;
//! ```

use crate::db::dialect::{CanonicalQuery, StatementKind, classify};
use crate::db::driver::Driver;
use crate::db::manager::{AdapterStatus, ConnectionManager};
use crate::db::pool::SqlxDriver;
use crate::error::{DbError, DbResult};
use crate::models::{ConnectionConfig, MutationResult, Outcome, QueryParam, SelectResult};

/// Shared entry point for data access. Clones share the same connection.
pub struct Database<D: Driver = SqlxDriver> {
    manager: ConnectionManager<D>,
}

impl<D: Driver> Clone for Database<D> {
    fn clone(&self) -> Self {
        Self {
            manager: self.manager.clone(),
        }
    }
}

impl<D: Driver> std::fmt::Debug for Database<D> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Database")
            .field("manager", &self.manager)
            .finish()
    }
}

impl Database<SqlxDriver> {
    /// Database backed by the sqlx pools.
    pub fn from_config(config: ConnectionConfig) -> Self {
        Self::new(ConnectionManager::new(SqlxDriver, config))
    }
}

impl<D: Driver> Database<D> {
    pub fn new(manager: ConnectionManager<D>) -> Self {
        Self { manager }
    }

    pub fn with_driver(driver: D, config: ConnectionConfig) -> Self {
        Self::new(ConnectionManager::new(driver, config))
    }

    pub fn manager(&self) -> &ConnectionManager<D> {
        &self.manager
    }

    pub async fn connect(&self) -> DbResult<()> {
        self.manager.connect().await
    }

    pub async fn reconnect(&self) -> DbResult<()> {
        self.manager.reconnect().await
    }

    pub async fn close(&self) -> DbResult<()> {
        self.manager.close().await
    }

    pub fn status(&self) -> AdapterStatus {
        self.manager.status()
    }

    /// Run a read statement.
    pub async fn query(&self, sql: &'static str, params: &[QueryParam]) -> DbResult<SelectResult> {
        match self.run(StatementKind::Select, sql, params).await? {
            Outcome::Select(result) => Ok(result),
            Outcome::Mutation(_) => Err(unexpected_shape("query")),
        }
    }

    /// Run an INSERT and return the generated key, if the engine produced one.
    pub async fn insert(&self, sql: &'static str, params: &[QueryParam]) -> DbResult<Option<i64>> {
        self.mutate(StatementKind::Insert, sql, params)
            .await
            .map(|result| result.inserted_id)
    }

    /// Run an UPDATE and return the affected row count.
    pub async fn update(&self, sql: &'static str, params: &[QueryParam]) -> DbResult<u64> {
        self.mutate(StatementKind::Update, sql, params)
            .await
            .map(|result| result.affected_row_count)
    }

    /// Run a DELETE and return the affected row count.
    pub async fn delete(&self, sql: &'static str, params: &[QueryParam]) -> DbResult<u64> {
        self.mutate(StatementKind::Delete, sql, params)
            .await
            .map(|result| result.affected_row_count)
    }

    async fn mutate(
        &self,
        expected: StatementKind,
        sql: &'static str,
        params: &[QueryParam],
    ) -> DbResult<MutationResult> {
        match self.run(expected, sql, params).await? {
            Outcome::Mutation(result) => Ok(result),
            Outcome::Select(_) => Err(unexpected_shape(expected.name())),
        }
    }

    async fn run(
        &self,
        expected: StatementKind,
        sql: &'static str,
        params: &[QueryParam],
    ) -> DbResult<Outcome> {
        let kind = classify(self.manager.db_type(), sql)?;
        if kind != expected {
            return Err(DbError::invalid_input(format!(
                "{}() only accepts {} statements, got {}",
                expected.name_for_call(),
                expected,
                kind
            )));
        }
        self.manager
            .execute(&CanonicalQuery::new(sql, params))
            .await
    }
}

impl StatementKind {
    fn name_for_call(&self) -> &'static str {
        match self {
            Self::Select => "query",
            other => other.name(),
        }
    }
}

fn unexpected_shape(operation: &str) -> DbError {
    DbError::internal(format!("{} returned a result of the wrong shape", operation))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_call_names() {
        assert_eq!(StatementKind::Select.name_for_call(), "query");
        assert_eq!(StatementKind::Insert.name_for_call(), "insert");
        assert_eq!(StatementKind::Delete.name_for_call(), "delete");
    }

    #[tokio::test]
    async fn test_kind_mismatch_never_reaches_driver() {
        let db = Database::from_config(ConnectionConfig::sqlite(":memory:"));
        // Not connected: a mismatch must fail before the lifecycle check
        let err = db.query("DELETE FROM statuses", &[]).await.unwrap_err();
        assert!(matches!(err, DbError::InvalidInput { .. }));

        let err = db
            .insert("SELECT * FROM statuses WHERE id = ?", &[QueryParam::Int(1)])
            .await
            .unwrap_err();
        assert!(err.to_string().contains("insert() only accepts insert statements, got select"));
    }

    #[tokio::test]
    async fn test_not_connected() {
        let db = Database::from_config(ConnectionConfig::sqlite(":memory:"));
        let err = db.query("SELECT 1", &[]).await.unwrap_err();
        assert!(matches!(err, DbError::NotConnected { .. }));
        assert!(!err.is_transient());
    }

    #[tokio::test]
    async fn test_round_trip_on_memory_sqlite() {
        let db = Database::from_config(ConnectionConfig::sqlite(":memory:"));
        db.connect().await.unwrap();
        db.manager()
            .execute(&CanonicalQuery::new(
                "CREATE TABLE notes (id INTEGER PRIMARY KEY AUTOINCREMENT, body TEXT, pinned BOOLEAN)",
                &[],
            ))
            .await
            .unwrap();

        let id = db
            .insert(
                "INSERT INTO notes (body, pinned) VALUES (?, ?)",
                &crate::params!["hello", true],
            )
            .await
            .unwrap();
        assert_eq!(id, Some(1));

        let rows = db
            .query("SELECT id, body, pinned FROM notes WHERE id = ?", &crate::params![1])
            .await
            .unwrap();
        assert_eq!(rows.columns, vec!["id", "body", "pinned"]);
        assert_eq!(rows.rows[0]["body"], serde_json::json!("hello"));
        assert_eq!(rows.rows[0]["pinned"], serde_json::json!(true));

        let updated = db
            .update("UPDATE notes SET body = ? WHERE id = ?", &crate::params!["bye", 1])
            .await
            .unwrap();
        assert_eq!(updated, 1);

        let deleted = db
            .delete("DELETE FROM notes WHERE id = ?", &crate::params![42])
            .await
            .unwrap();
        assert_eq!(deleted, 0);

        db.close().await.unwrap();
    }
}
