//! Boundary to the native database drivers.
//!
//! The adapter treats each driver as a black box that can run one translated
//! [`Statement`] and hand back a dialect-specific [`RawResult`]. [`SqlxDriver`]
//! is the production implementation; tests plug scripted drivers in through
//! the same traits.
//!
//! [`SqlxDriver`]: crate::db::pool::SqlxDriver

use crate::db::dialect::Statement;
use crate::error::DbResult;
use crate::models::{ConnectionConfig, Row};
use std::future::Future;

/// Raw result of running one statement, before normalization.
#[derive(Debug, Clone, PartialEq)]
pub enum RawResult {
    /// Rows of a read statement.
    Rows(Vec<Row>),
    /// Driver-specific summary of a mutating statement.
    Mutation(RawMutation),
}

/// Mutation summaries as each driver reports them.
#[derive(Debug, Clone, PartialEq)]
pub enum RawMutation {
    /// MySQL OK packet.
    MySql {
        last_insert_id: u64,
        rows_affected: u64,
    },
    /// PostgreSQL command tag plus any `RETURNING` rows.
    Postgres {
        rows_affected: u64,
        returning: Vec<Row>,
    },
    /// SQLite `changes()` / `last_insert_rowid()`.
    Sqlite { last_insert_rowid: i64, changes: u64 },
}

/// Establishes handles for one dialect.
pub trait Driver: Send + Sync + 'static {
    type Handle: DriverHandle;

    /// Open a new handle (pool or connection) for `config`.
    fn connect(
        &self,
        config: &ConnectionConfig,
    ) -> impl Future<Output = DbResult<Self::Handle>> + Send;
}

/// A live pool or connection.
pub trait DriverHandle: Send + Sync + 'static {
    /// Run one translated statement.
    fn run(&self, statement: &Statement) -> impl Future<Output = DbResult<RawResult>> + Send;

    /// Release the handle. Called at most once per handle.
    fn close(&self) -> impl Future<Output = DbResult<()>> + Send;
}
