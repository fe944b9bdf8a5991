//! Multi-dialect persistence adapter.
//!
//! One façade over MySQL, PostgreSQL and SQLite that normalizes placeholders and
//! result shapes, recovers from dropped connections with a single reconnect and
//! retry, keeps idle pools warm, and bootstraps its own schema and reference data.

pub mod config;
pub mod db;
pub mod error;
pub mod models;
pub mod schema;

pub use config::Config;
pub use db::{ConnectionManager, Database};
pub use error::{DbError, DbResult};
