//! Data models for the persistence adapter.
//!
//! This module re-exports all model types used throughout the crate.

pub mod connection;
pub mod query;

// Re-export commonly used types
pub use connection::{
    ConnectionConfig, ConnectionConfigError, DatabaseType, LifecycleState, TlsOptions, TlsVersion,
};
pub use query::{MutationResult, Outcome, QueryParam, Row, SelectResult};
