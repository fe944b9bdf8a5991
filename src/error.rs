//! Error types for the persistence adapter.
//!
//! This module defines all error types using `thiserror` for ergonomic error handling.
//! The variants follow the adapter's recovery policy: only transient I/O errors are
//! retried (once, after a reconnect); everything else surfaces to the caller as-is.

use crate::models::LifecycleState;
use thiserror::Error;

/// MySQL client/server error numbers that indicate a dropped or unreachable server.
const MYSQL_TRANSIENT_ERRORS: &[u16] = &[
    1053, // ER_SERVER_SHUTDOWN
    1927, // ER_CONNECTION_KILLED
    2002, // CR_CONNECTION_ERROR
    2003, // CR_CONN_HOST_ERROR
    2006, // CR_SERVER_GONE_ERROR
    2013, // CR_SERVER_LOST
    2055, // CR_SERVER_LOST_EXTENDED
    4031, // ER_CLIENT_INTERACTION_TIMEOUT
];

/// PostgreSQL SQLSTATEs outside class 08 that mean the server went away.
const POSTGRES_TRANSIENT_STATES: &[&str] = &["57P01", "57P02", "57P03"];

/// Message fragments drivers use for dropped server-side connections.
const TRANSIENT_MESSAGE_PATTERNS: &[&str] = &[
    "server has gone away",
    "lost connection",
    "connection reset",
    "connection refused",
    "connection closed",
    "broken pipe",
    "timed out",
    "econnreset",
    "econnrefused",
    "etimedout",
    "epipe",
    "protocol_connection_lost",
    "terminating connection",
];

#[derive(Error, Debug)]
pub enum DbError {
    #[error("Connection failed: {message}")]
    Connection { message: String, suggestion: String },

    #[error("Connection lost: {message}")]
    Transient {
        message: String,
        /// Driver error number or SQLSTATE, when the driver reported one.
        code: Option<String>,
    },

    #[error("Timeout: {operation} exceeded {elapsed_secs}s")]
    Timeout {
        operation: String,
        elapsed_secs: u32,
    },

    #[error("Schema initialization failed for table '{table}': {message}")]
    SchemaInit { table: String, message: String },

    #[error("Seeding failed for table '{table}': {message}")]
    Seed { table: String, message: String },

    #[error("Query error: {message}")]
    Query {
        message: String,
        /// e.g., "42P01" for undefined table
        sql_state: Option<String>,
        suggestion: String,
    },

    #[error("Invalid input: {message}")]
    InvalidInput { message: String },

    #[error("Adapter is not connected (state: {state})")]
    NotConnected { state: LifecycleState },

    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl DbError {
    /// Create a connection error with a helpful suggestion.
    pub fn connection(message: impl Into<String>, suggestion: impl Into<String>) -> Self {
        Self::Connection {
            message: message.into(),
            suggestion: suggestion.into(),
        }
    }

    /// Create a transient I/O error.
    pub fn transient(message: impl Into<String>, code: Option<String>) -> Self {
        Self::Transient {
            message: message.into(),
            code,
        }
    }

    /// Create a timeout error.
    pub fn timeout(operation: impl Into<String>, elapsed_secs: u32) -> Self {
        Self::Timeout {
            operation: operation.into(),
            elapsed_secs,
        }
    }

    /// Create a schema initialization error.
    pub fn schema_init(table: impl Into<String>, message: impl Into<String>) -> Self {
        Self::SchemaInit {
            table: table.into(),
            message: message.into(),
        }
    }

    /// Create a seeding error.
    pub fn seed(table: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Seed {
            table: table.into(),
            message: message.into(),
        }
    }

    /// Create a query error with optional SQL state.
    pub fn query(
        message: impl Into<String>,
        sql_state: Option<String>,
        suggestion: impl Into<String>,
    ) -> Self {
        Self::Query {
            message: message.into(),
            sql_state,
            suggestion: suggestion.into(),
        }
    }

    /// Create an invalid input error.
    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::InvalidInput {
            message: message.into(),
        }
    }

    /// Create a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Create an internal error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Get the suggestion for this error, if available.
    pub fn suggestion(&self) -> Option<&str> {
        match self {
            Self::Connection { suggestion, .. } => Some(suggestion),
            Self::Query { suggestion, .. } => Some(suggestion),
            _ => None,
        }
    }

    /// Check if this error means the connection dropped and a reconnect may fix it.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transient { .. } | Self::Timeout { .. })
    }

    /// Classify a driver-reported database error by code and message.
    ///
    /// `number` is the MySQL error number when available, `sql_state` the SQLSTATE.
    pub fn from_database_error(
        message: &str,
        number: Option<u16>,
        sql_state: Option<String>,
    ) -> Self {
        let postgres_transient = sql_state
            .as_deref()
            .is_some_and(|s| s.starts_with("08") || POSTGRES_TRANSIENT_STATES.contains(&s));
        let mysql_transient = number.is_some_and(|n| MYSQL_TRANSIENT_ERRORS.contains(&n));

        if postgres_transient || mysql_transient || is_transient_message(message) {
            let code = number.map(|n| n.to_string()).or(sql_state);
            return DbError::transient(message, code);
        }

        DbError::query(
            message,
            sql_state,
            "Check the SQL syntax, referenced objects and constraint values",
        )
    }
}

/// Check a driver message against the known dropped-connection patterns.
pub fn is_transient_message(message: &str) -> bool {
    let lower = message.to_lowercase();
    TRANSIENT_MESSAGE_PATTERNS.iter().any(|p| lower.contains(p))
}

/// Convert sqlx errors to DbError.
impl From<sqlx::Error> for DbError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::Configuration(msg) => DbError::connection(
                msg.to_string(),
                "Check the connection settings and credentials",
            ),
            sqlx::Error::Database(db_err) => {
                let number = db_err
                    .try_downcast_ref::<sqlx::mysql::MySqlDatabaseError>()
                    .map(|e| e.number());
                let sql_state = db_err.code().map(|c| c.to_string());
                DbError::from_database_error(db_err.message(), number, sql_state)
            }
            sqlx::Error::RowNotFound => DbError::query(
                "No rows returned",
                None,
                "Verify the query conditions match existing data",
            ),
            // Without the pool at hand the configured timeout is unknown
            sqlx::Error::PoolTimedOut => {
                DbError::transient("Timed out acquiring a pooled connection", None)
            }
            sqlx::Error::PoolClosed => DbError::transient("Connection pool is closed", None),
            sqlx::Error::Io(io_err) => DbError::transient(format!("I/O error: {}", io_err), None),
            sqlx::Error::Tls(tls_err) => DbError::connection(
                format!("TLS error: {}", tls_err),
                "Verify TLS configuration and certificates",
            ),
            sqlx::Error::Protocol(msg) => {
                if is_transient_message(&msg) {
                    DbError::transient(format!("Protocol error: {}", msg), None)
                } else {
                    DbError::internal(format!("Protocol error: {}", msg))
                }
            }
            sqlx::Error::WorkerCrashed => DbError::transient("Database worker crashed", None),
            sqlx::Error::TypeNotFound { type_name } => DbError::query(
                format!("Type not found: {}", type_name),
                None,
                "Check the parameter types",
            ),
            sqlx::Error::ColumnNotFound(col) => DbError::query(
                format!("Column not found: {}", col),
                None,
                "Check the selected columns",
            ),
            sqlx::Error::ColumnIndexOutOfBounds { index, len } => DbError::internal(format!(
                "Column index {} out of bounds (len: {})",
                index, len
            )),
            sqlx::Error::ColumnDecode { index, source } => {
                DbError::internal(format!("Failed to decode column {}: {}", index, source))
            }
            sqlx::Error::Decode(source) => DbError::internal(format!("Decode error: {}", source)),
            _ => DbError::internal(format!("Unknown database error: {}", err)),
        }
    }
}

/// Result type alias for database operations.
pub type DbResult<T> = Result<T, DbError>;
