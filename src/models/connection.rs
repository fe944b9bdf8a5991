//! Connection-related data models.
//!
//! This module defines types for database connection configuration and state.

use crate::config::{KeepAliveOptions, PoolOptions};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Supported database types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DatabaseType {
    PostgreSQL,
    /// Includes MariaDB
    MySQL,
    SQLite,
}

impl DatabaseType {
    /// Parse database type from a connection string.
    pub fn from_connection_string(connection_string: &str) -> Option<Self> {
        let lower = connection_string.to_lowercase();
        if lower.starts_with("postgres://") || lower.starts_with("postgresql://") {
            Some(Self::PostgreSQL)
        } else if lower.starts_with("mysql://") || lower.starts_with("mariadb://") {
            Some(Self::MySQL)
        } else if lower.starts_with("sqlite://") || lower.starts_with("sqlite:") {
            Some(Self::SQLite)
        } else {
            None
        }
    }

    /// Get the display name for this database type.
    pub fn display_name(&self) -> &'static str {
        match self {
            Self::PostgreSQL => "PostgreSQL",
            Self::MySQL => "MySQL",
            Self::SQLite => "SQLite",
        }
    }

    /// Get the default port for this database type.
    pub fn default_port(&self) -> Option<u16> {
        match self {
            Self::PostgreSQL => Some(5432),
            Self::MySQL => Some(3306),
            Self::SQLite => None,
        }
    }
}

impl std::fmt::Display for DatabaseType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.display_name())
    }
}

impl FromStr for DatabaseType {
    type Err = ConnectionConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "postgres" | "postgresql" | "pg" => Ok(Self::PostgreSQL),
            "mysql" | "mariadb" => Ok(Self::MySQL),
            "sqlite" | "sqlite3" => Ok(Self::SQLite),
            other => Err(ConnectionConfigError::UnknownDatabaseType(other.to_string())),
        }
    }
}

/// Minimum TLS protocol version accepted for non-local connections.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Serialize, Deserialize)]
pub enum TlsVersion {
    #[default]
    #[serde(rename = "1.2")]
    V1_2,
    #[serde(rename = "1.3")]
    V1_3,
}

impl std::fmt::Display for TlsVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::V1_2 => write!(f, "1.2"),
            Self::V1_3 => write!(f, "1.3"),
        }
    }
}

impl FromStr for TlsVersion {
    type Err = ConnectionConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().trim_start_matches(['v', 'V']) {
            "1.2" | "TLSv1.2" => Ok(Self::V1_2),
            "1.3" | "TLSv1.3" => Ok(Self::V1_3),
            other => Err(ConnectionConfigError::UnsupportedTlsVersion(other.to_string())),
        }
    }
}

/// TLS requirements for the connection.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TlsOptions {
    /// Explicitly requested. Non-local hosts require TLS regardless.
    #[serde(default)]
    pub required: bool,
    #[serde(default)]
    pub min_version: TlsVersion,
}

/// Configuration for the adapter's single connection handle.
///
/// Built once at startup and never mutated afterwards.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectionConfig {
    pub db_type: DatabaseType,
    /// Ignored for SQLite.
    pub host: String,
    /// `None` means the dialect's default port.
    pub port: Option<u16>,
    pub username: Option<String>,
    /// Contains sensitive data - never log
    #[serde(skip_serializing)]
    pub password: Option<String>,
    /// Database name, or the database file path for SQLite.
    pub database: String,
    #[serde(default)]
    pub pool_options: PoolOptions,
    #[serde(default)]
    pub tls: TlsOptions,
    #[serde(default)]
    pub keepalive: KeepAliveOptions,
}

impl ConnectionConfig {
    /// Create a configuration for `database` on a local server with default options.
    pub fn new(db_type: DatabaseType, database: impl Into<String>) -> Self {
        Self {
            db_type,
            host: "localhost".to_string(),
            port: None,
            username: None,
            password: None,
            database: database.into(),
            pool_options: PoolOptions::default(),
            tls: TlsOptions::default(),
            keepalive: KeepAliveOptions::default(),
        }
    }

    /// Create a configuration for a SQLite database file.
    pub fn sqlite(path: impl Into<String>) -> Self {
        Self::new(DatabaseType::SQLite, path)
    }

    pub fn with_host(mut self, host: impl Into<String>, port: Option<u16>) -> Self {
        self.host = host.into();
        self.port = port;
        self
    }

    pub fn with_credentials(
        mut self,
        username: impl Into<String>,
        password: Option<String>,
    ) -> Self {
        self.username = Some(username.into());
        self.password = password;
        self
    }

    pub fn with_pool_options(mut self, pool_options: PoolOptions) -> Self {
        self.pool_options = pool_options;
        self
    }

    pub fn with_tls(mut self, tls: TlsOptions) -> Self {
        self.tls = tls;
        self
    }

    pub fn with_keepalive(mut self, keepalive: KeepAliveOptions) -> Self {
        self.keepalive = keepalive;
        self
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConnectionConfigError> {
        if self.database.trim().is_empty() {
            return Err(ConnectionConfigError::MissingDatabase);
        }
        if self.db_type != DatabaseType::SQLite && self.host.trim().is_empty() {
            return Err(ConnectionConfigError::MissingHost);
        }
        self.pool_options
            .validate()
            .map_err(ConnectionConfigError::InvalidPool)
    }

    /// Port to connect to, falling back to the dialect default.
    pub fn port_or_default(&self) -> Option<u16> {
        self.port.or_else(|| self.db_type.default_port())
    }

    /// True if the server runs on this machine (or the dialect has no server at all).
    pub fn is_local(&self) -> bool {
        if self.db_type == DatabaseType::SQLite {
            return true;
        }
        matches!(
            self.host.trim().trim_start_matches('[').trim_end_matches(']'),
            "localhost" | "127.0.0.1" | "::1"
        )
    }

    /// Whether the handle must be established over TLS.
    pub fn tls_required(&self) -> bool {
        self.tls.required || !self.is_local()
    }

    /// Get a display-safe connection URL (credentials masked).
    pub fn masked_url(&self) -> String {
        if self.db_type == DatabaseType::SQLite {
            return format!("sqlite:{}", self.database);
        }
        let scheme = match self.db_type {
            DatabaseType::PostgreSQL => "postgres",
            _ => "mysql",
        };
        let user = match (&self.username, &self.password) {
            (Some(user), Some(_)) => format!("{}:****@", user),
            (Some(user), None) => format!("{}@", user),
            _ => String::new(),
        };
        let port = self
            .port_or_default()
            .map(|p| format!(":{}", p))
            .unwrap_or_default();
        format!("{}://{}{}{}/{}", scheme, user, self.host, port, self.database)
    }
}

/// Errors that can occur when creating a connection configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConnectionConfigError {
    #[error("Unknown database type: {0}")]
    UnknownDatabaseType(String),

    #[error("Database name (or SQLite file path) is required")]
    MissingDatabase,

    #[error("Host is required for server databases")]
    MissingHost,

    #[error("Invalid pool options: {0}")]
    InvalidPool(String),

    #[error("Unsupported minimum TLS version: {0} (expected 1.2 or 1.3)")]
    UnsupportedTlsVersion(String),

    #[error("Invalid connection URL: {0}")]
    InvalidUrl(String),
}

/// Adapter-wide lifecycle state of the connection handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleState {
    Disconnected,
    Connecting,
    Connected,
    Reconnecting,
    Failed,
}

impl LifecycleState {
    /// Check whether moving from `self` to `next` is a legal transition.
    pub fn can_transition_to(self, next: LifecycleState) -> bool {
        use LifecycleState::*;
        matches!(
            (self, next),
            (Disconnected, Connecting)
                | (Failed, Connecting)
                | (Connecting, Connected)
                | (Connecting, Failed)
                | (Connected, Reconnecting)
                | (Connected, Disconnected)
                | (Failed, Reconnecting)
                | (Failed, Disconnected)
                | (Reconnecting, Connected)
                | (Reconnecting, Failed)
                | (Reconnecting, Disconnected)
        )
    }

    /// True while a handle is expected to be live.
    pub fn is_connected(&self) -> bool {
        matches!(self, Self::Connected)
    }
}

impl std::fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::Reconnecting => "reconnecting",
            Self::Failed => "failed",
        };
        write!(f, "{}", s)
    }
}
