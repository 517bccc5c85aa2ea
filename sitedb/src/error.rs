use std::fmt;

/// Represents the various errors that can occur in sitedb.
#[derive(Debug)]
pub enum SiteDbError {
    /// Represents a connection error (network, authentication, runtime setup).
    ConnectionError(String),

    /// A statement was issued while the wrapper was disconnected.
    NotConnected,

    /// `disconnect()` was refused because a transaction is still open.
    TransactionInProgress,

    /// Represents a transaction error with a message detailing the issue.
    TransactionError(String),

    /// Represents a query execution error with a message detailing the issue.
    QueryError(String),

    /// A row could not be shaped into the requested record type.
    DeserializationError(String),

    /// Represents a serialization error with a message detailing the issue.
    SerializationError(String),

    /// Missing or malformed configuration.
    ConfigError(String),
}

impl SiteDbError {
    /// Returns `true` for the "busy" signal raised by a refused disconnect.
    pub fn is_busy(&self) -> bool {
        matches!(self, SiteDbError::TransactionInProgress)
    }
}

impl fmt::Display for SiteDbError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            SiteDbError::ConnectionError(msg) => write!(f, "Connection error: {}", msg),
            SiteDbError::NotConnected => write!(f, "Not connected to the database"),
            SiteDbError::TransactionInProgress => {
                write!(f, "Busy: commit or roll back the open transaction first")
            }
            SiteDbError::TransactionError(msg) => write!(f, "Transaction error: {}", msg),
            SiteDbError::QueryError(msg) => write!(f, "Query error: {}", msg),
            SiteDbError::DeserializationError(msg) => write!(f, "Deserialization error: {}", msg),
            SiteDbError::SerializationError(msg) => write!(f, "Serialization error: {}", msg),
            SiteDbError::ConfigError(msg) => write!(f, "Configuration error: {}", msg),
        }
    }
}

impl std::error::Error for SiteDbError {}

// Conversions from driver error types

#[cfg(feature = "postgres")]
impl From<tokio_postgres::Error> for SiteDbError {
    fn from(err: tokio_postgres::Error) -> Self {
        SiteDbError::QueryError(err.to_string())
    }
}

#[cfg(feature = "mysql")]
impl From<mysql::Error> for SiteDbError {
    fn from(err: mysql::Error) -> Self {
        SiteDbError::QueryError(err.to_string())
    }
}

impl From<serde_json::Error> for SiteDbError {
    fn from(err: serde_json::Error) -> Self {
        SiteDbError::DeserializationError(err.to_string())
    }
}
