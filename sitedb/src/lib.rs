/// The main library module for sitedb.
///
/// This module provides thin MySQL and PostgreSQL wrappers behind one
/// `Database` trait, the contact-form message store with its submission
/// rate limiter, and the gift-exchange queries. Connection lifecycle,
/// transactions and row shaping are shared by both backends.
mod config;
mod connection;
mod error;
mod gifts;
mod message;
#[cfg(feature = "mysql")]
mod mysql_db;
#[cfg(feature = "postgres")]
mod postgres_db;
mod rate_limit;
mod rows;
mod state;
mod value;

#[cfg(test)]
mod testing;

/// Re-exporting types for easier access by users of the library.
pub use config::{
    load_dotenv, DbConfig, DEFAULT_CONNECTION_LIMIT, DEFAULT_CONNECT_TIMEOUT_SECS, DEFAULT_LOCALE_FORMAT,
}; // Connection settings and `.env` loading
pub use connection::{Database, DatabaseType, TIME_NOT_FOUND}; // Backend-neutral handle
pub use error::SiteDbError; // Re-exporting the SiteDbError type for error handling
pub use gifts::{AliasGiftStatus, Gift, GiftRecipient, Recipient, XmasDatabase}; // Gift exchange
pub use message::{ContactMessage, MessageDatabase}; // Contact-form messages
pub use rate_limit::{
    elapsed_seconds, RateLimitPolicy, SendStatus, DAY_S, FIVE_MINUTES_S, HALF_HOUR_S, HOUR_S,
    MINUTE_S, MONTH_S, WEEK_S, YEAR_S,
}; // Submission throttling
pub use rows::{bool_from_int_or_bool, terminate_statement, JsonRow}; // Row shaping helpers
pub use state::ConnectionState;
pub use value::SqlValue; // Bind parameter values
#[cfg(feature = "mysql")]
pub use mysql_db::MySqlDatabase; // Re-exporting the MySQL wrapper
#[cfg(feature = "postgres")]
pub use postgres_db::PostgresDatabase; // Re-exporting the PostgreSQL wrapper
