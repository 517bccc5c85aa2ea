use std::fmt::Debug;

use chrono::{NaiveDateTime, Utc};
use log::{error, warn};
use serde::de::DeserializeOwned;
use serde::Deserialize;

use crate::config::DbConfig;
use crate::error::SiteDbError;
use crate::rows::JsonRow;
use crate::state::ConnectionState;
use crate::value::SqlValue;

/// Returned by [`Database::server_time`] when `SELECT NOW()` yields no row.
pub const TIME_NOT_FOUND: &str = "[Time Not Found]";

/// Represents the type of database being used.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DatabaseType {
    /// PostgreSQL database type.
    PostgreSQL,
    /// MySQL (or MariaDB) database type.
    MySQL,
}

impl DatabaseType {
    /// Placeholder for the 1-based parameter `index`.
    pub fn placeholder(&self, index: usize) -> String {
        match self {
            DatabaseType::PostgreSQL => format!("${}", index),
            DatabaseType::MySQL => "?".to_string(),
        }
    }

    /// Comma separated placeholders for `count` parameters starting at 1.
    pub fn placeholders(&self, count: usize) -> String {
        (1..=count)
            .map(|i| self.placeholder(i))
            .collect::<Vec<_>>()
            .join(", ")
    }

    /// Quotes an identifier so its case survives (Postgres folds bare names
    /// to lower case) and reserved words such as `user` can be used.
    pub fn quote_ident(&self, ident: &str) -> String {
        match self {
            DatabaseType::PostgreSQL => format!("\"{}\"", ident.replace('"', "\"\"")),
            DatabaseType::MySQL => format!("`{}`", ident.replace('`', "``")),
        }
    }

    /// `column AS "column"`, so result keys keep the declared camelCase.
    pub fn select_as(&self, column: &str) -> String {
        format!("{} AS {}", column, self.quote_ident(column))
    }

    /// [`DatabaseType::select_as`] applied to each column, comma separated.
    pub fn select_list(&self, columns: &[&str]) -> String {
        columns
            .iter()
            .map(|column| self.select_as(column))
            .collect::<Vec<_>>()
            .join(", ")
    }

    pub fn default_port(&self) -> u16 {
        match self {
            DatabaseType::PostgreSQL => 5432,
            DatabaseType::MySQL => 3306,
        }
    }

    pub(crate) fn begin_statement(&self) -> &'static str {
        match self {
            DatabaseType::PostgreSQL => "BEGIN",
            DatabaseType::MySQL => "START TRANSACTION",
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            DatabaseType::PostgreSQL => "Postgres",
            DatabaseType::MySQL => "MySQL",
        }
    }
}

#[derive(Debug, Deserialize)]
struct NowRow {
    now: Option<NaiveDateTime>,
}

/// A single logical database handle: lifecycle, statements and
/// transaction control.
///
/// Every operation takes `&mut self`; a wrapper holds one connection and is
/// not meant to be shared without external synchronization.
pub trait Database {
    /// Returns the dialect of this connection.
    fn database_type(&self) -> DatabaseType;

    fn config(&self) -> &DbConfig;

    fn state(&self) -> ConnectionState;

    /// Establishes the connection. Succeeds immediately if already
    /// connected or inside a transaction.
    fn connect(&mut self) -> Result<(), SiteDbError>;

    /// Closes the connection.
    ///
    /// Returns [`SiteDbError::TransactionInProgress`] and leaves the
    /// connection open while a transaction is active. Does nothing if
    /// already disconnected.
    fn disconnect(&mut self) -> Result<(), SiteDbError>;

    /// Executes a statement and returns the number of rows affected.
    fn execute(&mut self, sql: &str, params: &[SqlValue]) -> Result<u64, SiteDbError>;

    /// Executes a statement and returns its rows as JSON objects keyed by
    /// column name. An empty result is `Ok(vec![])`, never an error.
    fn query_rows(&mut self, sql: &str, params: &[SqlValue]) -> Result<Vec<JsonRow>, SiteDbError>;

    /// Starts a transaction. Does not connect implicitly.
    fn begin(&mut self) -> Result<(), SiteDbError>;

    /// Commits the open transaction. The wrapper leaves the transaction
    /// state even if the `COMMIT` itself fails.
    fn commit(&mut self) -> Result<(), SiteDbError>;

    /// Rolls back the open transaction.
    fn rollback(&mut self) -> Result<(), SiteDbError>;

    fn is_connected(&self) -> bool {
        self.state().is_connected()
    }

    fn in_transaction(&self) -> bool {
        self.state().in_transaction()
    }

    /// Executes a query and deserializes every row into `T`.
    fn query<T>(&mut self, sql: &str, params: &[SqlValue]) -> Result<Vec<T>, SiteDbError>
    where
        Self: Sized,
        T: DeserializeOwned + Debug,
    {
        self.query_rows(sql, params)?
            .into_iter()
            .map(|row| {
                serde_json::from_value(serde_json::Value::Object(row)).map_err(|e| {
                    error!("Could not shape row from `{}`: {}", sql, e);
                    SiteDbError::DeserializationError(e.to_string())
                })
            })
            .collect()
    }

    /// Executes a query and deserializes the first row, if any.
    fn query_one<T>(&mut self, sql: &str, params: &[SqlValue]) -> Result<Option<T>, SiteDbError>
    where
        Self: Sized,
        T: DeserializeOwned + Debug,
    {
        Ok(self.query::<T>(sql, params)?.into_iter().next())
    }

    /// Runs `f` inside a transaction: commit on `Ok`, rollback on `Err`.
    fn transaction<F, R>(&mut self, f: F) -> Result<R, SiteDbError>
    where
        Self: Sized,
        F: FnOnce(&mut Self) -> Result<R, SiteDbError>,
    {
        self.begin()?;
        match f(self) {
            Ok(value) => {
                self.commit()?;
                Ok(value)
            }
            Err(e) => {
                if let Err(rollback_err) = self.rollback() {
                    error!("Error during transaction rollback: {}", rollback_err);
                }
                Err(e)
            }
        }
    }

    /// Current database server time in UTC (sessions are pinned to UTC on
    /// connect).
    fn server_now(&mut self) -> Result<Option<NaiveDateTime>, SiteDbError>
    where
        Self: Sized,
    {
        let row: Option<NowRow> = self.query_one("SELECT NOW() AS now", &[])?;
        Ok(row.and_then(|r| r.now))
    }

    /// Server time rendered in the configured display zone, for health checks.
    fn server_time(&mut self) -> Result<String, SiteDbError>
    where
        Self: Sized,
    {
        let Some(now) = self.server_now()? else {
            warn!("SELECT NOW() returned no row");
            return Ok(TIME_NOT_FOUND.to_string());
        };
        let config = self.config();
        let local = now.and_utc().with_timezone(&config.display_timezone);
        Ok(local.format(&config.locale_format).to_string())
    }
}

/// Database time if available, otherwise the local UTC clock.
pub(crate) fn authoritative_now<D: Database>(db: &mut D) -> Result<NaiveDateTime, SiteDbError> {
    match db.server_now()? {
        Some(now) => Ok(now),
        None => {
            warn!("Server time unavailable; falling back to the local clock");
            Ok(Utc::now().naive_utc())
        }
    }
}

/// Shared `Display` body: `"<Backend> Database:\n"` plus the config as JSON.
pub(crate) fn describe(db_type: DatabaseType, config: &DbConfig) -> String {
    let body = serde_json::to_string_pretty(config).unwrap_or_else(|e| format!("<{}>", e));
    format!("{} Database:\n{}", db_type.name(), body)
}
