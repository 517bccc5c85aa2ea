use std::fmt;
use std::time::Duration;

use log::{debug, error, info};
use mysql::prelude::Queryable;
use mysql::{OptsBuilder, Pool, PoolConstraints, PoolOpts, PooledConn};

use crate::config::DbConfig;
use crate::connection::{describe, Database, DatabaseType};
use crate::error::SiteDbError;
use crate::rows::{mysql_row_to_json, terminate_statement, JsonRow};
use crate::state::ConnectionState;
use crate::value::{mysql_params, SqlValue};

/// Session setup run on every pooled connection.
const SESSION_INIT: &str = "SET time_zone = '+00:00'";

/// MySQL wrapper around a lazily created `mysql::Pool`.
///
/// One pooled connection is checked out on `connect()` and reused for every
/// statement, so `START TRANSACTION` and the statements that follow it run
/// on the same session.
pub struct MySqlDatabase {
    config: DbConfig,
    pool: Option<Pool>,
    conn: Option<PooledConn>,
    state: ConnectionState,
}

impl MySqlDatabase {
    /// Creates the wrapper. Neither the pool nor a connection exists until
    /// [`Database::connect`].
    pub fn new(config: DbConfig) -> Self {
        MySqlDatabase {
            config,
            pool: None,
            conn: None,
            state: ConnectionState::Disconnected,
        }
    }

    fn opts(&self) -> Result<OptsBuilder, SiteDbError> {
        let max = self.config.connection_limit.max(1);
        let constraints = PoolConstraints::new(0, max).ok_or_else(|| {
            SiteDbError::ConfigError(format!("invalid connection limit {}", max))
        })?;

        Ok(OptsBuilder::new()
            .ip_or_hostname(Some(self.config.host.clone()))
            .tcp_port(self.config.port)
            .user(Some(self.config.user.clone()))
            .pass(self.config.password.clone())
            .db_name(self.config.database.clone())
            .tcp_connect_timeout(Some(Duration::from_secs(self.config.connect_timeout_secs)))
            .init(vec![SESSION_INIT])
            .pool_opts(PoolOpts::default().with_constraints(constraints)))
    }

    fn open(&self) -> Result<(Pool, PooledConn), SiteDbError> {
        let pool = Pool::new(self.opts()?)
            .map_err(|e| SiteDbError::ConnectionError(format!("Failed to create MySQL pool: {}", e)))?;
        let conn = pool
            .get_conn()
            .map_err(|e| SiteDbError::ConnectionError(format!("Failed to connect to MySQL: {}", e)))?;
        Ok((pool, conn))
    }

    fn conn(&mut self) -> Result<&mut PooledConn, SiteDbError> {
        self.state.require_connected()?;
        self.conn.as_mut().ok_or(SiteDbError::NotConnected)
    }

    /// Transaction-control statements go over the text protocol.
    fn control(&mut self, statement: &str) -> Result<(), SiteDbError> {
        let conn = self.conn()?;
        conn.query_drop(terminate_statement(statement)).map_err(|e| {
            error!("{} failed: {}", statement, e);
            SiteDbError::TransactionError(format!("{} failed: {}", statement, e))
        })
    }

    /// Releases the pinned connection and the pool.
    pub fn close(&mut self) -> Result<(), SiteDbError> {
        self.disconnect()
    }
}

impl Database for MySqlDatabase {
    fn database_type(&self) -> DatabaseType {
        DatabaseType::MySQL
    }

    fn config(&self) -> &DbConfig {
        &self.config
    }

    fn state(&self) -> ConnectionState {
        self.state
    }

    fn connect(&mut self) -> Result<(), SiteDbError> {
        if !self.state.needs_connect() {
            return Ok(());
        }
        match self.open() {
            Ok((pool, conn)) => {
                self.pool = Some(pool);
                self.conn = Some(conn);
                self.state = ConnectionState::Connected;
                info!("Connected to MySQL at {}:{}", self.config.host, self.config.port);
                Ok(())
            }
            Err(e) => {
                error!("Could not connect to MySQL: {}", e);
                Err(e)
            }
        }
    }

    fn disconnect(&mut self) -> Result<(), SiteDbError> {
        if !self.state.needs_disconnect()? {
            return Ok(());
        }
        // The pooled connection goes back to the pool, and dropping the
        // last pool handle closes every idle connection.
        self.conn = None;
        self.pool = None;
        self.state = ConnectionState::Disconnected;
        info!("Disconnected from MySQL");
        Ok(())
    }

    fn execute(&mut self, sql: &str, params: &[SqlValue]) -> Result<u64, SiteDbError> {
        let sql = terminate_statement(sql).into_owned();
        let params = mysql_params(params);
        let conn = self.conn()?;
        debug!("execute: {}", sql);
        let result = conn.exec_iter(sql.as_str(), params).map_err(|e| {
            error!("Error in MySqlDatabase::execute: {}", e);
            SiteDbError::from(e)
        })?;
        Ok(result.affected_rows())
    }

    fn query_rows(&mut self, sql: &str, params: &[SqlValue]) -> Result<Vec<JsonRow>, SiteDbError> {
        let sql = terminate_statement(sql).into_owned();
        let params = mysql_params(params);
        let conn = self.conn()?;
        debug!("query: {}", sql);
        let result = conn.exec_iter(sql.as_str(), params).map_err(|e| {
            error!("Error in MySqlDatabase::query: {}", e);
            SiteDbError::from(e)
        })?;

        let mut rows = Vec::new();
        for row in result {
            let row = row.map_err(|e| {
                error!("Error reading MySQL row: {}", e);
                SiteDbError::from(e)
            })?;
            rows.push(mysql_row_to_json(&row));
        }
        Ok(rows)
    }

    fn begin(&mut self) -> Result<(), SiteDbError> {
        let next = self.state.begin()?;
        self.control(DatabaseType::MySQL.begin_statement())?;
        self.state = next;
        Ok(())
    }

    fn commit(&mut self) -> Result<(), SiteDbError> {
        let next = self.state.finish()?;
        let result = self.control("COMMIT");
        self.state = next;
        result
    }

    fn rollback(&mut self) -> Result<(), SiteDbError> {
        let next = self.state.finish()?;
        let result = self.control("ROLLBACK");
        self.state = next;
        result
    }
}

impl fmt::Display for MySqlDatabase {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(&describe(DatabaseType::MySQL, &self.config))
    }
}
