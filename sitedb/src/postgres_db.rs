use std::fmt;
use std::time::Duration;

use log::{debug, error, info};
use tokio::runtime::Runtime;
use tokio_postgres::NoTls;

use crate::config::DbConfig;
use crate::connection::{describe, Database, DatabaseType};
use crate::error::SiteDbError;
use crate::rows::{pg_row_to_json, terminate_statement, JsonRow};
use crate::state::ConnectionState;
use crate::value::{pg_params, SqlValue};

/// The connection statements run on.
enum PgClient {
    Single(tokio_postgres::Client),
    /// A connection checked out of `pool` and held until disconnect, so that
    /// `BEGIN` and `COMMIT` reach the same session.
    Pooled {
        conn: deadpool_postgres::Object,
        pool: deadpool_postgres::Pool,
    },
}

impl PgClient {
    fn client(&self) -> &tokio_postgres::Client {
        match self {
            PgClient::Single(client) => client,
            PgClient::Pooled { conn, .. } => &***conn,
        }
    }
}

/// Live client plus the runtime that drives its connection tasks.
struct PgSession {
    client: PgClient,
    runtime: Runtime,
}

impl PgSession {
    /// Releases the connection (closing the pool in pooled mode), then stops
    /// the runtime. `wait` bounds the shutdown instead of detaching it.
    fn close(self, wait: bool) {
        let PgSession { client, runtime } = self;
        match client {
            PgClient::Single(client) => drop(client),
            PgClient::Pooled { conn, pool } => {
                drop(conn);
                pool.close();
            }
        }
        if wait {
            runtime.shutdown_timeout(Duration::from_secs(1));
        } else {
            runtime.shutdown_background();
        }
    }
}

/// PostgreSQL wrapper around a `tokio_postgres` client, either a dedicated
/// connection or one taken from a `deadpool_postgres` pool.
///
/// The wrapper exposes a blocking API; each instance owns a dedicated Tokio
/// runtime, created on `connect()` and dropped on `disconnect()`.
pub struct PostgresDatabase {
    config: DbConfig,
    pooled: bool,
    session: Option<PgSession>,
    state: ConnectionState,
}

impl PostgresDatabase {
    /// Creates the wrapper. No connection is made until [`Database::connect`].
    pub fn new(config: DbConfig) -> Self {
        PostgresDatabase {
            config,
            pooled: false,
            session: None,
            state: ConnectionState::Disconnected,
        }
    }

    /// Like [`PostgresDatabase::new`], but `connect()` builds a pool of up to
    /// `connection_limit` connections and pins one of them.
    pub fn pooled(config: DbConfig) -> Self {
        PostgresDatabase {
            config,
            pooled: true,
            session: None,
            state: ConnectionState::Disconnected,
        }
    }

    pub fn is_pooled(&self) -> bool {
        self.pooled
    }

    fn pg_config(&self) -> tokio_postgres::Config {
        let mut pg_config = tokio_postgres::Config::new();
        pg_config
            .host(&self.config.host)
            .port(self.config.port)
            .user(&self.config.user)
            .connect_timeout(Duration::from_secs(self.config.connect_timeout_secs));
        if let Some(password) = &self.config.password {
            pg_config.password(password);
        }
        if let Some(database) = &self.config.database {
            pg_config.dbname(database);
        }
        pg_config
    }

    fn open_session(&self) -> Result<PgSession, SiteDbError> {
        // Create a dedicated Tokio runtime for blocking async operations
        let runtime = Runtime::new().map_err(|e| {
            SiteDbError::ConnectionError(format!("Failed to create Tokio runtime: {}", e))
        })?;

        let client = if self.pooled {
            self.open_pooled(&runtime)?
        } else {
            self.open_single(&runtime)?
        };

        runtime
            .block_on(async { client.client().batch_execute("SET TIME ZONE 'UTC';").await })
            .map_err(|e| SiteDbError::ConnectionError(format!("Failed to set session time zone: {}", e)))?;

        Ok(PgSession { client, runtime })
    }

    fn open_single(&self, runtime: &Runtime) -> Result<PgClient, SiteDbError> {
        let pg_config = self.pg_config();
        let (client, connection) = runtime
            .block_on(async { pg_config.connect(NoTls).await })
            .map_err(|e| SiteDbError::ConnectionError(format!("Failed to connect to PostgreSQL: {}", e)))?;

        // Drive the connection in the background and surface its failure
        runtime.spawn(async move {
            if let Err(e) = connection.await {
                error!("PostgreSQL connection error: {}", e);
            }
        });

        Ok(PgClient::Single(client))
    }

    fn open_pooled(&self, runtime: &Runtime) -> Result<PgClient, SiteDbError> {
        let manager = deadpool_postgres::Manager::new(self.pg_config(), NoTls);
        let pool = deadpool_postgres::Pool::builder(manager)
            .max_size(self.config.connection_limit.max(1))
            .build()
            .map_err(|e| SiteDbError::ConnectionError(format!("Failed to create PostgreSQL pool: {}", e)))?;

        // The manager spawns each connection task on the current runtime
        let conn = runtime
            .block_on(pool.get())
            .map_err(|e| SiteDbError::ConnectionError(format!("Failed to connect to PostgreSQL: {}", e)))?;

        debug!("Checked out pooled connection ({} max)", pool.status().max_size);
        Ok(PgClient::Pooled { conn, pool })
    }

    fn session(&self) -> Result<&PgSession, SiteDbError> {
        self.state.require_connected()?;
        self.session.as_ref().ok_or(SiteDbError::NotConnected)
    }

    /// Runs a transaction-control statement.
    fn control(&mut self, statement: &str) -> Result<(), SiteDbError> {
        let session = self.session()?;
        session
            .runtime
            .block_on(async { session.client.client().batch_execute(&terminate_statement(statement)).await })
            .map_err(|e| {
                error!("{} failed: {}", statement, e);
                SiteDbError::TransactionError(format!("{} failed: {}", statement, e))
            })
    }
}

impl Database for PostgresDatabase {
    fn database_type(&self) -> DatabaseType {
        DatabaseType::PostgreSQL
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
        match self.open_session() {
            Ok(session) => {
                self.session = Some(session);
                self.state = ConnectionState::Connected;
                info!(
                    "Connected to Postgres at {}:{}{}",
                    self.config.host,
                    self.config.port,
                    if self.pooled { " (pooled)" } else { "" }
                );
                Ok(())
            }
            Err(e) => {
                error!("Could not connect to Postgres: {}", e);
                Err(e)
            }
        }
    }

    fn disconnect(&mut self) -> Result<(), SiteDbError> {
        if !self.state.needs_disconnect()? {
            return Ok(());
        }
        if let Some(session) = self.session.take() {
            session.close(true);
        }
        self.state = ConnectionState::Disconnected;
        info!("Disconnected from Postgres");
        Ok(())
    }

    fn execute(&mut self, sql: &str, params: &[SqlValue]) -> Result<u64, SiteDbError> {
        let session = self.session()?;
        let sql = terminate_statement(sql);
        debug!("execute: {}", sql);
        let params = pg_params(params);
        session
            .runtime
            .block_on(async { session.client.client().execute(&*sql, &params).await })
            .map_err(|e| {
                error!("Error in PostgresDatabase::execute: {}", e);
                SiteDbError::from(e)
            })
    }

    fn query_rows(&mut self, sql: &str, params: &[SqlValue]) -> Result<Vec<JsonRow>, SiteDbError> {
        let session = self.session()?;
        let sql = terminate_statement(sql);
        debug!("query: {}", sql);
        let params = pg_params(params);
        let rows = session
            .runtime
            .block_on(async { session.client.client().query(&*sql, &params).await })
            .map_err(|e| {
                error!("Error in PostgresDatabase::query: {}", e);
                SiteDbError::from(e)
            })?;
        rows.iter().map(pg_row_to_json).collect()
    }

    fn begin(&mut self) -> Result<(), SiteDbError> {
        let next = self.state.begin()?;
        self.control(DatabaseType::PostgreSQL.begin_statement())?;
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

impl Drop for PostgresDatabase {
    fn drop(&mut self) {
        if let Some(session) = self.session.take() {
            session.close(false);
        }
    }
}

impl fmt::Display for PostgresDatabase {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(&describe(DatabaseType::PostgreSQL, &self.config))
    }
}
