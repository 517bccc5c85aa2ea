use std::str::FromStr;

use chrono_tz::Tz;
use log::{debug, info};
use serde::{Serialize, Serializer};

use crate::connection::DatabaseType;
use crate::error::SiteDbError;

pub const DEFAULT_CONNECTION_LIMIT: usize = 10;
pub const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 10;
/// `en-GB` date and time layout used when rendering server time.
pub const DEFAULT_LOCALE_FORMAT: &str = "%d/%m/%Y %H:%M:%S";

/// Connection settings shared by both backends.
///
/// Construction never touches the network; the wrappers only read this
/// when `connect()` is called.
#[derive(Debug, Clone, Serialize)]
pub struct DbConfig {
    pub host: String,
    pub port: u16,
    pub user: String,
    #[serde(skip_serializing)]
    pub password: Option<String>,
    pub database: Option<String>,
    /// Upper bound on pooled connections; applied to the MySQL pool and the
    /// pooled Postgres mode.
    pub connection_limit: usize,
    pub connect_timeout_secs: u64,
    #[serde(serialize_with = "serialize_tz")]
    pub display_timezone: Tz,
    pub locale_format: String,
}

fn serialize_tz<S: Serializer>(tz: &Tz, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(tz.name())
}

impl DbConfig {
    /// Creates a config for `host` with the backend's default port.
    pub fn new(db_type: DatabaseType, host: &str, user: &str) -> Self {
        DbConfig {
            host: host.to_string(),
            port: db_type.default_port(),
            user: user.to_string(),
            password: None,
            database: None,
            connection_limit: DEFAULT_CONNECTION_LIMIT,
            connect_timeout_secs: DEFAULT_CONNECT_TIMEOUT_SECS,
            display_timezone: Tz::UTC,
            locale_format: DEFAULT_LOCALE_FORMAT.to_string(),
        }
    }

    pub fn with_password(mut self, password: &str) -> Self {
        self.password = Some(password.to_string());
        self
    }

    pub fn with_database(mut self, database: &str) -> Self {
        self.database = Some(database.to_string());
        self
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn with_connection_limit(mut self, limit: usize) -> Self {
        self.connection_limit = limit;
        self
    }

    pub fn with_timezone(mut self, tz: Tz) -> Self {
        self.display_timezone = tz;
        self
    }

    /// Reads `<PREFIX>_HOST`, `<PREFIX>_PORT`, `<PREFIX>_USER`,
    /// `<PREFIX>_PASSWORD`, `<PREFIX>_DATABASE`, `<PREFIX>_CONNECTION_LIMIT`
    /// and `<PREFIX>_TIMEZONE` from the process environment.
    pub fn from_env(db_type: DatabaseType, prefix: &str) -> Result<Self, SiteDbError> {
        Self::from_lookup(db_type, prefix, |key| std::env::var(key).ok())
    }

    /// Same as [`DbConfig::from_env`] with an injectable variable source.
    pub fn from_lookup<F>(db_type: DatabaseType, prefix: &str, lookup: F) -> Result<Self, SiteDbError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| {
            lookup(&format!("{}_{}", prefix, name)).filter(|value| !value.trim().is_empty())
        };

        let host = var("HOST").ok_or_else(|| {
            SiteDbError::ConfigError(format!("{}_HOST is not set", prefix))
        })?;
        let user = var("USER").ok_or_else(|| {
            SiteDbError::ConfigError(format!("{}_USER is not set", prefix))
        })?;

        let mut config = DbConfig::new(db_type, &host, &user);
        config.password = var("PASSWORD");
        config.database = var("DATABASE");

        if let Some(port) = var("PORT") {
            config.port = parse_var(prefix, "PORT", &port)?;
        }
        if let Some(limit) = var("CONNECTION_LIMIT") {
            config.connection_limit = parse_var(prefix, "CONNECTION_LIMIT", &limit)?;
        }
        if let Some(tz) = var("TIMEZONE") {
            config.display_timezone = tz.parse::<Tz>().map_err(|e| {
                SiteDbError::ConfigError(format!("{}_TIMEZONE: {}", prefix, e))
            })?;
        }

        debug!("Loaded {} config for {}:{}", prefix, config.host, config.port);
        Ok(config)
    }
}

fn parse_var<T: FromStr>(prefix: &str, name: &str, raw: &str) -> Result<T, SiteDbError>
where
    T::Err: std::fmt::Display,
{
    raw.trim().parse::<T>().map_err(|e| {
        SiteDbError::ConfigError(format!("{}_{} = {:?}: {}", prefix, name, raw, e))
    })
}

/// Loads a `.env` file from the working directory, if there is one.
///
/// Variables that are already set are not overwritten.
pub fn load_dotenv() {
    match dotenvy::dotenv() {
        Ok(path) => info!("Loaded environment from {}", path.display()),
        Err(e) => debug!("No .env file loaded: {}", e),
    }
}
