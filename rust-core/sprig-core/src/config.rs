//! # Configuration
//!
//! Server and database settings, plus the `env()` helper for reading
//! loosely-typed environment values.

use crate::error::{Error, Result};
use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;

/// HTTP Server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address to bind the server to
    pub address: SocketAddr,
    /// Enable keep-alive connections
    pub keep_alive: bool,
    /// Shutdown timeout for graceful shutdown (default: 30 seconds)
    pub shutdown_timeout: Duration,
    /// Max request body size in bytes
    pub max_body_size: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            address: ([127, 0, 0, 1], 8000).into(),
            keep_alive: true,
            shutdown_timeout: Duration::from_secs(30),
            max_body_size: 1024 * 1024,
        }
    }
}

impl ServerConfig {
    /// Set the bind address
    #[must_use]
    pub const fn with_address(mut self, address: SocketAddr) -> Self {
        self.address = address;
        self
    }

    /// Enable or disable keep-alive
    #[must_use]
    pub const fn with_keep_alive(mut self, keep_alive: bool) -> Self {
        self.keep_alive = keep_alive;
        self
    }

    /// Set how long shutdown waits for in-flight connections
    #[must_use]
    pub const fn with_shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.shutdown_timeout = timeout;
        self
    }

    /// Set the request body limit
    #[must_use]
    pub const fn with_max_body_size(mut self, bytes: usize) -> Self {
        self.max_body_size = bytes;
        self
    }
}

/// Supported database drivers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Driver {
    /// SQLite
    Sqlite,
    /// PostgreSQL
    Postgres,
}

impl Driver {
    /// Infer the driver from a connection URL scheme
    ///
    /// # Errors
    ///
    /// Returns `Error::Database` for an unknown scheme.
    pub fn from_url(url: &str) -> Result<Self> {
        let scheme = url.split(':').next().unwrap_or_default();
        match scheme.to_ascii_lowercase().as_str() {
            "sqlite" => Ok(Self::Sqlite),
            "postgres" | "postgresql" => Ok(Self::Postgres),
            _ => Err(Error::Database {
                message: format!("Unsupported database URL scheme '{scheme}'"),
            }),
        }
    }
}

/// Database connection settings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatabaseConfig {
    /// Backend driver
    pub driver: Driver,
    /// Connection URL
    pub url: String,
    /// Pool size
    pub max_connections: u32,
}

impl DatabaseConfig {
    /// Build a config from a URL, inferring the driver
    ///
    /// # Errors
    ///
    /// Returns `Error::Database` for an unknown URL scheme.
    pub fn new(url: impl Into<String>) -> Result<Self> {
        let url = url.into();
        Ok(Self {
            driver: Driver::from_url(&url)?,
            url,
            max_connections: 10,
        })
    }

    /// Set the pool size
    #[must_use]
    pub const fn with_max_connections(mut self, max_connections: u32) -> Self {
        self.max_connections = max_connections;
        self
    }

    /// Read `DATABASE_URL` and `DATABASE_MAX_CONNECTIONS`
    ///
    /// # Errors
    ///
    /// Returns `Error::Database` if `DATABASE_URL` is unset or has an unknown
    /// scheme, or if the pool size is not a number.
    pub fn from_env() -> Result<Self> {
        let url = std::env::var("DATABASE_URL").map_err(|_| Error::Database {
            message: "DATABASE_URL is not set".to_string(),
        })?;
        let config = Self::new(url)?;

        match std::env::var("DATABASE_MAX_CONNECTIONS") {
            Ok(raw) => {
                let max = raw.trim().parse().map_err(|_| Error::Database {
                    message: format!("DATABASE_MAX_CONNECTIONS is not a number: {raw}"),
                })?;
                Ok(config.with_max_connections(max))
            }
            Err(_) => Ok(config),
        }
    }
}

/// A coerced environment value
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EnvValue {
    /// `true` / `(true)` or `false` / `(false)`
    Bool(bool),
    /// `null` / `(null)`
    Null,
    /// Any other text; `empty` / `(empty)` become the empty string
    Text(String),
}

impl EnvValue {
    /// Text form, `None` for `Null`
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            Self::Bool(true) => Some("true"),
            Self::Bool(false) => Some("false"),
            Self::Null => None,
        }
    }

    /// Parse the text form into any `FromStr` type
    #[must_use]
    pub fn parse<T: FromStr>(&self) -> Option<T> {
        self.as_str().and_then(|s| s.parse().ok())
    }
}

impl FromStr for EnvValue {
    type Err = std::convert::Infallible;

    fn from_str(raw: &str) -> std::result::Result<Self, Self::Err> {
        Ok(match raw.to_ascii_lowercase().as_str() {
            "true" | "(true)" => Self::Bool(true),
            "false" | "(false)" => Self::Bool(false),
            "null" | "(null)" => Self::Null,
            "empty" | "(empty)" => Self::Text(String::new()),
            _ => Self::Text(raw.to_string()),
        })
    }
}

/// Read and coerce an environment variable; `None` when unset
#[must_use]
pub fn env(key: &str) -> Option<EnvValue> {
    std::env::var(key).ok().and_then(|raw| raw.parse().ok())
}

/// Like [`env`], falling back to `default` when unset
#[must_use]
pub fn env_or(key: &str, default: EnvValue) -> EnvValue {
    env(key).unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_server_config_default() {
        let config = ServerConfig::default();
        assert_eq!(config.address.port(), 8000);
        assert!(config.keep_alive);
        assert_eq!(config.max_body_size, 1024 * 1024);
    }

    #[test]
    fn test_server_config_builders() {
        let config = ServerConfig::default()
            .with_address(([0, 0, 0, 0], 9000).into())
            .with_max_body_size(10);
        assert_eq!(config.address.port(), 9000);
        assert_eq!(config.max_body_size, 10);
    }

    #[test]
    fn test_driver_from_url() {
        assert_eq!(Driver::from_url("sqlite::memory:").unwrap(), Driver::Sqlite);
        assert_eq!(
            Driver::from_url("postgres://u@h/db").unwrap(),
            Driver::Postgres
        );
        assert_eq!(
            Driver::from_url("postgresql://u@h/db").unwrap(),
            Driver::Postgres
        );
        assert!(Driver::from_url("mysql://h/db").is_err());
    }

    #[test]
    fn test_database_config() {
        let config = DatabaseConfig::new("sqlite:app.db")
            .unwrap()
            .with_max_connections(3);
        assert_eq!(config.driver, Driver::Sqlite);
        assert_eq!(config.max_connections, 3);
    }

    #[test]
    fn test_env_value_coercions() {
        let parse = |s: &str| s.parse::<EnvValue>().unwrap();
        assert_eq!(parse("true"), EnvValue::Bool(true));
        assert_eq!(parse("(FALSE)"), EnvValue::Bool(false));
        assert_eq!(parse("null"), EnvValue::Null);
        assert_eq!(parse("(empty)"), EnvValue::Text(String::new()));
        assert_eq!(parse("Hello"), EnvValue::Text("Hello".into()));
        assert_eq!(parse("42").parse::<u32>(), Some(42));
        assert_eq!(EnvValue::Null.parse::<u32>(), None);
    }

    #[test]
    fn test_env_unset() {
        assert!(env("SPRIG_SURELY_UNSET_VARIABLE_1234").is_none());
        assert_eq!(
            env_or("SPRIG_SURELY_UNSET_VARIABLE_1234", EnvValue::Null),
            EnvValue::Null
        );
    }
}
