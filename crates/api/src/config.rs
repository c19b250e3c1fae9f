//! Configuration loaded from environment variables.

use std::env;
use std::net::SocketAddr;

use crate::request_log::{DEFAULT_CAPACITY, DEFAULT_MAX_USERS};

/// API server configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Server bind address.
    pub addr: SocketAddr,
    /// SQLite database URL.
    pub database_url: String,
    /// Key used to seal integration credentials at rest.
    pub credentials_key: String,
    /// Push gateway base URL. Pushes are only logged when unset.
    pub push_gateway_url: Option<String>,
    /// Requests kept per user for `/api/requests/recent`.
    pub request_log_capacity: usize,
    /// Users whose requests are kept at once.
    pub request_log_users: usize,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// | Variable | Description | Default |
    /// |----------|-------------|---------|
    /// | `BEACON_ADDR` | Server bind address | `127.0.0.1:8790` |
    /// | `DATABASE_URL` | SQLite database URL | `sqlite:beacon.db?mode=rwc` |
    /// | `CREDENTIALS_KEY` | 32-byte key, hex or base64 | (required) |
    /// | `PUSH_GATEWAY_URL` | Push gateway base URL | (none) |
    /// | `REQUEST_LOG_CAPACITY` | Captured requests per user | `100` |
    /// | `REQUEST_LOG_USERS` | Users tracked by the request log | `1000` |
    pub fn from_env() -> Result<Self, ConfigError> {
        let addr = env::var("BEACON_ADDR")
            .unwrap_or_else(|_| "127.0.0.1:8790".to_string())
            .parse()
            .map_err(|_| ConfigError::InvalidAddr)?;

        let database_url = env::var("DATABASE_URL")
            .unwrap_or_else(|_| "sqlite:beacon.db?mode=rwc".to_string());

        let credentials_key = env::var("CREDENTIALS_KEY")
            .ok()
            .filter(|value| !value.trim().is_empty())
            .ok_or(ConfigError::MissingCredentialsKey)?;

        let push_gateway_url = env::var("PUSH_GATEWAY_URL")
            .ok()
            .filter(|value| !value.trim().is_empty());

        let request_log_capacity = positive_var("REQUEST_LOG_CAPACITY", DEFAULT_CAPACITY)?;
        let request_log_users = positive_var("REQUEST_LOG_USERS", DEFAULT_MAX_USERS)?;

        Ok(Self {
            addr,
            database_url,
            credentials_key,
            push_gateway_url,
            request_log_capacity,
            request_log_users,
        })
    }
}

fn positive_var(name: &'static str, default: usize) -> Result<usize, ConfigError> {
    match env::var(name) {
        Ok(value) => value
            .parse::<usize>()
            .ok()
            .filter(|n| *n > 0)
            .ok_or(ConfigError::NotPositive { name, value }),
        Err(_) => Ok(default),
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid BEACON_ADDR format")]
    InvalidAddr,

    #[error("CREDENTIALS_KEY environment variable is required")]
    MissingCredentialsKey,

    #[error("{name} must be a positive integer, got {value:?}")]
    NotPositive { name: &'static str, value: String },
}
