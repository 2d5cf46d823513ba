//! Application configuration loaded from environment variables.
//!
//! A `.env` file is honoured for local development.

use std::env;
use std::time::Duration;

/// Default presence window: a device is offline after 10 minutes of silence.
pub const DEFAULT_OFFLINE_TIMEOUT_SECS: u64 = 10 * 60;

/// Default per-device command queue cap.
pub const DEFAULT_COMMAND_QUEUE_CAPACITY: usize = 50;

/// Default idle time after which presence/alert state is evicted (7 days).
pub const DEFAULT_PRESENCE_EVICT_SECS: u64 = 7 * 24 * 60 * 60;

/// Database used when `DATABASE_URL` is unset.
pub const DEFAULT_DATABASE_URL: &str = "sqlite:feeder-sync.db";

/// Application configuration, loaded once at startup.
#[derive(Debug, Clone)]
pub struct Config {
    /// Dashboard URL allowed by CORS
    pub frontend_url: String,
    /// Server port
    pub port: u16,
    /// JWT signing key for session tokens (raw bytes)
    pub jwt_signing_key: Vec<u8>,
    /// Presence staleness window
    pub offline_timeout: Duration,
    /// Max pending commands per device (oldest dropped on overflow)
    pub command_queue_capacity: usize,
    /// Idle time before ephemeral per-device state is evicted
    pub presence_evict_after: Duration,
    /// SQLite database URL, e.g. `sqlite:feeder-sync.db`
    pub database_url: String,
    /// Optional JSON file of users and pets to load at startup
    pub seed_file: Option<String>,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok(); // Load .env file if present

        Ok(Self {
            frontend_url: env::var("FRONTEND_URL")
                .unwrap_or_else(|_| "http://localhost:5173".to_string()),
            port: parse_or("PORT", 8080)?,
            jwt_signing_key: env::var("JWT_SIGNING_KEY")
                .map_err(|_| ConfigError::Missing("JWT_SIGNING_KEY"))?
                .into_bytes(),
            offline_timeout: Duration::from_secs(parse_or(
                "OFFLINE_TIMEOUT_SECS",
                DEFAULT_OFFLINE_TIMEOUT_SECS,
            )?),
            command_queue_capacity: parse_or(
                "COMMAND_QUEUE_CAPACITY",
                DEFAULT_COMMAND_QUEUE_CAPACITY,
            )?,
            presence_evict_after: Duration::from_secs(parse_or(
                "PRESENCE_EVICT_SECS",
                DEFAULT_PRESENCE_EVICT_SECS,
            )?),
            database_url: env::var("DATABASE_URL")
                .unwrap_or_else(|_| DEFAULT_DATABASE_URL.to_string()),
            seed_file: env::var("SEED_FILE").ok().filter(|s| !s.trim().is_empty()),
        })
    }

    /// Default config for testing only.
    pub fn test_default() -> Self {
        Self {
            frontend_url: "http://localhost:5173".to_string(),
            port: 8080,
            jwt_signing_key: b"test_jwt_key_32_bytes_minimum!!".to_vec(),
            offline_timeout: Duration::from_secs(DEFAULT_OFFLINE_TIMEOUT_SECS),
            command_queue_capacity: DEFAULT_COMMAND_QUEUE_CAPACITY,
            presence_evict_after: Duration::from_secs(DEFAULT_PRESENCE_EVICT_SECS),
            database_url: "sqlite::memory:".to_string(),
            seed_file: None,
        }
    }
}

/// Parse an optional numeric variable, falling back to `default` when unset.
fn parse_or<T: std::str::FromStr>(name: &'static str, default: T) -> Result<T, ConfigError> {
    match env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map_err(|_| ConfigError::Invalid(name, raw)),
        Err(_) => Ok(default),
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    Missing(&'static str),

    #[error("Invalid value for {0}: {1:?}")]
    Invalid(&'static str, String),
}
