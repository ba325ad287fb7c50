//! Configuration module
//!
//! Loads configuration from environment variables.

use std::env;
use std::str::FromStr;
use std::time::Duration;

/// Where ledger rows live
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreBackend {
    Postgres,
    Memory,
}

impl FromStr for StoreBackend {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "postgres" | "postgresql" => Ok(StoreBackend::Postgres),
            "memory" | "in-memory" => Ok(StoreBackend::Memory),
            _ => Err(ConfigError::InvalidValue("STORE_BACKEND")),
        }
    }
}

/// Log output format
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Pretty,
    Json,
}

impl FromStr for LogFormat {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "pretty" | "text" => Ok(LogFormat::Pretty),
            "json" => Ok(LogFormat::Json),
            _ => Err(ConfigError::InvalidValue("LOG_FORMAT")),
        }
    }
}

/// Application configuration
#[derive(Debug, Clone)]
pub struct Config {
    pub store_backend: StoreBackend,

    /// Database connection URL (required for the postgres backend)
    pub database_url: Option<String>,

    /// Maximum database connections in pool
    pub database_max_connections: u32,

    /// Server host
    pub host: String,

    /// Server port
    pub port: u16,

    /// Environment (development, production)
    pub environment: String,

    pub log_format: LogFormat,

    /// How long a settlement waits for the unit lock
    pub settlement_lock_timeout: Duration,

    /// How long a settlement quote stays confirmable
    pub settlement_quote_ttl: Duration,

    pub fee_cache_ttl_secs: u64,
    pub fee_cache_capacity: u64,

    pub outbox_poll_interval: Duration,
    pub outbox_batch_size: i64,
    pub outbox_max_attempts: i32,
    /// Claims older than this are returned to the queue
    pub outbox_stale_after: Duration,

    /// Optional JSON file replacing the built-in posting rules
    pub posting_rules_path: Option<String>,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        let store_backend: StoreBackend = env::var("STORE_BACKEND")
            .unwrap_or_else(|_| "postgres".to_string())
            .parse()?;

        let database_url = env::var("DATABASE_URL").ok().filter(|s| !s.trim().is_empty());
        if store_backend == StoreBackend::Postgres && database_url.is_none() {
            return Err(ConfigError::MissingEnv("DATABASE_URL"));
        }

        let log_format: LogFormat = env::var("LOG_FORMAT")
            .unwrap_or_else(|_| "pretty".to_string())
            .parse()?;

        Ok(Self {
            store_backend,
            database_url,
            database_max_connections: parse_env("DATABASE_MAX_CONNECTIONS", 10)?,
            host: env::var("HOST").unwrap_or_else(|_| "127.0.0.1".to_string()),
            port: parse_env("PORT", 3000)?,
            environment: env::var("ENVIRONMENT").unwrap_or_else(|_| "development".to_string()),
            log_format,
            settlement_lock_timeout: Duration::from_millis(parse_env(
                "SETTLEMENT_LOCK_TIMEOUT_MS",
                5000,
            )?),
            settlement_quote_ttl: Duration::from_secs(parse_env("SETTLEMENT_QUOTE_TTL_SECS", 300)?),
            fee_cache_ttl_secs: parse_env("FEE_CACHE_TTL_SECS", 60)?,
            fee_cache_capacity: parse_env("FEE_CACHE_CAPACITY", 1000)?,
            outbox_poll_interval: Duration::from_secs(parse_env("OUTBOX_POLL_INTERVAL_SECS", 5)?),
            outbox_batch_size: parse_env("OUTBOX_BATCH_SIZE", 50)?,
            outbox_max_attempts: parse_env("OUTBOX_MAX_ATTEMPTS", 5)?,
            outbox_stale_after: Duration::from_secs(parse_env("OUTBOX_STALE_AFTER_SECS", 300)?),
            posting_rules_path: env::var("POSTING_RULES_PATH")
                .ok()
                .filter(|s| !s.trim().is_empty()),
        })
    }

    /// Defaults for the in-memory backend, used by tests and local tooling.
    pub fn in_memory() -> Self {
        Self {
            store_backend: StoreBackend::Memory,
            database_url: None,
            database_max_connections: 10,
            host: "127.0.0.1".to_string(),
            port: 3000,
            environment: "development".to_string(),
            log_format: LogFormat::Pretty,
            settlement_lock_timeout: Duration::from_millis(5000),
            settlement_quote_ttl: Duration::from_secs(300),
            fee_cache_ttl_secs: 60,
            fee_cache_capacity: 1000,
            outbox_poll_interval: Duration::from_secs(5),
            outbox_batch_size: 50,
            outbox_max_attempts: 5,
            outbox_stale_after: Duration::from_secs(300),
            posting_rules_path: None,
        }
    }

    /// Check if running in production
    pub fn is_production(&self) -> bool {
        self.environment == "production"
    }
}

fn parse_env<T: FromStr>(name: &'static str, default: T) -> Result<T, ConfigError> {
    match env::var(name) {
        Ok(value) => value.trim().parse().map_err(|_| ConfigError::InvalidValue(name)),
        Err(_) => Ok(default),
    }
}

/// Configuration error types
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingEnv(&'static str),

    #[error("Invalid value for environment variable: {0}")]
    InvalidValue(&'static str),
}
