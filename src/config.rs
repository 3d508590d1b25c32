//! Configuration module
//!
//! Loads configuration from environment variables. Backoff and retry
//! values are deployment tuning, not part of the transfer contract.

use std::env;
use std::time::Duration;

use crate::worker::WorkerConfig;

/// Application configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Database connection URL
    pub database_url: String,

    /// Maximum database connections in pool
    pub database_max_connections: u32,

    /// Base delay before the first confirmation re-poll, in milliseconds
    pub confirm_backoff_base_ms: u64,

    /// Ceiling for the confirmation backoff schedule, in milliseconds
    pub confirm_backoff_max_ms: u64,

    /// Confirmation retries before a transfer is abandoned
    pub confirm_max_retries: u32,

    /// Environment (development, production)
    pub environment: String,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        let database_url =
            env::var("DATABASE_URL").map_err(|_| ConfigError::MissingEnv("DATABASE_URL"))?;

        let database_max_connections = env::var("DATABASE_MAX_CONNECTIONS")
            .unwrap_or_else(|_| "10".to_string())
            .parse()
            .map_err(|_| ConfigError::InvalidValue("DATABASE_MAX_CONNECTIONS"))?;

        let confirm_backoff_base_ms = env::var("CONFIRM_BACKOFF_BASE_MS")
            .unwrap_or_else(|_| "5000".to_string())
            .parse()
            .map_err(|_| ConfigError::InvalidValue("CONFIRM_BACKOFF_BASE_MS"))?;

        let confirm_backoff_max_ms = env::var("CONFIRM_BACKOFF_MAX_MS")
            .unwrap_or_else(|_| "300000".to_string())
            .parse()
            .map_err(|_| ConfigError::InvalidValue("CONFIRM_BACKOFF_MAX_MS"))?;

        let confirm_max_retries = env::var("CONFIRM_MAX_RETRIES")
            .unwrap_or_else(|_| "10".to_string())
            .parse()
            .map_err(|_| ConfigError::InvalidValue("CONFIRM_MAX_RETRIES"))?;

        let environment = env::var("ENVIRONMENT").unwrap_or_else(|_| "development".to_string());

        Ok(Self {
            database_url,
            database_max_connections,
            confirm_backoff_base_ms,
            confirm_backoff_max_ms,
            confirm_max_retries,
            environment,
        })
    }

    /// Check if running in production
    pub fn is_production(&self) -> bool {
        self.environment == "production"
    }

    /// Confirmation worker tuning derived from this configuration
    pub fn worker_config(&self) -> WorkerConfig {
        WorkerConfig {
            backoff_base: Duration::from_millis(self.confirm_backoff_base_ms),
            backoff_max: Duration::from_millis(self.confirm_backoff_max_ms),
            max_retries: self.confirm_max_retries,
        }
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
