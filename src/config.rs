//! Configuration Module
//!
//! Handles loading and managing configuration from environment variables.

use std::env;

/// Service configuration parameters.
///
/// All values can be configured via environment variables with sensible defaults.
#[derive(Debug, Clone)]
pub struct Config {
    /// Connection URL of the durable store
    pub database_url: String,
    /// Eviction interval in seconds for reads that do not pass one
    pub default_evict_secs: u64,
    /// Flush interval in seconds for writes that do not pass one
    pub default_flush_secs: u64,
    /// Maximum number of payloads held by the in-memory cache store
    pub max_entries: usize,
    /// Number of failed durable writes kept for inspection
    pub failed_flush_capacity: usize,
    /// HTTP server port
    pub server_port: u16,
}

fn env_or<T: std::str::FromStr>(name: &str, default: T) -> T {
    env::var(name)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

impl Config {
    /// Creates a new Config by loading values from environment variables.
    ///
    /// # Environment Variables
    /// - `DATABASE_URL` - Durable store URL (default: sqlite::memory:)
    /// - `DEFAULT_EVICT_SECS` - Default eviction interval (default: 300)
    /// - `DEFAULT_FLUSH_SECS` - Default flush interval (default: 60)
    /// - `MAX_ENTRIES` - In-memory cache capacity (default: 10000)
    /// - `FAILED_FLUSH_CAPACITY` - Retained failed writes (default: 256)
    /// - `SERVER_PORT` - HTTP server port (default: 3000)
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            database_url: env::var("DATABASE_URL").unwrap_or(defaults.database_url),
            default_evict_secs: env_or("DEFAULT_EVICT_SECS", defaults.default_evict_secs),
            default_flush_secs: env_or("DEFAULT_FLUSH_SECS", defaults.default_flush_secs),
            max_entries: env_or("MAX_ENTRIES", defaults.max_entries),
            failed_flush_capacity: env_or("FAILED_FLUSH_CAPACITY", defaults.failed_flush_capacity),
            server_port: env_or("SERVER_PORT", defaults.server_port),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database_url: "sqlite::memory:".to_string(),
            default_evict_secs: 300,
            default_flush_secs: 60,
            max_entries: 10_000,
            failed_flush_capacity: 256,
            server_port: 3000,
        }
    }
}
