use std::env;
use std::str::FromStr;

use tracing::info;

use crate::error::{Result, StatisticsError};

/// Application configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    // Solr
    pub solr_server: String,
    pub solr_timeout_secs: u64,

    // Postgres
    pub database_name: String,
    pub database_user: String,
    pub database_pass: String,
    pub database_host: String,
    pub database_port: u16,
    pub database_max_connections: u32,
    pub database_acquire_timeout_secs: u64,

    // Web server
    pub api_host: String,
    pub api_port: u16,
    /// Public prefix for API links on the landing page, e.g. `/rest/statistics`.
    pub api_base_url: String,
}

impl Config {
    /// Load the configuration shared by the API and the indexer.
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            solr_server: env_or("SOLR_SERVER", "http://localhost:8080/solr"),
            solr_timeout_secs: parse_env("SOLR_TIMEOUT_SECS", 120)?,
            database_name: env_or("DATABASE_NAME", "dspacestatistics"),
            database_user: env_or("DATABASE_USER", "dspacestatistics"),
            database_pass: env_or("DATABASE_PASS", "dspacestatistics"),
            database_host: env_or("DATABASE_HOST", "localhost"),
            database_port: parse_env("DATABASE_PORT", 5432)?,
            database_max_connections: parse_env("DATABASE_MAX_CONNECTIONS", 5)?,
            database_acquire_timeout_secs: parse_env("DATABASE_ACQUIRE_TIMEOUT_SECS", 30)?,
            api_host: env_or("API_HOST", "0.0.0.0"),
            api_port: parse_env("API_PORT", 8000)?,
            api_base_url: env_or("DSPACE_STATISTICS_API_URL", ""),
        })
    }

    /// The indexer is a single sequential writer and never needs more than one connection.
    pub fn indexer_from_env() -> Result<Self> {
        let mut config = Self::from_env()?;
        config.database_max_connections = 1;
        Ok(config)
    }

    /// Log the configuration without credentials.
    pub fn log_redacted(&self) {
        info!(
            solr_server = self.solr_server.as_str(),
            solr_timeout_secs = self.solr_timeout_secs,
            database = self.database_name.as_str(),
            database_user = self.database_user.as_str(),
            database_host = self.database_host.as_str(),
            database_port = self.database_port,
            max_connections = self.database_max_connections,
            "Loaded configuration"
        );
    }
}

fn env_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

fn parse_env<T: FromStr>(key: &str, default: T) -> Result<T> {
    match env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map_err(|_| StatisticsError::Config(format!("{key} must be a number, got {raw:?}"))),
        Err(_) => Ok(default),
    }
}
