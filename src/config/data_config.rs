//! Candle store configuration parsing from environment variables.

use anyhow::{Context, Result};

pub const DEFAULT_DATABASE_URL: &str = "sqlite://./database.sqlite";
pub const DEFAULT_CANDLE_LIMIT: usize = 50;

/// Candle store environment configuration
#[derive(Debug, Clone)]
pub struct DataEnvConfig {
    pub database_url: String,
    /// Number of most recent bars fetched per invocation
    pub candle_limit: usize,
}

impl Default for DataEnvConfig {
    fn default() -> Self {
        Self {
            database_url: DEFAULT_DATABASE_URL.to_string(),
            candle_limit: DEFAULT_CANDLE_LIMIT,
        }
    }
}

impl DataEnvConfig {
    pub fn from_lookup(lookup: &impl Fn(&str) -> Option<String>) -> Result<Self> {
        let candle_limit = match lookup("CANDLE_LIMIT") {
            Some(raw) => raw
                .parse::<usize>()
                .with_context(|| format!("Failed to parse CANDLE_LIMIT: {}", raw))?,
            None => DEFAULT_CANDLE_LIMIT,
        };
        if candle_limit == 0 {
            anyhow::bail!("CANDLE_LIMIT must be greater than zero");
        }

        Ok(Self {
            database_url: lookup("DATABASE_URL").unwrap_or_else(|| DEFAULT_DATABASE_URL.to_string()),
            candle_limit,
        })
    }
}
