//! Configuration module for Rustsignal.
//!
//! This module provides structured configuration loading from environment variables,
//! organized by concern: candle store, model artifacts and observability.

mod data_config;
mod model_config;
mod observability_config;

pub use data_config::DataEnvConfig;
pub use model_config::{ModelEnvConfig, SignalBackend};
pub use observability_config::ObservabilityEnvConfig;

use anyhow::Result;
use std::env;

/// Main application configuration.
#[derive(Debug, Clone)]
pub struct Config {
    pub data: DataEnvConfig,
    pub model: ModelEnvConfig,
    pub observability: ObservabilityEnvConfig,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(&|key| env::var(key).ok())
    }

    /// Build the configuration from any key/value source.
    pub fn from_lookup(lookup: &impl Fn(&str) -> Option<String>) -> Result<Self> {
        Ok(Self {
            data: DataEnvConfig::from_lookup(lookup)?,
            model: ModelEnvConfig::from_lookup(lookup)?,
            observability: ObservabilityEnvConfig::from_lookup(lookup),
        })
    }
}
