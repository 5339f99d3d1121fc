//! Model artifact configuration parsing from environment variables.

use crate::domain::types::Pair;
use anyhow::{Context, Result};
use std::path::PathBuf;
use std::str::FromStr;

/// Where signals come from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignalBackend {
    /// Run the exported network against live features
    Model,
    /// Weighted random placeholder, never used unless asked for explicitly
    Stub,
}

impl FromStr for SignalBackend {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "model" => Ok(SignalBackend::Model),
            "stub" => Ok(SignalBackend::Stub),
            _ => anyhow::bail!("Invalid SIGNAL_BACKEND: {}. Must be 'model' or 'stub'", s),
        }
    }
}

/// Model environment configuration
#[derive(Debug, Clone)]
pub struct ModelEnvConfig {
    pub models_dir: PathBuf,
    pub model_file: String,
    pub cutoffs_file: String,
    pub default_model: String,
    pub default_pair: Pair,
    pub backend: SignalBackend,
}

impl ModelEnvConfig {
    pub fn from_lookup(lookup: &impl Fn(&str) -> Option<String>) -> Result<Self> {
        let default_pair = lookup("PAIR")
            .unwrap_or_else(|| "BTCUSDT".to_string())
            .parse::<Pair>()
            .context("Failed to parse PAIR")?;

        let backend = lookup("SIGNAL_BACKEND")
            .unwrap_or_else(|| "model".to_string())
            .parse::<SignalBackend>()?;

        Ok(Self {
            models_dir: PathBuf::from(
                lookup("MODELS_DIR").unwrap_or_else(|| "./models/generated".to_string()),
            ),
            model_file: lookup("MODEL_FILE").unwrap_or_else(|| "model.onnx".to_string()),
            cutoffs_file: lookup("CUTOFFS_FILE").unwrap_or_else(|| "cutoffs.pickle".to_string()),
            default_model: lookup("MODEL_NAME").unwrap_or_else(|| "neural_net_model".to_string()),
            default_pair,
            backend,
        })
    }
}
