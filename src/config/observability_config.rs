//! Observability configuration parsing from environment variables.
//!
//! This module handles log verbosity, including the verbosity of the
//! inference runtime.

/// Observability environment configuration
#[derive(Debug, Clone)]
pub struct ObservabilityEnvConfig {
    pub log_level: String,
    pub inference_log_level: String,
}

impl Default for ObservabilityEnvConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            inference_log_level: "error".to_string(),
        }
    }
}

impl ObservabilityEnvConfig {
    pub fn from_lookup(lookup: &impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        Self {
            log_level: lookup("LOG_LEVEL").unwrap_or(defaults.log_level),
            inference_log_level: lookup("INFERENCE_LOG_LEVEL")
                .unwrap_or(defaults.inference_log_level),
        }
    }
}
