use crate::config::ObservabilityEnvConfig;
use anyhow::{Context, Result};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::filter::Directive;
use tracing_subscriber::prelude::*;

/// Build the log filter from configuration.
///
/// `RUST_LOG` wins when set; otherwise `log_level` is the base directive.
/// The inference runtime gets its own directive so its verbosity is tuned
/// here instead of through global state.
pub fn build_env_filter(config: &ObservabilityEnvConfig) -> Result<EnvFilter> {
    let base = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.log_level))
        .with_context(|| format!("Invalid LOG_LEVEL: {}", config.log_level))?;

    let inference = format!("ort={}", config.inference_log_level)
        .parse::<Directive>()
        .with_context(|| {
            format!(
                "Invalid INFERENCE_LOG_LEVEL: {}",
                config.inference_log_level
            )
        })?;

    Ok(base.add_directive(inference))
}

/// Install the global subscriber. Logs go to stderr, stdout carries the signal.
pub fn init_tracing(config: &ObservabilityEnvConfig) -> Result<()> {
    let stderr_layer = tracing_subscriber::fmt::layer()
        .with_target(false)
        .with_writer(std::io::stderr);

    tracing_subscriber::registry()
        .with(build_env_filter(config)?)
        .with(stderr_layer)
        .try_init()
        .context("Failed to install tracing subscriber")?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_inference_directive_is_added() {
        let config = ObservabilityEnvConfig {
            log_level: "info".to_string(),
            inference_log_level: "error".to_string(),
        };
        let filter = build_env_filter(&config).unwrap();
        assert!(filter.to_string().contains("ort=error"));
    }

    #[test]
    fn test_invalid_inference_level_is_rejected() {
        let config = ObservabilityEnvConfig {
            log_level: "info".to_string(),
            inference_log_level: "deafening".to_string(),
        };
        assert!(build_env_filter(&config).is_err());
    }
}
