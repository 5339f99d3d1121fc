use std::path::PathBuf;
use thiserror::Error;

/// Errors raised while turning model scores into a signal
#[derive(Debug, Error, PartialEq)]
pub enum DecisionError {
    #[error("Cutoff count mismatch: {cutoffs} cutoffs for {channels} output channels")]
    ChannelMismatch { cutoffs: usize, channels: usize },

    #[error("Missing output channel {channel}: only {available} channels available")]
    MissingChannel { channel: usize, available: usize },

    #[error("Model returned no prediction rows")]
    EmptyPredictions,
}

/// Errors related to model artifacts on disk
#[derive(Debug, Error)]
pub enum ModelError {
    #[error("Invalid model name: {name}")]
    InvalidName { name: String },

    #[error("Model artifact not found at {path:?}")]
    ArtifactNotFound { path: PathBuf },

    #[error("Failed to read cutoffs from {path:?}: {reason}")]
    CutoffsUnreadable { path: PathBuf, reason: String },

    #[error("Unsupported cutoffs format {extension:?} at {path:?}")]
    UnsupportedCutoffsFormat { path: PathBuf, extension: String },

    #[error("Model at {path:?} expects {actual} input features, {expected} are computed")]
    InputWidthMismatch {
        path: PathBuf,
        expected: usize,
        actual: i64,
    },
}

/// Errors from the inference backend
#[derive(Debug, Error)]
pub enum PredictorError {
    #[error("Failed to load model session: {0}")]
    Session(String),

    #[error("Inference failed: {0}")]
    Inference(String),

    #[error("Malformed model output: {0}")]
    MalformedOutput(String),
}

/// Errors from the technical feature builder
#[derive(Debug, Error)]
pub enum FeatureError {
    #[error("Failed to construct indicator {indicator}: {reason}")]
    Indicator { indicator: &'static str, reason: String },

    #[error("Invalid candle data at {open_time}: {reason}")]
    InvalidCandle { open_time: String, reason: String },
}

/// Errors raised by the signal pipeline itself
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("No candles with positive volume found for {pair}")]
    NoCandles { pair: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decision_error_formatting() {
        let error = DecisionError::ChannelMismatch {
            cutoffs: 2,
            channels: 3,
        };

        let msg = error.to_string();
        assert!(msg.contains("2 cutoffs"));
        assert!(msg.contains("3 output channels"));
    }

    #[test]
    fn test_input_width_error_formatting() {
        let error = ModelError::InputWidthMismatch {
            path: PathBuf::from("models/m/model.onnx"),
            expected: 86,
            actual: 35,
        };
        let msg = error.to_string();
        assert!(msg.contains("expects 35"));
        assert!(msg.contains("86 are computed"));
    }

    #[test]
    fn test_pipeline_error_formatting() {
        let error = PipelineError::NoCandles {
            pair: "ETHUSDT".to_string(),
        };
        assert!(error.to_string().contains("ETHUSDT"));
    }
}
