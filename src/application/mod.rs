pub mod feature_engineering_service;
pub mod ml;
pub mod preprocessing;
pub mod signal_pipeline;

pub use signal_pipeline::{SignalEvaluation, SignalPipeline, SignalRequest};
