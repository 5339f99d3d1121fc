//! End-to-end signal generation for one pair and one model.
//!
//! Every invocation loads the model and its cutoffs from disk, opens the
//! candle database, fetches the most recent bars, closes the database, then
//! runs features, scaling, inference and the decision policy in sequence.

use crate::application::feature_engineering_service::build_feature_table;
use crate::application::ml::{MLPredictor, ModelStore, OnnxPredictor};
use crate::application::preprocessing::RobustScaler;
use crate::config::Config;
use crate::domain::errors::{DecisionError, PipelineError, PredictorError};
use crate::domain::ml::cutoffs::Cutoffs;
use crate::domain::repositories::CandleRepository;
use crate::domain::signal_policy::decide;
use crate::domain::types::{Candle, Pair, Signal, TimedSignal};
use crate::infrastructure::persistence::{Database, SqliteCandleRepository};
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use ndarray::Array2;
use tracing::{debug, info, warn};

/// Parameters of a single invocation
#[derive(Debug, Clone)]
pub struct SignalRequest {
    pub pair: Pair,
    pub model_name: String,
    /// Only bars opened at or before this instant are considered
    pub candle_time: Option<DateTime<Utc>>,
}

/// Intermediate results of one run, oldest bar first.
#[derive(Debug, Clone)]
pub struct SignalEvaluation {
    pub candles: Vec<Candle>,
    pub predictions: Array2<f32>,
    pub exceedances: Array2<bool>,
}

impl SignalEvaluation {
    /// Signal of the most recent bar
    pub fn latest(&self) -> Result<Signal, DecisionError> {
        let rows = self.exceedances.nrows();
        if rows == 0 {
            return Err(DecisionError::EmptyPredictions);
        }
        decide(&self.exceedances.row(rows - 1).to_vec())
    }

    /// Signal of every bar in the batch, oldest first
    pub fn series(&self) -> Result<Vec<TimedSignal>, DecisionError> {
        self.candles
            .iter()
            .zip(self.exceedances.rows())
            .map(|(candle, flags)| {
                decide(&flags.to_vec()).map(|signal| TimedSignal {
                    open_time: candle.open_time,
                    signal,
                })
            })
            .collect()
    }
}

pub struct SignalPipeline {
    store: ModelStore,
    database_url: String,
    candle_limit: usize,
}

impl SignalPipeline {
    pub fn new(store: ModelStore, database_url: impl Into<String>, candle_limit: usize) -> Self {
        Self {
            store,
            database_url: database_url.into(),
            candle_limit,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(
            ModelStore::from_config(&config.model),
            config.data.database_url.clone(),
            config.data.candle_limit,
        )
    }

    pub fn store(&self) -> &ModelStore {
        &self.store
    }

    /// Signal for the most recent bar, using the exported network.
    pub async fn run(&self, request: &SignalRequest) -> Result<Signal> {
        let evaluation = self.evaluate(request).await?;
        let signal = evaluation.latest()?;
        info!(
            "Signal for {} with model {}: {}",
            request.pair, request.model_name, signal
        );
        Ok(signal)
    }

    /// Signal for every fetched bar, using the exported network.
    pub async fn run_series(&self, request: &SignalRequest) -> Result<Vec<TimedSignal>> {
        let evaluation = self.evaluate(request).await?;
        Ok(evaluation.series()?)
    }

    pub async fn evaluate(&self, request: &SignalRequest) -> Result<SignalEvaluation> {
        let model_path = self.store.model_path(&request.model_name)?;
        let predictor = OnnxPredictor::load(&model_path)
            .with_context(|| format!("Failed to load model {}", request.model_name))?;
        self.evaluate_with(&predictor, request).await
    }

    /// Run the pipeline with an already loaded predictor.
    pub async fn evaluate_with(
        &self,
        predictor: &dyn MLPredictor,
        request: &SignalRequest,
    ) -> Result<SignalEvaluation> {
        self.check_metadata(request);

        let cutoffs: Cutoffs = self
            .store
            .load_cutoffs(&request.model_name)
            .with_context(|| format!("Failed to load cutoffs for {}", request.model_name))?;

        let mut candles = self.fetch_candles(request).await?;
        if candles.is_empty() {
            return Err(PipelineError::NoCandles {
                pair: request.pair.to_string(),
            }
            .into());
        }
        // Indicators are computed over chronological order
        candles.sort_by_key(|c| c.open_time);

        let features = build_feature_table(&candles)?;
        let scaled = RobustScaler::fit_transform(&features.to_f32());
        debug!(
            "Scaled {} rows x {} features for {}",
            scaled.nrows(),
            scaled.ncols(),
            request.pair
        );

        let predictions = predictor.predict(&scaled)?;
        if predictions.nrows() == 0 {
            return Err(DecisionError::EmptyPredictions.into());
        }
        if predictions.nrows() != candles.len() {
            return Err(PredictorError::MalformedOutput(format!(
                "{} prediction rows for {} candles",
                predictions.nrows(),
                candles.len()
            ))
            .into());
        }
        debug!(
            "{} {} produced {} channels",
            predictor.name(),
            predictor.version(),
            predictions.ncols()
        );

        let exceedances = cutoffs.exceedances(&predictions)?;

        Ok(SignalEvaluation {
            candles,
            predictions,
            exceedances,
        })
    }

    /// Fetch candles with the database open only for the duration of the query.
    async fn fetch_candles(&self, request: &SignalRequest) -> Result<Vec<Candle>> {
        Database::new(&self.database_url)
            .await?
            .with_scope(|pool| async move {
                SqliteCandleRepository::new(pool)
                    .fetch_recent(&request.pair, request.candle_time, self.candle_limit)
                    .await
            })
            .await
    }

    fn check_metadata(&self, request: &SignalRequest) {
        match self.store.metadata(&request.model_name) {
            Ok(Some(metadata)) if metadata.pair != request.pair => warn!(
                "Model {} was generated for {} but is used for {}",
                request.model_name, metadata.pair, request.pair
            ),
            Ok(_) => {}
            Err(e) => warn!("Ignoring unreadable metadata of {}: {:?}", request.model_name, e),
        }
    }
}
