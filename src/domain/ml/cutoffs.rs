use crate::domain::errors::{DecisionError, ModelError};
use ndarray::Array2;
use serde_pickle::{DeOptions, Value};
use std::path::Path;

/// Per-channel score thresholds produced at training time.
///
/// A channel "exceeds" when its score is strictly greater than its cutoff.
#[derive(Debug, Clone, PartialEq)]
pub struct Cutoffs(Vec<f64>);

impl Cutoffs {
    pub fn new(values: Vec<f64>) -> Self {
        Self(values)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn values(&self) -> &[f64] {
        &self.0
    }

    /// Load cutoffs from a pickled Python sequence (`.pickle`/`.pkl`) or a
    /// JSON array (`.json`).
    pub fn load(path: &Path) -> Result<Self, ModelError> {
        if !path.exists() {
            return Err(ModelError::ArtifactNotFound {
                path: path.to_path_buf(),
            });
        }

        let bytes = std::fs::read(path).map_err(|e| ModelError::CutoffsUnreadable {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or_default()
            .to_lowercase();

        let unreadable = |reason: String| ModelError::CutoffsUnreadable {
            path: path.to_path_buf(),
            reason,
        };

        match extension.as_str() {
            "pickle" | "pkl" => {
                let value = serde_pickle::value_from_slice(&bytes, DeOptions::new())
                    .map_err(|e| unreadable(e.to_string()))?;
                Self::from_pickle_value(value).map_err(unreadable)
            }
            "json" => serde_json::from_slice::<Vec<f64>>(&bytes)
                .map(Self)
                .map_err(|e| unreadable(e.to_string())),
            _ => Err(ModelError::UnsupportedCutoffsFormat {
                path: path.to_path_buf(),
                extension,
            }),
        }
    }

    fn from_pickle_value(value: Value) -> Result<Self, String> {
        let items = match value {
            Value::List(items) | Value::Tuple(items) => items,
            other => return Err(format!("expected a list of numbers, got {:?}", other)),
        };

        items
            .into_iter()
            .enumerate()
            .map(|(index, item)| match item {
                Value::F64(v) => Ok(v),
                Value::I64(v) => Ok(v as f64),
                Value::Bool(v) => Ok(if v { 1.0 } else { 0.0 }),
                other => Err(format!("cutoff {} is not a number: {:?}", index, other)),
            })
            .collect::<Result<Vec<_>, _>>()
            .map(Self)
    }

    /// Flag, for every row and channel, whether the score exceeds the cutoff.
    ///
    /// The number of cutoffs must equal the number of output channels.
    pub fn exceedances(&self, predictions: &Array2<f32>) -> Result<Array2<bool>, DecisionError> {
        let (rows, channels) = predictions.dim();
        if channels != self.0.len() {
            return Err(DecisionError::ChannelMismatch {
                cutoffs: self.0.len(),
                channels,
            });
        }

        Ok(Array2::from_shape_fn((rows, channels), |(row, channel)| {
            // Scores are f32; the cutoff is narrowed rather than the score widened
            predictions[[row, channel]] > self.0[channel] as f32
        }))
    }
}
