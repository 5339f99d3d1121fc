use super::predictor::MLPredictor;
use crate::domain::errors::{ModelError, PredictorError};
use crate::domain::ml::feature_registry::feature_count;
use ndarray::Array2;
use ort::session::Session;
use std::path::Path;
use std::sync::Mutex;
use tracing::{debug, info};

/// Multi-head classifier exported to ONNX.
///
/// The session is created once per instance and never cached across
/// invocations.
pub struct OnnxPredictor {
    session: Mutex<Session>,
    version: String,
}

impl OnnxPredictor {
    pub fn load(model_path: &Path) -> anyhow::Result<Self> {
        if !model_path.exists() {
            return Err(ModelError::ArtifactNotFound {
                path: model_path.to_path_buf(),
            }
            .into());
        }

        let session = Session::builder()
            .and_then(|builder| builder.commit_from_file(model_path))
            .map_err(|e| PredictorError::Session(e.to_string()))?;

        let declared = session
            .inputs
            .first()
            .and_then(|input| input.input_type.tensor_shape())
            .and_then(|shape| shape.last().copied());
        check_input_width(model_path, declared, feature_count())?;

        info!("Successfully loaded ONNX model from {:?}", model_path);

        let version = model_path
            .parent()
            .and_then(Path::file_name)
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();

        Ok(Self {
            session: Mutex::new(session),
            version,
        })
    }
}

/// Compare the feature width a model declares with the computed one.
///
/// A missing or dynamic (negative) last dimension accepts any width.
pub fn check_input_width(
    model_path: &Path,
    declared: Option<i64>,
    expected: usize,
) -> Result<(), ModelError> {
    match declared {
        Some(width) if width >= 0 && width as usize != expected => {
            Err(ModelError::InputWidthMismatch {
                path: model_path.to_path_buf(),
                expected,
                actual: width,
            })
        }
        Some(width) if width >= 0 => Ok(()),
        _ => {
            debug!("Model {:?} does not fix its input width", model_path);
            Ok(())
        }
    }
}

/// Arrange model outputs into a `rows x channels` matrix.
///
/// A single output of shape `[rows, channels]` is used as is. Several outputs
/// (one per head, each `[rows]` or `[rows, 1]`) become one column each.
pub fn collect_channels(
    rows: usize,
    outputs: Vec<(Vec<i64>, Vec<f32>)>,
) -> Result<Array2<f32>, PredictorError> {
    if outputs.is_empty() {
        return Err(PredictorError::MalformedOutput("No output found".to_string()));
    }

    let mut columns: Vec<Vec<f32>> = Vec::new();
    for (shape, data) in outputs {
        if rows == 0 || data.len() % rows != 0 {
            return Err(PredictorError::MalformedOutput(format!(
                "output of shape {:?} does not split into {} rows",
                shape, rows
            )));
        }
        let width = data.len() / rows;
        for channel in 0..width {
            columns.push((0..rows).map(|row| data[row * width + channel]).collect());
        }
    }

    let channels = columns.len();
    Ok(Array2::from_shape_fn((rows, channels), |(row, channel)| {
        columns[channel][row]
    }))
}

impl MLPredictor for OnnxPredictor {
    fn predict(&self, features: &Array2<f32>) -> Result<Array2<f32>, PredictorError> {
        let (rows, feature_dim) = features.dim();
        let flat_data: Vec<f32> = features.iter().copied().collect();
        let shape = vec![rows, feature_dim];

        let input_value = ort::value::Value::from_array((shape.as_slice(), flat_data))
            .map_err(|e| PredictorError::Inference(format!("Input value creation failed: {}", e)))?;

        let inputs = ort::inputs![input_value];

        let mut session = self
            .session
            .lock()
            .map_err(|e| PredictorError::Inference(format!("Mutex lock failed: {}", e)))?;

        let outputs = session
            .run(inputs)
            .map_err(|e| PredictorError::Inference(e.to_string()))?;

        let mut extracted = Vec::new();
        for (_, value) in outputs.iter() {
            let (shape, data) = value
                .try_extract_tensor::<f32>()
                .map_err(|e| PredictorError::MalformedOutput(e.to_string()))?;
            extracted.push((shape.iter().copied().collect(), data.to_vec()));
        }

        collect_channels(rows, extracted)
    }

    fn name(&self) -> &str {
        "ONNX Runtime (multi-head classifier)"
    }

    fn version(&self) -> &str {
        &self.version
    }
}
