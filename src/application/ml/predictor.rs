use crate::domain::errors::PredictorError;
use ndarray::Array2;

/// Interface for Machine Learning models
pub trait MLPredictor: Send + Sync {
    /// Score every row of a scaled feature matrix.
    ///
    /// Returns a `rows x channels` matrix, one column per output head.
    fn predict(&self, features: &Array2<f32>) -> Result<Array2<f32>, PredictorError>;

    /// Get model name/type
    fn name(&self) -> &str;

    /// Get model version/id
    fn version(&self) -> &str;
}
