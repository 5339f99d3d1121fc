pub mod model_store;
pub mod onnx_predictor;
pub mod predictor;
pub mod random_signal;

pub use model_store::ModelStore;
pub use onnx_predictor::OnnxPredictor;
pub use predictor::MLPredictor;
