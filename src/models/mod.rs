//! Model artifact: a fitted classifier loaded once at startup

pub mod inference;
pub mod linear;
pub mod loader;

pub use inference::OnnxClassifier;
pub use linear::LinearModel;
pub use loader::{load_classifier, ModelLoader};

use crate::types::FeatureVector;
use thiserror::Error;

/// Failures raised while loading or running a classifier
#[derive(Debug, Error)]
pub enum ModelError {
    #[error("invalid model artifact: {0}")]
    InvalidArtifact(String),

    #[error("inference failed: {0}")]
    Inference(String),

    #[error("model lock poisoned")]
    LockPoisoned,

    #[error("ONNX runtime error: {0}")]
    Runtime(#[from] ort::Error),
}

/// A fitted classifier mapping a feature vector to a class id
pub trait Classifier: Send + Sync {
    /// Predict the class id for one sample
    fn classify(&self, features: &FeatureVector) -> Result<i64, ModelError>;

    /// Human-readable model identifier for logs
    fn name(&self) -> &str;
}

/// Index of the largest score, first one on ties.
///
/// Infinite scores from huge inputs rank like any other value; NaN is an error.
pub(crate) fn argmax(scores: &[f64]) -> Result<usize, ModelError> {
    if scores.iter().any(|s| s.is_nan()) {
        return Err(ModelError::Inference(format!("NaN class score in {scores:?}")));
    }

    scores
        .iter()
        .enumerate()
        .fold(None, |best: Option<(usize, f64)>, (idx, &score)| match best {
            Some((_, top)) if top >= score => best,
            _ => Some((idx, score)),
        })
        .map(|(idx, _)| idx)
        .ok_or_else(|| ModelError::Inference("no class scores produced".to_string()))
}
