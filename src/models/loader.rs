//! Model artifact loader

use super::{Classifier, LinearModel, OnnxClassifier};
use anyhow::{Context, Result};
use ort::session::{builder::GraphOptimizationLevel, Session};
use std::path::Path;
use std::sync::Arc;
use tracing::info;

/// Loader for ONNX models
pub struct ModelLoader {
    /// Number of threads for ONNX inference
    onnx_threads: usize,
}

impl ModelLoader {
    /// Create a new model loader with default settings (1 thread)
    pub fn new() -> Result<Self> {
        Self::with_threads(1)
    }

    /// Create a new model loader with specified number of threads
    pub fn with_threads(onnx_threads: usize) -> Result<Self> {
        ort::init().commit()?;
        info!(onnx_threads = onnx_threads, "ONNX Runtime initialized");
        Ok(Self { onnx_threads })
    }

    /// Load an ONNX classifier from file
    pub fn load_onnx<P: AsRef<Path>>(&self, path: P, name: &str) -> Result<OnnxClassifier> {
        let path = path.as_ref();

        info!(model = %name, path = %path.display(), threads = self.onnx_threads, "Loading ONNX model");

        let session = Session::builder()?
            .with_optimization_level(GraphOptimizationLevel::Level3)?
            .with_intra_threads(self.onnx_threads)?
            .commit_from_file(path)
            .with_context(|| format!("Failed to load model from {:?}", path))?;

        Ok(OnnxClassifier::new(name.to_string(), session))
    }
}

/// Load the classifier the service will run for its whole lifetime.
///
/// `.onnx` files go through ONNX Runtime; anything else is parsed as a
/// [`LinearModel`] JSON artifact. A missing or unreadable artifact is an error
/// the caller treats as fatal.
pub fn load_classifier<P: AsRef<Path>>(path: P) -> Result<Arc<dyn Classifier>> {
    let path = path.as_ref();

    if !path.is_file() {
        anyhow::bail!("Model artifact not found at {}", path.display());
    }

    let name = path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("model")
        .to_string();

    let is_onnx = path
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("onnx"));

    let classifier: Arc<dyn Classifier> = if is_onnx {
        Arc::new(ModelLoader::new()?.load_onnx(path, &name)?)
    } else {
        Arc::new(LinearModel::from_file(path)?)
    };

    info!(
        model = %classifier.name(),
        path = %path.display(),
        "Model loaded successfully"
    );

    Ok(classifier)
}
