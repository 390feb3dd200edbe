//! ONNX Runtime classifier for exported scikit-learn style models

use super::{argmax, Classifier, ModelError};
use crate::types::FeatureVector;
use ort::session::{Session, SessionOutputs};
use ort::value::Tensor;
use std::sync::Mutex;
use tracing::debug;

/// Classifier backed by an ONNX Runtime session.
///
/// Reads the int64 label output when the graph exposes one, otherwise takes the
/// argmax of the `[1, n_classes]` probability tensor.
pub struct OnnxClassifier {
    name: String,
    /// `Session::run` needs exclusive access
    session: Mutex<Session>,
    input_name: String,
    label_output: Option<String>,
    probability_output: Option<String>,
}

impl OnnxClassifier {
    pub(crate) fn new(name: String, session: Session) -> Self {
        let input_name = session
            .inputs
            .first()
            .map(|i| i.name.clone())
            .unwrap_or_else(|| "float_input".to_string());

        let label_output = session
            .outputs
            .iter()
            .find(|o| o.name.contains("label"))
            .map(|o| o.name.clone());

        let probability_output = session
            .outputs
            .iter()
            .find(|o| o.name.contains("prob"))
            .or_else(|| session.outputs.last())
            .map(|o| o.name.clone());

        Self {
            name,
            session: Mutex::new(session),
            input_name,
            label_output,
            probability_output,
        }
    }

    fn extract_class(&self, outputs: &SessionOutputs) -> Result<i64, ModelError> {
        if let Some(output) = self.label_output.as_deref().and_then(|name| outputs.get(name)) {
            if let Ok((_, labels)) = output.try_extract_tensor::<i64>() {
                if let Some(&label) = labels.first() {
                    debug!(model = %self.name, label, "Extracted class from label output");
                    return Ok(label);
                }
            }
        }

        if let Some(output) = self
            .probability_output
            .as_deref()
            .and_then(|name| outputs.get(name))
        {
            if let Ok((_, probs)) = output.try_extract_tensor::<f32>() {
                let scores: Vec<f64> = probs.iter().map(|&p| p as f64).collect();
                let class = argmax(&scores)?;
                debug!(model = %self.name, class, "Extracted class from probability tensor");
                return Ok(class as i64);
            }
        }

        Err(ModelError::Inference(format!(
            "model {} produced no usable label or probability output",
            self.name
        )))
    }
}

impl Classifier for OnnxClassifier {
    fn classify(&self, features: &FeatureVector) -> Result<i64, ModelError> {
        // Shape [1, 4]
        let input: Vec<f32> = features.as_array().iter().map(|&v| v as f32).collect();
        let input_tensor = Tensor::from_array((vec![1_i64, input.len() as i64], input))?;

        let mut session = self.session.lock().map_err(|_| ModelError::LockPoisoned)?;
        let outputs = session.run(ort::inputs![self.input_name.as_str() => input_tensor])?;

        self.extract_class(&outputs)
    }

    fn name(&self) -> &str {
        &self.name
    }
}
