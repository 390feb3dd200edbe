//! JSON linear-model artifact written by the `train` binary

use super::{argmax, Classifier, ModelError};
use crate::types::FeatureVector;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Number of inputs every Iris model takes
pub const N_FEATURES: usize = 4;

/// Multinomial linear classifier: one weight row and intercept per class.
///
/// The predicted class is `classes[argmax_k(coefficients[k] · x + intercepts[k])]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinearModel {
    /// Free-form label, e.g. `multinomial_logistic_regression`
    pub model_type: String,
    pub n_features: usize,
    /// Class id emitted for each row of `coefficients`
    pub classes: Vec<i64>,
    /// `[class][feature]` weights
    pub coefficients: Vec<Vec<f64>>,
    pub intercepts: Vec<f64>,
}

impl LinearModel {
    /// Build and validate a model from its parts
    pub fn new(
        model_type: impl Into<String>,
        classes: Vec<i64>,
        coefficients: Vec<Vec<f64>>,
        intercepts: Vec<f64>,
    ) -> Result<Self, ModelError> {
        let model = Self {
            model_type: model_type.into(),
            n_features: N_FEATURES,
            classes,
            coefficients,
            intercepts,
        };
        model.validate()?;
        Ok(model)
    }

    /// Read an artifact from disk
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read model artifact {}", path.display()))?;
        let model: Self = serde_json::from_str(&raw)
            .with_context(|| format!("Failed to parse model artifact {}", path.display()))?;
        model.validate()?;
        Ok(model)
    }

    /// Write the artifact as pretty JSON
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)
            .with_context(|| format!("Failed to write model artifact {}", path.display()))
    }

    /// Check dimensions agree and every parameter is finite
    pub fn validate(&self) -> Result<(), ModelError> {
        if self.n_features != N_FEATURES {
            return Err(ModelError::InvalidArtifact(format!(
                "expected {N_FEATURES} features, artifact declares {}",
                self.n_features
            )));
        }
        if self.classes.is_empty() {
            return Err(ModelError::InvalidArtifact("no classes".to_string()));
        }
        if self.coefficients.len() != self.classes.len() || self.intercepts.len() != self.classes.len() {
            return Err(ModelError::InvalidArtifact(format!(
                "{} classes but {} coefficient rows and {} intercepts",
                self.classes.len(),
                self.coefficients.len(),
                self.intercepts.len()
            )));
        }
        if let Some(row) = self.coefficients.iter().find(|row| row.len() != self.n_features) {
            return Err(ModelError::InvalidArtifact(format!(
                "coefficient row has {} weights, expected {}",
                row.len(),
                self.n_features
            )));
        }
        let all_finite = self
            .coefficients
            .iter()
            .flatten()
            .chain(self.intercepts.iter())
            .all(|v| v.is_finite());
        if !all_finite {
            return Err(ModelError::InvalidArtifact("non-finite parameter".to_string()));
        }
        Ok(())
    }

    /// Per-class decision scores
    pub fn decision_function(&self, features: &FeatureVector) -> Vec<f64> {
        let x = features.as_array();
        self.coefficients
            .iter()
            .zip(&self.intercepts)
            .map(|(weights, bias)| weights.iter().zip(x).map(|(w, xi)| w * xi).sum::<f64>() + bias)
            .collect()
    }
}

impl Classifier for LinearModel {
    fn classify(&self, features: &FeatureVector) -> Result<i64, ModelError> {
        let scores = self.decision_function(features);
        let idx = argmax(&scores)?;
        Ok(self.classes[idx])
    }

    fn name(&self) -> &str {
        &self.model_type
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Each class keys on one petal measurement band
    fn toy_model() -> LinearModel {
        LinearModel::new(
            "toy",
            vec![0, 1, 2],
            vec![
                vec![0.0, 0.0, -2.0, 0.0],
                vec![0.0, 0.0, 0.0, 0.0],
                vec![0.0, 0.0, 2.0, 0.0],
            ],
            vec![6.0, 0.0, -8.0],
        )
        .unwrap()
    }

    #[test]
    fn test_classify_picks_highest_score() {
        let model = toy_model();
        assert_eq!(model.classify(&FeatureVector::new(5.1, 3.5, 1.4, 0.2)).unwrap(), 0);
        assert_eq!(model.classify(&FeatureVector::new(6.0, 2.9, 3.5, 1.2)).unwrap(), 1);
        assert_eq!(model.classify(&FeatureVector::new(6.3, 3.3, 6.0, 2.5)).unwrap(), 2);
    }

    #[test]
    fn test_validate_rejects_shape_mismatch() {
        let result = LinearModel::new("bad", vec![0, 1], vec![vec![0.0; 4]], vec![0.0, 0.0]);
        assert!(matches!(result, Err(ModelError::InvalidArtifact(_))));

        let result = LinearModel::new("bad", vec![0], vec![vec![0.0; 3]], vec![0.0]);
        assert!(matches!(result, Err(ModelError::InvalidArtifact(_))));
    }

    #[test]
    fn test_overflowing_scores_still_pick_a_class() {
        let model = toy_model();
        let features = FeatureVector::new(5.1, 3.5, 1e308, 0.2);

        let scores = model.decision_function(&features);
        assert_eq!(scores[0], f64::NEG_INFINITY);
        assert_eq!(scores[2], f64::INFINITY);
        assert_eq!(model.classify(&features).unwrap(), 2);

        let features = FeatureVector::new(5.1, 3.5, -1e308, 0.2);
        assert_eq!(model.classify(&features).unwrap(), 0);
    }

    #[test]
    fn test_save_and_load_artifact() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("iris_model.json");

        let model = toy_model();
        model.save(&path).unwrap();

        let loaded = LinearModel::from_file(&path).unwrap();
        assert_eq!(loaded, model);
    }
}
