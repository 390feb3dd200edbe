//! Offline fitting of the Iris classifier.
//!
//! Produces the [`LinearModel`] artifact the service loads at startup. Nothing
//! here runs on the serving path.

use crate::models::{Classifier, LinearModel};
use crate::types::FeatureVector;
use anyhow::{bail, Context, Result};
use linfa::prelude::*;
use linfa_logistic::MultiLogisticRegression;
use ndarray::{Array1, Array2};
use rand::{rngs::StdRng, SeedableRng};
use tracing::info;

/// Training knobs
#[derive(Debug, Clone)]
pub struct TrainingParams {
    /// Share of samples held out for scoring
    pub test_ratio: f32,
    pub seed: u64,
    pub max_iterations: u64,
}

impl Default for TrainingParams {
    fn default() -> Self {
        Self {
            test_ratio: 0.2,
            seed: 42,
            max_iterations: 200,
        }
    }
}

/// Fitted artifact plus held-out accuracy
#[derive(Debug)]
pub struct TrainingReport {
    pub model: LinearModel,
    pub accuracy: f64,
    pub train_samples: usize,
    pub test_samples: usize,
}

/// Fit multinomial logistic regression on the bundled Iris dataset
pub fn train_iris(params: &TrainingParams) -> Result<TrainingReport> {
    if !(0.0..1.0).contains(&params.test_ratio) {
        bail!("test ratio must be in [0, 1), got {}", params.test_ratio);
    }

    let mut rng = StdRng::seed_from_u64(params.seed);
    let (train, test) = linfa_datasets::iris()
        .shuffle(&mut rng)
        .split_with_ratio(1.0 - params.test_ratio);

    let fitted = MultiLogisticRegression::default()
        .max_iterations(params.max_iterations)
        .fit(&train)
        .context("Failed to fit logistic regression")?;

    // Columns follow the sorted label order.
    let weights = fitted.params();
    let intercepts = fitted.intercept();
    let n_classes = intercepts.len();
    let coefficients: Vec<Vec<f64>> = (0..n_classes)
        .map(|k| weights.column(k).to_vec())
        .collect();

    let model = LinearModel::new(
        "multinomial_logistic_regression",
        (0..n_classes as i64).collect(),
        coefficients,
        intercepts.to_vec(),
    )?;

    let expected = fitted.predict(train.records());
    let disagreements = count_disagreements(&model, train.records(), &expected)?;
    if disagreements > 0 {
        bail!("Exported artifact disagrees with the fitted model on {disagreements} training samples");
    }

    let accuracy = if test.nsamples() == 0 {
        1.0
    } else {
        let predicted = fitted.predict(test.records());
        let correct = predicted
            .iter()
            .zip(test.targets().iter())
            .filter(|(p, t)| p == t)
            .count();
        correct as f64 / test.nsamples() as f64
    };

    info!(
        train_samples = train.nsamples(),
        test_samples = test.nsamples(),
        accuracy,
        "Training complete"
    );

    Ok(TrainingReport {
        model,
        accuracy,
        train_samples: train.nsamples(),
        test_samples: test.nsamples(),
    })
}

fn count_disagreements(
    model: &LinearModel,
    records: &Array2<f64>,
    expected: &Array1<usize>,
) -> Result<usize> {
    let mut disagreements = 0;
    for (row, &label) in records.rows().into_iter().zip(expected.iter()) {
        let features = FeatureVector::new(row[0], row[1], row[2], row[3]);
        if model.classify(&features)? != label as i64 {
            disagreements += 1;
        }
    }
    Ok(disagreements)
}
