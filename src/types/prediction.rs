//! Prediction payloads and persisted records

use super::features::FeatureVector;
use chrono::{DateTime, SubsecRound, Utc};
use serde::{Serialize, Serializer};

/// Species names indexed by class id
pub const CLASS_NAMES: [&str; 3] = ["setosa", "versicolor", "virginica"];

/// Name used for any class id outside the table
pub const UNKNOWN_CLASS: &str = "unknown";

/// Resolve a model class id to its species name
pub fn class_name(class_id: i64) -> &'static str {
    usize::try_from(class_id)
        .ok()
        .and_then(|idx| CLASS_NAMES.get(idx))
        .copied()
        .unwrap_or(UNKNOWN_CLASS)
}

/// Fixed-width ISO-8601 UTC rendering with microseconds.
///
/// Lexicographic order of these strings is chronological order.
pub fn format_timestamp(ts: &DateTime<Utc>) -> String {
    ts.format("%Y-%m-%dT%H:%M:%S%.6fZ").to_string()
}

fn serialize_timestamp<S: Serializer>(ts: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&format_timestamp(ts))
}

/// Body returned by `POST /predict`
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PredictResponse {
    pub predicted_class: i64,
    pub predicted_class_name: &'static str,
}

impl PredictResponse {
    pub fn new(class_id: i64) -> Self {
        Self {
            predicted_class: class_id,
            predicted_class_name: class_name(class_id),
        }
    }
}

/// A prediction about to be written
#[derive(Debug, Clone)]
pub struct NewPrediction {
    pub features: FeatureVector,
    pub predicted_class: String,
    pub created_at: DateTime<Utc>,
}

impl NewPrediction {
    /// Stamp a prediction with the current time, at the microsecond precision it is stored with
    pub fn new(features: FeatureVector, predicted_class: impl Into<String>) -> Self {
        Self {
            features,
            predicted_class: predicted_class.into(),
            created_at: Utc::now().trunc_subsecs(6),
        }
    }
}

/// A stored prediction as listed by `GET /predictions`
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PredictionRecord {
    pub id: i64,
    pub sepal_length: f64,
    pub sepal_width: f64,
    pub petal_length: f64,
    pub petal_width: f64,
    /// Species name, not the numeric class id
    pub predicted_class: String,
    #[serde(serialize_with = "serialize_timestamp")]
    pub created_at: DateTime<Utc>,
}
