//! Iris feature vector and request validation

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// Request field names, in model input order
pub const FEATURE_NAMES: [&str; 4] = ["sepal_length", "sepal_width", "petal_length", "petal_width"];

/// Rejection reasons for a predict payload
#[derive(Debug, Error, PartialEq)]
pub enum FeatureError {
    #[error("payload is not a JSON object")]
    NotAnObject,

    #[error("missing field `{0}`")]
    Missing(&'static str),

    #[error("field `{0}` is not numeric")]
    NotNumeric(&'static str),
}

/// Four measurements describing one flower sample
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FeatureVector {
    pub sepal_length: f64,
    pub sepal_width: f64,
    pub petal_length: f64,
    pub petal_width: f64,
}

impl FeatureVector {
    pub fn new(sepal_length: f64, sepal_width: f64, petal_length: f64, petal_width: f64) -> Self {
        Self {
            sepal_length,
            sepal_width,
            petal_length,
            petal_width,
        }
    }

    /// Validate a decoded JSON body.
    ///
    /// Every field must be present and a JSON number (integer or real). Booleans,
    /// strings and nulls are rejected. No range checks are applied.
    ///
    /// `true`/`false` are not coerced to 1/0: a boolean is not a measurement,
    /// even where other runtimes would treat it as an integer.
    pub fn from_json(payload: &Value) -> Result<Self, FeatureError> {
        let object = payload.as_object().ok_or(FeatureError::NotAnObject)?;

        let mut values = [0.0_f64; 4];
        for (slot, name) in values.iter_mut().zip(FEATURE_NAMES) {
            *slot = match object.get(name) {
                None | Some(Value::Null) => return Err(FeatureError::Missing(name)),
                Some(Value::Number(n)) => n.as_f64().ok_or(FeatureError::NotNumeric(name))?,
                Some(_) => return Err(FeatureError::NotNumeric(name)),
            };
        }

        Ok(Self::from(values))
    }

    /// Features in model input order
    pub fn as_array(&self) -> [f64; 4] {
        [
            self.sepal_length,
            self.sepal_width,
            self.petal_length,
            self.petal_width,
        ]
    }

    /// Exact-match cache key for this vector
    pub fn cache_key(&self) -> CacheKey {
        CacheKey::from(self)
    }
}

impl From<[f64; 4]> for FeatureVector {
    fn from(values: [f64; 4]) -> Self {
        Self::new(values[0], values[1], values[2], values[3])
    }
}

/// Bit-exact key over the four features.
///
/// `-0.0` is folded into `0.0` so numerically equal inputs share an entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CacheKey([u64; 4]);

impl From<&FeatureVector> for CacheKey {
    fn from(features: &FeatureVector) -> Self {
        Self(features.as_array().map(|v| (v + 0.0).to_bits()))
    }
}
