//! Type definitions for the classifier service

pub mod features;
pub mod prediction;

pub use features::{CacheKey, FeatureError, FeatureVector};
pub use prediction::{class_name, NewPrediction, PredictResponse, PredictionRecord};
