//! Iris Classifier Serving
//!
//! Exposes a pre-trained Iris species classifier over an authenticated JSON
//! API. Each prediction is memoized in process and persisted to SQLite; past
//! predictions are listed newest first.

pub mod auth;
pub mod cache;
pub mod config;
pub mod error;
pub mod handlers;
pub mod metrics;
pub mod models;
pub mod server;
pub mod store;
pub mod training;
pub mod types;

pub use auth::{AuthError, TokenService};
pub use cache::PredictionCache;
pub use config::AppConfig;
pub use error::AppError;
pub use handlers::AppState;
pub use models::{load_classifier, Classifier};
pub use server::{build_router, start_server};
pub use store::{PredictionStore, SqlitePredictionStore};
pub use types::{FeatureVector, PredictionRecord};
