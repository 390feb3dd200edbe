//! Request handlers for `/login`, `/predict` and `/predictions`

use crate::auth::{AuthError, Claims, StaticCredentials, TokenService};
use crate::cache::PredictionCache;
use crate::config::AppConfig;
use crate::error::AppError;
use crate::metrics::ServiceMetrics;
use crate::models::Classifier;
use crate::store::PredictionStore;
use crate::types::{class_name, FeatureVector, NewPrediction, PredictResponse, PredictionRecord};
use axum::{
    body::Bytes,
    extract::{Query, State},
    http::{header::AUTHORIZATION, HeaderMap, Uri},
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Default page size for `GET /predictions`
pub const DEFAULT_LIMIT: i64 = 10;

/// Everything the handlers share; built once and passed in explicitly
pub struct AppState {
    pub credentials: StaticCredentials,
    pub tokens: TokenService,
    pub cache: PredictionCache,
    pub classifier: Arc<dyn Classifier>,
    pub store: Arc<dyn PredictionStore>,
    pub metrics: Arc<ServiceMetrics>,
}

impl AppState {
    pub fn new(
        config: &AppConfig,
        classifier: Arc<dyn Classifier>,
        store: Arc<dyn PredictionStore>,
        metrics: Arc<ServiceMetrics>,
    ) -> Arc<Self> {
        Arc::new(Self {
            credentials: StaticCredentials::from_config(&config.auth),
            tokens: TokenService::from_config(&config.auth),
            cache: PredictionCache::new(),
            classifier,
            store,
            metrics,
        })
    }

    /// Auth guard called first by every protected handler
    pub fn authorize(&self, headers: &HeaderMap) -> Result<Claims, AppError> {
        let result = match headers.get(AUTHORIZATION) {
            None => Err(AuthError::Missing),
            Some(value) => match value.to_str() {
                Ok(header) => self.tokens.verify_header(Some(header)),
                Err(_) => Err(AuthError::Invalid),
            },
        };

        result.map_err(|e| {
            warn!(reason = e.kind(), "Rejected credential");
            self.metrics.record_auth_failure(e);
            AppError::from(e)
        })
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct LoginResponse {
    pub token: String,
}

/// `POST /login`
pub async fn login_handler(
    State(state): State<Arc<AppState>>,
    body: Bytes,
) -> Result<Json<LoginResponse>, AppError> {
    // An unreadable body is just a failed login.
    let payload: Value = serde_json::from_slice(&body).unwrap_or(Value::Null);
    let username = payload.get("username").and_then(Value::as_str);
    let password = payload.get("password").and_then(Value::as_str);

    match username {
        Some(user) if state.credentials.matches(username, password) => {
            let token = state.tokens.issue(user)?;
            state.metrics.record_login(true);
            info!(user = %user, "Issued token");
            Ok(Json(LoginResponse { token }))
        }
        _ => {
            state.metrics.record_login(false);
            warn!("Failed login attempt");
            Err(AppError::InvalidLogin)
        }
    }
}

/// `POST /predict`
pub async fn predict_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<PredictResponse>, AppError> {
    let claims = state.authorize(&headers)?;

    let features = serde_json::from_slice::<Value>(&body)
        .map_err(|e| e.to_string())
        .and_then(|payload| FeatureVector::from_json(&payload).map_err(|e| e.to_string()))
        .map_err(|reason| {
            warn!(user = %claims.sub, reason = %reason, "Invalid prediction input");
            state.metrics.record_invalid_input();
            AppError::InvalidInput
        })?;

    let result = run_prediction(&state, features).await;
    if let Err(AppError::Internal(_)) = &result {
        state.metrics.record_internal_error();
    }
    result.map(Json)
}

/// Cache lookup or inference, then persistence
async fn run_prediction(state: &AppState, features: FeatureVector) -> Result<PredictResponse, AppError> {
    let (class_id, cache_hit) = match state.cache.get(&features) {
        Some(class_id) => {
            info!(features = ?features.as_array(), class_id, "Prediction cached for features");
            (class_id, true)
        }
        None => {
            let started = Instant::now();
            let classifier = Arc::clone(&state.classifier);
            // ONNX sessions run synchronously behind a mutex.
            let class_id = tokio::task::spawn_blocking(move || classifier.classify(&features))
                .await
                .map_err(|e| AppError::Internal(format!("inference task: {e}")))??;
            state.metrics.record_inference_time(started.elapsed());

            state.cache.insert(&features, class_id);
            info!(
                features = ?features.as_array(),
                class_id,
                model = %state.classifier.name(),
                "Prediction made for features"
            );
            (class_id, false)
        }
    };

    let record = state
        .store
        .append(&NewPrediction::new(features, class_name(class_id)))
        .await?;
    debug!(id = record.id, "Prediction persisted");

    state.metrics.record_prediction(cache_hit);
    Ok(PredictResponse::new(class_id))
}

/// Paging for `GET /predictions`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ListParams {
    pub limit: i64,
    pub offset: i64,
}

impl Default for ListParams {
    fn default() -> Self {
        Self {
            limit: DEFAULT_LIMIT,
            offset: 0,
        }
    }
}

impl ListParams {
    /// Values that do not parse as integers fall back to their defaults
    pub fn from_query(query: &HashMap<String, String>) -> Self {
        let defaults = Self::default();
        let parse = |key: &str, default: i64| {
            query
                .get(key)
                .and_then(|v| v.trim().parse::<i64>().ok())
                .unwrap_or(default)
        };

        Self {
            limit: parse("limit", defaults.limit),
            offset: parse("offset", defaults.offset),
        }
    }
}

/// `GET /predictions`
pub async fn list_predictions_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    uri: Uri,
) -> Result<Json<Vec<PredictionRecord>>, AppError> {
    state.authorize(&headers)?;

    let query = Query::<HashMap<String, String>>::try_from_uri(&uri)
        .map(|Query(q)| q)
        .unwrap_or_default();
    let params = ListParams::from_query(&query);

    let records = state.store.list(params.offset, params.limit).await?;
    debug!(limit = params.limit, offset = params.offset, returned = records.len(), "Listed predictions");

    Ok(Json(records))
}
