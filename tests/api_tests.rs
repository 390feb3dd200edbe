//! End-to-end tests for the HTTP API against an in-memory store

use async_trait::async_trait;
use axum::{
    body::Body,
    http::{header, Request, StatusCode},
    Router,
};
use chrono::Utc;
use http_body_util::BodyExt;
use iris_serving::{
    build_router,
    config::AppConfig,
    handlers::AppState,
    metrics::ServiceMetrics,
    models::{Classifier, LinearModel, ModelError},
    store::{PredictionStore, SqlitePredictionStore, StoreError},
    types::{FeatureVector, NewPrediction, PredictionRecord},
};
use serde_json::{json, Value};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, ThreadId};
use tower::ServiceExt;

/// Returns a fixed class and counts calls
struct CountingClassifier {
    class_id: i64,
    calls: AtomicUsize,
}

impl CountingClassifier {
    fn new(class_id: i64) -> Arc<Self> {
        Arc::new(Self {
            class_id,
            calls: AtomicUsize::new(0),
        })
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl Classifier for CountingClassifier {
    fn classify(&self, _features: &FeatureVector) -> Result<i64, ModelError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.class_id)
    }

    fn name(&self) -> &str {
        "counting"
    }
}

struct BrokenClassifier;

impl Classifier for BrokenClassifier {
    fn classify(&self, _features: &FeatureVector) -> Result<i64, ModelError> {
        Err(ModelError::Inference("weights file truncated".to_string()))
    }

    fn name(&self) -> &str {
        "broken"
    }
}

/// Remembers which thread ran inference
#[derive(Default)]
struct ThreadRecordingClassifier {
    ran_on: Mutex<Option<ThreadId>>,
}

impl Classifier for ThreadRecordingClassifier {
    fn classify(&self, _features: &FeatureVector) -> Result<i64, ModelError> {
        *self.ran_on.lock().unwrap() = Some(thread::current().id());
        Ok(1)
    }

    fn name(&self) -> &str {
        "thread-recording"
    }
}

struct BrokenStore;

#[async_trait]
impl PredictionStore for BrokenStore {
    async fn migrate(&self) -> Result<(), StoreError> {
        Ok(())
    }

    async fn append(&self, _prediction: &NewPrediction) -> Result<PredictionRecord, StoreError> {
        Err(StoreError::Database(sqlx::Error::PoolClosed))
    }

    async fn list(&self, _offset: i64, _limit: i64) -> Result<Vec<PredictionRecord>, StoreError> {
        Err(StoreError::Database(sqlx::Error::PoolClosed))
    }

    async fn count(&self) -> Result<i64, StoreError> {
        Ok(0)
    }
}

struct TestApp {
    router: Router,
    state: Arc<AppState>,
}

impl TestApp {
    async fn with_classifier(classifier: Arc<dyn Classifier>) -> Self {
        let store = Arc::new(SqlitePredictionStore::in_memory().await.unwrap());
        Self::with_parts(classifier, store)
    }

    fn with_parts(classifier: Arc<dyn Classifier>, store: Arc<dyn PredictionStore>) -> Self {
        let state = AppState::new(
            &AppConfig::default(),
            classifier,
            store,
            Arc::new(ServiceMetrics::new()),
        );
        Self {
            router: build_router(state.clone()),
            state,
        }
    }

    async fn send(&self, request: Request<Body>) -> (StatusCode, Value) {
        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, body)
    }

    async fn login(&self, username: &str, password: &str) -> (StatusCode, Value) {
        let request = Request::builder()
            .method("POST")
            .uri("/login")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(
                json!({"username": username, "password": password}).to_string(),
            ))
            .unwrap();
        self.send(request).await
    }

    async fn token(&self) -> String {
        let (status, body) = self.login("admin", "admin123").await;
        assert_eq!(status, StatusCode::OK);
        body["token"].as_str().unwrap().to_string()
    }

    async fn predict(&self, token: Option<&str>, payload: &str) -> (StatusCode, Value) {
        let mut builder = Request::builder()
            .method("POST")
            .uri("/predict")
            .header(header::CONTENT_TYPE, "application/json");
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
        }
        self.send(builder.body(Body::from(payload.to_string())).unwrap())
            .await
    }

    async fn list(&self, token: Option<&str>, query: &str) -> (StatusCode, Value) {
        let mut builder = Request::builder()
            .method("GET")
            .uri(format!("/predictions{query}"));
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
        }
        self.send(builder.body(Body::empty()).unwrap()).await
    }

    async fn stored(&self) -> i64 {
        self.state.store.count().await.unwrap()
    }
}

fn sample(sepal_length: f64) -> String {
    json!({
        "sepal_length": sepal_length,
        "sepal_width": 3.5,
        "petal_length": 1.4,
        "petal_width": 0.2
    })
    .to_string()
}

const SETOSA: &str =
    r#"{"sepal_length":5.1,"sepal_width":3.5,"petal_length":1.4,"petal_width":0.2}"#;

#[tokio::test]
async fn test_login_issues_token_for_configured_user() {
    let app = TestApp::with_classifier(CountingClassifier::new(0)).await;

    let token = app.token().await;
    let claims = app.state.tokens.verify(&token).unwrap();

    assert_eq!(claims.sub, "admin");
    assert_eq!(claims.exp - claims.iat, 3600);
    assert!((claims.iat - Utc::now().timestamp()).abs() <= 5);
}

#[tokio::test]
async fn test_login_rejects_any_other_pair() {
    let app = TestApp::with_classifier(CountingClassifier::new(0)).await;
    let expected = json!({"error": "Invalid username or password"});

    for (user, pass) in [("admin", "wrong"), ("root", "admin123"), ("", "")] {
        let (status, body) = app.login(user, pass).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body, expected);
    }

    let request = Request::builder()
        .method("POST")
        .uri("/login")
        .body(Body::from("not json"))
        .unwrap();
    let (status, body) = app.send(request).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body, expected);
}

#[tokio::test]
async fn test_predict_reference_sample() {
    let app = TestApp::with_classifier(CountingClassifier::new(0)).await;
    let token = app.token().await;

    let (status, body) = app.predict(Some(&token), SETOSA).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        body,
        json!({"predicted_class": 0, "predicted_class_name": "setosa"})
    );
    assert_eq!(app.stored().await, 1);
}

#[tokio::test]
async fn test_predict_requires_token() {
    let classifier = CountingClassifier::new(0);
    let app = TestApp::with_classifier(classifier.clone()).await;

    let (status, body) = app.predict(None, SETOSA).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body, json!({"error": "Token is missing"}));

    let (status, body) = app.predict(Some("garbage"), SETOSA).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body, json!({"error": "Token is invalid"}));

    let expired = app
        .state
        .tokens
        .issue_at("admin", Utc::now().timestamp() - 7200)
        .unwrap();
    let (status, body) = app.predict(Some(&expired), SETOSA).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body, json!({"error": "Token has expired"}));

    assert_eq!(classifier.calls(), 0);
    assert_eq!(app.stored().await, 0);
}

#[tokio::test]
async fn test_auth_is_checked_before_input() {
    let app = TestApp::with_classifier(CountingClassifier::new(0)).await;

    let (status, _) = app.predict(None, r#"{"sepal_length": "x"}"#).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_accepts_bare_token_without_bearer_prefix() {
    let app = TestApp::with_classifier(CountingClassifier::new(1)).await;
    let token = app.token().await;

    let request = Request::builder()
        .method("POST")
        .uri("/predict")
        .header(header::AUTHORIZATION, token)
        .body(Body::from(SETOSA))
        .unwrap();
    let (status, body) = app.send(request).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["predicted_class_name"], "versicolor");
}

#[tokio::test]
async fn test_repeat_prediction_served_from_cache() {
    let classifier = CountingClassifier::new(2);
    let app = TestApp::with_classifier(classifier.clone()).await;
    let token = app.token().await;

    let (_, first) = app.predict(Some(&token), SETOSA).await;
    let (_, second) = app.predict(Some(&token), SETOSA).await;

    assert_eq!(first, second);
    assert_eq!(first["predicted_class"], 2);
    assert_eq!(classifier.calls(), 1);

    let metrics = &app.state.metrics;
    assert_eq!(metrics.cache_hits.load(Ordering::Relaxed), 1);
    assert_eq!(metrics.cache_misses.load(Ordering::Relaxed), 1);
    assert_eq!(app.state.cache.len(), 1);
    // Cache hits are still persisted.
    assert_eq!(app.stored().await, 2);
}

#[tokio::test]
async fn test_integer_inputs_share_cache_with_reals() {
    let classifier = CountingClassifier::new(1);
    let app = TestApp::with_classifier(classifier.clone()).await;
    let token = app.token().await;

    let ints = r#"{"sepal_length":6,"sepal_width":3,"petal_length":4,"petal_width":1}"#;
    let reals = r#"{"sepal_length":6.0,"sepal_width":3.0,"petal_length":4.0,"petal_width":1.0}"#;
    app.predict(Some(&token), ints).await;
    app.predict(Some(&token), reals).await;

    assert_eq!(classifier.calls(), 1);
}

#[tokio::test]
async fn test_unknown_class_id_maps_to_unknown() {
    let app = TestApp::with_classifier(CountingClassifier::new(7)).await;
    let token = app.token().await;

    let (status, body) = app.predict(Some(&token), SETOSA).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({"predicted_class": 7, "predicted_class_name": "unknown"}));
}

#[tokio::test]
async fn test_invalid_input_is_rejected_without_side_effects() {
    let classifier = CountingClassifier::new(0);
    let app = TestApp::with_classifier(classifier.clone()).await;
    let token = app.token().await;

    let payloads = [
        r#"{"sepal_length":"5.1","sepal_width":3.5,"petal_length":1.4,"petal_width":0.2}"#,
        r#"{"sepal_length":5.1,"sepal_width":3.5,"petal_length":1.4}"#,
        r#"{"sepal_length":5.1,"sepal_width":null,"petal_length":1.4,"petal_width":0.2}"#,
        r#"{"sepal_length":[5.1],"sepal_width":3.5,"petal_length":1.4,"petal_width":0.2}"#,
        r#"[5.1, 3.5, 1.4, 0.2]"#,
        "not json at all",
    ];

    for payload in payloads {
        let (status, body) = app.predict(Some(&token), payload).await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "payload {payload}");
        assert_eq!(body, json!({"error": "Invalid input data"}));
    }

    assert_eq!(classifier.calls(), 0);
    assert_eq!(app.stored().await, 0);
    assert!(app.state.cache.is_empty());
}

#[tokio::test]
async fn test_model_failure_is_generic_internal_error() {
    let app = TestApp::with_classifier(Arc::new(BrokenClassifier)).await;
    let token = app.token().await;

    let (status, body) = app.predict(Some(&token), SETOSA).await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body, json!({"error": "Internal server error"}));
    assert_eq!(app.stored().await, 0);
    assert_eq!(
        app.state.metrics.internal_errors.load(Ordering::Relaxed),
        1
    );
}

#[tokio::test]
async fn test_store_failure_is_generic_internal_error() {
    let app = TestApp::with_parts(CountingClassifier::new(0), Arc::new(BrokenStore));
    let token = app.token().await;

    let (status, body) = app.predict(Some(&token), SETOSA).await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body, json!({"error": "Internal server error"}));
}

#[tokio::test]
async fn test_list_store_failure_is_generic_internal_error() {
    let app = TestApp::with_parts(CountingClassifier::new(0), Arc::new(BrokenStore));
    let token = app.token().await;

    let (status, body) = app.list(Some(&token), "?limit=5").await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body, json!({"error": "Internal server error"}));
}

#[tokio::test]
async fn test_huge_finite_input_still_predicts() {
    let model = LinearModel::new(
        "toy",
        vec![0, 1, 2],
        vec![
            vec![0.0, 0.0, -2.0, 0.0],
            vec![0.0, 0.0, 0.0, 0.0],
            vec![0.0, 0.0, 2.0, 0.0],
        ],
        vec![6.0, 0.0, -8.0],
    )
    .unwrap();
    let app = TestApp::with_classifier(Arc::new(model)).await;
    let token = app.token().await;

    let payload = r#"{"sepal_length":5.1,"sepal_width":3.5,"petal_length":1e308,"petal_width":0.2}"#;
    let (status, body) = app.predict(Some(&token), payload).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({"predicted_class": 2, "predicted_class_name": "virginica"}));
    assert_eq!(app.stored().await, 1);
}

#[tokio::test]
async fn test_inference_runs_off_the_request_thread() {
    let classifier = Arc::new(ThreadRecordingClassifier::default());
    let app = TestApp::with_classifier(classifier.clone()).await;
    let token = app.token().await;

    let (status, _) = app.predict(Some(&token), SETOSA).await;
    assert_eq!(status, StatusCode::OK);

    let ran_on = classifier.ran_on.lock().unwrap().expect("classifier was called");
    assert_ne!(ran_on, thread::current().id());
}

#[tokio::test]
async fn test_list_returns_newest_first_and_pages() {
    let app = TestApp::with_classifier(CountingClassifier::new(0)).await;
    let token = app.token().await;

    let n = 4;
    for i in 0..n {
        let (status, _) = app.predict(Some(&token), &sample(4.0 + i as f64)).await;
        assert_eq!(status, StatusCode::OK);
    }

    let (status, body) = app.list(Some(&token), &format!("?limit={n}&offset=0")).await;
    assert_eq!(status, StatusCode::OK);
    let records = body.as_array().unwrap();
    assert_eq!(records.len(), n);

    let created: Vec<&str> = records
        .iter()
        .map(|r| r["created_at"].as_str().unwrap())
        .collect();
    assert!(created.windows(2).all(|w| w[0] >= w[1]));
    assert_eq!(records[0]["sepal_length"], 7.0);
    assert_eq!(records[0]["predicted_class"], "setosa");
    for key in ["id", "sepal_width", "petal_length", "petal_width"] {
        assert!(records[0].get(key).is_some(), "missing {key}");
    }

    let (status, body) = app.list(Some(&token), &format!("?limit={n}&offset={n}")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!([]));

    let (_, body) = app.list(Some(&token), "?limit=2&offset=1").await;
    let page = body.as_array().unwrap();
    assert_eq!(page.len(), 2);
    assert_eq!(page[0]["sepal_length"], 6.0);
}

#[tokio::test]
async fn test_list_defaults_to_ten() {
    let app = TestApp::with_classifier(CountingClassifier::new(0)).await;
    let token = app.token().await;

    for i in 0..12 {
        app.predict(Some(&token), &sample(i as f64)).await;
    }

    let (_, body) = app.list(Some(&token), "").await;
    assert_eq!(body.as_array().unwrap().len(), 10);

    let (_, body) = app.list(Some(&token), "?limit=abc").await;
    assert_eq!(body.as_array().unwrap().len(), 10);
}

#[tokio::test]
async fn test_list_requires_token() {
    let app = TestApp::with_classifier(CountingClassifier::new(0)).await;

    let (status, body) = app.list(None, "").await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body, json!({"error": "Token is missing"}));

    let (status, _) = app.list(Some("not.a.token"), "").await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}
