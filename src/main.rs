//! Iris Classifier Serving - Main Entry Point
//!
//! Loads the model artifact, opens the prediction store and serves the HTTP API.

use anyhow::{Context, Result};
use iris_serving::{
    config::{AppConfig, LoggingConfig},
    handlers::AppState,
    load_classifier,
    metrics::{MetricsReporter, ServiceMetrics},
    start_server, SqlitePredictionStore,
};
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

fn init_logging(config: &LoggingConfig) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.level))
        .context("Invalid log level")?;

    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    if config.format.eq_ignore_ascii_case("json") {
        builder.json().init();
    } else {
        builder.init();
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let config = AppConfig::load()?;
    init_logging(&config.logging)?;

    info!("Starting Iris classifier service");
    info!(auth = ?config.auth, model = %config.model.path, "Configuration loaded successfully");

    // No model, no service.
    let classifier = load_classifier(&config.model.path)
        .with_context(|| format!("Cannot start without model artifact {}", config.model.path))?;

    let store = SqlitePredictionStore::connect(&config.database.url, config.database.max_connections)
        .await
        .context("Failed to open prediction store")?;

    let metrics = Arc::new(ServiceMetrics::new());
    if config.metrics.report_interval_secs > 0 {
        let reporter = MetricsReporter::new(metrics.clone(), config.metrics.report_interval_secs);
        tokio::spawn(reporter.start());
    }

    let state = AppState::new(&config, classifier, Arc::new(store.clone()), metrics.clone());

    start_server(&config.bind_address(), state).await?;

    metrics.print_summary();
    store.close().await;
    Ok(())
}
