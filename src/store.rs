//! Persistence store for prediction history.
//!
//! Append-only from the serving path; listed newest first.

use crate::types::prediction::format_timestamp;
use crate::types::{NewPrediction, PredictionRecord};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Pool, Sqlite};
use std::str::FromStr;
use thiserror::Error;
use tracing::info;

/// Storage failures
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("stored timestamp {value:?} is not RFC 3339: {source}")]
    Timestamp {
        value: String,
        source: chrono::ParseError,
    },
}

/// Durable, append-only log of predictions
#[async_trait]
pub trait PredictionStore: Send + Sync {
    /// Create the table if absent
    async fn migrate(&self) -> Result<(), StoreError>;

    /// Write one prediction and return it with its assigned id
    async fn append(&self, prediction: &NewPrediction) -> Result<PredictionRecord, StoreError>;

    /// Newest first, skipping `offset` rows and returning at most `limit`.
    ///
    /// A negative `limit` means no limit; a negative `offset` is treated as 0.
    async fn list(&self, offset: i64, limit: i64) -> Result<Vec<PredictionRecord>, StoreError>;

    /// Total stored predictions
    async fn count(&self) -> Result<i64, StoreError>;
}

const CREATE_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS predictions (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    sepal_length REAL NOT NULL,
    sepal_width REAL NOT NULL,
    petal_length REAL NOT NULL,
    petal_width REAL NOT NULL,
    predicted_class TEXT NOT NULL,
    created_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%f', 'now') || '000Z')
)
"#;

const CREATE_INDEX: &str =
    "CREATE INDEX IF NOT EXISTS idx_predictions_created_at ON predictions (created_at)";

#[derive(Debug, sqlx::FromRow)]
struct PredictionRow {
    id: i64,
    sepal_length: f64,
    sepal_width: f64,
    petal_length: f64,
    petal_width: f64,
    predicted_class: String,
    created_at: String,
}

impl TryFrom<PredictionRow> for PredictionRecord {
    type Error = StoreError;

    fn try_from(row: PredictionRow) -> Result<Self, Self::Error> {
        let created_at = DateTime::parse_from_rfc3339(&row.created_at)
            .map_err(|source| StoreError::Timestamp {
                value: row.created_at.clone(),
                source,
            })?
            .with_timezone(&Utc);

        Ok(PredictionRecord {
            id: row.id,
            sepal_length: row.sepal_length,
            sepal_width: row.sepal_width,
            petal_length: row.petal_length,
            petal_width: row.petal_width,
            predicted_class: row.predicted_class,
            created_at,
        })
    }
}

/// SQLite-backed prediction store
#[derive(Clone)]
pub struct SqlitePredictionStore {
    pool: Pool<Sqlite>,
}

impl SqlitePredictionStore {
    /// Open (creating if missing) the database at `url` and ensure the schema exists
    pub async fn connect(url: &str, max_connections: u32) -> Result<Self, StoreError> {
        let opts = SqliteConnectOptions::from_str(url)?.create_if_missing(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections.max(1))
            .connect_with(opts)
            .await?;

        let store = Self { pool };
        store.migrate().await?;

        info!(url = %url, "Prediction store ready");
        Ok(store)
    }

    /// Private in-memory database, kept alive on a single pooled connection
    pub async fn in_memory() -> Result<Self, StoreError> {
        let opts = SqliteConnectOptions::from_str("sqlite::memory:")?;

        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .min_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(opts)
            .await?;

        let store = Self { pool };
        store.migrate().await?;
        Ok(store)
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}

#[async_trait]
impl PredictionStore for SqlitePredictionStore {
    async fn migrate(&self) -> Result<(), StoreError> {
        sqlx::query(CREATE_TABLE).execute(&self.pool).await?;
        sqlx::query(CREATE_INDEX).execute(&self.pool).await?;
        Ok(())
    }

    async fn append(&self, prediction: &NewPrediction) -> Result<PredictionRecord, StoreError> {
        let features = &prediction.features;
        let created_at = format_timestamp(&prediction.created_at);

        let result = sqlx::query(
            "INSERT INTO predictions \
             (sepal_length, sepal_width, petal_length, petal_width, predicted_class, created_at) \
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(features.sepal_length)
        .bind(features.sepal_width)
        .bind(features.petal_length)
        .bind(features.petal_width)
        .bind(prediction.predicted_class.as_str())
        .bind(created_at.as_str())
        .execute(&self.pool)
        .await?;

        Ok(PredictionRecord {
            id: result.last_insert_rowid(),
            sepal_length: features.sepal_length,
            sepal_width: features.sepal_width,
            petal_length: features.petal_length,
            petal_width: features.petal_width,
            predicted_class: prediction.predicted_class.clone(),
            created_at: prediction.created_at,
        })
    }

    async fn list(&self, offset: i64, limit: i64) -> Result<Vec<PredictionRecord>, StoreError> {
        let rows: Vec<PredictionRow> = sqlx::query_as(
            "SELECT id, sepal_length, sepal_width, petal_length, petal_width, predicted_class, created_at \
             FROM predictions \
             ORDER BY created_at DESC, id DESC \
             LIMIT ? OFFSET ?",
        )
        .bind(limit)
        .bind(offset.max(0))
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(PredictionRecord::try_from).collect()
    }

    async fn count(&self) -> Result<i64, StoreError> {
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM predictions")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }
}
