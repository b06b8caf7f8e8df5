//! SQLite Durable Store
//!
//! sqlx-backed system of record. Rows are converted column by column into the
//! JSON [`Row`] shape the entity codecs consume.

use async_trait::async_trait;
use serde_json::{Number, Value};
use sqlx::sqlite::{SqlitePool, SqlitePoolOptions, SqliteRow};
use sqlx::{Column, Row as _};
use tracing::debug;

use crate::entity::{EntityKey, Row};
use crate::error::{CacheError, Result};
use crate::store::DurableStore;

/// Durable store over a SQLite connection pool.
#[derive(Debug, Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Wraps an existing pool.
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Opens a pool for `url`.
    ///
    /// In-memory databases are private to each connection and vanish with
    /// it, so `sqlite::memory:` URLs get a single connection that is never
    /// recycled. Use `sqlite://path.db?mode=rwc` to create a file.
    pub async fn connect(url: &str) -> Result<Self> {
        let mut options = SqlitePoolOptions::new().max_connections(5);
        if url.contains(":memory:") {
            options = options
                .max_connections(1)
                .idle_timeout(None)
                .max_lifetime(None);
        }
        let pool = options.connect(url).await?;
        Ok(Self::new(pool))
    }
}

/// Collection names are interpolated into SQL, so only plain identifiers pass.
fn validate_identifier(name: &str) -> Result<()> {
    let mut chars = name.chars();
    let valid_start = chars
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_');
    if valid_start && chars.all(|c| c.is_ascii_alphanumeric() || c == '_') {
        Ok(())
    } else {
        Err(CacheError::InvalidRequest(format!(
            "invalid collection name: {:?}",
            name
        )))
    }
}

fn row_to_json(row: &SqliteRow) -> Result<Row> {
    let mut out = Row::new();
    for (idx, column) in row.columns().iter().enumerate() {
        let value = if let Ok(v) = row.try_get::<Option<i64>, _>(idx) {
            v.map(Value::from).unwrap_or(Value::Null)
        } else if let Ok(v) = row.try_get::<Option<f64>, _>(idx) {
            v.and_then(Number::from_f64)
                .map(Value::Number)
                .unwrap_or(Value::Null)
        } else if let Ok(v) = row.try_get::<Option<String>, _>(idx) {
            v.map(Value::String).unwrap_or(Value::Null)
        } else {
            return Err(CacheError::Codec(format!(
                "unsupported type in column {}",
                column.name()
            )));
        };
        out.insert(column.name().to_string(), value);
    }
    Ok(out)
}

#[async_trait]
impl DurableStore for SqliteStore {
    async fn query_by_id(&self, collection: &str, id: i64) -> Result<Row> {
        validate_identifier(collection)?;
        let sql = format!("SELECT * FROM {} WHERE id = ?", collection);

        let row = sqlx::query(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| CacheError::NotFound(EntityKey::new(collection, id).to_string()))?;
        row_to_json(&row)
    }

    async fn execute(&self, statement: &str) -> Result<()> {
        let result = sqlx::query(statement).execute(&self.pool).await?;
        debug!(rows = result.rows_affected(), "statement executed");
        Ok(())
    }
}
