use crate::{KeyedStore, StoreError};
use async_trait::async_trait;
use chrono::Utc;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::SqlitePool;
use std::str::FromStr;
use std::time::Duration;
use tracing::info;

const INIT_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS kv_store (
    key TEXT PRIMARY KEY NOT NULL,
    value BLOB NOT NULL,
    expires_at TEXT NULL
);
CREATE INDEX IF NOT EXISTS idx_kv_store_expires_at ON kv_store(expires_at);
"#;

/// Durable `KeyedStore` backed by a SQLite table, for deployments that must survive a restart.
///
/// Expired rows are swept lazily on `get`/`list`, same discipline as [`crate::MemoryStore`];
/// there is no background reaper, since a missed sweep only costs a little disk, never
/// correctness.
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    pub async fn connect(database_url: &str) -> Result<Self, StoreError> {
        let opts = SqliteConnectOptions::from_str(database_url)
            .map_err(|e| StoreError::Unavailable(format!("invalid database url: {e}")))?
            .create_if_missing(true)
            .busy_timeout(Duration::from_secs(5))
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal);

        let pool = SqlitePoolOptions::new()
            .connect_with(opts)
            .await
            .map_err(|e| StoreError::Unavailable(format!("connect failed: {e}")))?;

        sqlx::query(INIT_SQL)
            .execute(&pool)
            .await
            .map_err(|e| StoreError::Unavailable(format!("schema init failed: {e}")))?;

        info!("SqliteStore initialized at {}", database_url);
        Ok(Self { pool })
    }
}

#[async_trait]
impl KeyedStore for SqliteStore {
    async fn put(&self, key: &str, value: Vec<u8>, ttl: Option<Duration>) -> Result<(), StoreError> {
        let expires_at = ttl
            .and_then(|d| chrono::Duration::from_std(d).ok())
            .map(|d| (Utc::now() + d).to_rfc3339());

        sqlx::query(
            "INSERT INTO kv_store (key, value, expires_at) VALUES (?1, ?2, ?3)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value, expires_at = excluded.expires_at",
        )
        .bind(key)
        .bind(value)
        .bind(expires_at)
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::Unavailable(e.to_string()))?;
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        let row: Option<(Vec<u8>, Option<String>)> =
            sqlx::query_as("SELECT value, expires_at FROM kv_store WHERE key = ?1")
                .bind(key)
                .fetch_optional(&self.pool)
                .await
                .map_err(|e| StoreError::Unavailable(e.to_string()))?;

        let Some((value, expires_at)) = row else {
            return Ok(None);
        };

        if is_expired(expires_at.as_deref()) {
            self.delete(key).await?;
            return Ok(None);
        }

        Ok(Some(value))
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        sqlx::query("DELETE FROM kv_store WHERE key = ?1")
            .bind(key)
            .execute(&self.pool)
            .await
            .map_err(|e| StoreError::Unavailable(e.to_string()))?;
        Ok(())
    }

    async fn take(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        // DELETE ... RETURNING is one statement, so SQLite's own write-serialization makes the
        // read-and-remove atomic: two concurrent takes can never both see the row.
        let row: Option<(Vec<u8>, Option<String>)> =
            sqlx::query_as("DELETE FROM kv_store WHERE key = ?1 RETURNING value, expires_at")
                .bind(key)
                .fetch_optional(&self.pool)
                .await
                .map_err(|e| StoreError::Unavailable(e.to_string()))?;

        let Some((value, expires_at)) = row else {
            return Ok(None);
        };

        if is_expired(expires_at.as_deref()) {
            return Ok(None);
        }

        Ok(Some(value))
    }

    async fn list(&self, prefix: &str) -> Result<Vec<String>, StoreError> {
        let like_pattern = format!("{}%", prefix.replace('%', "\\%").replace('_', "\\_"));
        let rows: Vec<(String, Option<String>)> = sqlx::query_as(
            "SELECT key, expires_at FROM kv_store WHERE key LIKE ?1 ESCAPE '\\'",
        )
        .bind(like_pattern)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| StoreError::Unavailable(e.to_string()))?;

        let mut live = Vec::with_capacity(rows.len());
        for (key, expires_at) in rows {
            if is_expired(expires_at.as_deref()) {
                self.delete(&key).await?;
                continue;
            }
            live.push(key);
        }
        Ok(live)
    }
}

fn is_expired(expires_at: Option<&str>) -> bool {
    match expires_at {
        None => false,
        Some(raw) => chrono::DateTime::parse_from_rfc3339(raw)
            .map(|at| Utc::now() >= at)
            .unwrap_or(false),
    }
}
