//! Durable key-value backend persisted in SQLite.

use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;

use anyhow::Context;
use async_trait::async_trait;
use chrono::Utc;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Row, SqlitePool};
use tokio::sync::Mutex;

use crate::error::LocalStoreError;
use crate::local::KeyValueStore;

/// SQLite-backed [`KeyValueStore`] using a single `kv` table.
///
/// This struct is cheap to clone and is safe to share across threads. The
/// database is opened and the table created lazily on first use.
#[derive(Debug, Clone)]
pub struct SqliteKeyValueStore {
    /// Database file; `None` for a private in-memory database.
    path: Option<PathBuf>,
    max_connections: u32,
    pool: Arc<Mutex<Option<SqlitePool>>>,
}

impl SqliteKeyValueStore {
    /// Store backed by the database file at `path` (created if missing).
    pub fn open(path: impl Into<PathBuf>) -> Self {
        Self {
            path: Some(path.into()),
            max_connections: 4,
            pool: Arc::new(Mutex::new(None)),
        }
    }

    /// Private in-memory database, alive as long as this store.
    pub fn in_memory() -> Self {
        Self {
            path: None,
            // Every connection to `:memory:` is a distinct database.
            max_connections: 1,
            pool: Arc::new(Mutex::new(None)),
        }
    }

    /// Initialize the database connection (called lazily on first use).
    async fn ensure_initialized(&self) -> anyhow::Result<SqlitePool> {
        let mut pool_guard = self.pool.lock().await;
        if let Some(pool) = pool_guard.as_ref() {
            return Ok(pool.clone());
        }

        let options = match self.path.as_deref() {
            Some(path) => {
                if let Some(parent) = path.parent() {
                    std::fs::create_dir_all(parent).with_context(|| {
                        format!("failed to create store directory at {:?}", parent)
                    })?;
                }
                SqliteConnectOptions::new()
                    .filename(path)
                    .create_if_missing(true)
            }
            None => SqliteConnectOptions::from_str("sqlite::memory:")
                .context("invalid in-memory SQLite options")?,
        };

        let pool = SqlitePoolOptions::new()
            .max_connections(self.max_connections)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await
            .with_context(|| format!("failed to open SQLite store at {:?}", self.path))?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS kv (
                key        TEXT PRIMARY KEY,
                value      TEXT NOT NULL,
                updated_at TEXT NOT NULL
            )
            "#,
        )
        .execute(&pool)
        .await
        .context("failed to create kv table")?;

        *pool_guard = Some(pool.clone());
        Ok(pool)
    }

    /// Close the pool; the next call reopens it.
    pub async fn close(&self) {
        if let Some(pool) = self.pool.lock().await.take() {
            pool.close().await;
        }
    }
}

#[async_trait]
impl KeyValueStore for SqliteKeyValueStore {
    async fn get(&self, key: &str) -> Result<Option<String>, LocalStoreError> {
        let pool = self.ensure_initialized().await?;
        let row = sqlx::query(
            r#"
            SELECT value
            FROM kv
            WHERE key = ?1
            "#,
        )
        .bind(key)
        .fetch_optional(&pool)
        .await
        .with_context(|| format!("failed to read key '{key}'"))?;

        match row {
            Some(row) => {
                let value: String = row
                    .try_get("value")
                    .context("invalid value column in kv")?;
                Ok(Some(value))
            }
            None => Ok(None),
        }
    }

    async fn set(&self, key: &str, value: String) -> Result<(), LocalStoreError> {
        let pool = self.ensure_initialized().await?;
        sqlx::query(
            r#"
            INSERT INTO kv (key, value, updated_at)
            VALUES (?1, ?2, ?3)
            ON CONFLICT(key)
            DO UPDATE SET
                value = excluded.value,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(key)
        .bind(&value)
        .bind(Utc::now().to_rfc3339())
        .execute(&pool)
        .await
        .with_context(|| format!("failed to upsert key '{key}'"))?;
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<(), LocalStoreError> {
        let pool = self.ensure_initialized().await?;
        sqlx::query("DELETE FROM kv WHERE key = ?1")
            .bind(key)
            .execute(&pool)
            .await
            .with_context(|| format!("failed to delete key '{key}'"))?;
        Ok(())
    }

    async fn keys(&self) -> Result<Vec<String>, LocalStoreError> {
        let pool = self.ensure_initialized().await?;
        let rows = sqlx::query("SELECT key FROM kv ORDER BY key ASC")
            .fetch_all(&pool)
            .await
            .context("failed to list keys")?;

        let mut keys = Vec::with_capacity(rows.len());
        for row in rows {
            keys.push(row.try_get::<String, _>("key").context("invalid key column in kv")?);
        }
        Ok(keys)
    }
}

/// Resolve the path of the store database:
/// `{data_dir}/crm-sync/store.db`, `data_dir` defaulting to the OS data dir.
pub fn default_store_path(data_dir: Option<&Path>) -> anyhow::Result<PathBuf> {
    let base = match data_dir {
        Some(dir) => dir.to_path_buf(),
        None => dirs::data_dir()
            .or_else(|| {
                dirs::home_dir().map(|mut h| {
                    h.push(".local");
                    h.push("share");
                    h
                })
            })
            .context("failed to resolve OS app data directory - tried data_dir() and home_dir()/.local/share")?,
    };

    let mut path = base;
    path.push("crm-sync");
    path.push("store.db");
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn explicit_data_dir_wins() {
        let path = default_store_path(Some(Path::new("/var/lib/crm"))).unwrap();
        assert_eq!(path, PathBuf::from("/var/lib/crm/crm-sync/store.db"));
    }

    #[tokio::test]
    async fn in_memory_store_upserts() {
        let store = SqliteKeyValueStore::in_memory();
        assert_eq!(store.get("k").await.unwrap(), None);

        store.set("k", "1".to_string()).await.unwrap();
        store.set("k", "2".to_string()).await.unwrap();
        assert_eq!(store.get("k").await.unwrap().as_deref(), Some("2"));
        assert_eq!(store.keys().await.unwrap(), vec!["k".to_string()]);

        store.remove("k").await.unwrap();
        assert_eq!(store.get("k").await.unwrap(), None);
    }
}
