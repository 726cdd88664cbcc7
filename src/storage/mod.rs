//! # Attachment Name Cache
//!
//! Persistent SQLite table remembering the original file name of every
//! attachment this client uploaded, keyed by the URL the server returned.
//! The server stores files under UUID names; this cache lets them be shown
//! under the name the user picked.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use webchat_sync::storage::NameCacheDb;
//!
//! # async fn demo() -> webchat_sync::shared::error::Result<()> {
//! let db = NameCacheDb::open(NameCacheDb::default_path()).await?;
//! db.remember("https://cdn/0b7e.pdf", "Quarterly.pdf").await?;
//! let names = db.load_all().await?;
//! # Ok(())
//! # }
//! ```

use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crate::shared::config::AppConfig;
use crate::shared::error::{Result, SyncError};

/// SQLite-backed attachment name store
#[derive(Debug, Clone)]
pub struct NameCacheDb {
    pool: SqlitePool,
}

impl NameCacheDb {
    /// Open or create the cache file
    pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .map_err(|e| SyncError::Storage(e.to_string()))?;
        }
        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(2)
            .connect_with(options)
            .await?;
        sqlx::query("PRAGMA journal_mode=WAL").execute(&pool).await?;
        tracing::info!("[CACHE] Opened attachment name cache at {}", path.display());
        Self::init(pool).await
    }

    /// Private in-memory cache, gone when dropped
    pub async fn open_in_memory() -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect("sqlite::memory:")
            .await?;
        Self::init(pool).await
    }

    pub fn default_path() -> PathBuf {
        AppConfig::default_name_cache_path()
    }

    async fn init(pool: SqlitePool) -> Result<Self> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS attachment_names (
                url TEXT PRIMARY KEY,
                name TEXT NOT NULL,
                updated_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
            )",
        )
        .execute(&pool)
        .await?;
        Ok(Self { pool })
    }

    /// Every remembered URL with its name
    pub async fn load_all(&self) -> Result<HashMap<String, String>> {
        let rows: Vec<(String, String)> = sqlx::query_as("SELECT url, name FROM attachment_names")
            .fetch_all(&self.pool)
            .await?;
        tracing::debug!("[CACHE] Loaded {} attachment names", rows.len());
        Ok(rows.into_iter().collect())
    }

    pub async fn get(&self, url: &str) -> Result<Option<String>> {
        let row: Option<(String,)> = sqlx::query_as("SELECT name FROM attachment_names WHERE url = ?")
            .bind(url)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(|(name,)| name))
    }

    /// Insert or overwrite the name for `url`
    pub async fn remember(&self, url: &str, name: &str) -> Result<()> {
        sqlx::query(
            "INSERT INTO attachment_names (url, name) VALUES (?, ?)
             ON CONFLICT(url) DO UPDATE SET name = excluded.name, updated_at = CURRENT_TIMESTAMP",
        )
        .bind(url)
        .bind(name)
        .execute(&self.pool)
        .await?;
        tracing::debug!("[CACHE] Remembered '{}' for {}", name, url);
        Ok(())
    }
}
