//! Episode index repository
//!
//! Durable mirror of the last full catalog refresh: checksum → (title,
//! page link), plus a single `last_update` timestamp written only after a
//! successful full pass. A refresh is authoritative for every entry it
//! produces (replace-on-conflict), never an incremental merge.

use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

use anyhow::Result;
use chrono::NaiveDateTime;
use sqlx::SqlitePool;

use super::{TIMESTAMP_FORMAT, get_metadata, now_timestamp, set_metadata};

const LAST_UPDATE_KEY: &str = "last_update";

/// Repository over the `episodes_index` table
#[derive(Clone)]
pub struct EpisodeIndex {
    pool: SqlitePool,
}

impl EpisodeIndex {
    /// Open the index database, creating the schema if needed.
    pub async fn open(path: &Path) -> Result<Self> {
        let pool = super::connect(path).await?;
        Self::migrate(&pool).await?;
        Ok(Self { pool })
    }

    /// In-memory index for tests.
    pub async fn open_in_memory() -> Result<Self> {
        let pool = super::connect_in_memory().await?;
        Self::migrate(&pool).await?;
        Ok(Self { pool })
    }

    async fn migrate(pool: &SqlitePool) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS episodes_index (
                crc32 TEXT PRIMARY KEY,
                title TEXT,
                page_link TEXT
            )
            "#,
        )
        .execute(pool)
        .await?;
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS metadata (
                key TEXT PRIMARY KEY,
                value TEXT
            )
            "#,
        )
        .execute(pool)
        .await?;
        Ok(())
    }

    /// Idempotent per-entry upsert.
    pub async fn upsert(&self, crc32: &str, title: &str, page_link: &str) -> Result<()> {
        sqlx::query(
            "INSERT OR REPLACE INTO episodes_index (crc32, title, page_link) VALUES (?, ?, ?)",
        )
        .bind(crc32)
        .bind(title)
        .bind(page_link)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Canonical title for a checksum, if indexed.
    pub async fn lookup(&self, crc32: &str) -> Result<Option<String>> {
        let title = sqlx::query_scalar::<_, String>(
            "SELECT title FROM episodes_index WHERE crc32 = ?",
        )
        .bind(crc32)
        .fetch_optional(&self.pool)
        .await?;
        Ok(title)
    }

    /// Full checksum → title map, used by the rename workflow.
    pub async fn title_map(&self) -> Result<HashMap<String, String>> {
        let rows = sqlx::query_as::<_, (String, String)>(
            "SELECT crc32, title FROM episodes_index",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().collect())
    }

    pub async fn entry_count(&self) -> Result<i64> {
        let count = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM episodes_index")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    /// Timestamp of the last successful full refresh, if any.
    pub async fn last_update(&self) -> Result<Option<String>> {
        get_metadata(&self.pool, LAST_UPDATE_KEY).await
    }

    /// Mark a full refresh pass as complete.
    pub async fn touch_last_update(&self) -> Result<()> {
        set_metadata(&self.pool, LAST_UPDATE_KEY, &now_timestamp()).await
    }

    /// Whether the index is older than `max_age` (or was never refreshed).
    pub async fn is_stale(&self, max_age: Duration) -> Result<bool> {
        let Some(stamp) = self.last_update().await? else {
            return Ok(true);
        };
        let Ok(parsed) = NaiveDateTime::parse_from_str(&stamp, TIMESTAMP_FORMAT) else {
            // Unparseable timestamp means we cannot trust the index age
            return Ok(true);
        };
        let age = chrono::Local::now().naive_local() - parsed;
        Ok(age > chrono::Duration::from_std(max_age)?)
    }
}
