//! Local checksum cache repository
//!
//! Maps normalized file paths to content checksums so a rescan only hashes
//! files it has not seen before. The checksum column is unique: at most one
//! local file is canonical per checksum, and a second physical file hashing
//! to an existing checksum is a conflict the scanner must surface, never a
//! silent overwrite.

use std::path::Path;

use anyhow::Result;
use sqlx::SqlitePool;

use super::{get_metadata, set_metadata};

/// A cached (path, checksum) pair
#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct LocalFileRecord {
    pub file_path: String,
    pub crc32: String,
}

/// Repository over the `crc32_cache` table
#[derive(Clone)]
pub struct ChecksumCache {
    pool: SqlitePool,
}

impl ChecksumCache {
    /// Open the cache database, creating the schema if needed.
    pub async fn open(path: &Path) -> Result<Self> {
        let pool = super::connect(path).await?;
        Self::migrate(&pool).await?;
        Ok(Self { pool })
    }

    /// In-memory cache for tests.
    pub async fn open_in_memory() -> Result<Self> {
        let pool = super::connect_in_memory().await?;
        Self::migrate(&pool).await?;
        Ok(Self { pool })
    }

    async fn migrate(pool: &SqlitePool) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS crc32_cache (
                file_path TEXT PRIMARY KEY,
                crc32 TEXT UNIQUE
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

    /// Cached checksum for a normalized path, if any.
    pub async fn checksum_for_path(&self, path: &str) -> Result<Option<String>> {
        let crc = sqlx::query_scalar::<_, String>(
            "SELECT crc32 FROM crc32_cache WHERE file_path = ?",
        )
        .bind(path)
        .fetch_optional(&self.pool)
        .await?;
        Ok(crc)
    }

    /// Path currently owning a checksum, if any.
    pub async fn path_for_checksum(&self, crc32: &str) -> Result<Option<String>> {
        let path = sqlx::query_scalar::<_, String>(
            "SELECT file_path FROM crc32_cache WHERE crc32 = ?",
        )
        .bind(crc32)
        .fetch_optional(&self.pool)
        .await?;
        Ok(path)
    }

    /// Record a freshly computed (path, checksum) pair.
    ///
    /// Callers must have checked [`path_for_checksum`] first; inserting a
    /// checksum owned by another path violates the uniqueness constraint.
    pub async fn insert(&self, path: &str, crc32: &str) -> Result<()> {
        sqlx::query("INSERT OR REPLACE INTO crc32_cache (file_path, crc32) VALUES (?, ?)")
            .bind(path)
            .bind(crc32)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Move a record to a new path after a successful rename.
    pub async fn update_path(&self, old_path: &str, new_path: &str) -> Result<()> {
        sqlx::query("UPDATE crc32_cache SET file_path = ? WHERE file_path = ?")
            .bind(new_path)
            .bind(old_path)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Whether a normalized path is already recorded.
    pub async fn contains_path(&self, path: &str) -> Result<bool> {
        let count =
            sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM crc32_cache WHERE file_path = ?")
                .bind(path)
                .fetch_one(&self.pool)
                .await?;
        Ok(count > 0)
    }

    /// All cached records, ordered by path.
    pub async fn all_records(&self) -> Result<Vec<LocalFileRecord>> {
        let records = sqlx::query_as::<_, LocalFileRecord>(
            "SELECT file_path, crc32 FROM crc32_cache ORDER BY file_path",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(records)
    }

    pub async fn get_metadata(&self, key: &str) -> Result<Option<String>> {
        get_metadata(&self.pool, key).await
    }

    pub async fn set_metadata(&self, key: &str, value: &str) -> Result<()> {
        set_metadata(&self.pool, key, value).await
    }
}
