//! Persistent cache tier: a content-addressed blob table backed by
//! sqlite, TTL + LRU-by-insertion-order eviction.
//!
//! Used only for the message body cache, which gets a 7-day TTL --
//! long enough that keeping it in memory across restarts is wasteful,
//! and sqlite gives it for free.

use chrono::Utc;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Row, SqlitePool};

use crate::error::{Error, Result};

const DEFAULT_MAX_BYTES: i64 = 200 * 1024 * 1024;
const EVICTION_BATCH: i64 = 100;

pub struct PersistentCache {
    pool: SqlitePool,
    max_bytes: i64,
}

impl PersistentCache {
    pub async fn open(path: &std::path::Path, max_bytes: u64) -> Result<Self> {
        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(4)
            .connect_with(options)
            .await
            .map_err(|e| Error::Internal(format!("opening cache database: {e}")))?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS blob_cache (
                key TEXT PRIMARY KEY,
                value BLOB NOT NULL,
                size INTEGER NOT NULL,
                expires_at INTEGER NOT NULL,
                inserted_at INTEGER NOT NULL
            )",
        )
        .execute(&pool)
        .await
        .map_err(|e| Error::Internal(format!("creating cache table: {e}")))?;

        Ok(Self {
            pool,
            max_bytes: i64::try_from(max_bytes).unwrap_or(DEFAULT_MAX_BYTES),
        })
    }

    pub async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let now = Utc::now().timestamp();
        let row = sqlx::query("SELECT value, expires_at FROM blob_cache WHERE key = ?")
            .bind(key)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| Error::Internal(format!("cache read: {e}")))?;

        let Some(row) = row else {
            return Ok(None);
        };
        let expires_at: i64 = row.try_get("expires_at").unwrap_or(0);
        if expires_at <= now {
            self.remove(key).await?;
            return Ok(None);
        }
        let value: Vec<u8> = row
            .try_get("value")
            .map_err(|e| Error::Internal(format!("cache read: {e}")))?;
        Ok(Some(value))
    }

    pub async fn set(&self, key: &str, value: &[u8], ttl_secs: i64) -> Result<()> {
        let now = Utc::now().timestamp();
        let size = i64::try_from(value.len()).unwrap_or(i64::MAX);

        sqlx::query("DELETE FROM blob_cache WHERE expires_at <= ?")
            .bind(now)
            .execute(&self.pool)
            .await
            .map_err(|e| Error::Internal(format!("cache prune: {e}")))?;

        sqlx::query(
            "INSERT INTO blob_cache (key, value, size, expires_at, inserted_at)
             VALUES (?, ?, ?, ?, ?)
             ON CONFLICT(key) DO UPDATE SET
                value = excluded.value, size = excluded.size,
                expires_at = excluded.expires_at, inserted_at = excluded.inserted_at",
        )
        .bind(key)
        .bind(value)
        .bind(size)
        .bind(now + ttl_secs)
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(|e| Error::Internal(format!("cache write: {e}")))?;

        self.evict_to_fit().await
    }

    async fn evict_to_fit(&self) -> Result<()> {
        loop {
            let total: i64 = sqlx::query("SELECT COALESCE(SUM(size), 0) AS total FROM blob_cache")
                .fetch_one(&self.pool)
                .await
                .map_err(|e| Error::Internal(format!("cache stats: {e}")))?
                .try_get("total")
                .unwrap_or(0);

            if total <= self.max_bytes {
                return Ok(());
            }

            let deleted = sqlx::query(
                "DELETE FROM blob_cache WHERE key IN (
                    SELECT key FROM blob_cache ORDER BY inserted_at ASC LIMIT ?
                )",
            )
            .bind(EVICTION_BATCH)
            .execute(&self.pool)
            .await
            .map_err(|e| Error::Internal(format!("cache eviction: {e}")))?
            .rows_affected();

            if deleted == 0 {
                return Ok(());
            }
        }
    }

    pub async fn remove(&self, key: &str) -> Result<()> {
        sqlx::query("DELETE FROM blob_cache WHERE key = ?")
            .bind(key)
            .execute(&self.pool)
            .await
            .map_err(|e| Error::Internal(format!("cache delete: {e}")))?;
        Ok(())
    }

    /// SQL-LIKE-style pattern delete (`%` wildcard).
    pub async fn delete_pattern(&self, like_pattern: &str) -> Result<u64> {
        let result = sqlx::query("DELETE FROM blob_cache WHERE key LIKE ?")
            .bind(like_pattern)
            .execute(&self.pool)
            .await
            .map_err(|e| Error::Internal(format!("cache pattern delete: {e}")))?;
        Ok(result.rows_affected())
    }

    pub async fn prune(&self) -> Result<u64> {
        let now = Utc::now().timestamp();
        let result = sqlx::query("DELETE FROM blob_cache WHERE expires_at <= ?")
            .bind(now)
            .execute(&self.pool)
            .await
            .map_err(|e| Error::Internal(format!("cache prune: {e}")))?;
        Ok(result.rows_affected())
    }

    pub async fn stats(&self) -> Result<(i64, i64)> {
        let row = sqlx::query("SELECT COUNT(*) AS entries, COALESCE(SUM(size), 0) AS bytes FROM blob_cache")
            .fetch_one(&self.pool)
            .await
            .map_err(|e| Error::Internal(format!("cache stats: {e}")))?;
        Ok((
            row.try_get("entries").unwrap_or(0),
            row.try_get("bytes").unwrap_or(0),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn open_temp() -> (PersistentCache, tempfile_path::TempPath) {
        let path = tempfile_path::named();
        let cache = PersistentCache::open(path.as_path(), 1024)
            .await
            .unwrap();
        (cache, path)
    }

    /// Sqlite needs a real path; this creates one under the OS temp
    /// directory and removes it on drop.
    mod tempfile_path {
        use std::path::{Path, PathBuf};

        pub struct TempPath(PathBuf);

        impl TempPath {
            #[must_use]
            pub fn as_path(&self) -> &Path {
                &self.0
            }
        }

        impl Drop for TempPath {
            fn drop(&mut self) {
                let _ = std::fs::remove_file(&self.0);
            }
        }

        #[must_use]
        pub fn named() -> TempPath {
            let mut path = std::env::temp_dir();
            path.push(format!("xmit-gateway-cache-test-{}.sqlite", uuid::Uuid::new_v4()));
            TempPath(path)
        }
    }

    #[tokio::test]
    async fn set_and_get_round_trip() {
        let (cache, _path) = open_temp().await;
        cache.set("k", b"hello", 60).await.unwrap();
        assert_eq!(cache.get("k").await.unwrap(), Some(b"hello".to_vec()));
    }

    #[tokio::test]
    async fn expired_entries_are_removed_on_get() {
        let (cache, _path) = open_temp().await;
        cache.set("k", b"hello", -1).await.unwrap();
        assert_eq!(cache.get("k").await.unwrap(), None);
    }

    #[tokio::test]
    async fn delete_pattern_supports_like_wildcard() {
        let (cache, _path) = open_temp().await;
        cache.set("body:s1:INBOX:1", b"a", 60).await.unwrap();
        cache.set("body:s1:INBOX:2", b"b", 60).await.unwrap();
        cache.set("body:s1:Sent:1", b"c", 60).await.unwrap();
        let removed = cache.delete_pattern("body:s1:INBOX:%").await.unwrap();
        assert_eq!(removed, 2);
    }

    #[tokio::test]
    async fn evicts_oldest_when_over_budget() {
        let (cache, _path) = open_temp().await;
        for i in 0..20 {
            cache
                .set(&format!("k{i}"), &vec![0u8; 100], 60)
                .await
                .unwrap();
        }
        let (_, bytes) = cache.stats().await.unwrap();
        assert!(bytes <= 1024);
        assert_eq!(cache.get("k0").await.unwrap(), None);
    }
}
