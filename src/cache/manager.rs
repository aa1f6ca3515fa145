//! `CacheManager`: combines the memory and persistent tiers behind the
//! typed `get`/`set`/invalidate surface the upstream adapter uses.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use serde::{de::DeserializeOwned, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::error::{Error, Result};

use super::memory::MemoryCache;
use super::persistent::PersistentCache;
use super::keys;

pub struct CacheManager {
    memory: Mutex<MemoryCache>,
    persistent: PersistentCache,
}

impl CacheManager {
    pub async fn open(
        cache_dir: &PathBuf,
        memory_bytes: usize,
        persistent_bytes: u64,
    ) -> Result<Arc<Self>> {
        tokio::fs::create_dir_all(cache_dir)
            .await
            .map_err(Error::Io)?;
        let db_path = cache_dir.join("blob_cache.sqlite");
        let persistent = PersistentCache::open(&db_path, persistent_bytes).await?;
        Ok(Arc::new(Self {
            memory: Mutex::new(MemoryCache::new(50_000, memory_bytes)),
            persistent,
        }))
    }

    /// Read a JSON-serializable value from the memory tier.
    pub async fn get_json<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let bytes = self.memory.lock().await.get(key)?;
        match serde_json::from_slice(&bytes) {
            Ok(value) => Some(value),
            Err(e) => {
                warn!(key, error = %e, "dropping corrupt cache entry");
                None
            }
        }
    }

    pub async fn set_json<T: Serialize>(&self, key: &str, value: &T, ttl: Duration) {
        let Ok(bytes) = serde_json::to_vec(value) else {
            return;
        };
        let as_json = serde_json::to_value(value).unwrap_or(serde_json::Value::Null);
        let size = MemoryCache::estimate_size(&as_json);
        self.memory.lock().await.set(key, bytes, size, ttl);
    }

    /// Read raw bytes (a message body) from the persistent tier.
    pub async fn get_body(&self, sender_id: &str, folder: &str, uid: u32) -> Result<Option<Vec<u8>>> {
        self.persistent
            .get(&keys::body(sender_id, folder, uid))
            .await
    }

    pub async fn set_body(&self, sender_id: &str, folder: &str, uid: u32, raw: &[u8]) -> Result<()> {
        self.persistent
            .set(
                &keys::body(sender_id, folder, uid),
                raw,
                keys::TTL_BODY.as_secs() as i64,
            )
            .await
    }

    /// Invalidate every cache entry scoped to a folder: its message
    /// list, status, every message/body cached under it, and the
    /// sender's folder list (whose entries carry per-folder UIDNEXT/
    /// totals that a mutation can also make stale).
    pub async fn invalidate_folder(&self, sender_id: &str, folder: &str) -> Result<()> {
        let pattern = keys::folder_scope_pattern(sender_id, folder);
        let removed = self.memory.lock().await.delete_pattern(&pattern)?;
        self.memory.lock().await.remove(&keys::folders(sender_id));
        debug!(sender_id, folder, removed, "invalidated folder cache scope");
        let like = format!("body:{sender_id}:{folder}:%");
        self.persistent.delete_pattern(&like).await?;
        Ok(())
    }

    /// Invalidate a single message's metadata and body cache.
    pub async fn invalidate_message(&self, sender_id: &str, folder: &str, uid: u32) -> Result<()> {
        let pattern = keys::message_scope_pattern(sender_id, folder, uid);
        self.memory.lock().await.delete_pattern(&pattern)?;
        self.persistent
            .remove(&keys::body(sender_id, folder, uid))
            .await?;
        Ok(())
    }

    /// Invalidate everything cached for a sender, used after `sync`
    /// and after folder create/delete.
    pub async fn invalidate_sender(&self, sender_id: &str) -> Result<()> {
        let pattern = keys::sender_scope_pattern(sender_id);
        self.memory.lock().await.delete_pattern(&pattern)?;
        let like = format!("body:{sender_id}:%");
        self.persistent.delete_pattern(&like).await?;
        Ok(())
    }

    /// Drop all expired entries in both tiers. Called from a periodic
    /// background task.
    pub async fn prune(&self) {
        let memory_pruned = self.memory.lock().await.prune();
        let persistent_pruned = self.persistent.prune().await.unwrap_or(0);
        debug!(memory_pruned, persistent_pruned, "cache prune cycle");
    }

    /// Spawn the periodic prune task, running every 5 minutes.
    pub fn spawn_pruner(self: &Arc<Self>) {
        let manager = Arc::clone(self);
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_secs(5 * 60));
            loop {
                interval.tick().await;
                manager.prune().await;
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn temp_manager() -> (Arc<CacheManager>, PathBuf) {
        let mut dir = std::env::temp_dir();
        dir.push(format!("xmit-gateway-cache-manager-test-{}", uuid::Uuid::new_v4()));
        let manager = CacheManager::open(&dir, 1024 * 1024, 1024 * 1024)
            .await
            .unwrap();
        (manager, dir)
    }

    #[tokio::test]
    async fn json_round_trips_through_memory_tier() {
        let (manager, dir) = temp_manager().await;
        manager
            .set_json("k", &vec!["a".to_string(), "b".to_string()], Duration::from_secs(60))
            .await;
        let value: Option<Vec<String>> = manager.get_json("k").await;
        assert_eq!(value, Some(vec!["a".to_string(), "b".to_string()]));
        let _ = tokio::fs::remove_dir_all(dir).await;
    }

    #[tokio::test]
    async fn body_round_trips_through_persistent_tier() {
        let (manager, dir) = temp_manager().await;
        manager.set_body("s1", "INBOX", 1, b"raw bytes").await.unwrap();
        let body = manager.get_body("s1", "INBOX", 1).await.unwrap();
        assert_eq!(body, Some(b"raw bytes".to_vec()));
        let _ = tokio::fs::remove_dir_all(dir).await;
    }

    #[tokio::test]
    async fn invalidate_folder_clears_message_and_body() {
        let (manager, dir) = temp_manager().await;
        manager.set_json(&keys::message("s1", "INBOX", 1), &1u32, Duration::from_secs(60)).await;
        manager.set_body("s1", "INBOX", 1, b"x").await.unwrap();
        manager.invalidate_folder("s1", "INBOX").await.unwrap();
        assert_eq!(manager.get_json::<u32>(&keys::message("s1", "INBOX", 1)).await, None);
        assert_eq!(manager.get_body("s1", "INBOX", 1).await.unwrap(), None);
        let _ = tokio::fs::remove_dir_all(dir).await;
    }
}
