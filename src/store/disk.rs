use crate::core::cache::KeyValueCollection;
use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use fjall::{Config, Keyspace, PartitionCreateOptions, PartitionHandle, PersistMode};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tracing::debug;

const PARTITION_NAME: &str = "residue";

#[derive(Serialize, Deserialize)]
struct CacheEntry {
    value: String,
    expires_at: Option<DateTime<Utc>>,
}

/// Collection persisted in a fjall keyspace; entries carry their own expiry.
pub struct DiskCollection {
    keyspace: Keyspace,
    partition: PartitionHandle,
}

impl DiskCollection {
    pub fn open(db_path: &Path) -> Result<Self> {
        std::fs::create_dir_all(db_path)?;

        let keyspace = Config::new(db_path).open()?;
        let partition = keyspace.open_partition(PARTITION_NAME, PartitionCreateOptions::default())?;
        Ok(Self {
            keyspace,
            partition,
        })
    }

    fn read(&self, key: &str) -> Result<Option<String>> {
        let Some(raw) = self.partition.get(key)? else {
            debug!("Cache MISS for key: {:?}", key);
            return Ok(None);
        };

        let entry: CacheEntry = serde_json::from_slice(&raw)?;
        if let Some(expires_at) = entry.expires_at {
            if Utc::now() >= expires_at {
                debug!("Cache entry expired for key: {:?}", key);
                self.partition.remove(key)?;
                return Ok(None);
            }
        }
        debug!("Cache HIT for key: {:?}", key);
        Ok(Some(entry.value))
    }

    fn write(&self, key: &str, value: String, ttl: Option<Duration>) -> Result<()> {
        let expires_at = match ttl {
            Some(ttl) => Some(Utc::now() + chrono::Duration::from_std(ttl)?),
            None => None,
        };
        let entry = CacheEntry { value, expires_at };
        self.partition.insert(key, serde_json::to_vec(&entry)?)?;
        self.keyspace.persist(PersistMode::SyncAll)?;
        debug!("Cache PUT for key: {:?}", key);
        Ok(())
    }
}

#[async_trait]
impl KeyValueCollection for DiskCollection {
    async fn get(&self, key: &str) -> Option<String> {
        match self.read(key) {
            Ok(value) => value,
            Err(e) => {
                debug!("DiskCollection get error for {:?}: {}", key, e);
                None
            }
        }
    }

    async fn put(&self, key: &str, value: String, ttl: Option<Duration>) {
        if let Err(e) = self.write(key, value, ttl) {
            debug!("DiskCollection put error for {:?}: {}", key, e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;
    use tokio::time::sleep;

    #[tokio::test]
    async fn test_disk_cache_get_put() {
        let dir = tempdir().unwrap();
        let cache = DiskCollection::open(dir.path()).unwrap();

        assert!(cache.get("key1").await.is_none());

        cache.put("key1", "123".to_string(), None).await;

        assert_eq!(cache.get("key1").await, Some("123".to_string()));
        assert!(cache.get("key2").await.is_none());
    }

    #[tokio::test]
    async fn test_disk_cache_ttl_expiration() {
        let dir = tempdir().unwrap();
        let cache = DiskCollection::open(dir.path()).unwrap();

        cache
            .put("key1", "123".to_string(), Some(Duration::from_millis(10)))
            .await;
        assert_eq!(cache.get("key1").await, Some("123".to_string()));

        sleep(Duration::from_millis(20)).await;
        assert!(cache.get("key1").await.is_none());
    }

    #[tokio::test]
    async fn test_disk_cache_survives_reopen() {
        let dir = tempdir().unwrap();
        {
            let cache = DiskCollection::open(dir.path()).unwrap();
            cache
                .put("key1", "123".to_string(), Some(Duration::from_secs(60)))
                .await;
        }

        let cache = DiskCollection::open(dir.path()).unwrap();
        assert_eq!(cache.get("key1").await, Some("123".to_string()));
    }

    #[tokio::test]
    async fn test_corrupt_entry_reads_as_missing() {
        let dir = tempdir().unwrap();
        let cache = DiskCollection::open(dir.path()).unwrap();

        cache.partition.insert("key1", "not an entry").unwrap();
        assert!(cache.get("key1").await.is_none());
    }
}
