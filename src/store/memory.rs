use crate::core::cache::KeyValueCollection;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::debug;

struct CacheValue {
    value: String,
    expires_at: Option<Instant>,
}

/// In-memory collection; used when no data directory is available and in tests
pub struct MemoryCollection {
    inner: Arc<Mutex<HashMap<String, CacheValue>>>,
}

impl MemoryCollection {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(HashMap::new())),
        }
    }
}

impl Default for MemoryCollection {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl KeyValueCollection for MemoryCollection {
    async fn get(&self, key: &str) -> Option<String> {
        let mut cache = self.inner.lock().await;
        let expired = match cache.get(key) {
            Some(entry) => entry.expires_at.is_some_and(|expiry| expiry <= Instant::now()),
            None => {
                debug!("Cache MISS for key: {:?}", key);
                return None;
            }
        };
        if expired {
            debug!("Cache entry expired for key: {:?}", key);
            cache.remove(key);
            return None;
        }
        debug!("Cache HIT for key: {:?}", key);
        cache.get(key).map(|entry| entry.value.clone())
    }

    async fn put(&self, key: &str, value: String, ttl: Option<Duration>) {
        let expires_at = ttl.map(|duration| Instant::now() + duration);
        let cache_value = CacheValue { value, expires_at };

        let mut cache = self.inner.lock().await;
        debug!("Cache PUT for key: {:?}", key);
        cache.insert(key.to_string(), cache_value);
    }
}
