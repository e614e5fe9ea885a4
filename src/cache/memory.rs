use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};
use std::time::{Duration, Instant};

use async_trait::async_trait;

use super::{Cache, CachedValue};
use crate::error::Result;

struct Entry {
    value: CachedValue,
    expires_at: Option<Instant>,
}

impl Entry {
    fn is_live(&self, now: Instant) -> bool {
        self.expires_at.is_none_or(|at| now < at)
    }
}

/// In-process cache with optional per-entry expiry. Expired entries are dropped when read.
#[derive(Default)]
pub struct MemoryCache {
    entries: Mutex<HashMap<(String, String), Entry>>,
}

impl MemoryCache {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        let now = Instant::now();
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .filter(|e| e.is_live(now))
            .count()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop every entry of `cache_name`.
    pub fn remove_all(&self, cache_name: &str) {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .retain(|(name, _), _| name != cache_name);
    }
}

#[async_trait]
impl Cache for MemoryCache {
    async fn get(&self, cache_name: &str, key: &str) -> Result<Option<CachedValue>> {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        let slot = (cache_name.to_string(), key.to_string());
        match entries.get(&slot) {
            Some(entry) if entry.is_live(Instant::now()) => Ok(Some(entry.value.clone())),
            Some(_) => {
                entries.remove(&slot);
                Ok(None)
            }
            None => Ok(None),
        }
    }

    async fn put(
        &self,
        cache_name: &str,
        key: &str,
        value: CachedValue,
        ttl: Option<Duration>,
    ) -> Result<()> {
        let expires_at = ttl.map(|ttl| Instant::now() + ttl);
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(
                (cache_name.to_string(), key.to_string()),
                Entry { value, expires_at },
            );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn entries_expire() {
        let cache = MemoryCache::new();
        cache
            .put("c", "short", CachedValue::Record(None), Some(Duration::ZERO))
            .await
            .unwrap();
        cache.put("c", "long", CachedValue::Record(None), None).await.unwrap();
        assert!(cache.get("c", "short").await.unwrap().is_none());
        assert!(cache.get("c", "long").await.unwrap().is_some());
        assert_eq!(cache.len(), 1);
    }

    #[tokio::test]
    async fn names_partition_keys() {
        let cache = MemoryCache::new();
        cache.put("a", "k", CachedValue::Records(vec![]), None).await.unwrap();
        cache.put("b", "k", CachedValue::Record(None), None).await.unwrap();
        cache.remove_all("a");
        assert!(cache.get("a", "k").await.unwrap().is_none());
        assert_eq!(cache.get("b", "k").await.unwrap(), Some(CachedValue::Record(None)));
    }
}
