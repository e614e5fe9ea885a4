//! Look-aside caching of read results, keyed by cache name and key.

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::paginate::Page;
use crate::record::Record;

mod memory;

pub use memory::MemoryCache;

/// Everything a cacheable read can return.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum CachedValue {
    Records(Vec<Record>),
    Record(Option<Record>),
    Page(Page<Record>),
}

impl CachedValue {
    fn shape(&self) -> &'static str {
        match self {
            CachedValue::Records(_) => "records",
            CachedValue::Record(_) => "record",
            CachedValue::Page(_) => "page",
        }
    }
}

/// Results that can be stored in a [`Cache`].
pub trait Cacheable: Sized {
    fn into_cached(self) -> CachedValue;

    /// `None` when `value` holds a different kind of result.
    fn from_cached(value: CachedValue) -> Option<Self>;
}

impl Cacheable for Vec<Record> {
    fn into_cached(self) -> CachedValue {
        CachedValue::Records(self)
    }

    fn from_cached(value: CachedValue) -> Option<Self> {
        match value {
            CachedValue::Records(records) => Some(records),
            _ => None,
        }
    }
}

impl Cacheable for Option<Record> {
    fn into_cached(self) -> CachedValue {
        CachedValue::Record(self)
    }

    fn from_cached(value: CachedValue) -> Option<Self> {
        match value {
            CachedValue::Record(record) => Some(record),
            _ => None,
        }
    }
}

impl Cacheable for Page<Record> {
    fn into_cached(self) -> CachedValue {
        CachedValue::Page(self)
    }

    fn from_cached(value: CachedValue) -> Option<Self> {
        match value {
            CachedValue::Page(page) => Some(page),
            _ => None,
        }
    }
}

/// Cache backend. Entries are never invalidated by this crate; expiry is the backend's job.
#[async_trait]
pub trait Cache: Send + Sync {
    async fn get(&self, cache_name: &str, key: &str) -> Result<Option<CachedValue>>;

    async fn put(
        &self,
        cache_name: &str,
        key: &str,
        value: CachedValue,
        ttl: Option<Duration>,
    ) -> Result<()>;
}

/// Serves reads from a [`Cache`], loading and storing on a miss.
///
/// Backend failures never fail the read: a failed lookup counts as a miss and a failed store
/// still returns the loaded value.
pub struct CachingDecorator<'a> {
    cache: &'a dyn Cache,
}

impl<'a> CachingDecorator<'a> {
    #[must_use]
    pub fn new(cache: &'a dyn Cache) -> Self {
        Self { cache }
    }

    /// # Errors
    /// Returns the loader's error on a miss.
    pub async fn get_or_load<T, F, Fut>(
        &self,
        cache_name: &str,
        key: &str,
        ttl: Option<Duration>,
        load: F,
    ) -> Result<T>
    where
        T: Cacheable + Clone,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        match self.cache.get(cache_name, key).await {
            Ok(Some(cached)) => {
                let shape = cached.shape();
                if let Some(hit) = T::from_cached(cached) {
                    tracing::trace!(cache = cache_name, key = key, "Cache hit");
                    return Ok(hit);
                }
                tracing::warn!(cache = cache_name, key = key, shape, "Cached value has another shape; reloading");
            }
            Ok(None) => {}
            Err(e) => {
                tracing::warn!(cache = cache_name, key = key, error = %e, "Cache lookup failed");
            }
        }

        let loaded = load().await?;
        if let Err(e) = self
            .cache
            .put(cache_name, key, loaded.clone().into_cached(), ttl)
            .await
        {
            tracing::warn!(cache = cache_name, key = key, error = %e, "Cache store failed");
        }
        Ok(loaded)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;
    use crate::error::SqlRecordError;

    fn record(n: i64) -> Record {
        let mut r = Record::new();
        r.set("n", n);
        r
    }

    #[tokio::test]
    async fn loads_once_then_hits() {
        let cache = MemoryCache::new();
        let decorator = CachingDecorator::new(&cache);
        let loads = AtomicUsize::new(0);
        for _ in 0..2 {
            let rows: Vec<Record> = decorator
                .get_or_load("users", "all", None, || async {
                    loads.fetch_add(1, Ordering::SeqCst);
                    Ok(vec![record(1), record(2)])
                })
                .await
                .unwrap();
            assert_eq!(rows.len(), 2);
        }
        assert_eq!(loads.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn cached_absence_is_a_hit() {
        let cache = MemoryCache::new();
        let decorator = CachingDecorator::new(&cache);
        let loads = AtomicUsize::new(0);
        for _ in 0..2 {
            let found: Option<Record> = decorator
                .get_or_load("users", "missing", None, || async {
                    loads.fetch_add(1, Ordering::SeqCst);
                    Ok(None)
                })
                .await
                .unwrap();
            assert!(found.is_none());
        }
        assert_eq!(loads.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn wrong_shape_is_reloaded() {
        let cache = MemoryCache::new();
        cache
            .put("users", "k", CachedValue::Records(vec![]), None)
            .await
            .unwrap();
        let found: Option<Record> = CachingDecorator::new(&cache)
            .get_or_load("users", "k", None, || async { Ok(Some(record(3))) })
            .await
            .unwrap();
        assert_eq!(found.and_then(|r| r.get_long("n")), Some(3));
    }

    struct Broken;

    #[async_trait]
    impl Cache for Broken {
        async fn get(&self, _: &str, _: &str) -> Result<Option<CachedValue>> {
            Err(SqlRecordError::CacheError("down".into()))
        }

        async fn put(&self, _: &str, _: &str, _: CachedValue, _: Option<Duration>) -> Result<()> {
            Err(SqlRecordError::CacheError("down".into()))
        }
    }

    #[tokio::test]
    async fn failing_backend_falls_through_to_the_loader() {
        let rows: Vec<Record> = CachingDecorator::new(&Broken)
            .get_or_load("users", "all", None, || async { Ok(vec![record(1)]) })
            .await
            .unwrap();
        assert_eq!(rows.len(), 1);
    }

    #[tokio::test]
    async fn loader_errors_are_not_cached() {
        let cache = MemoryCache::new();
        let decorator = CachingDecorator::new(&cache);
        let err = decorator
            .get_or_load::<Vec<Record>, _, _>("users", "all", None, || async {
                Err(SqlRecordError::ExecutionError("db down".into()))
            })
            .await
            .unwrap_err();
        assert!(err.to_string().contains("db down"));
        assert!(cache.get("users", "all").await.unwrap().is_none());
    }
}
