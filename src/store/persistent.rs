//! Counter store over a shared cache.

use async_trait::async_trait;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use crate::cache::SharedCache;
use crate::error::StoreError;
use crate::ratelimit::{CounterRecord, CounterStore};

/// Default upper bound on a single cache round trip.
pub const DEFAULT_STORAGE_TIMEOUT: Duration = Duration::from_millis(250);

/// [`CounterStore`] that keeps records in a shared cache as JSON.
///
/// Expiry is left to the cache. Every call is bounded by `timeout`; a call
/// that overruns fails with [`StoreError::Timeout`].
#[derive(Clone)]
pub struct PersistentCounterStore {
    cache: Arc<dyn SharedCache>,
    timeout: Duration,
}

impl PersistentCounterStore {
    pub fn new(cache: Arc<dyn SharedCache>) -> Self {
        Self {
            cache,
            timeout: DEFAULT_STORAGE_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    async fn bounded<T, F>(&self, op: F) -> Result<T, StoreError>
    where
        F: Future<Output = Result<T, StoreError>>,
    {
        tokio::time::timeout(self.timeout, op)
            .await
            .map_err(|_| StoreError::Timeout(self.timeout))?
    }
}

#[async_trait]
impl CounterStore for PersistentCounterStore {
    async fn get(&self, key: &str) -> Result<Option<CounterRecord>, StoreError> {
        match self.bounded(self.cache.get_bytes(key)).await? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    async fn set(&self, key: &str, record: CounterRecord, ttl: Duration) -> Result<(), StoreError> {
        let bytes = serde_json::to_vec(&record)?;
        self.bounded(self.cache.set_bytes(key, bytes, ttl)).await
    }

    async fn remove(&self, key: &str) -> Result<(), StoreError> {
        self.bounded(self.cache.delete(key)).await
    }
}
