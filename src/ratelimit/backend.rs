//! Counter storage trait for abstracting persistent and in-process backends.

use async_trait::async_trait;
use std::time::Duration;

use super::counter::CounterRecord;
use crate::error::StoreError;

/// Storage primitive the fixed-window algorithm runs on.
///
/// Implementations only move records in and out; window arithmetic lives in
/// [`RateLimiter`](super::RateLimiter). A store may return an expired record
/// or drop it, the limiter treats both the same way.
#[async_trait]
pub trait CounterStore: Send + Sync {
    /// Fetch the record stored under `key`, if any.
    async fn get(&self, key: &str) -> Result<Option<CounterRecord>, StoreError>;

    /// Store `record` under `key`, replacing any previous value. The entry
    /// may be discarded once `ttl` has elapsed.
    async fn set(&self, key: &str, record: CounterRecord, ttl: Duration) -> Result<(), StoreError>;

    /// Remove the record stored under `key`.
    async fn remove(&self, key: &str) -> Result<(), StoreError>;
}
