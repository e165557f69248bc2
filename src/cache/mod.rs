//! Shared key-value cache used by the persistent counter store.
//!
//! The cache is an external collaborator: anything that can get, set with a
//! TTL and delete raw bytes can back a [`PersistentCounterStore`].
//!
//! [`PersistentCounterStore`]: crate::store::PersistentCounterStore

mod redis;

pub use self::redis::RedisCache;

use async_trait::async_trait;
use std::time::Duration;

use crate::error::StoreError;

/// Byte-oriented cache with per-entry expiry.
#[async_trait]
pub trait SharedCache: Send + Sync {
    /// Returns `Ok(None)` if the key doesn't exist or has expired.
    async fn get_bytes(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError>;

    /// Store `value`, expiring it after `ttl`.
    async fn set_bytes(&self, key: &str, value: Vec<u8>, ttl: Duration) -> Result<(), StoreError>;

    async fn delete(&self, key: &str) -> Result<(), StoreError>;
}
