//! Redis-backed shared cache.

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use std::time::Duration;
use tracing::{debug, warn};

use super::SharedCache;
use crate::error::StoreError;

/// [`SharedCache`] over a Redis-compatible server.
///
/// Uses a reconnecting multiplexed connection, so a cloned handle is cheap and
/// a dropped server connection is re-established on the next command.
#[derive(Clone)]
pub struct RedisCache {
    connection: ConnectionManager,
}

impl RedisCache {
    /// Connect to the server at `url` and verify it answers.
    ///
    /// The whole handshake, reconnect backoff included, is bounded by
    /// `connect_timeout`.
    pub async fn connect(url: &str, connect_timeout: Duration) -> Result<Self, StoreError> {
        let client = redis::Client::open(url).map_err(|e| {
            warn!(error = %e, "Failed to create Redis client");
            StoreError::from(e)
        })?;

        match tokio::time::timeout(connect_timeout, Self::establish(client)).await {
            Ok(result) => result,
            Err(_) => {
                warn!(
                    timeout_ms = connect_timeout.as_millis() as u64,
                    "Timed out connecting to Redis"
                );
                Err(StoreError::Timeout(connect_timeout))
            }
        }
    }

    async fn establish(client: redis::Client) -> Result<Self, StoreError> {
        let connection = ConnectionManager::new(client).await.map_err(|e| {
            warn!(error = %e, "Failed to connect to Redis");
            StoreError::from(e)
        })?;

        let mut conn = connection.clone();
        redis::cmd("PING")
            .query_async::<String>(&mut conn)
            .await?;

        debug!("Connected to Redis counter backend");
        Ok(Self { connection })
    }
}

#[async_trait]
impl SharedCache for RedisCache {
    async fn get_bytes(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        let mut conn = self.connection.clone();
        let value = redis::cmd("GET")
            .arg(key)
            .query_async::<Option<Vec<u8>>>(&mut conn)
            .await?;
        Ok(value)
    }

    async fn set_bytes(&self, key: &str, value: Vec<u8>, ttl: Duration) -> Result<(), StoreError> {
        let mut conn = self.connection.clone();
        // PX rejects zero; an entry due now lives for one more millisecond.
        let ttl_ms = u64::try_from(ttl.as_millis()).unwrap_or(u64::MAX).max(1);
        redis::cmd("SET")
            .arg(key)
            .arg(value)
            .arg("PX")
            .arg(ttl_ms)
            .query_async::<()>(&mut conn)
            .await?;
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        let mut conn = self.connection.clone();
        redis::cmd("DEL")
            .arg(key)
            .query_async::<i64>(&mut conn)
            .await?;
        Ok(())
    }
}
