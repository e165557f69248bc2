//! Process-local counter store with a hard entry cap.
//!
//! Meant for runtimes that cannot hold outbound connections. Nothing runs in
//! the background: expired and excess entries are dropped when the store is
//! touched and is close to its cap.

use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use crate::error::StoreError;
use crate::ratelimit::{Clock, CounterRecord, CounterStore, SystemClock};

/// Default maximum number of tracked keys.
pub const DEFAULT_MAX_ENTRIES: usize = 10_000;

#[derive(Debug, Clone, Copy)]
struct MemoryEntry {
    record: CounterRecord,
    expires_at: i64,
}

/// In-process [`CounterStore`] bounded to `max_entries` keys.
pub struct BoundedMemoryCounterStore {
    entries: DashMap<String, MemoryEntry>,
    max_entries: usize,
    /// Size at which a sweep is attempted (90% of the cap)
    sweep_threshold: usize,
    /// Held while sweeping so concurrent callers skip rather than repeat it
    sweep_lock: Mutex<()>,
    clock: Arc<dyn Clock>,
}

impl BoundedMemoryCounterStore {
    /// Create a store holding at most `max_entries` keys.
    pub fn new(max_entries: usize) -> Self {
        let max_entries = max_entries.max(1);
        Self {
            entries: DashMap::new(),
            max_entries,
            sweep_threshold: (max_entries * 9 / 10).max(1),
            sweep_lock: Mutex::new(()),
            clock: Arc::new(SystemClock),
        }
    }

    /// Replace the time source used for expiry.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn max_entries(&self) -> usize {
        self.max_entries
    }

    /// Sweep expired entries, then evict the soonest-expiring ones until the
    /// store is within its cap. With `reserve` set, one slot is left free for
    /// an incoming key.
    fn maybe_evict(&self, now: i64, reserve: bool) {
        if self.entries.len() < self.sweep_threshold {
            return;
        }
        let Some(_guard) = self.sweep_lock.try_lock() else {
            return;
        };

        let before = self.entries.len();
        self.entries.retain(|_, entry| entry.expires_at > now);
        let expired = before - self.entries.len();

        let limit = if reserve {
            self.max_entries - 1
        } else {
            self.max_entries
        };
        let mut evicted = 0;
        if self.entries.len() > limit {
            let excess = self.entries.len() - limit;
            let mut candidates: Vec<(String, i64)> = self
                .entries
                .iter()
                .map(|entry| (entry.key().clone(), entry.value().expires_at))
                .collect();
            candidates.sort_unstable_by_key(|(_, expires_at)| *expires_at);

            for (key, _) in candidates.into_iter().take(excess) {
                if self.entries.remove(&key).is_some() {
                    evicted += 1;
                }
            }
        }

        debug!(
            expired = expired,
            evicted = evicted,
            size = self.entries.len(),
            "Swept in-memory counter store"
        );
    }
}

impl Default for BoundedMemoryCounterStore {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_ENTRIES)
    }
}

#[async_trait]
impl CounterStore for BoundedMemoryCounterStore {
    async fn get(&self, key: &str) -> Result<Option<CounterRecord>, StoreError> {
        let now = self.clock.now_ms();
        self.maybe_evict(now, false);

        let found = self.entries.get(key).map(|entry| *entry.value());
        match found {
            Some(entry) if entry.expires_at > now => Ok(Some(entry.record)),
            Some(_) => {
                self.entries.remove_if(key, |_, entry| entry.expires_at <= now);
                Ok(None)
            }
            None => Ok(None),
        }
    }

    async fn set(&self, key: &str, record: CounterRecord, ttl: Duration) -> Result<(), StoreError> {
        let now = self.clock.now_ms();
        if !self.entries.contains_key(key) {
            self.maybe_evict(now, true);
        }

        let ttl_ms = i64::try_from(ttl.as_millis()).unwrap_or(i64::MAX);
        let expires_at = now.saturating_add(ttl_ms);
        self.entries
            .insert(key.to_string(), MemoryEntry { record, expires_at });
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<(), StoreError> {
        self.entries.remove(key);
        Ok(())
    }
}
