//! Core rate limiter implementation.
//!
//! Implements a fixed-window counter on top of any [`CounterStore`]. Each
//! `(policy, identifier)` pair owns one record; the first request of a window
//! creates it, later requests increment it, and requests past the limit are
//! rejected without touching it.

use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, trace, warn};

use super::backend::CounterStore;
use super::clock::{Clock, SystemClock};
use super::counter::CounterRecord;
use super::descriptor::{CounterKey, DEFAULT_KEY_PREFIX};
use super::policy::{Policy, PolicyCatalog};
use crate::error::StoreError;

/// Outcome of a rate limit check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Decision {
    /// Whether the request may proceed
    pub allowed: bool,
    /// Requests left in the current window
    pub remaining: u32,
    /// The policy's per-window cap
    pub limit: u32,
    /// When the current window ends (epoch ms)
    pub reset_at: i64,
}

impl Decision {
    fn allowed(policy: &Policy, record: &CounterRecord) -> Self {
        Self {
            allowed: true,
            remaining: policy.max_requests().saturating_sub(record.count),
            limit: policy.max_requests(),
            reset_at: record.window_reset_at,
        }
    }

    fn rejected(policy: &Policy, record: &CounterRecord) -> Self {
        Self {
            allowed: false,
            remaining: 0,
            limit: policy.max_requests(),
            reset_at: record.window_reset_at,
        }
    }

    /// Decision used when the counter state could not be read.
    ///
    /// Shaped like the first request of a fresh window.
    pub fn fail_open(policy: &Policy, now_ms: i64) -> Self {
        Self::allowed(policy, &CounterRecord::start(now_ms, policy.window()))
    }

    /// Whole seconds until the window resets, rounded up and at least one.
    pub fn retry_after_secs(&self, now_ms: i64) -> u64 {
        let left_ms = self.reset_at.saturating_sub(now_ms).max(0) as u64;
        left_ms.div_ceil(1000).max(1)
    }
}

/// The fixed-window rate limiter.
///
/// Constructed once at startup and shared by reference (usually through an
/// `Arc`) with every request handler.
pub struct RateLimiter {
    /// Counter storage
    store: Arc<dyn CounterStore>,
    /// Validated policies
    catalog: PolicyCatalog,
    /// Time source for window arithmetic
    clock: Arc<dyn Clock>,
    /// Namespace for every key this limiter writes
    key_prefix: String,
}

impl RateLimiter {
    /// Create a new rate limiter over the given store and policies.
    pub fn new(store: Arc<dyn CounterStore>, catalog: PolicyCatalog) -> Self {
        Self {
            store,
            catalog,
            clock: Arc::new(SystemClock),
            key_prefix: DEFAULT_KEY_PREFIX.to_string(),
        }
    }

    /// Replace the time source.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Replace the key namespace.
    pub fn with_key_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.key_prefix = prefix.into();
        self
    }

    pub fn catalog(&self) -> &PolicyCatalog {
        &self.catalog
    }

    /// Current time according to the limiter's clock.
    pub fn now_ms(&self) -> i64 {
        self.clock.now_ms()
    }

    /// Check and record one request from `identifier` under `policy_name`.
    ///
    /// Never fails: if the store cannot be read the request is allowed.
    /// Unknown policy names are governed by the default policy.
    pub async fn check_limit(&self, identifier: &str, policy_name: &str) -> Decision {
        let policy = self.catalog.resolve(policy_name);
        if policy.name() != policy_name {
            debug!(
                requested = %policy_name,
                policy = %policy.name(),
                "Unknown policy, using default"
            );
        }

        let now = self.clock.now_ms();
        match self.evaluate(identifier, policy, now).await {
            Ok(decision) => decision,
            Err(e) => {
                warn!(
                    policy = %policy.name(),
                    error = %e,
                    "Counter storage unavailable, failing open"
                );
                Decision::fail_open(policy, now)
            }
        }
    }

    async fn evaluate(
        &self,
        identifier: &str,
        policy: &Policy,
        now: i64,
    ) -> Result<Decision, StoreError> {
        let key = self.key_for(policy.name(), identifier);

        trace!(key = %key, "Checking rate limit");

        let current = self.store.get(&key).await?;

        let record = match current {
            Some(record) if !record.is_expired(now) => record,
            _ => {
                let record = CounterRecord::start(now, policy.window());
                debug!(
                    policy = %policy.name(),
                    reset_at = record.window_reset_at,
                    "Starting new rate limit window"
                );
                self.persist(&key, record, policy.window(), policy).await;
                return Ok(Decision::allowed(policy, &record));
            }
        };

        if record.count >= policy.max_requests() {
            debug!(
                policy = %policy.name(),
                count = record.count,
                limit = policy.max_requests(),
                "Rate limit exceeded"
            );
            return Ok(Decision::rejected(policy, &record));
        }

        let next = record.incremented();
        self.persist(&key, next, next.remaining_ttl(now), policy).await;
        Ok(Decision::allowed(policy, &next))
    }

    /// Write a record; a failed write does not change the decision.
    async fn persist(&self, key: &str, record: CounterRecord, ttl: Duration, policy: &Policy) {
        if let Err(e) = self.store.set(key, record, ttl).await {
            warn!(
                policy = %policy.name(),
                error = %e,
                "Failed to persist rate limit counter"
            );
        }
    }

    /// Clear the counter for `identifier` under `policy_name`.
    pub async fn reset(&self, identifier: &str, policy_name: &str) -> Result<(), StoreError> {
        let policy = self.catalog.resolve(policy_name);
        let key = self.key_for(policy.name(), identifier);
        self.store.remove(&key).await
    }

    /// Read the stored record without counting a request.
    pub async fn peek(
        &self,
        identifier: &str,
        policy_name: &str,
    ) -> Result<Option<CounterRecord>, StoreError> {
        let policy = self.catalog.resolve(policy_name);
        let key = self.key_for(policy.name(), identifier);
        self.store.get(&key).await
    }

    fn key_for(&self, policy: &str, identifier: &str) -> String {
        CounterKey::new(&self.key_prefix, policy, identifier).to_string_key()
    }
}
