//! Fixed-window counter record.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// The stored state for one caller under one policy.
///
/// `window_reset_at` is an epoch timestamp in milliseconds. The record is
/// valid while `now < window_reset_at`; from that instant on it is treated
/// exactly like an absent record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CounterRecord {
    /// Requests accepted in the current window
    pub count: u32,
    /// When the current window ends (epoch ms)
    pub window_reset_at: i64,
}

impl CounterRecord {
    /// Open a new window at `now_ms` with the first request already counted.
    ///
    /// The reset instant saturates at `i64::MAX` rather than wrapping.
    pub fn start(now_ms: i64, window: Duration) -> Self {
        let window_ms = i64::try_from(window.as_millis()).unwrap_or(i64::MAX);
        Self {
            count: 1,
            window_reset_at: now_ms.saturating_add(window_ms),
        }
    }

    /// Whether the window has ended at `now_ms`.
    pub fn is_expired(&self, now_ms: i64) -> bool {
        now_ms >= self.window_reset_at
    }

    /// The same window with one more request counted.
    pub fn incremented(&self) -> Self {
        Self {
            count: self.count.saturating_add(1),
            window_reset_at: self.window_reset_at,
        }
    }

    /// Time left in the window, zero once expired.
    pub fn remaining_ttl(&self, now_ms: i64) -> Duration {
        let left = self.window_reset_at.saturating_sub(now_ms);
        if left <= 0 {
            Duration::ZERO
        } else {
            Duration::from_millis(left as u64)
        }
    }
}
