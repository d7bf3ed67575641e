//! Per-sender sliding-window rate limiting
//!
//! Each sender owns an ordered list of admission timestamps behind its own
//! async mutex, so the prune-count-append sequence is atomic per sender while
//! different senders never wait on each other.

use crate::sender::SenderId;
use chrono::{DateTime, TimeDelta, Utc};
use moka::future::Cache;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::debug;

type Window = Arc<Mutex<VecDeque<DateTime<Utc>>>>;

/// Upper bound for cache idle expiry; moka rejects durations near 1000 years
const MAX_IDLE: Duration = Duration::from_secs(365 * 24 * 60 * 60);

/// Sliding-window admission control keyed by sender
///
/// At most `max_messages` events are admitted per sender within any rolling
/// `window`. Denied events do not consume a slot.
#[derive(Clone)]
pub struct RateLimiter {
    /// Moka cache storing sender -> admitted timestamps; idle entries expire
    /// after one window since all their timestamps would be pruned anyway
    windows: Cache<SenderId, Window>,
    window: TimeDelta,
    max_messages: usize,
}

impl RateLimiter {
    /// Creates a new `RateLimiter`
    ///
    /// # Arguments
    ///
    /// * `window` - Length of the rolling window
    /// * `max_messages` - Admissions allowed per sender inside one window
    ///
    /// # Examples
    ///
    /// ```
    /// use reel_relay::gate::RateLimiter;
    ///
    /// let limiter = RateLimiter::new(chrono::TimeDelta::hours(1), 5);
    /// ```
    #[must_use]
    pub fn new(window: TimeDelta, max_messages: usize) -> Self {
        let idle = window.to_std().unwrap_or(Duration::ZERO);
        let windows = Cache::builder()
            .time_to_idle(idle.clamp(Duration::from_secs(1), MAX_IDLE))
            .build();

        Self {
            windows,
            window,
            max_messages,
        }
    }

    /// Admits or denies one event from `sender` arriving at `now`
    ///
    /// Timestamps older than the window are dropped first. If fewer than
    /// `max_messages` remain, `now` is recorded and the event is admitted.
    pub async fn allow(&self, sender: &SenderId, now: DateTime<Utc>) -> bool {
        let slot = self
            .windows
            .get_with(sender.clone(), async { Arc::new(Mutex::new(VecDeque::new())) })
            .await;

        let mut stamps = slot.lock().await;
        stamps.retain(|t| now.signed_duration_since(*t) < self.window);

        if stamps.len() < self.max_messages {
            stamps.push_back(now);
            true
        } else {
            debug!(
                sender = %sender,
                in_window = stamps.len(),
                "Rate limit reached"
            );
            false
        }
    }

    /// Number of admissions currently counted for `sender` as of `now`
    pub async fn recent_count(&self, sender: &SenderId, now: DateTime<Utc>) -> usize {
        match self.windows.get(sender).await {
            Some(slot) => slot
                .lock()
                .await
                .iter()
                .filter(|t| now.signed_duration_since(**t) < self.window)
                .count(),
            None => 0,
        }
    }

    /// Configured admissions per window
    #[must_use]
    pub const fn max_messages(&self) -> usize {
        self.max_messages
    }
}
