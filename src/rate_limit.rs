//! Sliding-window rate limiter with an optional minimum spacing between grants.

use crate::config::ConfigError;
use std::collections::VecDeque;
use std::time::Duration;
use tokio::time::Instant;

/// Decides when a send is permitted.
///
/// A request is permitted when fewer than `max_requests` grants fall inside
/// the trailing window of `last_n_seconds`, and at least `min_interval` has
/// elapsed since the most recent grant. Grants are only recorded through
/// [`RateLimiter::inc`]; querying never mutates the history.
#[derive(Debug, Clone)]
pub struct RateLimiter {
    last_n_seconds: Duration,
    max_requests: usize,
    min_interval: Duration,
    grants: VecDeque<Instant>,
}

impl RateLimiter {
    /// Creates a limiter allowing `max_requests` grants per `last_n_seconds`.
    ///
    /// # Errors
    /// Returns `ConfigError::InvalidRateLimit` if `max_requests` is zero.
    pub fn new(last_n_seconds: Duration, max_requests: usize) -> Result<Self, ConfigError> {
        if max_requests == 0 {
            return Err(ConfigError::InvalidRateLimit(
                "max_requests must be at least 1".to_string(),
            ));
        }
        Ok(Self {
            last_n_seconds,
            max_requests,
            min_interval: Duration::ZERO,
            grants: VecDeque::new(),
        })
    }

    /// Sets the minimum spacing between consecutive grants.
    pub fn with_min_interval(mut self, min_interval: Duration) -> Self {
        self.min_interval = min_interval;
        self
    }

    pub fn last_n_seconds(&self) -> Duration {
        self.last_n_seconds
    }

    pub fn max_requests(&self) -> usize {
        self.max_requests
    }

    pub fn min_interval(&self) -> Duration {
        self.min_interval
    }

    /// Records `now` as a granted request. Does not check permission.
    pub fn inc(&mut self, now: Instant) {
        // Grants at or before `now - window` can never count again, and the
        // grant recorded here becomes the newest one for spacing purposes.
        let window = self.last_n_seconds;
        self.grants
            .retain(|&granted| now.saturating_duration_since(granted) < window);
        self.grants.push_back(now);
    }

    /// Returns `None` if a request at `now` would be permitted, otherwise the
    /// minimum duration to wait before one is.
    pub fn get_wait_duration(&self, now: Instant) -> Option<Duration> {
        let mut window_count = 0usize;
        let mut oldest: Option<Instant> = None;
        for &granted in self.grants.iter().filter(|&&t| self.in_window(t, now)) {
            window_count += 1;
            oldest = Some(oldest.map_or(granted, |o| o.min(granted)));
        }

        let window_wait = match oldest {
            Some(oldest) if window_count >= self.max_requests => {
                (oldest + self.last_n_seconds).saturating_duration_since(now)
            }
            _ => Duration::ZERO,
        };

        let spacing_wait = match self.grants.iter().max() {
            Some(&last) if !self.min_interval.is_zero() => self
                .min_interval
                .saturating_sub(now.saturating_duration_since(last)),
            _ => Duration::ZERO,
        };

        let total = window_wait.max(spacing_wait);
        if total.is_zero() {
            None
        } else {
            Some(total)
        }
    }

    /// `granted > now - last_n_seconds`, without underflowing `Instant`.
    fn in_window(&self, granted: Instant, now: Instant) -> bool {
        now.saturating_duration_since(granted) < self.last_n_seconds
    }
}

impl Default for RateLimiter {
    /// 30 grants per minute, at least 500ms apart.
    fn default() -> Self {
        Self {
            last_n_seconds: Duration::from_secs(60),
            max_requests: 30,
            min_interval: Duration::from_millis(500),
            grants: VecDeque::new(),
        }
    }
}
