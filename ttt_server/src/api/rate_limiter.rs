//! Rate limiting for inbound WebSocket messages.
//!
//! Each connection owns a [`MessageLimiter`] that combines a short burst
//! window with a longer sustained window. A message is admitted only when
//! both windows have room, and a rejected message is not counted.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

/// Sliding window over the timestamps of admitted messages
#[derive(Debug)]
struct SlidingWindow {
    name: &'static str,
    timestamps: VecDeque<Instant>,
    max_requests: usize,
    window: Duration,
}

impl SlidingWindow {
    fn new(name: &'static str, max_requests: usize, window: Duration) -> Self {
        Self {
            name,
            timestamps: VecDeque::with_capacity(max_requests),
            max_requests,
            window,
        }
    }

    fn evict(&mut self, now: Instant) {
        while let Some(ts) = self.timestamps.front() {
            if now.duration_since(*ts) >= self.window {
                self.timestamps.pop_front();
            } else {
                break;
            }
        }
    }

    /// Time until a slot frees up, or `None` when one is free now
    fn wait_time(&self, now: Instant) -> Option<Duration> {
        if self.timestamps.len() < self.max_requests {
            return None;
        }
        self.timestamps
            .front()
            .map(|oldest| self.window.saturating_sub(now.duration_since(*oldest)))
    }
}

/// A message was refused by one of the windows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimited {
    /// Which window refused it (`burst` or `sustained`)
    pub window: &'static str,
    /// How long until the refusing window admits again
    pub retry_after: Duration,
}

/// Burst plus sustained limiter for one connection
#[derive(Debug)]
pub struct MessageLimiter {
    windows: [SlidingWindow; 2],
}

impl Default for MessageLimiter {
    /// 10 messages per second, 100 per minute
    fn default() -> Self {
        Self::new((10, Duration::from_secs(1)), (100, Duration::from_secs(60)))
    }
}

impl MessageLimiter {
    /// Create a limiter from `(max_requests, window)` pairs
    ///
    /// # Example
    ///
    /// ```
    /// use ttt_server::api::rate_limiter::MessageLimiter;
    /// use std::time::Duration;
    ///
    /// let mut limiter = MessageLimiter::new(
    ///     (2, Duration::from_secs(1)),
    ///     (5, Duration::from_secs(60)),
    /// );
    /// assert!(limiter.check().is_ok());
    /// assert!(limiter.check().is_ok());
    /// assert_eq!(limiter.check().unwrap_err().window, "burst");
    /// ```
    pub fn new(burst: (usize, Duration), sustained: (usize, Duration)) -> Self {
        Self {
            windows: [
                SlidingWindow::new("burst", burst.0, burst.1),
                SlidingWindow::new("sustained", sustained.0, sustained.1),
            ],
        }
    }

    /// Admit a message now, or report why not
    pub fn check(&mut self) -> Result<(), RateLimited> {
        self.check_at(Instant::now())
    }

    /// Admit a message at `now`
    pub fn check_at(&mut self, now: Instant) -> Result<(), RateLimited> {
        for window in &mut self.windows {
            window.evict(now);
        }

        if let Some(limited) = self
            .windows
            .iter()
            .filter_map(|w| {
                w.wait_time(now).map(|retry_after| RateLimited {
                    window: w.name,
                    retry_after,
                })
            })
            .max_by_key(|limited| limited.retry_after)
        {
            return Err(limited);
        }

        for window in &mut self.windows {
            window.timestamps.push_back(now);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn limiter() -> MessageLimiter {
        MessageLimiter::new((3, Duration::from_secs(1)), (5, Duration::from_secs(60)))
    }

    #[test]
    fn test_allows_within_burst() {
        let mut limiter = limiter();
        let now = Instant::now();
        for _ in 0..3 {
            assert!(limiter.check_at(now).is_ok());
        }
    }

    #[test]
    fn test_blocks_over_burst_with_retry_after() {
        let mut limiter = limiter();
        let start = Instant::now();
        for _ in 0..3 {
            limiter.check_at(start).unwrap();
        }

        let err = limiter
            .check_at(start + Duration::from_millis(400))
            .unwrap_err();
        assert_eq!(err.window, "burst");
        assert_eq!(err.retry_after, Duration::from_millis(600));
    }

    #[test]
    fn test_burst_window_expiry() {
        let mut limiter = limiter();
        let start = Instant::now();
        for _ in 0..3 {
            limiter.check_at(start).unwrap();
        }
        assert!(limiter.check_at(start + Duration::from_secs(1)).is_ok());
    }

    #[test]
    fn test_sustained_limit_outlasts_burst() {
        let mut limiter = limiter();
        let start = Instant::now();
        for i in 0..5 {
            limiter.check_at(start + Duration::from_secs(i)).unwrap();
        }

        let err = limiter.check_at(start + Duration::from_secs(10)).unwrap_err();
        assert_eq!(err.window, "sustained");
        assert_eq!(err.retry_after, Duration::from_secs(50));
    }

    #[test]
    fn test_rejected_messages_are_not_counted() {
        let mut limiter = limiter();
        let start = Instant::now();
        for _ in 0..3 {
            limiter.check_at(start).unwrap();
        }
        for _ in 0..10 {
            assert!(limiter.check_at(start).is_err());
        }
        // Only the three admitted messages count toward the sustained window.
        let later = start + Duration::from_secs(2);
        assert!(limiter.check_at(later).is_ok());
        assert!(limiter.check_at(later).is_ok());
        assert_eq!(limiter.check_at(later).unwrap_err().window, "sustained");
    }

    #[test]
    fn test_default_limits() {
        let mut limiter = MessageLimiter::default();
        let now = Instant::now();
        for _ in 0..10 {
            assert!(limiter.check_at(now).is_ok());
        }
        assert!(limiter.check_at(now).is_err());
    }
}
