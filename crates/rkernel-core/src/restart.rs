//! Sliding-window restart accounting.

use std::collections::VecDeque;
use std::time::Duration;

use tokio::time::Instant;

/// Counts restarts inside a time window and enforces a maximum.
#[derive(Debug)]
pub struct RestartTracker {
    restarts: VecDeque<Instant>,
    max_restarts: u32,
    window: Duration,
}

impl RestartTracker {
    pub fn new(max_restarts: u32, window: Duration) -> Self {
        Self {
            restarts: VecDeque::new(),
            max_restarts,
            window,
        }
    }

    /// Record a restart if the limit allows it.
    ///
    /// Returns `false`, recording nothing, when `max_restarts` restarts
    /// already happened within the window.
    pub fn try_record(&mut self) -> bool {
        let now = Instant::now();
        self.evict(now);

        if self.restarts.len() as u32 >= self.max_restarts {
            return false;
        }
        self.restarts.push_back(now);
        true
    }

    /// Number of restarts within the window.
    pub fn count(&self) -> u32 {
        self.restarts
            .iter()
            .filter(|at| at.elapsed() <= self.window)
            .count() as u32
    }

    pub fn max_restarts(&self) -> u32 {
        self.max_restarts
    }

    fn evict(&mut self, now: Instant) {
        while let Some(front) = self.restarts.front() {
            if now.duration_since(*front) > self.window {
                self.restarts.pop_front();
            } else {
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_limit_reached() {
        let mut tracker = RestartTracker::new(2, Duration::from_secs(60));
        assert!(tracker.try_record());
        assert!(tracker.try_record());
        assert!(!tracker.try_record());
        assert_eq!(tracker.count(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_window_expiry() {
        let mut tracker = RestartTracker::new(1, Duration::from_secs(60));
        assert!(tracker.try_record());
        assert!(!tracker.try_record());

        tokio::time::advance(Duration::from_secs(61)).await;
        assert_eq!(tracker.count(), 0);
        assert!(tracker.try_record());
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_max_restarts() {
        let mut tracker = RestartTracker::new(0, Duration::from_secs(60));
        assert!(!tracker.try_record());
        assert_eq!(tracker.max_restarts(), 0);
    }
}
