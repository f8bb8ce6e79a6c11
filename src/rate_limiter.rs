//! Process-wide throttle for outbound model calls.
//!
//! One counter is shared by every stage of every concurrent run. When the
//! counter reaches the threshold the caller sleeps for the pause duration
//! while still holding the lock, so every other caller waits as well.

use crate::error::{PipelineError, Result};
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{info, warn};

pub struct RateLimiter {
    threshold: u32,
    pause: Duration,
    count: Mutex<u32>,
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self {
            threshold: 4,
            pause: Duration::from_secs(60),
            count: Mutex::new(0),
        }
    }
}

impl RateLimiter {
    pub fn new(threshold: u32, pause: Duration) -> Result<Self> {
        if threshold == 0 {
            return Err(PipelineError::Config(
                "rate limit threshold must be positive".to_string(),
            ));
        }
        Ok(Self {
            threshold,
            pause,
            count: Mutex::new(0),
        })
    }

    pub fn threshold(&self) -> u32 {
        self.threshold
    }

    pub fn pause(&self) -> Duration {
        self.pause
    }

    /// Current counter value.
    pub async fn count(&self) -> u32 {
        *self.count.lock().await
    }

    /// Count one model call, pausing first if the threshold is reached.
    ///
    /// Returns the counter value after the call: 0 when this call paused.
    pub async fn check_and_wait(&self) -> u32 {
        let mut count = self.count.lock().await;
        *count += 1;
        info!("API Call Count: {}/{}", *count, self.threshold);

        if *count >= self.threshold {
            warn!(
                "Rate limit threshold ({}) reached. Pausing for {:.0?} (all callers wait)",
                self.threshold, self.pause
            );
            tokio::time::sleep(self.pause).await;
            *count = 0;
            info!("Resuming execution.");
        }

        *count
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::Instant;

    #[tokio::test(start_paused = true)]
    async fn test_counter_increments_then_resets_after_pause() {
        let limiter = RateLimiter::new(4, Duration::from_secs(60)).unwrap();
        let start = Instant::now();

        assert_eq!(limiter.check_and_wait().await, 1);
        assert_eq!(limiter.check_and_wait().await, 2);
        assert_eq!(limiter.check_and_wait().await, 3);
        assert!(start.elapsed() < Duration::from_secs(60));

        assert_eq!(limiter.check_and_wait().await, 0);
        assert!(start.elapsed() >= Duration::from_secs(60));
        assert_eq!(limiter.count().await, 0);

        assert_eq!(limiter.check_and_wait().await, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_threshold_of_one_pauses_every_call() {
        let limiter = RateLimiter::new(1, Duration::from_millis(250)).unwrap();
        let start = Instant::now();
        for _ in 0..3 {
            assert_eq!(limiter.check_and_wait().await, 0);
        }
        assert!(start.elapsed() >= Duration::from_millis(750));
    }

    #[tokio::test(start_paused = true)]
    async fn test_pause_blocks_concurrent_callers() {
        let limiter = RateLimiter::new(2, Duration::from_secs(10)).unwrap();
        let start = Instant::now();

        let (a, b, c, d) = tokio::join!(
            limiter.check_and_wait(),
            limiter.check_and_wait(),
            limiter.check_and_wait(),
            limiter.check_and_wait(),
        );

        let mut results = vec![a, b, c, d];
        results.sort();
        assert_eq!(results, vec![0, 0, 1, 1]);
        assert!(start.elapsed() >= Duration::from_secs(20));
    }

    #[test]
    fn test_zero_threshold_is_rejected() {
        assert!(RateLimiter::new(0, Duration::from_secs(1)).is_err());
        let limiter = RateLimiter::default();
        assert_eq!(limiter.threshold(), 4);
        assert_eq!(limiter.pause(), Duration::from_secs(60));
    }
}
