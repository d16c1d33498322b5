//! Helper utilities for Socksgate
//!
//! This module provides common utility functions used throughout the application.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

/// Retry configuration for operations
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum number of retry attempts, 0 for unlimited
    pub max_retries: u32,
    /// Initial delay between retries
    pub initial_delay: Duration,
    /// Maximum delay between retries
    pub max_delay: Duration,
    /// Multiplier for exponential backoff
    pub multiplier: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        RetryConfig {
            max_retries: 3,
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(10),
            multiplier: 2.0,
        }
    }
}

impl RetryConfig {
    /// Calculate delay for a given attempt number
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        if attempt == 0 {
            return self.initial_delay;
        }

        let delay_ms = self.initial_delay.as_millis() as f64 * self.multiplier.powi(attempt as i32);
        let delay = Duration::from_millis(delay_ms as u64);

        std::cmp::min(delay, self.max_delay)
    }

    /// Whether another attempt is allowed after `attempt` failures
    pub fn should_retry(&self, attempt: u32) -> bool {
        self.max_retries == 0 || attempt < self.max_retries
    }
}

/// Bound on concurrently served connections
///
/// A limit of zero never blocks.
#[derive(Debug, Clone)]
pub struct ConnectionLimit {
    semaphore: Option<Arc<Semaphore>>,
}

impl ConnectionLimit {
    /// Create a limit of `max` concurrent connections
    pub fn new(max: usize) -> Self {
        ConnectionLimit {
            semaphore: (max > 0).then(|| Arc::new(Semaphore::new(max))),
        }
    }

    /// Wait for a free slot
    ///
    /// The slot is released when the returned permit is dropped. Unbounded
    /// limits return `None` right away.
    pub async fn acquire(&self) -> Option<OwnedSemaphorePermit> {
        match &self.semaphore {
            Some(semaphore) => Arc::clone(semaphore).acquire_owned().await.ok(),
            None => None,
        }
    }
}
