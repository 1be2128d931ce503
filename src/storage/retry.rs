//! Bounded retry for local I/O

use std::time::Duration;
use crate::error::Result;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub retry_delay_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            retry_delay_ms: 100,
        }
    }
}

impl RetryPolicy {
    pub fn new(max_retries: u32, retry_delay_ms: u64) -> Self {
        Self { max_retries, retry_delay_ms }
    }

    pub fn none() -> Self {
        Self::new(0, 0)
    }

    /// Run `op`, retrying transient failures. Terminal errors return at once;
    /// the last transient error escalates once retries are exhausted.
    pub fn run<T, F>(&self, label: &str, mut op: F) -> Result<T>
    where
        F: FnMut() -> Result<T>,
    {
        let mut attempt = 0;
        loop {
            match op() {
                Ok(value) => return Ok(value),
                Err(e) if e.is_transient() && attempt < self.max_retries => {
                    attempt += 1;
                    log::warn!("{} failed ({}), retry {}/{}", label, e, attempt, self.max_retries);
                    if self.retry_delay_ms > 0 {
                        std::thread::sleep(Duration::from_millis(self.retry_delay_ms));
                    }
                }
                Err(e) => {
                    if e.is_transient() {
                        log::error!("{} failed after {} retries: {}", label, self.max_retries, e);
                    }
                    return Err(e);
                }
            }
        }
    }
}
