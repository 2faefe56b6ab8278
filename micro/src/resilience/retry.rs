//! Retry backoff policy.
//!
//! Exponential backoff with symmetric multiplicative jitter: the base delay
//! doubles per attempt, is capped, then scaled by `1 + U(-jitter, +jitter)`
//! and clamped back into `[0, max_backoff]`.

use std::time::Duration;

use rand::Rng;

#[derive(Debug, Clone)]
pub struct RetryOptions {
    pub max_attempts: u32,
    pub base_backoff: Duration,
    pub max_backoff: Duration,
    /// Jitter ratio, clamped into `[0, 1]` at construction.
    pub jitter_ratio: f64,
}

impl Default for RetryOptions {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_backoff: Duration::from_millis(5),
            max_backoff: Duration::from_millis(200),
            jitter_ratio: 0.2,
        }
    }
}

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    opts: RetryOptions,
}

impl RetryPolicy {
    pub fn new(mut opts: RetryOptions) -> Self {
        if opts.max_attempts < 1 {
            opts.max_attempts = 1;
        }
        opts.jitter_ratio = opts.jitter_ratio.clamp(0.0, 1.0);
        Self { opts }
    }

    pub fn max_attempts(&self) -> u32 {
        self.opts.max_attempts
    }

    /// Sleep to perform before `attempt` (1-based). The first attempt is
    /// immediate.
    pub fn backoff_before_attempt(&self, attempt: u32) -> Duration {
        if attempt <= 1 {
            return Duration::ZERO;
        }

        let factor = 2f64.powi(attempt as i32 - 2);
        let base_ms = self.opts.base_backoff.as_millis() as f64;
        let max_ms = self.opts.max_backoff.as_millis() as f64;
        let raw = (base_ms * factor).min(max_ms);

        let jitter = if self.opts.jitter_ratio > 0.0 {
            rand::thread_rng().gen_range(-self.opts.jitter_ratio..=self.opts.jitter_ratio)
        } else {
            0.0
        };

        let jittered = (raw * (1.0 + jitter)).clamp(0.0, max_ms);
        Duration::from_millis(jittered as u64)
    }
}
