//! Retry policy: decides backoff delays for jobs that asked to be retried.
//!
//! Only an explicit `retry` from a worker is delayed. An expired lease makes
//! the job ready straight away, since the previous holder already held it for
//! a full `lease_timeout`.

use std::time::Duration;

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Delay before the first retry.
    pub base_delay: Duration,

    /// Backoff multiplier for exponential backoff.
    pub multiplier: f64,

    /// Upper bound for any single delay.
    pub max_delay: Duration,
}

impl RetryPolicy {
    pub fn new(base_delay: Duration) -> Self {
        Self {
            base_delay,
            ..Self::default()
        }
    }

    /// Delay before the next delivery, given how many deliveries happened.
    ///
    /// delay = base_delay * multiplier^(deliveries - 1), capped at `max_delay`.
    ///
    /// With base_delay=2s, multiplier=2.0: 2s, 4s, 8s, 16s, ...
    pub fn next_delay(&self, deliveries: u32) -> Duration {
        let base_secs = self.base_delay.as_secs_f64();
        let exponent = deliveries.saturating_sub(1).min(i32::MAX as u32) as i32;
        let delay_secs = base_secs * self.multiplier.powi(exponent);
        if !delay_secs.is_finite() || delay_secs >= self.max_delay.as_secs_f64() {
            return self.max_delay;
        }
        Duration::from_secs_f64(delay_secs)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_secs(2),
            multiplier: 2.0,
            max_delay: Duration::from_secs(300),
        }
    }
}
