//! Reconnect delay policy for the streaming loop
//!
//! The default policy is a single fixed delay: every failed connection waits
//! the same interval before the next attempt. Raising `max_delay` above
//! `initial_delay` doubles the delay per consecutive failure up to the cap.
//! There is no retry limit; the loop keeps trying until stopped.

use rand::Rng;
use std::time::Duration;

/// Largest fraction of a delay removed by jitter
const MAX_JITTER_FRACTION: f64 = 0.25;

/// Delay schedule between streaming connection attempts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectPolicy {
    /// Delay after the first failure
    pub initial_delay: Duration,
    /// Upper bound for any delay
    pub max_delay: Duration,
    /// Subtract a random share of each delay
    pub jitter: bool,
}

impl ReconnectPolicy {
    /// A policy that always waits `delay`
    pub fn fixed(delay: Duration) -> Self {
        Self {
            initial_delay: delay,
            max_delay: delay,
            jitter: false,
        }
    }

    /// Delay before the next attempt
    ///
    /// `attempt` counts consecutive failures and starts at 1. Zero is treated
    /// as 1.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let base = self.base_delay(attempt);
        if !self.jitter || base.is_zero() {
            return base;
        }

        let fraction = rand::thread_rng().gen_range(0.0..=MAX_JITTER_FRACTION);
        base.mul_f64(1.0 - fraction)
    }

    fn base_delay(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(31);
        self.initial_delay
            .checked_mul(1u32 << exponent)
            .unwrap_or(self.max_delay)
            .min(self.max_delay)
    }
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self::fixed(Duration::from_secs(15))
    }
}
