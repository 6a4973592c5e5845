//! Retry delay after failed iterations

use rand::Rng;
use std::time::Duration;

/// Starting delay after the first failure
pub const DEFAULT_BASE: Duration = Duration::from_secs(5);

/// Lower bound on any applied delay, jitter included
pub const MIN_DELAY: Duration = Duration::from_secs(3);

/// Exponential backoff with symmetric jitter
///
/// The nominal delay starts at `base`, doubles after every failure and is
/// capped at `max`. Any successful post resets it.
#[derive(Debug, Clone)]
pub struct Backoff {
    base: Duration,
    max: Duration,
    jitter_ratio: f64,
    current: Duration,
    failures: u32,
}

impl Backoff {
    pub fn new(base: Duration, max: Duration, jitter_ratio: f64) -> Self {
        let max = max.max(base);
        Self {
            base,
            max,
            jitter_ratio: jitter_ratio.clamp(0.0, 1.0),
            current: base,
            failures: 0,
        }
    }

    /// Nominal delay the next failure will use, before jitter
    pub fn nominal(&self) -> Duration {
        self.current.min(self.max)
    }

    /// Consecutive failures since the last reset
    pub fn failures(&self) -> u32 {
        self.failures
    }

    /// Record a failure and return the jittered delay to sleep
    pub fn next_delay(&mut self) -> Duration {
        let u = rand::thread_rng().gen_range(-1.0..=1.0);
        self.next_delay_with(u)
    }

    /// Same as [`next_delay`](Self::next_delay) with a fixed jitter sample `u` in `[-1, 1]`
    pub fn next_delay_with(&mut self, u: f64) -> Duration {
        let nominal = self.nominal();
        self.current = self.current.saturating_mul(2).min(self.max);
        self.failures = self.failures.saturating_add(1);

        let nominal_secs = nominal.as_secs_f64();
        let jittered = nominal_secs + nominal_secs * self.jitter_ratio * u.clamp(-1.0, 1.0);
        Duration::from_secs_f64(jittered.max(MIN_DELAY.as_secs_f64()))
    }

    pub fn reset(&mut self) {
        self.current = self.base;
        self.failures = 0;
    }
}

impl Default for Backoff {
    fn default() -> Self {
        Self::new(DEFAULT_BASE, Duration::from_secs(900), 0.2)
    }
}
