//! Retry delays for the rotation loop.

use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use rand::Rng;

use crate::config::BackoffSettings;

/// Computes increasing delays between failed rotation attempts.
///
/// Shared between the manager and its scheduler, so both operations take
/// `&self`.
pub trait BackoffPolicy: Send + Sync + std::fmt::Debug {
    /// Delay before the next attempt; advances the policy.
    fn duration(&self) -> Duration;

    /// Return to the first delay after a success.
    fn reset(&self);
}

/// Exponential backoff with an optional full jitter.
///
/// Attempt `n` (1-based) waits `initial * multiplier^(n-1)`, capped at `max`.
/// With jitter enabled the delay is drawn uniformly from `[0, computed]`.
#[derive(Debug)]
pub struct ExponentialBackoff {
    initial: Duration,
    max: Duration,
    multiplier: f64,
    jitter: bool,
    attempt: AtomicU32,
}

impl ExponentialBackoff {
    pub fn new(initial: Duration, max: Duration, multiplier: f64) -> Self {
        Self { initial, max, multiplier, jitter: false, attempt: AtomicU32::new(0) }
    }

    pub fn with_jitter(mut self, jitter: bool) -> Self {
        self.jitter = jitter;
        self
    }

    pub fn from_settings(settings: &BackoffSettings) -> Self {
        Self::new(
            Duration::from_millis(settings.initial_ms),
            Duration::from_millis(settings.max_ms),
            settings.multiplier,
        )
        .with_jitter(settings.jitter)
    }

    /// Backoff for a given attempt number (0 means no delay).
    pub fn backoff_for_attempt(&self, attempt: u32) -> Duration {
        if attempt == 0 {
            return Duration::ZERO;
        }

        let exponent = i32::try_from(attempt - 1).unwrap_or(i32::MAX);
        let backoff_ms = self.initial.as_millis() as f64 * self.multiplier.powi(exponent);
        let capped_ms = backoff_ms.min(self.max.as_millis() as f64);

        Duration::from_millis(capped_ms as u64)
    }

    /// Attempts made since the last reset.
    pub fn attempts(&self) -> u32 {
        self.attempt.load(Ordering::Relaxed)
    }
}

impl Default for ExponentialBackoff {
    fn default() -> Self {
        Self::from_settings(&BackoffSettings::default())
    }
}

impl BackoffPolicy for ExponentialBackoff {
    fn duration(&self) -> Duration {
        let attempt = self.attempt.fetch_add(1, Ordering::Relaxed).saturating_add(1);
        let delay = self.backoff_for_attempt(attempt);

        if self.jitter && !delay.is_zero() {
            let millis = rand::thread_rng().gen_range(0..=delay.as_millis() as u64);
            return Duration::from_millis(millis);
        }
        delay
    }

    fn reset(&self) {
        self.attempt.store(0, Ordering::Relaxed);
    }
}
