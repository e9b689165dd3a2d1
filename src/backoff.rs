//! Reconnect backoff.
//!
//! Pure state: the attempt counter and configuration. The random source is
//! injectable so tests can pin the jitter.

use std::fmt;
use std::time::Duration;

use rand::rngs::StdRng;
use rand::{Rng, RngCore, SeedableRng};

/// Default delay before the first retry.
pub const DEFAULT_BASE: Duration = Duration::from_millis(500);

/// Default upper bound on the un-jittered delay.
pub const DEFAULT_CAP: Duration = Duration::from_secs(60);

/// Default relative jitter (±25 %).
pub const DEFAULT_JITTER: f64 = 0.25;

/// Exponential backoff with randomized jitter.
pub struct ExponentialBackoff {
    base: Duration,
    cap: Duration,
    jitter: f64,
    attempts: u32,
    rng: Box<dyn RngCore + Send>,
}

impl fmt::Debug for ExponentialBackoff {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExponentialBackoff")
            .field("base", &self.base)
            .field("cap", &self.cap)
            .field("jitter", &self.jitter)
            .field("attempts", &self.attempts)
            .finish_non_exhaustive()
    }
}

impl ExponentialBackoff {
    /// Creates a backoff seeded from the OS.
    ///
    /// `jitter` is clamped to `[0, 1]`.
    ///
    /// # Examples
    ///
    /// ```
    /// use presence_ipc::backoff::ExponentialBackoff;
    /// use std::time::Duration;
    /// let mut backoff = ExponentialBackoff::new(
    ///     Duration::from_millis(100),
    ///     Duration::from_millis(5000),
    ///     0.25,
    /// );
    /// let delay = backoff.next_delay();
    /// assert!(delay >= Duration::from_millis(75));
    /// assert!(delay <= Duration::from_millis(125));
    /// ```
    #[must_use]
    pub fn new(base: Duration, cap: Duration, jitter: f64) -> Self {
        Self::with_rng(base, cap, jitter, Box::new(StdRng::from_entropy()))
    }

    /// Creates a backoff drawing jitter from `rng`.
    #[must_use]
    pub fn with_rng(base: Duration, cap: Duration, jitter: f64, rng: Box<dyn RngCore + Send>) -> Self {
        let jitter = if jitter.is_finite() { jitter.clamp(0.0, 1.0) } else { 0.0 };
        Self {
            base,
            cap,
            jitter,
            attempts: 0,
            rng,
        }
    }

    /// Compute the next delay (with jitter) and count the attempt.
    #[allow(clippy::cast_possible_truncation, clippy::cast_precision_loss, clippy::cast_sign_loss)]
    pub fn next_delay(&mut self) -> Duration {
        let base_ms = self.base.as_millis().min(u128::from(u64::MAX)) as u64;
        let cap_ms = self.cap.as_millis().min(u128::from(u64::MAX)) as u64;

        let grown = 1u64
            .checked_shl(self.attempts)
            .and_then(|factor| base_ms.checked_mul(factor))
            .unwrap_or(u64::MAX);
        let current_ms = grown.min(cap_ms);

        let factor = if self.jitter > 0.0 {
            self.rng.gen_range((1.0 - self.jitter)..=(1.0 + self.jitter))
        } else {
            1.0
        };
        let delay = Duration::from_millis((current_ms as f64 * factor) as u64);

        self.attempts = self.attempts.saturating_add(1);
        delay
    }

    /// Forget previous failures.
    pub fn reset(&mut self) {
        self.attempts = 0;
    }

    /// Number of delays handed out since the last reset.
    pub fn attempts(&self) -> u32 {
        self.attempts
    }
}

impl Default for ExponentialBackoff {
    fn default() -> Self {
        Self::new(DEFAULT_BASE, DEFAULT_CAP, DEFAULT_JITTER)
    }
}
