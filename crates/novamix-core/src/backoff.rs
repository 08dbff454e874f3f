//! Reconnect backoff policy.

use std::time::Duration;

/// Shortest delay handed out. A zero delay would never grow.
pub const MIN_DELAY: Duration = Duration::from_millis(10);

/// Geometric backoff with an upper bound and an optional attempt limit.
#[derive(Debug, Clone, PartialEq)]
pub struct Backoff {
    initial: Duration,
    max: Duration,
    multiplier: f64,
    max_attempts: Option<u32>,
    attempts: u32,
}

impl Backoff {
    /// Create a backoff policy.
    ///
    /// A multiplier below 1.0 is treated as 1.0 and `initial` is raised to
    /// at least [`MIN_DELAY`].
    #[must_use]
    pub fn new(
        initial: Duration,
        max: Duration,
        multiplier: f64,
        max_attempts: Option<u32>,
    ) -> Self {
        let initial = initial.max(MIN_DELAY);
        Self {
            initial,
            max: max.max(initial),
            multiplier: multiplier.max(1.0),
            max_attempts,
            attempts: 0,
        }
    }

    /// Delay before the next attempt, or `None` once the limit is reached.
    pub fn next_delay(&mut self) -> Option<Duration> {
        if self.max_attempts.is_some_and(|limit| self.attempts >= limit) {
            return None;
        }

        let exponent = i32::try_from(self.attempts).unwrap_or(i32::MAX);
        let scaled = self.initial.as_secs_f64() * self.multiplier.powi(exponent);
        let delay = if scaled.is_finite() && scaled < self.max.as_secs_f64() {
            Duration::from_secs_f64(scaled)
        } else {
            self.max
        };

        self.attempts = self.attempts.saturating_add(1);
        Some(delay)
    }

    /// Forget previous failures.
    pub fn reset(&mut self) {
        self.attempts = 0;
    }

    /// Number of delays handed out since the last reset.
    #[must_use]
    pub fn attempts(&self) -> u32 {
        self.attempts
    }
}

impl Default for Backoff {
    fn default() -> Self {
        Self::new(Duration::from_millis(500), Duration::from_secs(30), 2.0, None)
    }
}
