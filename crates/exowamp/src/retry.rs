//! # Retry Strategies
//!
//! Decide how long to wait before each connection attempt and when to give up.
//!
//! Every call to [`RetryStrategy::next`] counts as one attempt, including the
//! very first connection. A successful connection should be followed by
//! [`RetryStrategy::reset`].
//!
//! ## Backoff
//!
//! For attempt `k` (1-based) the delay is
//! `round(min(cap, factor^(k-1) - 1 + base))` seconds. With `base = 0`,
//! `factor = 3` that is 0, 2, 8, 26, 80, ... seconds.

use std::time::Duration;

/// Maximum attempts of the default strategy.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 100;

/// Growth factor of the default strategy.
pub const DEFAULT_FACTOR: f64 = 3.0;

/// Longest wait of the default strategy.
pub const DEFAULT_CAP: Duration = Duration::from_secs(3600);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryAttemptsExceeded {
    pub max_attempts: u32,
}

impl std::fmt::Display for RetryAttemptsExceeded {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Retry attempts exceeded ({})", self.max_attempts)
    }
}

impl std::error::Error for RetryAttemptsExceeded {}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Delay {
    Constant(Duration),
    Backoff { base: f64, factor: f64, cap: f64 },
}

#[derive(Debug, Clone, PartialEq)]
pub struct RetryStrategy {
    max_attempts: u32,
    attempt: u32,
    delay: Delay,
}

impl RetryStrategy {
    /// Waits `delay` before every attempt.
    pub fn constant(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts,
            attempt: 0,
            delay: Delay::Constant(delay),
        }
    }

    /// Waits exponentially longer before every attempt, up to `cap`.
    pub fn backoff(max_attempts: u32, base: Duration, factor: f64, cap: Duration) -> Self {
        Self {
            max_attempts,
            attempt: 0,
            delay: Delay::Backoff {
                base: base.as_secs_f64(),
                factor,
                cap: cap.as_secs_f64(),
            },
        }
    }

    pub fn attempt_number(&self) -> u32 {
        self.attempt
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    pub fn done(&self) -> bool {
        self.attempt >= self.max_attempts
    }

    /// Consumes one attempt and returns how long to wait before making it.
    pub fn next(&mut self) -> Result<Duration, RetryAttemptsExceeded> {
        if self.done() {
            return Err(RetryAttemptsExceeded {
                max_attempts: self.max_attempts,
            });
        }
        self.attempt += 1;
        Ok(self.delay_for(self.attempt))
    }

    pub fn reset(&mut self) {
        self.attempt = 0;
    }

    fn delay_for(&self, attempt: u32) -> Duration {
        match self.delay {
            Delay::Constant(delay) => delay,
            Delay::Backoff { base, factor, cap } => {
                let exponent = i32::try_from(attempt - 1).unwrap_or(i32::MAX);
                let seconds = (factor.powi(exponent) - 1.0 + base).min(cap).round();
                Duration::from_secs_f64(seconds.max(0.0))
            }
        }
    }
}

impl Default for RetryStrategy {
    fn default() -> Self {
        Self::backoff(DEFAULT_MAX_ATTEMPTS, Duration::ZERO, DEFAULT_FACTOR, DEFAULT_CAP)
    }
}
