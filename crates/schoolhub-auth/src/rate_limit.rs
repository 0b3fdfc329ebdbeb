//! Token bucket for failed login attempts.
//!
//! Each failed attempt consumes one token. Tokens refill continuously so
//! that an empty bucket is full again after the configured window. A bucket
//! that cannot pay for an attempt means the login is under attack.

use std::time::Duration;

use tokio::time::Instant;

/// A token bucket with sub-token precision.
///
/// Amounts are kept in thousandths of a token so slow refill rates still
/// make progress between calls.
#[derive(Debug, Clone)]
pub struct TokenBucket {
    tokens_millis: u64,
    capacity_millis: u64,
    /// Tokens added per second.
    refill_rate: f64,
    last_refill: Instant,
}

impl TokenBucket {
    /// A full bucket of `capacity` tokens that refills completely over `window`.
    pub fn new(capacity: u32, window: Duration) -> Self {
        Self::new_at(capacity, window, Instant::now())
    }

    pub fn new_at(capacity: u32, window: Duration, now: Instant) -> Self {
        let capacity = u64::from(capacity);
        let refill_rate = if window.is_zero() {
            0.0
        } else {
            capacity as f64 / window.as_secs_f64()
        };
        Self {
            tokens_millis: capacity * 1000,
            capacity_millis: capacity * 1000,
            refill_rate,
            last_refill: now,
        }
    }

    /// Refills for the time elapsed, then tries to take one token.
    ///
    /// Returns `false` when the bucket is exhausted.
    pub fn try_acquire(&mut self) -> bool {
        self.try_acquire_at(Instant::now())
    }

    pub fn try_acquire_at(&mut self, now: Instant) -> bool {
        self.refill(now);
        if self.tokens_millis >= 1000 {
            self.tokens_millis -= 1000;
            true
        } else {
            false
        }
    }

    /// Whole tokens currently available.
    pub fn available_at(&mut self, now: Instant) -> u64 {
        self.refill(now);
        self.tokens_millis / 1000
    }

    fn refill(&mut self, now: Instant) {
        let elapsed = now.saturating_duration_since(self.last_refill);
        let refill = (elapsed.as_secs_f64() * self.refill_rate * 1000.0) as u64;
        if refill > 0 {
            self.tokens_millis = (self.tokens_millis + refill).min(self.capacity_millis);
            self.last_refill = now;
        }
    }
}
