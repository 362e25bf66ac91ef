//! Token-bucket rate limiter governing client admission.
//!
//! `rate_per_second × max_burst_seconds` sets the bucket capacity; tokens
//! refill continuously based on elapsed monotonic time and are spent
//! whole (no partial spending, no waiting) by `try_acquire`.

use std::fmt;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

/// Outcome of a `try_acquire` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    Granted,
    Denied,
}

impl Admission {
    pub fn is_granted(self) -> bool {
        matches!(self, Admission::Granted)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InvalidRate;

impl fmt::Display for InvalidRate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "rate_per_second and max_burst_seconds must both be > 0")
    }
}

impl std::error::Error for InvalidRate {}

struct State {
    tokens: f64,
    last_refill: Instant,
    rate_per_second: f64,
    capacity: f64,
}

/// A token bucket: `rate_per_second` tokens are added per second of wall
/// time, up to `rate_per_second * max_burst_seconds` tokens banked.
pub struct TokenBucket {
    state: Mutex<State>,
}

impl TokenBucket {
    pub fn new(rate_per_second: f64, max_burst_seconds: f64) -> Result<Self, InvalidRate> {
        if rate_per_second <= 0.0 || max_burst_seconds <= 0.0 {
            return Err(InvalidRate);
        }
        let capacity = rate_per_second * max_burst_seconds;
        Ok(Self {
            state: Mutex::new(State {
                tokens: capacity,
                last_refill: Instant::now(),
                rate_per_second,
                capacity,
            }),
        })
    }

    /// Refill based on elapsed time, then attempt to spend `n` tokens
    /// atomically. Never partially spends and never waits.
    pub fn try_acquire(&self, n: f64) -> Admission {
        let mut state = self.state.lock();
        refill(&mut state);
        if state.tokens >= n {
            state.tokens -= n;
            Admission::Granted
        } else {
            Admission::Denied
        }
    }

    /// Try to acquire a single token; the common case.
    pub fn try_acquire_one(&self) -> Admission {
        self.try_acquire(1.0)
    }

    /// Side-effect-free read of currently available tokens (after a refill
    /// calculation, but without spending).
    pub fn available_permits(&self) -> f64 {
        let mut state = self.state.lock();
        refill(&mut state);
        state.tokens
    }

    pub fn capacity(&self) -> f64 {
        self.state.lock().capacity
    }

    pub fn current_rate(&self) -> f64 {
        self.state.lock().rate_per_second
    }

    /// Change the rate (and therefore capacity); clamps current tokens to
    /// the new capacity so a rate decrease can't leave a stale surplus.
    pub fn set_rate(&self, rate_per_second: f64, max_burst_seconds: f64) -> Result<(), InvalidRate> {
        if rate_per_second <= 0.0 || max_burst_seconds <= 0.0 {
            return Err(InvalidRate);
        }
        let mut state = self.state.lock();
        refill(&mut state);
        state.rate_per_second = rate_per_second;
        state.capacity = rate_per_second * max_burst_seconds;
        state.tokens = state.tokens.min(state.capacity);
        tracing::debug!(rate_per_second, max_burst_seconds, "rate limiter rate changed");
        Ok(())
    }

    /// Restore tokens to full capacity and reset the refill clock to now.
    pub fn reset(&self) {
        let mut state = self.state.lock();
        state.tokens = state.capacity;
        state.last_refill = Instant::now();
        tracing::debug!("rate limiter reset to capacity");
    }
}

fn refill(state: &mut State) {
    let now = Instant::now();
    let elapsed = now.saturating_duration_since(state.last_refill);
    state.tokens = (state.tokens + elapsed.as_secs_f64() * state.rate_per_second).min(state.capacity);
    state.last_refill = now;
}
