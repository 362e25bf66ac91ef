//! Idle strategies: the adaptive pause policy used when no work is
//! available, or when a non-blocking offer needs to be retried.
//!
//! A busy-spin-with-sleep back-pressure loop is easy to get wrong in either
//! direction (wastes a core, or adds latency under light load), so this is
//! a small trait with three selectable policies rather than one hard-coded
//! loop.

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

/// A pause policy invoked when a poll/offer loop has no progress to report.
///
/// `idle` takes the number of consecutive no-progress attempts so callers
/// can implement a ladder (e.g. spin, then yield, then sleep with growing
/// duration). Boxed futures keep the trait object-safe so engines can be
/// configured with a `Box<dyn IdleStrategy>` chosen at construction time.
pub trait IdleStrategy: Send + Sync {
    fn idle<'a>(&'a self, attempt: u32) -> Pin<Box<dyn Future<Output = ()> + Send + 'a>>;

    /// Called when progress resumes, so a stateful strategy can reset its
    /// ladder position. The default is a no-op for stateless strategies.
    fn reset(&self) {}
}

/// Never actually pauses; yields to the scheduler only to avoid starving
/// other tasks on a cooperative runtime. Lowest latency, highest CPU use.
#[derive(Debug, Default, Clone, Copy)]
pub struct BusySpinIdle;

impl IdleStrategy for BusySpinIdle {
    fn idle<'a>(&'a self, _attempt: u32) -> Pin<Box<dyn Future<Output = ()> + Send + 'a>> {
        Box::pin(std::future::ready(()))
    }
}

/// Cooperatively yields on every call. A step up from busy-spin when
/// sharing a runtime with other tasks matters more than shaving
/// microseconds of latency.
#[derive(Debug, Default, Clone, Copy)]
pub struct YieldingIdle;

impl IdleStrategy for YieldingIdle {
    fn idle<'a>(&'a self, _attempt: u32) -> Pin<Box<dyn Future<Output = ()> + Send + 'a>> {
        Box::pin(tokio::task::yield_now())
    }
}

/// Yield for the first few attempts, then escalate to sleeping with a
/// growing duration, capped at `max_sleep`. This is the glossary's "yield ->
/// sleep-ns ladder" and the strategy engines default to.
#[derive(Debug, Clone, Copy)]
pub struct BackoffIdle {
    yield_attempts: u32,
    initial_sleep: Duration,
    max_sleep: Duration,
}

impl BackoffIdle {
    pub fn new(yield_attempts: u32, initial_sleep: Duration, max_sleep: Duration) -> Self {
        Self {
            yield_attempts,
            initial_sleep,
            max_sleep,
        }
    }
}

impl Default for BackoffIdle {
    fn default() -> Self {
        Self::new(10, Duration::from_micros(50), Duration::from_millis(10))
    }
}

impl IdleStrategy for BackoffIdle {
    fn idle<'a>(&'a self, attempt: u32) -> Pin<Box<dyn Future<Output = ()> + Send + 'a>> {
        if attempt < self.yield_attempts {
            return Box::pin(tokio::task::yield_now());
        }
        let escalations = attempt - self.yield_attempts;
        let sleep = self
            .initial_sleep
            .saturating_mul(1u32.checked_shl(escalations).unwrap_or(u32::MAX))
            .min(self.max_sleep);
        Box::pin(tokio::time::sleep(sleep))
    }
}
