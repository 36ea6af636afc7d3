//! Rate limiting for repeated checks.

use std::time::Duration;

use tokio::time::Instant;

/// Lets an action through at most once per period.
///
/// The first call always passes. Time comes from the runtime clock, so a
/// paused test clock controls it.
#[derive(Debug, Clone)]
pub struct Debouncer {
    period: Duration,
    last: Option<Instant>,
}

impl Debouncer {
    /// Creates a debouncer that has never fired.
    #[must_use]
    pub const fn new(period: Duration) -> Self {
        Self { period, last: None }
    }

    /// Returns `true` and records the time if the period has passed since
    /// the last accepted call.
    pub fn ready(&mut self) -> bool {
        let now = Instant::now();
        match self.last {
            Some(last) if now.duration_since(last) < self.period => false,
            _ => {
                self.last = Some(now);
                true
            }
        }
    }

    /// Forgets the last accepted call so the next one passes.
    pub const fn reset(&mut self) {
        self.last = None;
    }
}
