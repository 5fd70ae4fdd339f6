//! Backoff schedules for the WAITING state.
//!
//! The schedule is an explicit function of the empty-poll attempt count,
//! injected into the drain loop, so tests can collapse the waits to zero
//! instead of sleeping through them.

use std::sync::Arc;
use std::time::Duration;

/// Maps the 1-based empty-poll attempt count to the wait before the next
/// poll.
pub type BackoffSchedule = Arc<dyn Fn(u32) -> Duration + Send + Sync>;

/// Linearly increasing waits: base, 2x base, 3x base...
///
/// With the default 5s base this yields the 5s/10s/15s straggler grace
/// window.
pub fn linear(base: Duration) -> BackoffSchedule {
    Arc::new(move |attempt| base.saturating_mul(attempt.max(1)))
}

/// The same wait for every attempt.
pub fn constant(delay: Duration) -> BackoffSchedule {
    Arc::new(move |_attempt| delay)
}

/// No waiting at all. For tests.
pub fn none() -> BackoffSchedule {
    Arc::new(|_attempt| Duration::ZERO)
}
