//! Injectable time source.
//!
//! The scheduler's frame budget, the project timer and every "wait" block
//! read time through [`Clock`], so tests can drive them with [`MockClock`]
//! instead of sleeping.

use std::sync::Mutex;
use std::time::{Duration, Instant};

/// Monotonic time source, measured from an arbitrary fixed origin.
pub trait Clock: Send + Sync {
    fn now(&self) -> Duration;
}

/// Wall clock backed by [`Instant`].
#[derive(Debug)]
pub struct SystemClock {
    origin: Instant,
}

impl SystemClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    fn now(&self) -> Duration {
        self.origin.elapsed()
    }
}

/// Manually driven clock.
///
/// Time only moves through [`MockClock::advance`] / [`MockClock::set`], or,
/// when built with [`MockClock::auto_advance`], by a fixed step after every
/// reading. Auto-advance lets a test observe the scheduler's time budget
/// expiring while a thread spins.
#[derive(Debug, Default)]
pub struct MockClock {
    state: Mutex<MockState>,
}

#[derive(Debug, Default)]
struct MockState {
    now: Duration,
    step: Duration,
}

impl MockClock {
    pub fn new() -> Self {
        Self::default()
    }

    /// A clock that moves forward by `step` each time it is read.
    pub fn auto_advance(step: Duration) -> Self {
        Self {
            state: Mutex::new(MockState {
                now: Duration::ZERO,
                step,
            }),
        }
    }

    pub fn advance(&self, by: Duration) {
        let mut state = self.lock();
        state.now = state.now.saturating_add(by);
    }

    pub fn set(&self, now: Duration) {
        self.lock().now = now;
    }

    /// Current time without triggering auto-advance.
    pub fn peek(&self) -> Duration {
        self.lock().now
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MockState> {
        // A poisoned clock still holds a valid duration.
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl Clock for MockClock {
    fn now(&self) -> Duration {
        let mut state = self.lock();
        let now = state.now;
        state.now = state.now.saturating_add(state.step);
        now
    }
}
