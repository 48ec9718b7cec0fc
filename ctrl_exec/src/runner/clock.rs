//! Clocks used by the solver runner to measure policy lag

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use std::{
    convert::TryFrom,
    sync::atomic::{AtomicU64, Ordering},
    time::{Duration, Instant},
};

// ------------------------------------------------------------------------------------------------
// TRAITS
// ------------------------------------------------------------------------------------------------

/// A monotonic source of time, measured from an arbitrary epoch.
pub trait Clock: Send + Sync {
    fn now(&self) -> Duration;
}

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// Wall clock time since the clock was created.
#[derive(Debug, Clone, Copy)]
pub struct MonotonicClock {
    epoch: Instant,
}

/// A clock which only moves when told to.
#[derive(Debug, Default)]
pub struct ManualClock {
    nanos: AtomicU64,
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl MonotonicClock {
    pub fn new() -> Self {
        Self {
            epoch: Instant::now(),
        }
    }
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for MonotonicClock {
    fn now(&self) -> Duration {
        self.epoch.elapsed()
    }
}

impl ManualClock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Move the clock forward.
    pub fn advance(&self, by: Duration) {
        self.nanos.fetch_add(duration_to_nanos(by), Ordering::SeqCst);
    }

    /// Set the clock to an absolute time.
    pub fn set(&self, to: Duration) {
        self.nanos.store(duration_to_nanos(to), Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Duration {
        Duration::from_nanos(self.nanos.load(Ordering::SeqCst))
    }
}

// ------------------------------------------------------------------------------------------------
// FUNCTIONS
// ------------------------------------------------------------------------------------------------

/// Number of whole time steps of length `dt` seconds contained in `elapsed`.
///
/// Counted in integer nanoseconds so that an elapsed time landing exactly on a step boundary
/// gives that step.
pub fn steps_elapsed(elapsed: Duration, dt: f64) -> usize {
    let dt_nanos = ((dt * 1e9).round() as u128).max(1);
    usize::try_from(elapsed.as_nanos() / dt_nanos).unwrap_or(usize::MAX)
}

/// [`steps_elapsed`] for a time in seconds, negative and NaN times give step zero.
pub fn steps_elapsed_secs(elapsed_s: f64, dt: f64) -> usize {
    if elapsed_s > 0.0 {
        steps_elapsed(Duration::from_nanos((elapsed_s * 1e9).round() as u64), dt)
    } else {
        0
    }
}

fn duration_to_nanos(d: Duration) -> u64 {
    u64::try_from(d.as_nanos()).unwrap_or(u64::MAX)
}
