//! Virtual clock.
//!
//! The only notion of time in a simulation. It starts at zero and advances by
//! exactly one tick per harness step; nothing in the crate reads wall-clock time.

/// Deterministic tick counter.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SimClock {
    now: u64,
}

impl SimClock {
    /// Creates a new clock starting at time zero.
    pub fn new() -> Self {
        Self { now: 0 }
    }

    /// Returns the current virtual time.
    #[inline]
    pub fn now(&self) -> u64 {
        self.now
    }

    /// Advances time by exactly one unit.
    #[inline]
    pub fn tick(&mut self) {
        self.now += 1;
    }
}
