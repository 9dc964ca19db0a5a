//! Modification timestamps.
//!
//! Each pipeline owns one [`ModifiedClock`]. Parameter changes and executions
//! both draw from it, so "newer than" comparisons between any two nodes of the
//! same pipeline are meaningful and deterministic.

use std::fmt;

/// A point on a pipeline's modification clock. `Timestamp::ZERO` predates everything.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Timestamp(pub u64);

impl Timestamp {
    pub const ZERO: Timestamp = Timestamp(0);
}

impl fmt::Debug for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "t{}", self.0)
    }
}

/// Monotonically increasing counter.
#[derive(Debug, Default)]
pub struct ModifiedClock {
    current: u64,
}

impl ModifiedClock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Advance and return the new time.
    pub fn tick(&mut self) -> Timestamp {
        self.current += 1;
        Timestamp(self.current)
    }

    pub fn now(&self) -> Timestamp {
        Timestamp(self.current)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tick_is_strictly_increasing() {
        let mut clock = ModifiedClock::new();
        let a = clock.tick();
        let b = clock.tick();
        assert!(b > a);
        assert!(a > Timestamp::ZERO);
        assert_eq!(clock.now(), b);
    }
}
