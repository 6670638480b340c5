//! Simulation clock for the `FarmWorld` server.
//!
//! The clock is the single source of truth for "now" inside a tick. Every
//! workflow that stamps a time (lock start, mining session start, planting
//! time) or schedules a delayed event reads it from here, never from the
//! wall clock.
//!
//! # Design Principles
//!
//! - Simulation time is a configured start offset plus the elapsed
//!   milliseconds supplied by the tick driver. The driver owns the wall
//!   clock; this type only checks that time never runs backwards.
//! - All arithmetic is checked.
//! - Checkpoints are reported, not written: the caller decides where the
//!   value is persisted.

/// Default interval between persisted clock checkpoints.
pub const DEFAULT_CHECKPOINT_INTERVAL_MS: u64 = 5_000;

/// Errors that can occur during clock operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ClockError {
    /// The driver supplied a time earlier than the previous tick.
    #[error("clock moved backwards: {requested} ms is before current {current} ms")]
    WentBackwards {
        /// Simulation time of the previous tick.
        current: u64,
        /// The rejected simulation time.
        requested: u64,
    },

    /// Time or tick arithmetic would overflow.
    #[error("clock overflow: {context}")]
    Overflow {
        /// Which computation overflowed.
        context: &'static str,
    },
}

/// Monotonic simulation clock.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GameClock {
    /// Simulation time at process start, restored from the last checkpoint.
    offset_ms: u64,

    /// Simulation time of the current tick.
    now_ms: u64,

    /// Number of ticks advanced so far.
    tick: u64,

    /// Minimum spacing between checkpoints.
    checkpoint_interval_ms: u64,

    /// Simulation time of the last reported checkpoint.
    last_checkpoint_ms: u64,
}

impl GameClock {
    /// Create a clock that starts at `offset_ms` of simulation time.
    pub const fn new(offset_ms: u64, checkpoint_interval_ms: u64) -> Self {
        Self {
            offset_ms,
            now_ms: offset_ms,
            tick: 0,
            checkpoint_interval_ms,
            last_checkpoint_ms: offset_ms,
        }
    }

    /// Record the start of a new tick, `elapsed_ms` after process start.
    ///
    /// Returns the new simulation time.
    ///
    /// # Errors
    ///
    /// Returns [`ClockError::WentBackwards`] if the resulting time is
    /// earlier than the previous tick, or [`ClockError::Overflow`] if the
    /// offset plus elapsed time exceeds `u64::MAX`.
    pub fn advance(&mut self, elapsed_ms: u64) -> Result<u64, ClockError> {
        let requested = self
            .offset_ms
            .checked_add(elapsed_ms)
            .ok_or(ClockError::Overflow {
                context: "offset + elapsed",
            })?;
        if requested < self.now_ms {
            return Err(ClockError::WentBackwards {
                current: self.now_ms,
                requested,
            });
        }
        self.tick = self
            .tick
            .checked_add(1)
            .ok_or(ClockError::Overflow { context: "tick" })?;
        self.now_ms = requested;
        Ok(requested)
    }

    /// Simulation time of the current tick in milliseconds.
    pub const fn now(&self) -> u64 {
        self.now_ms
    }

    /// Number of ticks advanced so far.
    pub const fn tick(&self) -> u64 {
        self.tick
    }

    /// Simulation time the clock started from.
    pub const fn offset(&self) -> u64 {
        self.offset_ms
    }

    /// Report a checkpoint if at least one interval has passed since the
    /// last one.
    ///
    /// Returns the time to persist, or `None` if no checkpoint is due.
    pub const fn checkpoint(&mut self) -> Option<u64> {
        if self.now_ms.saturating_sub(self.last_checkpoint_ms) >= self.checkpoint_interval_ms {
            self.last_checkpoint_ms = self.now_ms;
            Some(self.now_ms)
        } else {
            None
        }
    }
}

impl Default for GameClock {
    fn default() -> Self {
        Self::new(0, DEFAULT_CHECKPOINT_INTERVAL_MS)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn advance_adds_offset() {
        let mut clock = GameClock::new(1_000, 5_000);
        assert_eq!(clock.now(), 1_000);
        assert_eq!(clock.advance(50).unwrap(), 1_050);
        assert_eq!(clock.tick(), 1);
        assert_eq!(clock.advance(50).unwrap(), 1_050);
        assert_eq!(clock.tick(), 2);
    }

    #[test]
    fn rejects_time_going_backwards() {
        let mut clock = GameClock::default();
        clock.advance(200).unwrap();
        let err = clock.advance(100).unwrap_err();
        assert_eq!(
            err,
            ClockError::WentBackwards {
                current: 200,
                requested: 100
            }
        );
        assert_eq!(clock.now(), 200);
        assert_eq!(clock.tick(), 1);
    }

    #[test]
    fn overflow_is_an_error() {
        let mut clock = GameClock::new(u64::MAX, 5_000);
        assert!(matches!(
            clock.advance(1),
            Err(ClockError::Overflow { .. })
        ));
    }

    #[test]
    fn checkpoints_follow_interval() {
        let mut clock = GameClock::new(0, 5_000);
        clock.advance(4_999).unwrap();
        assert_eq!(clock.checkpoint(), None);
        clock.advance(5_000).unwrap();
        assert_eq!(clock.checkpoint(), Some(5_000));
        assert_eq!(clock.checkpoint(), None);
        clock.advance(10_100).unwrap();
        assert_eq!(clock.checkpoint(), Some(10_100));
    }
}
