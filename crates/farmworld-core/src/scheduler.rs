//! Delayed event queue.
//!
//! Gameplay that must happen "later" (a fish biting after a random wait) is
//! recorded here as a data-only [`ScheduledTask`] instead of a closure. The
//! tick driver sweeps the queue once per tick after advancing the clock and
//! hands every due task to the dispatcher, which re-checks the task's
//! preconditions against current session state before acting.
//!
//! Cancellation is cooperative: a cancelled task is dropped at the next
//! sweep without running. There is no sub-tick precision.

use crate::clock::ClockError;
use crate::session::SessionId;

/// Handle returned by [`DelayedEventQueue::schedule`], used to cancel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct EventHandle(u64);

impl core::fmt::Display for EventHandle {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "evt-{}", self.0)
    }
}

/// What a scheduled task does when it fires.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskKind {
    /// A fish bites the line of a waiting angler.
    FishBite {
        /// The angler's session.
        session: SessionId,
        /// The angler's username, for logging and re-validation.
        user_name: String,
    },
}

/// One entry in the delayed event queue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScheduledTask {
    /// Handle identifying this entry.
    pub handle: EventHandle,
    /// Action to perform.
    pub kind: TaskKind,
    /// Simulation time at or after which the task fires.
    pub due_time: u64,
    /// Set by [`DelayedEventQueue::cancel`]; cancelled tasks never fire.
    pub cancelled: bool,
}

/// Queue of pending delayed tasks, kept in insertion order.
#[derive(Debug, Default)]
pub struct DelayedEventQueue {
    pending: Vec<ScheduledTask>,
    next_handle: u64,
}

impl DelayedEventQueue {
    /// Create an empty queue.
    pub const fn new() -> Self {
        Self {
            pending: Vec::new(),
            next_handle: 0,
        }
    }

    /// Schedule `kind` to fire `delay_ms` after `now`.
    ///
    /// # Errors
    ///
    /// Returns [`ClockError::Overflow`] if the due time or the handle
    /// counter would overflow.
    pub fn schedule(
        &mut self,
        now: u64,
        delay_ms: u64,
        kind: TaskKind,
    ) -> Result<EventHandle, ClockError> {
        let due_time = now.checked_add(delay_ms).ok_or(ClockError::Overflow {
            context: "event due time",
        })?;
        self.next_handle = self.next_handle.checked_add(1).ok_or(ClockError::Overflow {
            context: "event handle",
        })?;
        let handle = EventHandle(self.next_handle);
        self.pending.push(ScheduledTask {
            handle,
            kind,
            due_time,
            cancelled: false,
        });
        Ok(handle)
    }

    /// Mark a pending task as cancelled.
    ///
    /// Returns `false` if the handle is unknown, already fired, or already
    /// cancelled.
    pub fn cancel(&mut self, handle: EventHandle) -> bool {
        match self.pending.iter_mut().find(|t| t.handle == handle) {
            Some(task) if !task.cancelled => {
                task.cancelled = true;
                true
            }
            _ => false,
        }
    }

    /// Remove and return every task due at `now`, in insertion order.
    ///
    /// Cancelled tasks are removed without being returned, whether or not
    /// they are due. Everything else stays queued.
    pub fn sweep(&mut self, now: u64) -> Vec<ScheduledTask> {
        let mut due = Vec::new();
        let mut kept = Vec::with_capacity(self.pending.len());
        for task in self.pending.drain(..) {
            if task.cancelled {
                continue;
            }
            if task.due_time <= now {
                due.push(task);
            } else {
                kept.push(task);
            }
        }
        self.pending = kept;
        due
    }

    /// Number of queued tasks, including cancelled ones not yet swept.
    pub fn len(&self) -> usize {
        self.pending.len()
    }

    /// Whether the queue holds no tasks.
    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}
