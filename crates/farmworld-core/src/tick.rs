//! The tick: one synchronous step of the server.
//!
//! Every tick runs the same phases in the same order:
//!
//! 1. **Advance** -- record the tick's simulation time.
//! 2. **Dispatch** -- hand each inbound event to its workflow handler.
//! 3. **Relay** -- send every known player pose to everyone else (on the
//!    configured cadence).
//! 4. **Sweep** -- fire delayed events that are now due.
//! 5. **Checkpoint** -- report the clock value to persist, if one is due.
//!
//! All state the phases touch is owned by [`ServerState`] and passed in
//! explicitly; nothing here is global.

use std::sync::Arc;

use rand::SeedableRng;
use rand::rngs::StdRng;
use tracing::debug;

use crate::activity::{ActivityError, TransitionTable};
use crate::broadcast::{BroadcastRouter, Transport};
use crate::clock::{ClockError, GameClock};
use crate::config::ServerConfig;
use crate::dispatch::{self, DispatchOutcome, InboundEvent};
use crate::locks::LockCoordinator;
use crate::scheduler::DelayedEventQueue;
use crate::session::SessionRegistry;
use crate::store::WorldStore;
use crate::workflows::presence;

/// Errors that abort a tick.
///
/// Individual bad requests never do; only a broken clock or an invalid
/// startup configuration does.
#[derive(Debug, thiserror::Error)]
pub enum TickError {
    /// The clock refused to advance.
    #[error("clock error: {source}")]
    Clock {
        /// The underlying clock error.
        #[from]
        source: ClockError,
    },

    /// The activity transition table is inconsistent.
    #[error("activity table error: {source}")]
    Activity {
        /// The underlying state machine error.
        #[from]
        source: ActivityError,
    },
}

/// Gameplay knobs read from configuration once at startup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GameplaySettings {
    /// Shortest bite delay.
    pub min_bite_delay_ms: u64,
    /// Longest bite delay.
    pub max_bite_delay_ms: u64,
    /// Whether developer placement requests are honoured.
    pub allow_developer_placement: bool,
    /// Relay transforms every N ticks.
    pub transform_broadcast_interval_ticks: u64,
}

impl GameplaySettings {
    /// Extract the gameplay settings from a full configuration.
    pub const fn from_config(config: &ServerConfig) -> Self {
        Self {
            min_bite_delay_ms: config.fishing.min_bite_delay_ms,
            max_bite_delay_ms: config.fishing.max_bite_delay_ms,
            allow_developer_placement: config.developer.allow_developer_placement,
            transform_broadcast_interval_ticks: config.server.transform_broadcast_interval_ticks,
        }
    }
}

/// Everything the tick and the workflow handlers operate on.
pub struct ServerState {
    /// Simulation clock.
    pub clock: GameClock,
    /// Pending delayed tasks.
    pub events: DelayedEventQueue,
    /// Logged-in players.
    pub sessions: SessionRegistry,
    /// Object lock protocol.
    pub locks: LockCoordinator,
    /// Persistence.
    pub store: Arc<dyn WorldStore>,
    /// Outbound fan-out.
    pub router: BroadcastRouter,
    /// Seeded randomness for bite delays.
    pub rng: StdRng,
    /// Gameplay knobs.
    pub settings: GameplaySettings,
}

impl core::fmt::Debug for ServerState {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("ServerState")
            .field("clock", &self.clock)
            .field("sessions", &self.sessions.len())
            .field("events", &self.events.len())
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}

impl ServerState {
    /// Assemble server state from configuration and its collaborators.
    ///
    /// `clock_offset_ms` is the simulation time to resume from, normally
    /// the last persisted checkpoint or the configured start time.
    ///
    /// # Errors
    ///
    /// Returns [`TickError::Activity`] if the transition table is invalid.
    pub fn new(
        config: &ServerConfig,
        store: Arc<dyn WorldStore>,
        transport: Box<dyn Transport>,
        clock_offset_ms: u64,
    ) -> Result<Self, TickError> {
        let table = Arc::new(TransitionTable::standard()?);
        Ok(Self {
            clock: GameClock::new(clock_offset_ms, config.time.checkpoint_interval_ms),
            events: DelayedEventQueue::new(),
            sessions: SessionRegistry::new(table),
            locks: LockCoordinator::new(Arc::clone(&store)),
            store,
            router: BroadcastRouter::new(transport),
            rng: StdRng::seed_from_u64(config.world.seed),
            settings: GameplaySettings::from_config(config),
        })
    }
}

/// Summary of one completed tick.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TickSummary {
    /// Tick number that just ran.
    pub tick: u64,
    /// Simulation time of the tick.
    pub time_ms: u64,
    /// Inbound events handled successfully.
    pub events_handled: usize,
    /// Inbound events dropped as invalid.
    pub events_rejected: usize,
    /// Inbound events that failed.
    pub events_failed: usize,
    /// Poses relayed.
    pub transforms_relayed: usize,
    /// Delayed tasks fired.
    pub tasks_fired: usize,
    /// Messages handed to the transport during the tick.
    pub messages_sent: u64,
    /// Clock value to persist, if a checkpoint is due.
    pub checkpoint: Option<u64>,
    /// Players logged in at the end of the tick.
    pub sessions: usize,
}

/// Run one tick `elapsed_ms` after process start with the events received
/// since the previous tick.
///
/// # Errors
///
/// Returns [`TickError::Clock`] if `elapsed_ms` would move time backwards.
/// The inbound events are not processed in that case.
pub fn run_tick(
    state: &mut ServerState,
    elapsed_ms: u64,
    inbound: Vec<InboundEvent>,
) -> Result<TickSummary, TickError> {
    // --- Phase 1: Advance ---
    let time_ms = state.clock.advance(elapsed_ms)?;
    let tick = state.clock.tick();
    let sent_before = state.router.sent();
    let mut summary = TickSummary {
        tick,
        time_ms,
        ..TickSummary::default()
    };

    // --- Phase 2: Dispatch ---
    for event in inbound {
        match dispatch::dispatch_event(state, event) {
            DispatchOutcome::Handled => {
                summary.events_handled = summary.events_handled.saturating_add(1);
            }
            DispatchOutcome::Rejected => {
                summary.events_rejected = summary.events_rejected.saturating_add(1);
            }
            DispatchOutcome::Failed => {
                summary.events_failed = summary.events_failed.saturating_add(1);
            }
        }
    }

    // --- Phase 3: Relay ---
    let interval = state.settings.transform_broadcast_interval_ticks.max(1);
    if tick.checked_rem(interval) == Some(0) {
        summary.transforms_relayed = presence::broadcast_transforms(state);
    }

    // --- Phase 4: Sweep ---
    for task in state.events.sweep(time_ms) {
        dispatch::dispatch_task(state, task);
        summary.tasks_fired = summary.tasks_fired.saturating_add(1);
    }

    // --- Phase 5: Checkpoint ---
    summary.checkpoint = state.clock.checkpoint();
    summary.messages_sent = state.router.sent().saturating_sub(sent_before);
    summary.sessions = state.sessions.len();

    debug!(
        tick,
        time_ms,
        handled = summary.events_handled,
        rejected = summary.events_rejected,
        failed = summary.events_failed,
        tasks = summary.tasks_fired,
        sent = summary.messages_sent,
        "Tick complete"
    );
    Ok(summary)
}
