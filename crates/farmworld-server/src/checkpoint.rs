//! Tick callback that persists clock checkpoints.
//!
//! The tick reports a checkpoint every `checkpoint_interval_ms` of
//! simulation time. Writing it is fire-and-forget: the tick never waits on
//! it, and a failed write is retried implicitly by the next checkpoint.

use farmworld_core::runner::TickCallback;
use farmworld_core::tick::{ServerState, TickSummary};
use farmworld_db::DragonflyPool;
use tracing::{debug, warn};

/// Callback that writes `world:clock` whenever the tick asks for it.
pub struct CheckpointCallback {
    pool: DragonflyPool,
}

impl CheckpointCallback {
    /// Create a callback writing through `pool`.
    pub const fn new(pool: DragonflyPool) -> Self {
        Self { pool }
    }
}

impl TickCallback for CheckpointCallback {
    fn on_tick(&mut self, summary: &TickSummary, _state: &ServerState) {
        let Some(time_ms) = summary.checkpoint else {
            return;
        };
        let pool = self.pool.clone();
        tokio::spawn(async move {
            match pool.set_world_clock(time_ms).await {
                Ok(()) => debug!(time_ms, "Clock checkpoint written"),
                Err(e) => warn!(time_ms, error = %e, "Clock checkpoint failed"),
            }
        });
    }
}
