//! Fixed-rate tick loop.
//!
//! [`run_server`] drives [`run_tick`] at the configured rate. Between ticks
//! it sleeps until the next tick boundary; at each boundary it drains
//! everything the transport queued and hands it to the tick in one batch.
//!
//! The loop stops when shutdown is signalled, when every inbox sender is
//! gone, or after `max_ticks` ticks if a bound was given.
//!
//! [`run_tick`]: crate::tick::run_tick

use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio::time::Instant;
use tracing::{info, warn};

use crate::dispatch::InboundEvent;
use crate::tick::{self, ServerState, TickError, TickSummary};

/// Errors that can occur while the loop runs.
#[derive(Debug, thiserror::Error)]
pub enum RunnerError {
    /// A tick execution failed.
    #[error("tick error: {source}")]
    Tick {
        /// The underlying tick error.
        #[from]
        source: TickError,
    },
}

/// Why the loop returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownReason {
    /// The shutdown signal fired.
    Requested,
    /// Every inbox sender was dropped.
    InboxClosed,
    /// The configured tick bound was reached.
    MaxTicksReached,
}

/// Result of a run.
#[derive(Debug)]
pub struct RunResult {
    /// Why the loop stopped.
    pub reason: ShutdownReason,
    /// Ticks executed.
    pub total_ticks: u64,
    /// The last tick summary, if any tick completed.
    pub final_summary: Option<TickSummary>,
}

/// Loop settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunnerOptions {
    /// Wall time between tick starts.
    pub tick_interval: Duration,
    /// Stop after this many ticks. Zero runs until shutdown.
    pub max_ticks: u64,
}

/// Callback invoked after each tick completes.
///
/// The server uses this to persist clock checkpoints.
pub trait TickCallback: Send {
    /// Called after a tick completes successfully.
    fn on_tick(&mut self, summary: &TickSummary, state: &ServerState);
}

/// A no-op tick callback for testing.
pub struct NoOpCallback;

impl TickCallback for NoOpCallback {
    fn on_tick(&mut self, _summary: &TickSummary, _state: &ServerState) {}
}

/// Run the tick loop until a stop condition is met.
///
/// # Errors
///
/// Returns [`RunnerError`] if a tick fails unrecoverably.
pub async fn run_server(
    state: &mut ServerState,
    inbox: &mut mpsc::UnboundedReceiver<InboundEvent>,
    shutdown: &mut watch::Receiver<bool>,
    options: RunnerOptions,
    callback: &mut dyn TickCallback,
) -> Result<RunResult, RunnerError> {
    let started = Instant::now();
    let mut next_tick = started;
    let mut last_summary: Option<TickSummary> = None;
    let mut total_ticks: u64 = 0;

    info!(
        tick_interval = ?options.tick_interval,
        max_ticks = options.max_ticks,
        resume_from_ms = state.clock.offset(),
        "Tick loop starting"
    );

    loop {
        // --- Check shutdown (before tick) ---
        if *shutdown.borrow() {
            return Ok(finish(ShutdownReason::Requested, total_ticks, last_summary));
        }

        // --- Drain inbox ---
        let (events, closed) = drain(inbox);

        // --- Execute tick ---
        let elapsed_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
        let summary = tick::run_tick(state, elapsed_ms, events)?;
        total_ticks = total_ticks.saturating_add(1);

        // --- Notify callback ---
        callback.on_tick(&summary, state);

        if closed {
            return Ok(finish(ShutdownReason::InboxClosed, total_ticks, Some(summary)));
        }
        if options.max_ticks > 0 && total_ticks >= options.max_ticks {
            return Ok(finish(
                ShutdownReason::MaxTicksReached,
                total_ticks,
                Some(summary),
            ));
        }
        last_summary = Some(summary);

        // --- Sleep until the next boundary ---
        next_tick = next_tick.checked_add(options.tick_interval).unwrap_or(next_tick);
        let now = Instant::now();
        if next_tick < now {
            warn!(
                behind = ?now.saturating_duration_since(next_tick),
                "Tick overran its interval; skipping ahead"
            );
            next_tick = now;
        }
        tokio::select! {
            () = tokio::time::sleep_until(next_tick) => {}
            changed = shutdown.changed() => {
                if changed.is_err() {
                    return Ok(finish(ShutdownReason::Requested, total_ticks, last_summary));
                }
            }
        }
    }
}

/// Take everything queued right now. The flag is set once every sender is
/// gone.
fn drain(inbox: &mut mpsc::UnboundedReceiver<InboundEvent>) -> (Vec<InboundEvent>, bool) {
    let mut events = Vec::new();
    loop {
        match inbox.try_recv() {
            Ok(event) => events.push(event),
            Err(mpsc::error::TryRecvError::Empty) => return (events, false),
            Err(mpsc::error::TryRecvError::Disconnected) => return (events, true),
        }
    }
}

const fn finish(
    reason: ShutdownReason,
    total_ticks: u64,
    final_summary: Option<TickSummary>,
) -> RunResult {
    RunResult {
        reason,
        total_ticks,
        final_summary,
    }
}

/// Log how the run ended.
pub fn log_run_end(result: &RunResult) {
    info!(
        reason = ?result.reason,
        total_ticks = result.total_ticks,
        final_tick = result.final_summary.as_ref().map(|s| s.tick),
        final_time_ms = result.final_summary.as_ref().map(|s| s.time_ms),
        "Tick loop ended"
    );
    if result.final_summary.is_none() {
        warn!("Tick loop ended with no ticks executed");
    }
}
