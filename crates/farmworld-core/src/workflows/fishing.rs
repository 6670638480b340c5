//! Fishing: cast, wait for a scheduled bite, catch or give up.
//!
//! The bite is a delayed event. Whatever happens to the session in the
//! meantime, the event re-checks on firing that the session is still
//! waiting on that exact event before it changes anything.

use farmworld_types::{InventoryItem, ServerMessage, Zone};
use rand::Rng;
use tracing::{debug, info};

use super::{WorkflowError, parse_field, require_non_empty};
use crate::activity::{ActivityError, Trigger};
use crate::scheduler::{EventHandle, TaskKind};
use crate::session::SessionId;
use crate::statistics;
use crate::tick::ServerState;

/// Idle → casting.
///
/// # Errors
///
/// Returns [`WorkflowError::Activity`] unless the session is idle.
pub fn throw_bobbler(
    state: &mut ServerState,
    session: SessionId,
    user_name: &str,
) -> Result<(), WorkflowError> {
    state
        .sessions
        .get_mut(session)
        .ok_or_else(|| WorkflowError::not_found(format!("session for {user_name}")))?
        .activity
        .throw_bobbler()?;

    debug!(user = %user_name, "Bobbler thrown");
    state.router.to_others(
        &state.sessions,
        session,
        &ServerMessage::FishThrowBobbler {
            user_name: user_name.to_owned(),
        },
    );
    Ok(())
}

/// Casting → waiting, and schedule the bite.
///
/// The bite delay is drawn uniformly from the configured bounds.
///
/// # Errors
///
/// Returns [`WorkflowError::Validation`] for an unknown zone and
/// [`WorkflowError::Activity`] unless the session is casting.
pub fn bobbler_in_water(
    state: &mut ServerState,
    session: SessionId,
    user_name: &str,
    zone: &str,
) -> Result<(), WorkflowError> {
    require_non_empty("zone", zone)?;
    let zone: Zone = parse_field("zone", zone)?;

    let player = state
        .sessions
        .get(session)
        .ok_or_else(|| WorkflowError::not_found(format!("session for {user_name}")))?;
    if !player.activity.can_fire(Trigger::BobblerInWater) {
        return Err(ActivityError::IllegalTransition {
            from: player.activity.kind(),
            trigger: Trigger::BobblerInWater,
        }
        .into());
    }

    let low = state.settings.min_bite_delay_ms;
    let high = state.settings.max_bite_delay_ms.max(low);
    let delay = state.rng.random_range(low..=high);
    let now = state.clock.now();
    let handle = state.events.schedule(
        now,
        delay,
        TaskKind::FishBite {
            session,
            user_name: user_name.to_owned(),
        },
    )?;

    let entered = state
        .sessions
        .get_mut(session)
        .ok_or_else(|| WorkflowError::not_found(format!("session for {user_name}")))
        .and_then(|player| {
            player
                .activity
                .bobbler_in_water(zone, handle)
                .map_err(WorkflowError::from)
        });
    if let Err(err) = entered {
        state.events.cancel(handle);
        return Err(err);
    }

    info!(
        user = %user_name,
        %zone,
        delay_ms = delay,
        due = now.saturating_add(delay),
        "Bobbler in water"
    );
    state.router.to_others(
        &state.sessions,
        session,
        &ServerMessage::FishBobblerInWater {
            user_name: user_name.to_owned(),
            zone,
        },
    );
    Ok(())
}

/// Fire a scheduled bite.
///
/// Does nothing if the session is gone or is no longer waiting on
/// `handle` (it aborted, or it recast and is waiting on a newer event).
///
/// # Errors
///
/// Returns [`WorkflowError::Activity`] only if the state machine refuses
/// a transition the precondition check allowed.
pub fn fire_fish_bite(
    state: &mut ServerState,
    handle: EventHandle,
    session: SessionId,
    user_name: &str,
) -> Result<(), WorkflowError> {
    let Some(player) = state.sessions.get_mut(session) else {
        debug!(user = %user_name, event = %handle, "Bite for a departed session dropped");
        return Ok(());
    };
    if player.activity.state().bite_event() != Some(handle) {
        debug!(user = %user_name, event = %handle, "Stale bite dropped");
        return Ok(());
    }
    player.activity.fish_bite()?;

    info!(user = %user_name, "Fish biting");
    state.router.to_all(
        &state.sessions,
        &ServerMessage::FishBiting {
            user_name: user_name.to_owned(),
        },
    );
    Ok(())
}

/// A fish is biting → idle, granting a herring on success.
///
/// On success the reward is persisted before the state changes, so a store
/// failure leaves the fish on the line and the client can retry.
///
/// # Errors
///
/// Returns [`WorkflowError::Activity`] unless a fish is biting, or
/// [`WorkflowError::Store`] if the reward cannot be persisted.
pub fn fish_caught(
    state: &mut ServerState,
    session: SessionId,
    user_name: &str,
    success: bool,
) -> Result<(), WorkflowError> {
    let trigger = if success {
        Trigger::FishSuccessfulCatch
    } else {
        Trigger::FishUnsuccessfulCatch
    };
    let player = state
        .sessions
        .get(session)
        .ok_or_else(|| WorkflowError::not_found(format!("session for {user_name}")))?;
    if !player.activity.can_fire(trigger) {
        return Err(ActivityError::IllegalTransition {
            from: player.activity.kind(),
            trigger,
        }
        .into());
    }

    let item = if success {
        let item = InventoryItem {
            unique_name: statistics::FISHING_REWARD,
            user_name: user_name.to_owned(),
            quantity: statistics::FISHING_REWARD_QUANTITY,
        };
        state.store.add_to_user_inventory(&item)?;
        Some(item)
    } else {
        None
    };

    state
        .sessions
        .get_mut(session)
        .ok_or_else(|| WorkflowError::not_found(format!("session for {user_name}")))?
        .activity
        .catch_fish(success)?;

    info!(user = %user_name, success, "Fish caught");
    state.router.to_all(
        &state.sessions,
        &ServerMessage::FishCaught {
            user_name: user_name.to_owned(),
            success,
            item,
        },
    );
    if success {
        let items = state.store.user_inventory(user_name)?;
        state
            .router
            .to_session(&state.sessions, session, &ServerMessage::UserInventory { items });
    }
    Ok(())
}

/// Any fishing state → idle, cancelling the pending bite.
///
/// # Errors
///
/// Returns [`WorkflowError::Activity`] unless the session is fishing.
pub fn abort_fishing(
    state: &mut ServerState,
    session: SessionId,
    user_name: &str,
) -> Result<(), WorkflowError> {
    let pending = state
        .sessions
        .get_mut(session)
        .ok_or_else(|| WorkflowError::not_found(format!("session for {user_name}")))?
        .activity
        .abort_fishing()?;
    let cancelled = pending.is_some_and(|handle| state.events.cancel(handle));

    info!(user = %user_name, cancelled_bite = cancelled, "Fishing aborted");
    state.router.to_others(
        &state.sessions,
        session,
        &ServerMessage::AbortFishing {
            user_name: user_name.to_owned(),
        },
    );
    Ok(())
}
