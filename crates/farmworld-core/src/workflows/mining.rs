//! Mining: lock an object, report progress, collect the reward.
//!
//! The object lock is taken before the session enters `Mining` and released
//! before it leaves, so a session is `Mining` exactly while it holds the
//! lock on the object it is mining.

use farmworld_types::{InventoryItem, MineableSubType, MineableType, ObjectId, ServerMessage};
use tracing::{debug, info, warn};

use super::{WorkflowError, after_commit, parse_field, require_non_empty};
use crate::activity::{ActivityError, ActivityState, MiningState, Trigger};
use crate::session::SessionId;
use crate::statistics;
use crate::tick::ServerState;

/// Begin mining `object_id`.
///
/// A session that is already mining first releases its old lock, is reset
/// to idle and others are told it aborted. If the new lock cannot be taken
/// the requester is told with `MiningLockFailed` and nothing else changes.
///
/// # Errors
///
/// Returns [`WorkflowError::Validation`] for empty or unknown fields,
/// [`WorkflowError::Activity`] if the session is fishing, and
/// [`WorkflowError::Store`] if the lock attempt fails at the store.
pub fn start_mining(
    state: &mut ServerState,
    session: SessionId,
    object_id: ObjectId,
    user_name: &str,
    mineable_type: &str,
    sub_mineable_type: &str,
) -> Result<(), WorkflowError> {
    require_non_empty("id", object_id.as_str())?;
    require_non_empty("userName", user_name)?;
    require_non_empty("mineableType", mineable_type)?;
    require_non_empty("subMineableType", sub_mineable_type)?;
    let mineable_type: MineableType = parse_field("mineableType", mineable_type)?;
    let sub_mineable_type: MineableSubType = parse_field("subMineableType", sub_mineable_type)?;

    let previous = state
        .sessions
        .get(session)
        .ok_or_else(|| WorkflowError::not_found(format!("session for {user_name}")))?
        .activity
        .state()
        .mining_object()
        .cloned();

    if let Some(previous_object) = previous {
        // Release first: if the store fails the session keeps mining the
        // object it still holds.
        let released = state.locks.release(&previous_object, user_name)?;
        state
            .sessions
            .get_mut(session)
            .ok_or_else(|| WorkflowError::not_found(format!("session for {user_name}")))?
            .activity
            .reset();
        info!(
            user = %user_name,
            previous = %previous_object,
            next = %object_id,
            released,
            "Restarting mining; previous lock released"
        );
        state.router.to_others(
            &state.sessions,
            session,
            &ServerMessage::AbortMining {
                id: previous_object,
                user_name: user_name.to_owned(),
            },
        );
    }

    // Refuse before touching the lock if the session cannot start mining.
    let player = state
        .sessions
        .get(session)
        .ok_or_else(|| WorkflowError::not_found(format!("session for {user_name}")))?;
    if !player.activity.can_fire(Trigger::StartMining) {
        return Err(ActivityError::IllegalTransition {
            from: player.activity.kind(),
            trigger: Trigger::StartMining,
        }
        .into());
    }

    let now = state.clock.now();
    if !state.locks.try_lock(&object_id, user_name, now)? {
        info!(user = %user_name, object = %object_id, "Mining lock refused");
        state.router.to_session(
            &state.sessions,
            session,
            &ServerMessage::MiningLockFailed {
                id: object_id,
                user_name: user_name.to_owned(),
            },
        );
        return Ok(());
    }

    let started = state
        .sessions
        .get_mut(session)
        .ok_or_else(|| WorkflowError::not_found(format!("session for {user_name}")))
        .and_then(|player| {
            player
                .activity
                .start_mining(MiningState {
                    object_id: object_id.clone(),
                    mineable_type,
                    sub_mineable_type,
                    session_start_time: now,
                    mined_quantity: 0,
                })
                .map_err(WorkflowError::from)
        });
    if let Err(err) = started {
        // Do not leave the object locked by a session that is not mining it.
        state.locks.unlock(&object_id, user_name)?;
        return Err(err);
    }

    info!(user = %user_name, object = %object_id, %sub_mineable_type, "Mining started");
    state.router.to_others(
        &state.sessions,
        session,
        &ServerMessage::StartMining {
            id: object_id,
            user_name: user_name.to_owned(),
            mineable_type,
            sub_mineable_type,
        },
    );
    Ok(())
}

/// Add reported progress to the current mining session.
///
/// # Errors
///
/// Returns [`WorkflowError::Validation`] for a zero quantity or if the
/// session is not mining `object_id`.
pub fn mined_quantity(
    state: &mut ServerState,
    session: SessionId,
    object_id: ObjectId,
    user_name: &str,
    item: InventoryItem,
) -> Result<(), WorkflowError> {
    require_non_empty("id", object_id.as_str())?;
    if item.quantity == 0 {
        return Err(WorkflowError::validation("mined quantity must be positive"));
    }
    let player = state
        .sessions
        .get_mut(session)
        .ok_or_else(|| WorkflowError::not_found(format!("session for {user_name}")))?;
    let total = player
        .activity
        .record_mined(&object_id, item.quantity)
        .ok_or_else(|| {
            WorkflowError::validation(format!(
                "{user_name} reported progress on {object_id} while not mining it"
            ))
        })?;

    debug!(user = %user_name, object = %object_id, total, "Mining progress");
    state.router.to_others(
        &state.sessions,
        session,
        &ServerMessage::MinedQuantity {
            id: object_id,
            user_name: user_name.to_owned(),
            item: InventoryItem {
                user_name: user_name.to_owned(),
                ..item
            },
        },
    );
    Ok(())
}

/// Finish mining `object_id`: grant the reward and XP, release the lock.
///
/// Steps, each gated on the previous one: read the object for its size and
/// check the session's player holds it, persist the reward (skipped when
/// nothing was mined), push the updated inventory, release the lock, return
/// the session to idle, persist and announce the XP, announce the end to
/// others.
///
/// Once the reward is persisted the request cannot be replayed without
/// granting it twice, so any later store failure is reported as an
/// invariant violation and the session is reset rather than left mining.
///
/// # Errors
///
/// Returns [`WorkflowError::InvariantViolation`] if the session is not
/// mining `object_id`, the object is gone, not a mineable or not locked by
/// this player, the lock could not be released, or a store call failed
/// after the reward was committed; [`WorkflowError::Store`] if reading the
/// object or persisting the reward fails.
pub fn end_mining(
    state: &mut ServerState,
    session: SessionId,
    object_id: ObjectId,
    user_name: &str,
) -> Result<(), WorkflowError> {
    let mining = current_mining(state, session, user_name)?;
    if mining.object_id != object_id {
        return Err(WorkflowError::invariant(format!(
            "{user_name} ended mining {object_id} but holds {}",
            mining.object_id
        )));
    }

    let object = state
        .store
        .read_object(&object_id)?
        .ok_or_else(|| WorkflowError::invariant(format!("mined object {object_id} vanished")))?
        .value;
    if !object.lock.locked || object.lock.locked_by != user_name {
        return Err(WorkflowError::invariant(format!(
            "{user_name} ended mining {object_id} without holding its lock"
        )));
    }
    let size = object
        .as_mineable()
        .map(|m| m.size)
        .ok_or_else(|| WorkflowError::invariant(format!("{object_id} is not a mineable")))?;

    let reward = InventoryItem {
        unique_name: statistics::reward_item(mining.sub_mineable_type),
        user_name: user_name.to_owned(),
        quantity: mining.mined_quantity,
    };
    if reward.quantity > 0 {
        state.store.add_to_user_inventory(&reward)?;
    }

    let items = state
        .store
        .user_inventory(user_name)
        .map_err(|e| after_commit("inventory read", e))?;
    state
        .router
        .to_session(&state.sessions, session, &ServerMessage::UserInventory { items });

    if !state
        .locks
        .unlock(&object_id, user_name)
        .map_err(|e| after_commit("unlock", e))?
    {
        return Err(WorkflowError::invariant(format!(
            "lock on {object_id} held by {user_name} could not be released"
        )));
    }
    state
        .sessions
        .get_mut(session)
        .ok_or_else(|| WorkflowError::not_found(format!("session for {user_name}")))?
        .activity
        .end_mining()?;

    let xp = statistics::mining_xp(mining.sub_mineable_type, size);
    let total_xp = state
        .store
        .add_player_xp(user_name, xp)
        .map_err(|e| after_commit("xp award", e))?;
    state.router.to_all(
        &state.sessions,
        &ServerMessage::ReceivedXp {
            user_name: user_name.to_owned(),
            xp,
            total_xp,
        },
    );

    info!(
        user = %user_name,
        object = %object_id,
        item = %reward.unique_name,
        quantity = reward.quantity,
        xp,
        total_xp,
        "Mining finished"
    );
    state.router.to_others(
        &state.sessions,
        session,
        &ServerMessage::EndMining {
            id: object_id,
            user_name: user_name.to_owned(),
            item: reward,
        },
    );
    Ok(())
}

/// Stop mining without a reward.
///
/// A mismatched object id is logged and the session's actual object is
/// released instead, so one player can never unlock another's object.
///
/// # Errors
///
/// Returns [`WorkflowError::NotFoundInSession`] if the session is not
/// mining at all, or [`WorkflowError::Store`] on store failure.
pub fn abort_mining(
    state: &mut ServerState,
    session: SessionId,
    object_id: &ObjectId,
    user_name: &str,
) -> Result<(), WorkflowError> {
    let held = current_mining(state, session, user_name)
        .map_err(|_err| {
            WorkflowError::not_found(format!("{user_name} aborted mining while not mining"))
        })?
        .object_id;
    if held != *object_id {
        warn!(
            user = %user_name,
            requested = %object_id,
            held = %held,
            "AbortMining for a different object; releasing the held one"
        );
    }

    if !state.locks.unlock(&held, user_name)? {
        warn!(user = %user_name, object = %held, "Lock already released on abort");
    }
    state
        .sessions
        .get_mut(session)
        .ok_or_else(|| WorkflowError::not_found(format!("session for {user_name}")))?
        .activity
        .abort_mining()?;

    info!(user = %user_name, object = %held, "Mining aborted");
    state.router.to_others(
        &state.sessions,
        session,
        &ServerMessage::AbortMining {
            id: held,
            user_name: user_name.to_owned(),
        },
    );
    Ok(())
}

/// Copy of the session's mining state, or an invariant violation.
fn current_mining(
    state: &ServerState,
    session: SessionId,
    user_name: &str,
) -> Result<MiningState, WorkflowError> {
    let player = state
        .sessions
        .get(session)
        .ok_or_else(|| WorkflowError::not_found(format!("session for {user_name}")))?;
    match player.activity.state() {
        ActivityState::Mining(m) => Ok(m.clone()),
        other => Err(WorkflowError::invariant(format!(
            "{user_name} is {:?}, not mining",
            other.kind()
        ))),
    }
}
