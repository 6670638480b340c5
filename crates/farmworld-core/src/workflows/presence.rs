//! Login, logout and avatar transforms.

use farmworld_types::{ConnectionId, ObjectKind, PlayerRecord, ServerMessage, Transform};
use tracing::{debug, info};

use super::{WorkflowError, recover_session, require_non_empty, session_user};
use crate::session::{SessionError, SessionId};
use crate::tick::ServerState;

/// Create a session for `user_name` and send it the initial snapshot.
///
/// The snapshot is read before the session is created, so a store failure
/// leaves no half-logged-in player behind. The new connection receives, in
/// order: its player record, its inventory, every live world object, and
/// the current server time.
///
/// # Errors
///
/// Returns [`WorkflowError::Session`] for a duplicate login and
/// [`WorkflowError::Store`] if the snapshot cannot be read.
pub fn login(
    state: &mut ServerState,
    connection: ConnectionId,
    user_name: &str,
) -> Result<SessionId, WorkflowError> {
    require_non_empty("userName", user_name)?;
    if state.sessions.contains_user(user_name)
        || state.sessions.id_by_connection(connection).is_some()
    {
        return Err(SessionError::AlreadyLoggedIn {
            user_name: user_name.to_owned(),
        }
        .into());
    }

    let player = state
        .store
        .get_player(user_name)?
        .unwrap_or_else(|| PlayerRecord::new(user_name));
    let items = state.store.user_inventory(user_name)?;
    let mut objects = state.store.query_objects_by_type(ObjectKind::Mineable)?;
    objects.extend(state.store.query_objects_by_type(ObjectKind::Plantable)?);

    let now = state.clock.now();
    let id = state.sessions.login(user_name, connection, now)?;
    info!(
        user = %user_name,
        connection = %connection,
        session = %id,
        xp = player.xp,
        objects = objects.len(),
        "Player logged in"
    );

    state
        .router
        .to_connection(connection, &ServerMessage::LoginInitialPlayerState { player });
    state
        .router
        .to_connection(connection, &ServerMessage::UserInventory { items });
    state
        .router
        .to_connection(connection, &ServerMessage::WorldSnapshot { objects });
    state
        .router
        .to_connection(connection, &ServerMessage::CurrentServerTime { time_ms: now });
    Ok(id)
}

/// Remove the session on `connection`, releasing its activity first.
///
/// # Errors
///
/// Returns [`WorkflowError::NotFoundInSession`] if the connection never
/// logged in.
pub fn logout(state: &mut ServerState, connection: ConnectionId) -> Result<(), WorkflowError> {
    let id = state.sessions.id_by_connection(connection).ok_or_else(|| {
        WorkflowError::not_found(format!("logout from connection {connection} without a session"))
    })?;
    let user_name = session_user(state, id)?;
    let recovery = recover_session(state, id);

    state
        .router
        .to_others(&state.sessions, id, &ServerMessage::PlayerExited {
            user_name: user_name.clone(),
        });
    state.sessions.remove(id);
    info!(
        user = %user_name,
        connection = %connection,
        released_lock = recovery.released_lock,
        cancelled_bite = recovery.cancelled_bite,
        "Player logged out"
    );
    Ok(())
}

/// Store the latest pose of `user_name`.
///
/// # Errors
///
/// Returns [`WorkflowError::Session`] for an all-zero transform.
pub fn update_transform(
    state: &mut ServerState,
    user_name: &str,
    transform: Transform,
) -> Result<(), WorkflowError> {
    state.sessions.update_transform(user_name, transform)?;
    Ok(())
}

/// Send every known pose to every other session.
///
/// Returns how many poses were relayed.
pub fn broadcast_transforms(state: &mut ServerState) -> usize {
    let poses: Vec<(SessionId, ServerMessage)> = state
        .sessions
        .iter()
        .filter_map(|(id, session)| {
            session.last_transform.map(|transform| {
                (
                    id,
                    ServerMessage::PlayerTransform {
                        user_name: session.user_name.clone(),
                        transform,
                    },
                )
            })
        })
        .collect();
    for (id, message) in &poses {
        state.router.to_others(&state.sessions, *id, message);
    }
    if !poses.is_empty() {
        debug!(count = poses.len(), "Relayed player transforms");
    }
    poses.len()
}
