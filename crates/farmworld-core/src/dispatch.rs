//! Routing of inbound events and fired tasks to workflow handlers.
//!
//! This is where the error policy lives. Handlers return a
//! [`WorkflowError`]; the dispatcher logs it at the level its class calls
//! for and, for invariant violations, resets the offending session. No
//! error escapes to the tick.

use farmworld_types::{ClientMessage, ConnectionId};
use tracing::{debug, error, info, warn};

use crate::scheduler::{ScheduledTask, TaskKind};
use crate::session::SessionId;
use crate::tick::ServerState;
use crate::workflows::placement::Placement;
use crate::workflows::{
    ErrorClass, WorkflowError, fishing, mining, placement, presence, recover_session, session_user,
};

/// Something the transport delivered since the last tick.
#[derive(Debug, Clone, PartialEq)]
pub enum InboundEvent {
    /// A client connected. Nothing happens until it logs in.
    Connected(ConnectionId),
    /// A client went away.
    Disconnected(ConnectionId),
    /// A client sent a decoded message.
    Message {
        /// Sender.
        connection: ConnectionId,
        /// Payload.
        message: ClientMessage,
    },
}

/// What became of one event or task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// The handler completed.
    Handled,
    /// The request was dropped as invalid or moot.
    Rejected,
    /// The handler hit an invariant violation or a store failure.
    Failed,
}

/// Handle one inbound event.
pub fn dispatch_event(state: &mut ServerState, event: InboundEvent) -> DispatchOutcome {
    match event {
        InboundEvent::Connected(connection) => {
            debug!(connection = %connection, "Client connected");
            DispatchOutcome::Handled
        }
        InboundEvent::Disconnected(connection) => {
            if state.sessions.id_by_connection(connection).is_none() {
                warn!(connection = %connection, "Disconnect from a connection with no session");
                return DispatchOutcome::Rejected;
            }
            let result = presence::logout(state, connection);
            settle(state, None, "Disconnect", result)
        }
        InboundEvent::Message {
            connection,
            message,
        } => {
            let session = state.sessions.id_by_connection(connection);
            let name = message.name();
            let result = route(state, connection, message);
            settle(state, session, name, result)
        }
    }
}

/// Handle one task the scheduler reported as due.
pub fn dispatch_task(state: &mut ServerState, task: ScheduledTask) -> DispatchOutcome {
    match task.kind {
        TaskKind::FishBite { session, user_name } => {
            let result = fishing::fire_fish_bite(state, task.handle, session, &user_name);
            settle(state, Some(session), "FishBite", result)
        }
    }
}

fn route(
    state: &mut ServerState,
    connection: ConnectionId,
    message: ClientMessage,
) -> Result<(), WorkflowError> {
    if let ClientMessage::Login { user_name } = &message {
        return presence::login(state, connection, user_name).map(drop);
    }

    let session = state.sessions.id_by_connection(connection).ok_or_else(|| {
        WorkflowError::not_found(format!(
            "{} from connection {connection} before login",
            message.name()
        ))
    })?;
    if let Some(claimed) = message.claimed_user() {
        let actual = session_user(state, session)?;
        if claimed != actual {
            return Err(WorkflowError::validation(format!(
                "{} claims to be '{claimed}' but connection belongs to '{actual}'",
                message.name()
            )));
        }
    }

    match message {
        ClientMessage::Login { .. } => Ok(()),
        ClientMessage::PlayerTransform {
            user_name,
            transform,
        } => presence::update_transform(state, &user_name, transform),
        ClientMessage::StartMining {
            id,
            user_name,
            mineable_type,
            sub_mineable_type,
        } => mining::start_mining(
            state,
            session,
            id,
            &user_name,
            &mineable_type,
            &sub_mineable_type,
        ),
        ClientMessage::MinedQuantity {
            id,
            user_name,
            item,
        } => mining::mined_quantity(state, session, id, &user_name, item),
        ClientMessage::EndMining { id, user_name, .. } => {
            mining::end_mining(state, session, id, &user_name)
        }
        ClientMessage::AbortMining { id, user_name } => {
            mining::abort_mining(state, session, &id, &user_name)
        }
        ClientMessage::StartPlanting {
            user_name,
            plantable_type,
        } => placement::start_planting(state, session, &user_name, &plantable_type),
        ClientMessage::PlaceMinableObject { mineable } => {
            placement::place_mineable(state, session, mineable, Placement::Standard)
        }
        ClientMessage::DeveloperPlaceMinableObject { mineable } => {
            placement::place_mineable(state, session, mineable, Placement::Developer)
        }
        ClientMessage::PlacePlantableObject { plantable } => {
            placement::place_plantable(state, session, plantable)
        }
        ClientMessage::FishThrowBobbler { user_name } => {
            fishing::throw_bobbler(state, session, &user_name)
        }
        ClientMessage::FishBobblerInWater { user_name, zone } => {
            fishing::bobbler_in_water(state, session, &user_name, &zone)
        }
        ClientMessage::FishCaught { user_name, success } => {
            fishing::fish_caught(state, session, &user_name, success)
        }
        ClientMessage::AbortFishing { user_name } => {
            fishing::abort_fishing(state, session, &user_name)
        }
    }
}

/// Apply the error policy to a handler result.
fn settle(
    state: &mut ServerState,
    session: Option<SessionId>,
    context: &str,
    result: Result<(), WorkflowError>,
) -> DispatchOutcome {
    let Err(err) = result else {
        return DispatchOutcome::Handled;
    };
    match err.class() {
        ErrorClass::Rejected => {
            warn!(context, error = %err, "Request rejected");
            DispatchOutcome::Rejected
        }
        ErrorClass::NotFound => {
            info!(context, error = %err, "Request ignored");
            DispatchOutcome::Rejected
        }
        ErrorClass::Invariant => {
            error!(context, session = ?session, error = %err, "Invariant violated; resetting session");
            if let Some(id) = session {
                recover_session(state, id);
            }
            DispatchOutcome::Failed
        }
        ErrorClass::Persistence => {
            error!(context, session = ?session, error = %err, "Store failure");
            DispatchOutcome::Failed
        }
    }
}
