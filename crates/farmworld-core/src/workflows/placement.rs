//! Placing new world objects and relaying planting animations.

use farmworld_types::{
    Mineable, ObjectBody, ObjectId, Plantable, PlantableType, ServerMessage, WorldObject,
};
use tracing::info;

use super::{WorkflowError, parse_field, require_non_empty, session_user};
use crate::session::SessionId;
use crate::statistics;
use crate::tick::ServerState;

/// Which quantity a placed mineable starts with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Placement {
    /// Quantity comes from the starting-quantity table.
    Standard,
    /// Quantity is taken from the request as sent. Gated by configuration.
    Developer,
}

/// Persist a new mineable and announce it to everyone.
///
/// # Errors
///
/// Returns [`WorkflowError::Validation`] if developer placement is
/// disabled, the transform is all zeros, or the material does not belong
/// to the declared category; [`WorkflowError::Store`] on store failure.
pub fn place_mineable(
    state: &mut ServerState,
    session: SessionId,
    mut mineable: Mineable,
    placement: Placement,
) -> Result<(), WorkflowError> {
    let placed_by = session_user(state, session)?;
    if placement == Placement::Developer && !state.settings.allow_developer_placement {
        return Err(WorkflowError::validation("developer placement is disabled"));
    }
    if mineable.transform.is_all_zero() {
        return Err(WorkflowError::validation("mineable placed with an all-zero transform"));
    }
    let category = statistics::category_of(mineable.sub_mineable_type);
    if category != mineable.mineable_type {
        return Err(WorkflowError::validation(format!(
            "{} is a {category}, not a {}",
            mineable.sub_mineable_type, mineable.mineable_type
        )));
    }
    if placement == Placement::Standard {
        mineable.quantity =
            statistics::starting_quantity(mineable.sub_mineable_type, mineable.size);
    }

    let object = persist(state, ObjectBody::Mineable(mineable))?;
    info!(
        placed_by = %placed_by,
        object = %object.id,
        developer = placement == Placement::Developer,
        "Mineable placed"
    );
    state
        .router
        .to_all(&state.sessions, &ServerMessage::PlaceMinableObject { object });
    Ok(())
}

/// Persist a new plantable, stamped with its growth time and planting
/// time, and announce it to everyone.
///
/// # Errors
///
/// Returns [`WorkflowError::Validation`] for an all-zero transform and
/// [`WorkflowError::Store`] on store failure.
pub fn place_plantable(
    state: &mut ServerState,
    session: SessionId,
    mut plantable: Plantable,
) -> Result<(), WorkflowError> {
    let placed_by = session_user(state, session)?;
    if plantable.transform.is_all_zero() {
        return Err(WorkflowError::validation("plantable placed with an all-zero transform"));
    }
    plantable.growth_time = statistics::growth_time_ms(plantable.plantable_type);
    plantable.time_planted = state.clock.now();

    let object = persist(state, ObjectBody::Plantable(plantable))?;
    info!(
        placed_by = %placed_by,
        object = %object.id,
        "Plantable placed"
    );
    state
        .router
        .to_all(&state.sessions, &ServerMessage::PlacePlantableObject { object });
    Ok(())
}

/// Relay a planting animation to everyone else.
///
/// # Errors
///
/// Returns [`WorkflowError::Validation`] for an unknown plant type.
pub fn start_planting(
    state: &mut ServerState,
    session: SessionId,
    user_name: &str,
    plantable_type: &str,
) -> Result<(), WorkflowError> {
    require_non_empty("plantableType", plantable_type)?;
    let plantable_type: PlantableType = parse_field("plantableType", plantable_type)?;
    state.router.to_others(
        &state.sessions,
        session,
        &ServerMessage::StartPlanting {
            user_name: user_name.to_owned(),
            plantable_type,
        },
    );
    Ok(())
}

/// Write a new object and read it back as stored.
fn persist(state: &ServerState, body: ObjectBody) -> Result<WorldObject, WorkflowError> {
    let id: ObjectId = state.store.write_new_object(&WorldObject::unplaced(body))?;
    state
        .store
        .read_object(&id)?
        .map(|v| v.value)
        .ok_or_else(|| WorkflowError::invariant(format!("object {id} missing right after write")))
}
