//! Gameplay workflows.
//!
//! Each handler takes the [`ServerState`], the sending session, and the
//! already-decoded message fields. Handlers validate first, then perform
//! their steps in order and stop at the first failure, so a later side
//! effect is never committed after an earlier one failed.
//!
//! # Modules
//!
//! - [`presence`] -- Login snapshot, logout, transform updates and relay
//! - [`mining`] -- Lock, progress, reward and release of mineables
//! - [`fishing`] -- Cast, scheduled bite, catch and abort
//! - [`placement`] -- Placing mineables and plantables, planting relay
//!
//! [`ServerState`]: crate::tick::ServerState

pub mod fishing;
pub mod mining;
pub mod placement;
pub mod presence;

use core::str::FromStr;

use farmworld_types::{ServerMessage, UnknownVariant};
use tracing::{info, warn};

use crate::activity::{ActivityError, ActivityState, FishingState};
use crate::clock::ClockError;
use crate::session::{SessionError, SessionId};
use crate::store::StoreError;
use crate::tick::ServerState;

/// Errors returned by workflow handlers.
#[derive(Debug, thiserror::Error)]
pub enum WorkflowError {
    /// The request is malformed or not allowed; it is dropped.
    #[error("validation failed: {reason}")]
    Validation {
        /// What was wrong with the request.
        reason: String,
    },

    /// The request refers to a session or state that does not exist.
    #[error("not found in session: {reason}")]
    NotFoundInSession {
        /// What was missing.
        reason: String,
    },

    /// Server-side state contradicts itself; the session must be reset.
    #[error("invariant violated: {reason}")]
    InvariantViolation {
        /// What contradicted what.
        reason: String,
    },

    /// The activity state machine refused a transition.
    #[error("activity error: {source}")]
    Activity {
        /// The underlying state machine error.
        #[from]
        source: ActivityError,
    },

    /// The session registry refused the request.
    #[error("session error: {source}")]
    Session {
        /// The underlying registry error.
        #[from]
        source: SessionError,
    },

    /// The store failed.
    #[error("store error: {source}")]
    Store {
        /// The underlying store error.
        #[from]
        source: StoreError,
    },

    /// Scheduling a delayed event failed.
    #[error("clock error: {source}")]
    Clock {
        /// The underlying clock error.
        #[from]
        source: ClockError,
    },
}

/// How the dispatcher should treat a [`WorkflowError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Bad input; log a warning and drop.
    Rejected,
    /// Nothing to act on; log and drop.
    NotFound,
    /// Session state is inconsistent; log an error and reset the session.
    Invariant,
    /// The store failed; log an error, the session is left as is.
    Persistence,
}

impl WorkflowError {
    /// Classify the error for logging and recovery.
    pub const fn class(&self) -> ErrorClass {
        match self {
            Self::Validation { .. } | Self::Session { .. } => ErrorClass::Rejected,
            Self::NotFoundInSession { .. } => ErrorClass::NotFound,
            Self::InvariantViolation { .. } | Self::Activity { .. } | Self::Clock { .. } => {
                ErrorClass::Invariant
            }
            Self::Store { .. } => ErrorClass::Persistence,
        }
    }

    pub(crate) fn validation(reason: impl Into<String>) -> Self {
        Self::Validation {
            reason: reason.into(),
        }
    }

    pub(crate) fn not_found(reason: impl Into<String>) -> Self {
        Self::NotFoundInSession {
            reason: reason.into(),
        }
    }

    pub(crate) fn invariant(reason: impl Into<String>) -> Self {
        Self::InvariantViolation {
            reason: reason.into(),
        }
    }
}

/// Reject an empty wire field.
pub(crate) fn require_non_empty(field: &str, value: &str) -> Result<(), WorkflowError> {
    if value.trim().is_empty() {
        return Err(WorkflowError::validation(format!("{field} is empty")));
    }
    Ok(())
}

/// Parse a wire string into one of the protocol enums.
pub(crate) fn parse_field<T>(field: &str, value: &str) -> Result<T, WorkflowError>
where
    T: FromStr<Err = UnknownVariant>,
{
    value
        .parse()
        .map_err(|err: UnknownVariant| WorkflowError::validation(format!("{field}: {err}")))
}

/// Username of a live session.
pub(crate) fn session_user(state: &ServerState, id: SessionId) -> Result<String, WorkflowError> {
    state
        .sessions
        .get(id)
        .map(|s| s.user_name.clone())
        .ok_or_else(|| WorkflowError::not_found(format!("session {id} is gone")))
}

/// What [`recover_session`] had to undo.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Recovery {
    /// Whether a held object lock was released.
    pub released_lock: bool,
    /// Whether a pending bite event was cancelled.
    pub cancelled_bite: bool,
}

/// Return a session to idle, releasing whatever its activity held.
///
/// Used after an invariant violation and on logout. Only a lock the
/// session's own player still holds is released. Other sessions are told
/// the activity ended with the matching abort message. Failures to release
/// are logged, never propagated: the session is reset either way and the
/// startup sweep reclaims any lock left behind.
pub fn recover_session(state: &mut ServerState, id: SessionId) -> Recovery {
    let Some(session) = state.sessions.get_mut(id) else {
        return Recovery::default();
    };
    let user_name = session.user_name.clone();
    let previous = session.activity.reset();
    let mut recovery = Recovery::default();

    let abort = match previous {
        ActivityState::Mining(mining) => {
            match state.locks.release(&mining.object_id, &user_name) {
                Ok(released) => recovery.released_lock = released,
                Err(err) => warn!(
                    user = %user_name,
                    object = %mining.object_id,
                    error = %err,
                    "Failed to release lock during session recovery"
                ),
            }
            Some(ServerMessage::AbortMining {
                id: mining.object_id,
                user_name: user_name.clone(),
            })
        }
        ActivityState::Fishing(fishing) => {
            if let FishingState::BobblerInWater { bite_event, .. } = fishing {
                recovery.cancelled_bite = state.events.cancel(bite_event);
            }
            Some(ServerMessage::AbortFishing {
                user_name: user_name.clone(),
            })
        }
        ActivityState::Idle => None,
    };
    if let Some(message) = abort {
        state.router.to_others(&state.sessions, id, &message);
    }

    info!(
        user = %user_name,
        released_lock = recovery.released_lock,
        cancelled_bite = recovery.cancelled_bite,
        "Session reset to idle"
    );
    recovery
}

/// Reclassify a store failure that happened after an earlier step of the
/// same request was committed. The request cannot be retried safely, so
/// the session is reset instead of being left mid-activity.
pub(crate) fn after_commit(step: &str, err: StoreError) -> WorkflowError {
    WorkflowError::invariant(format!("{step} failed after an earlier step was committed: {err}"))
}
