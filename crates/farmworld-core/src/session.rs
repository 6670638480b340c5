//! Session registry: who is connected and what they are doing.
//!
//! Sessions live in a generational arena. A [`SessionId`] stays valid only
//! as long as the slot's generation matches, so a stale id held by a
//! delayed event can never resolve to a player who logged in later and
//! reused the slot. Two secondary indexes map username and connection to
//! the id; both are updated on every login and removal.

use std::collections::HashMap;
use std::sync::Arc;

use farmworld_types::{ConnectionId, Transform};

use crate::activity::{ActivityMachine, TransitionTable};

/// Generational key into the session arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SessionId {
    index: u32,
    generation: u32,
}

impl SessionId {
    /// Build an id from raw parts.
    pub const fn from_parts(index: u32, generation: u32) -> Self {
        Self { index, generation }
    }

    /// Arena slot index.
    pub const fn index(self) -> u32 {
        self.index
    }

    /// Generation of the slot when this id was issued.
    pub const fn generation(self) -> u32 {
        self.generation
    }
}

impl core::fmt::Display for SessionId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}v{}", self.index, self.generation)
    }
}

/// Errors raised by the session registry.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SessionError {
    /// The username or the connection already owns a session.
    #[error("'{user_name}' is already logged in")]
    AlreadyLoggedIn {
        /// Requested username.
        user_name: String,
    },

    /// No session exists for the given username.
    #[error("no session for '{user_name}'")]
    UnknownUser {
        /// Username that was looked up.
        user_name: String,
    },

    /// The transform was all zeros and was not stored.
    #[error("all-zero transform from '{user_name}' rejected")]
    ZeroTransform {
        /// Sender.
        user_name: String,
    },

    /// The arena cannot address another slot.
    #[error("session arena is full")]
    Capacity,
}

/// Server-side state for one logged-in player.
#[derive(Debug, Clone)]
pub struct PlayerSession {
    /// Unique username.
    pub user_name: String,
    /// Transport connection the player is on.
    pub connection: ConnectionId,
    /// Most recent non-zero pose, if any has been received.
    pub last_transform: Option<Transform>,
    /// Current activity.
    pub activity: ActivityMachine,
    /// Simulation time of login.
    pub logged_in_at: u64,
}

#[derive(Debug)]
struct Slot {
    generation: u32,
    session: Option<PlayerSession>,
}

/// Arena of player sessions with username and connection indexes.
#[derive(Debug)]
pub struct SessionRegistry {
    slots: Vec<Slot>,
    free: Vec<u32>,
    by_name: HashMap<String, SessionId>,
    by_connection: HashMap<ConnectionId, SessionId>,
    table: Arc<TransitionTable>,
}

impl SessionRegistry {
    /// Create an empty registry whose sessions follow `table`.
    pub fn new(table: Arc<TransitionTable>) -> Self {
        Self {
            slots: Vec::new(),
            free: Vec::new(),
            by_name: HashMap::new(),
            by_connection: HashMap::new(),
            table,
        }
    }

    /// Create an idle session for `user_name` on `connection`.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::AlreadyLoggedIn`] if either the username or
    /// the connection already has a session, or [`SessionError::Capacity`]
    /// if the arena is exhausted.
    pub fn login(
        &mut self,
        user_name: &str,
        connection: ConnectionId,
        now: u64,
    ) -> Result<SessionId, SessionError> {
        if self.by_name.contains_key(user_name) || self.by_connection.contains_key(&connection) {
            return Err(SessionError::AlreadyLoggedIn {
                user_name: user_name.to_owned(),
            });
        }

        let session = PlayerSession {
            user_name: user_name.to_owned(),
            connection,
            last_transform: None,
            activity: ActivityMachine::new(Arc::clone(&self.table)),
            logged_in_at: now,
        };

        let id = if let Some(index) = self.free.pop() {
            let slot = self
                .slots
                .get_mut(index as usize)
                .ok_or(SessionError::Capacity)?;
            slot.session = Some(session);
            SessionId::from_parts(index, slot.generation)
        } else {
            let index = u32::try_from(self.slots.len()).map_err(|_err| SessionError::Capacity)?;
            self.slots.push(Slot {
                generation: 0,
                session: Some(session),
            });
            SessionId::from_parts(index, 0)
        };

        self.by_name.insert(user_name.to_owned(), id);
        self.by_connection.insert(connection, id);
        Ok(id)
    }

    /// Remove a session and free its slot. Returns the removed session.
    pub fn remove(&mut self, id: SessionId) -> Option<PlayerSession> {
        let slot = self.slots.get_mut(id.index as usize)?;
        if slot.generation != id.generation {
            return None;
        }
        let session = slot.session.take()?;
        slot.generation = slot.generation.wrapping_add(1);
        self.free.push(id.index);
        self.by_name.remove(&session.user_name);
        self.by_connection.remove(&session.connection);
        Some(session)
    }

    /// Store `transform` as the latest pose of `user_name`.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::ZeroTransform`] for an all-zero pose and
    /// [`SessionError::UnknownUser`] if the player is not logged in.
    pub fn update_transform(
        &mut self,
        user_name: &str,
        transform: Transform,
    ) -> Result<(), SessionError> {
        if transform.is_all_zero() {
            return Err(SessionError::ZeroTransform {
                user_name: user_name.to_owned(),
            });
        }
        let id = self
            .id_by_name(user_name)
            .ok_or_else(|| SessionError::UnknownUser {
                user_name: user_name.to_owned(),
            })?;
        let session = self.get_mut(id).ok_or_else(|| SessionError::UnknownUser {
            user_name: user_name.to_owned(),
        })?;
        session.last_transform = Some(transform);
        Ok(())
    }

    /// Look up a live session.
    pub fn get(&self, id: SessionId) -> Option<&PlayerSession> {
        self.slots
            .get(id.index as usize)
            .filter(|slot| slot.generation == id.generation)
            .and_then(|slot| slot.session.as_ref())
    }

    /// Look up a live session mutably.
    pub fn get_mut(&mut self, id: SessionId) -> Option<&mut PlayerSession> {
        self.slots
            .get_mut(id.index as usize)
            .filter(|slot| slot.generation == id.generation)
            .and_then(|slot| slot.session.as_mut())
    }

    /// Session id for a username.
    pub fn id_by_name(&self, user_name: &str) -> Option<SessionId> {
        self.by_name.get(user_name).copied()
    }

    /// Session id for a connection.
    pub fn id_by_connection(&self, connection: ConnectionId) -> Option<SessionId> {
        self.by_connection.get(&connection).copied()
    }

    /// Whether `user_name` has a session.
    pub fn contains_user(&self, user_name: &str) -> bool {
        self.by_name.contains_key(user_name)
    }

    /// Iterate over live sessions in slot order.
    pub fn iter(&self) -> impl Iterator<Item = (SessionId, &PlayerSession)> {
        self.slots.iter().enumerate().filter_map(|(i, slot)| {
            let index = u32::try_from(i).ok()?;
            slot.session
                .as_ref()
                .map(|s| (SessionId::from_parts(index, slot.generation), s))
        })
    }

    /// Number of live sessions.
    pub fn len(&self) -> usize {
        self.by_name.len()
    }

    /// Whether no one is logged in.
    pub fn is_empty(&self) -> bool {
        self.by_name.is_empty()
    }
}
