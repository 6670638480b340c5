//! Exclusive access to shared world objects.
//!
//! A lock is three fields on the persisted object (`locked`, `lockedBy`,
//! `lockStartTime`) written through the store's compare-and-swap. Two
//! sessions racing for the same object, in this process or another, are
//! serialized by the version check alone: at most one swap succeeds and the
//! loser sees `false`.

use std::sync::Arc;

use farmworld_types::{LockFields, ObjectId, WorldObject};
use tracing::{debug, info, warn};

use crate::store::{CasOutcome, StoreError, WorldStore};

/// How many times a forced unlock re-reads after losing a CAS race.
const FORCE_UNLOCK_ATTEMPTS: u32 = 3;

/// CAS-based lock protocol over a [`WorldStore`].
#[derive(Clone)]
pub struct LockCoordinator {
    store: Arc<dyn WorldStore>,
}

impl core::fmt::Debug for LockCoordinator {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("LockCoordinator").finish_non_exhaustive()
    }
}

impl LockCoordinator {
    /// Build a coordinator over `store`.
    pub fn new(store: Arc<dyn WorldStore>) -> Self {
        Self { store }
    }

    /// Try to take the lock on `id` for `holder` at simulation time `now`.
    ///
    /// Returns `false` if the object is missing, already locked, or another
    /// writer changed it between the read and the swap.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the store itself fails.
    pub fn try_lock(&self, id: &ObjectId, holder: &str, now: u64) -> Result<bool, StoreError> {
        let Some(current) = self.store.read_object(id)? else {
            debug!(object = %id, holder, "Lock refused: object missing");
            return Ok(false);
        };
        if current.value.lock.locked {
            debug!(
                object = %id,
                holder,
                locked_by = %current.value.lock.locked_by,
                "Lock refused: already held"
            );
            return Ok(false);
        }

        let locked = WorldObject {
            lock: LockFields::held_by(holder, now),
            ..current.value
        };
        match self.store.compare_and_swap(id, current.version, &locked)? {
            CasOutcome::Swapped(_) => Ok(true),
            CasOutcome::Conflict | CasOutcome::Missing => {
                debug!(object = %id, holder, "Lock refused: lost CAS race");
                Ok(false)
            }
        }
    }

    /// Release the lock `holder` took on `id`.
    ///
    /// Returns `false` if the object is missing, not locked, locked by
    /// someone else, or the swap lost a race.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the store itself fails.
    pub fn unlock(&self, id: &ObjectId, holder: &str) -> Result<bool, StoreError> {
        let Some(current) = self.store.read_object(id)? else {
            return Ok(false);
        };
        if !current.value.lock.locked {
            return Ok(false);
        }
        if current.value.lock.locked_by != holder {
            warn!(
                object = %id,
                holder,
                locked_by = %current.value.lock.locked_by,
                "Unlock refused: held by another player"
            );
            return Ok(false);
        }
        let cleared = WorldObject {
            lock: LockFields::default(),
            ..current.value
        };
        Ok(matches!(
            self.store.compare_and_swap(id, current.version, &cleared)?,
            CasOutcome::Swapped(_)
        ))
    }

    /// Release `holder`'s lock on `id`, retrying lost CAS races.
    ///
    /// Used when a session is reset: a lock someone else has taken since is
    /// left alone.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the store itself fails.
    pub fn release(&self, id: &ObjectId, holder: &str) -> Result<bool, StoreError> {
        self.clear(id, Some(holder))
    }

    /// Clear the lock on `id` regardless of who holds it.
    ///
    /// Retries a few times if concurrent writers keep bumping the version.
    /// Returns `true` if a lock was cleared, `false` if there was none or
    /// every attempt lost its race.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the store itself fails.
    pub fn force_unlock(&self, id: &ObjectId) -> Result<bool, StoreError> {
        self.clear(id, None)
    }

    fn clear(&self, id: &ObjectId, holder: Option<&str>) -> Result<bool, StoreError> {
        for _ in 0..FORCE_UNLOCK_ATTEMPTS {
            let Some(current) = self.store.read_object(id)? else {
                return Ok(false);
            };
            if !current.value.lock.locked {
                return Ok(false);
            }
            let previous_holder = current.value.lock.locked_by.clone();
            if holder.is_some_and(|h| h != previous_holder) {
                debug!(object = %id, locked_by = %previous_holder, "Lock belongs to another player");
                return Ok(false);
            }
            let cleared = WorldObject {
                lock: LockFields::default(),
                ..current.value
            };
            match self.store.compare_and_swap(id, current.version, &cleared)? {
                CasOutcome::Swapped(_) => {
                    info!(object = %id, previous_holder = %previous_holder, "Lock cleared");
                    return Ok(true);
                }
                CasOutcome::Missing => return Ok(false),
                CasOutcome::Conflict => {}
            }
        }
        warn!(object = %id, attempts = FORCE_UNLOCK_ATTEMPTS, "Unlock kept losing CAS races");
        Ok(false)
    }

    /// Clear every lock left over from a previous run.
    ///
    /// No session survives a restart, so any lock found at startup is
    /// orphaned. Returns how many objects were unlocked.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the store fails to list or clear locks.
    pub fn recover_startup_locks(&self) -> Result<usize, StoreError> {
        let orphaned = self.store.locked_objects()?;
        for object in &orphaned {
            warn!(
                object = %object.id,
                locked_by = %object.lock.locked_by,
                lock_start_time = object.lock.lock_start_time,
                "Clearing orphaned lock"
            );
        }
        let mut cleared = self.store.force_unlock_all()?;
        // Objects whose bulk clear lost a race get one more targeted try.
        for straggler in self.store.locked_objects()? {
            if self.force_unlock(&straggler.id)? {
                cleared = cleared.saturating_add(1);
            }
        }
        info!(found = orphaned.len(), cleared, "Startup lock recovery complete");
        Ok(cleared)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use farmworld_types::{
        Mineable, MineableSize, MineableSubType, MineableType, ObjectBody, Transform,
    };

    fn setup() -> (LockCoordinator, Arc<MemoryStore>, ObjectId) {
        let store = Arc::new(MemoryStore::new());
        let id = store
            .write_new_object(&WorldObject::unplaced(ObjectBody::Mineable(Mineable {
                mineable_type: MineableType::Tree,
                sub_mineable_type: MineableSubType::Oak,
                size: MineableSize::Large,
                quantity: 80,
                transform: Transform::default(),
            })))
            .unwrap();
        let dyn_store: Arc<dyn WorldStore> = store.clone();
        (LockCoordinator::new(dyn_store), store, id)
    }

    #[test]
    fn second_lock_fails_until_unlocked() {
        let (locks, store, id) = setup();
        assert!(locks.try_lock(&id, "alice", 100).unwrap());
        assert!(!locks.try_lock(&id, "bob", 101).unwrap());

        let held = store.read_object(&id).unwrap().unwrap().value.lock;
        assert_eq!(held, LockFields::held_by("alice", 100));

        assert!(locks.unlock(&id, "alice").unwrap());
        assert!(!locks.unlock(&id, "alice").unwrap());
        assert!(locks.try_lock(&id, "bob", 102).unwrap());
    }

    #[test]
    fn missing_object_cannot_be_locked() {
        let (locks, _, _) = setup();
        let ghost = ObjectId::from("MINEABLE404");
        assert!(!locks.try_lock(&ghost, "alice", 0).unwrap());
        assert!(!locks.unlock(&ghost, "alice").unwrap());
        assert!(!locks.release(&ghost, "alice").unwrap());
        assert!(!locks.force_unlock(&ghost).unwrap());
    }

    #[test]
    fn force_unlock_ignores_holder() {
        let (locks, _, id) = setup();
        locks.try_lock(&id, "alice", 0).unwrap();
        assert!(locks.force_unlock(&id).unwrap());
        assert!(!locks.force_unlock(&id).unwrap());
    }

    #[test]
    fn only_the_holder_can_unlock_or_release() {
        let (locks, store, id) = setup();
        locks.try_lock(&id, "bob", 7).unwrap();

        assert!(!locks.unlock(&id, "alice").unwrap());
        assert!(!locks.release(&id, "alice").unwrap());
        let held = store.read_object(&id).unwrap().unwrap().value.lock;
        assert_eq!(held, LockFields::held_by("bob", 7));

        assert!(locks.release(&id, "bob").unwrap());
        assert!(!store.read_object(&id).unwrap().unwrap().value.lock.locked);
    }

    #[test]
    fn racing_threads_get_exactly_one_lock() {
        let (locks, _, id) = setup();
        let winners: usize = std::thread::scope(|scope| {
            let handles: Vec<_> = (0..8)
                .map(|i| {
                    let locks = locks.clone();
                    let id = id.clone();
                    scope.spawn(move || locks.try_lock(&id, &format!("p{i}"), 0).unwrap())
                })
                .collect();
            handles
                .into_iter()
                .map(|h| usize::from(h.join().unwrap()))
                .sum()
        });
        assert_eq!(winners, 1);
    }

    #[test]
    fn startup_recovery_clears_all() {
        let (locks, store, id) = setup();
        locks.try_lock(&id, "alice", 0).unwrap();
        let other = store
            .write_new_object(&store.read_object(&id).unwrap().unwrap().value)
            .unwrap();
        locks.try_lock(&other, "bob", 0).unwrap();

        assert_eq!(locks.recover_startup_locks().unwrap(), 2);
        assert!(store.locked_objects().unwrap().is_empty());
        assert_eq!(locks.recover_startup_locks().unwrap(), 0);
    }
}
