//! Persistence contract for world objects, inventories and players.
//!
//! The tick runs synchronously, so [`WorldStore`] is a blocking trait. The
//! server binary adapts its async Dragonfly client to it; tests and local
//! runs use [`MemoryStore`].
//!
//! Every world object carries a version that increases on each write.
//! [`WorldStore::compare_and_swap`] is the only mutation path for existing
//! objects and is what makes object locks safe across processes.

use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard};

use farmworld_types::{
    InventoryItem, ItemName, LockFields, ObjectId, ObjectKind, PlayerRecord, WorldObject,
};

/// Errors surfaced by a store implementation.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    /// The backing service could not be reached or rejected the command.
    #[error("store unavailable: {message}")]
    Unavailable {
        /// Backend error text.
        message: String,
    },

    /// A stored document could not be decoded.
    #[error("corrupt record at '{key}': {reason}")]
    Corrupt {
        /// Key of the bad record.
        key: String,
        /// Decoder error text.
        reason: String,
    },

    /// An in-process lock was poisoned by a panicking writer.
    #[error("store state poisoned")]
    Poisoned,
}

/// A stored value paired with its CAS version.
#[derive(Debug, Clone, PartialEq)]
pub struct Versioned<T> {
    /// Version the value was read at.
    pub version: u64,
    /// The value.
    pub value: T,
}

/// Outcome of [`WorldStore::compare_and_swap`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CasOutcome {
    /// The write was applied; carries the new version.
    Swapped(u64),
    /// Another writer got there first.
    Conflict,
    /// The object does not exist.
    Missing,
}

/// Blocking persistence operations used by the tick.
pub trait WorldStore: Send + Sync {
    /// Persist a new object under a freshly assigned id.
    ///
    /// The id and lock fields of `object` are ignored. Returns the id.
    fn write_new_object(&self, object: &WorldObject) -> Result<ObjectId, StoreError>;

    /// Read one object with its version.
    fn read_object(&self, id: &ObjectId) -> Result<Option<Versioned<WorldObject>>, StoreError>;

    /// Every object of a kind.
    fn query_objects_by_type(&self, kind: ObjectKind) -> Result<Vec<WorldObject>, StoreError>;

    /// Replace an object only if its version is still `expected_version`.
    fn compare_and_swap(
        &self,
        id: &ObjectId,
        expected_version: u64,
        object: &WorldObject,
    ) -> Result<CasOutcome, StoreError>;

    /// Every object whose lock flag is set.
    fn locked_objects(&self) -> Result<Vec<WorldObject>, StoreError>;

    /// Clear the lock on every object. Returns how many were locked.
    fn force_unlock_all(&self) -> Result<usize, StoreError>;

    /// Add `item.quantity` to the owner's stack, creating it if absent.
    ///
    /// Returns the new stack size.
    fn add_to_user_inventory(&self, item: &InventoryItem) -> Result<u32, StoreError>;

    /// All stacks owned by `user_name`.
    fn user_inventory(&self, user_name: &str) -> Result<Vec<InventoryItem>, StoreError>;

    /// Persistent record for `user_name`, if one exists.
    fn get_player(&self, user_name: &str) -> Result<Option<PlayerRecord>, StoreError>;

    /// Add experience, creating the record if absent. Returns the new total.
    fn add_player_xp(&self, user_name: &str, xp: u32) -> Result<u64, StoreError>;
}

// ---------------------------------------------------------------------------
// In-memory implementation
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
struct MemoryInner {
    counter: u64,
    objects: BTreeMap<ObjectId, Versioned<WorldObject>>,
    inventories: BTreeMap<String, BTreeMap<ItemName, u32>>,
    players: BTreeMap<String, u64>,
}

/// Process-local [`WorldStore`] guarded by a mutex.
#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: Mutex<MemoryInner>,
}

impl MemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, MemoryInner>, StoreError> {
        self.inner.lock().map_err(|_err| StoreError::Poisoned)
    }
}

impl WorldStore for MemoryStore {
    fn write_new_object(&self, object: &WorldObject) -> Result<ObjectId, StoreError> {
        let mut inner = self.lock()?;
        inner.counter = inner.counter.checked_add(1).ok_or_else(|| StoreError::Unavailable {
            message: "object counter exhausted".to_owned(),
        })?;
        let id = ObjectId(format!("{}{}", object.kind().as_str(), inner.counter));
        let stored = WorldObject {
            id: id.clone(),
            lock: LockFields::default(),
            body: object.body.clone(),
        };
        inner.objects.insert(
            id.clone(),
            Versioned {
                version: 1,
                value: stored,
            },
        );
        Ok(id)
    }

    fn read_object(&self, id: &ObjectId) -> Result<Option<Versioned<WorldObject>>, StoreError> {
        Ok(self.lock()?.objects.get(id).cloned())
    }

    fn query_objects_by_type(&self, kind: ObjectKind) -> Result<Vec<WorldObject>, StoreError> {
        Ok(self
            .lock()?
            .objects
            .values()
            .filter(|v| v.value.kind() == kind)
            .map(|v| v.value.clone())
            .collect())
    }

    fn compare_and_swap(
        &self,
        id: &ObjectId,
        expected_version: u64,
        object: &WorldObject,
    ) -> Result<CasOutcome, StoreError> {
        let mut inner = self.lock()?;
        let Some(entry) = inner.objects.get_mut(id) else {
            return Ok(CasOutcome::Missing);
        };
        if entry.version != expected_version {
            return Ok(CasOutcome::Conflict);
        }
        entry.version = entry.version.saturating_add(1);
        entry.value = WorldObject {
            id: id.clone(),
            ..object.clone()
        };
        Ok(CasOutcome::Swapped(entry.version))
    }

    fn locked_objects(&self) -> Result<Vec<WorldObject>, StoreError> {
        Ok(self
            .lock()?
            .objects
            .values()
            .filter(|v| v.value.lock.locked)
            .map(|v| v.value.clone())
            .collect())
    }

    fn force_unlock_all(&self) -> Result<usize, StoreError> {
        let mut inner = self.lock()?;
        let mut cleared: usize = 0;
        for entry in inner.objects.values_mut().filter(|v| v.value.lock.locked) {
            entry.value.lock = LockFields::default();
            entry.version = entry.version.saturating_add(1);
            cleared = cleared.saturating_add(1);
        }
        Ok(cleared)
    }

    fn add_to_user_inventory(&self, item: &InventoryItem) -> Result<u32, StoreError> {
        let mut inner = self.lock()?;
        let stack = inner
            .inventories
            .entry(item.user_name.clone())
            .or_default()
            .entry(item.unique_name)
            .or_insert(0);
        *stack = stack.saturating_add(item.quantity);
        Ok(*stack)
    }

    fn user_inventory(&self, user_name: &str) -> Result<Vec<InventoryItem>, StoreError> {
        Ok(self
            .lock()?
            .inventories
            .get(user_name)
            .map(|stacks| {
                stacks
                    .iter()
                    .map(|(name, quantity)| InventoryItem {
                        unique_name: *name,
                        user_name: user_name.to_owned(),
                        quantity: *quantity,
                    })
                    .collect()
            })
            .unwrap_or_default())
    }

    fn get_player(&self, user_name: &str) -> Result<Option<PlayerRecord>, StoreError> {
        Ok(self.lock()?.players.get(user_name).map(|xp| PlayerRecord {
            user_name: user_name.to_owned(),
            xp: *xp,
        }))
    }

    fn add_player_xp(&self, user_name: &str, xp: u32) -> Result<u64, StoreError> {
        let mut inner = self.lock()?;
        let total = inner.players.entry(user_name.to_owned()).or_insert(0);
        *total = total.saturating_add(u64::from(xp));
        Ok(*total)
    }
}
