//! Blocking [`WorldStore`] over the async `Dragonfly` pool.
//!
//! The tick is synchronous; every call here parks the tick thread on the
//! current runtime until the `Dragonfly` round trip completes.

use std::future::Future;

use farmworld_core::store::{CasOutcome, StoreError, Versioned, WorldStore};
use farmworld_db::{DbError, DragonflyPool, SwapResult};
use farmworld_types::{InventoryItem, ObjectId, ObjectKind, PlayerRecord, WorldObject};

/// [`WorldStore`] backed by `Dragonfly`.
#[derive(Debug, Clone)]
pub struct DragonflyStore {
    pool: DragonflyPool,
}

impl DragonflyStore {
    /// Wrap a connected pool.
    pub const fn new(pool: DragonflyPool) -> Self {
        Self { pool }
    }

    /// Run `fut` to completion from synchronous code.
    ///
    /// Must be called from a worker of a multi-threaded runtime.
    fn block<T, F>(fut: F) -> Result<T, StoreError>
    where
        F: Future<Output = Result<T, DbError>>,
    {
        let handle =
            tokio::runtime::Handle::try_current().map_err(|e| StoreError::Unavailable {
                message: format!("no tokio runtime available: {e}"),
            })?;
        tokio::task::block_in_place(|| handle.block_on(fut)).map_err(into_store_error)
    }
}

/// Map data layer failures onto the store contract.
fn into_store_error(err: DbError) -> StoreError {
    match err {
        DbError::Serialization(e) => StoreError::Corrupt {
            key: "<document>".to_owned(),
            reason: e.to_string(),
        },
        DbError::InvalidRecord { key, reason } => StoreError::Corrupt { key, reason },
        other @ (DbError::Dragonfly(_) | DbError::KeyNotFound(_) | DbError::Config(_)) => {
            StoreError::Unavailable {
                message: other.to_string(),
            }
        }
    }
}

impl WorldStore for DragonflyStore {
    fn write_new_object(&self, object: &WorldObject) -> Result<ObjectId, StoreError> {
        Self::block(self.pool.write_new_object(object))
    }

    fn read_object(&self, id: &ObjectId) -> Result<Option<Versioned<WorldObject>>, StoreError> {
        Ok(Self::block(self.pool.read_object(id))?
            .map(|(version, value)| Versioned { version, value }))
    }

    fn query_objects_by_type(&self, kind: ObjectKind) -> Result<Vec<WorldObject>, StoreError> {
        Self::block(self.pool.query_objects_by_type(kind))
    }

    fn compare_and_swap(
        &self,
        id: &ObjectId,
        expected_version: u64,
        object: &WorldObject,
    ) -> Result<CasOutcome, StoreError> {
        let outcome = Self::block(self.pool.compare_and_swap(id, expected_version, object))?;
        Ok(match outcome {
            SwapResult::Swapped(version) => CasOutcome::Swapped(version),
            SwapResult::Conflict => CasOutcome::Conflict,
            SwapResult::Missing => CasOutcome::Missing,
        })
    }

    fn locked_objects(&self) -> Result<Vec<WorldObject>, StoreError> {
        Self::block(self.pool.locked_objects())
    }

    fn force_unlock_all(&self) -> Result<usize, StoreError> {
        Self::block(self.pool.force_unlock_all())
    }

    fn add_to_user_inventory(&self, item: &InventoryItem) -> Result<u32, StoreError> {
        Self::block(self.pool.add_to_inventory(item))
    }

    fn user_inventory(&self, user_name: &str) -> Result<Vec<InventoryItem>, StoreError> {
        Self::block(self.pool.user_inventory(user_name))
    }

    fn get_player(&self, user_name: &str) -> Result<Option<PlayerRecord>, StoreError> {
        Self::block(self.pool.get_player(user_name))
    }

    fn add_player_xp(&self, user_name: &str, xp: u32) -> Result<u64, StoreError> {
        Self::block(self.pool.add_player_xp(user_name, xp))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn invalid_records_become_corrupt() {
        let err = into_store_error(DbError::InvalidRecord {
            key: "inventory:alice".to_owned(),
            reason: "bad".to_owned(),
        });
        assert_eq!(
            err,
            StoreError::Corrupt {
                key: "inventory:alice".to_owned(),
                reason: "bad".to_owned(),
            }
        );
    }

    #[test]
    fn connection_failures_become_unavailable() {
        let err = into_store_error(DbError::Config("Invalid Dragonfly URL".to_owned()));
        assert!(matches!(err, StoreError::Unavailable { .. }));
    }

    #[test]
    fn calls_outside_a_runtime_fail_cleanly() {
        let result = DragonflyStore::block(async { Ok::<u8, DbError>(1) });
        assert!(matches!(result, Err(StoreError::Unavailable { .. })));
    }
}
