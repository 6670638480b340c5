//! `Dragonfly` (Redis-compatible) world state operations.
//!
//! # Key Patterns
//!
//! | Pattern | Type | Description |
//! |---------|------|-------------|
//! | `world:clock` | JSON | Last checkpointed simulation time (ms) |
//! | `world:objects:counter` | Integer | Source of object id suffixes |
//! | `world:objects:{KIND}` | Set | Ids of every object of a kind |
//! | `object:{id}` | JSON | The world object document |
//! | `object:{id}:version` | Integer | CAS version, bumped on every write |
//! | `inventory:{user}` | Hash | Item name to stack size |
//! | `player:{user}` | Hash | Player record (`xp` field) |
//!
//! Object writes that touch more than one key go through Lua scripts so
//! the document, its version and its index entry never disagree.

use std::collections::{BTreeMap, HashMap};

use farmworld_types::{
    InventoryItem, ItemName, LockFields, ObjectId, ObjectKind, PlayerRecord, WorldObject,
};
use fred::interfaces::LuaInterface;
use fred::prelude::*;
use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::error::DbError;

const CLOCK_KEY: &str = "world:clock";
const OBJECT_COUNTER_KEY: &str = "world:objects:counter";
const XP_FIELD: &str = "xp";

/// Retries per object when clearing every lock at startup.
const UNLOCK_ALL_ATTEMPTS: u32 = 3;

/// Store a new document, its initial version and its index entry.
///
/// KEYS: object, version, index. ARGV: json, id.
const INSERT_SCRIPT: &str = r"
redis.call('SET', KEYS[1], ARGV[1])
redis.call('SET', KEYS[2], 1)
redis.call('SADD', KEYS[3], ARGV[2])
return 1
";

/// Replace a document if its version still matches.
///
/// KEYS: object, version. ARGV: expected version, json.
/// Returns the new version, 0 on conflict, -1 if the object is missing.
const CAS_SCRIPT: &str = r"
local current = redis.call('GET', KEYS[2])
if not current then
  return -1
end
if tonumber(current) ~= tonumber(ARGV[1]) then
  return 0
end
redis.call('SET', KEYS[1], ARGV[2])
return redis.call('INCR', KEYS[2])
";

/// Outcome of [`DragonflyPool::compare_and_swap`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SwapResult {
    /// The write was applied; carries the new version.
    Swapped(u64),
    /// The stored version no longer matches.
    Conflict,
    /// No such object.
    Missing,
}

fn object_key(id: &ObjectId) -> String {
    format!("object:{id}")
}

fn version_key(id: &ObjectId) -> String {
    format!("object:{id}:version")
}

fn index_key(kind: ObjectKind) -> String {
    format!("world:objects:{kind}")
}

fn inventory_key(user_name: &str) -> String {
    format!("inventory:{user_name}")
}

fn player_key(user_name: &str) -> String {
    format!("player:{user_name}")
}

/// Connection handle to a `Dragonfly` (Redis-compatible) instance.
///
/// Wraps a [`fred::prelude::Client`] and provides typed operations for the
/// key patterns listed in the module docs.
#[derive(Clone)]
pub struct DragonflyPool {
    client: Client,
}

impl core::fmt::Debug for DragonflyPool {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("DragonflyPool").finish_non_exhaustive()
    }
}

impl DragonflyPool {
    /// Connect to `Dragonfly` at the given URL.
    ///
    /// The URL should follow the Redis URL scheme:
    /// `redis://host:port` or `redis://host:port/db`
    ///
    /// # Errors
    ///
    /// Returns [`DbError::Config`] if the URL cannot be parsed.
    /// Returns [`DbError::Dragonfly`] if the connection fails.
    pub async fn connect(url: &str) -> Result<Self, DbError> {
        let config = Config::from_url(url)
            .map_err(|e| DbError::Config(format!("Invalid Dragonfly URL: {e}")))?;

        let client = Builder::from_config(config).build()?;
        client.init().await?;

        tracing::info!("Connected to Dragonfly");
        Ok(Self { client })
    }

    // =========================================================================
    // Generic JSON get/set
    // =========================================================================

    /// Serialize `value` as JSON and store it at `key`.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::Serialization`] if serialization fails.
    /// Returns [`DbError::Dragonfly`] if the write fails.
    pub async fn set_json<T: Serialize + Sync>(&self, key: &str, value: &T) -> Result<(), DbError> {
        let json = serde_json::to_string(value)?;
        let _: () = self.client.set(key, json.as_str(), None, None, false).await?;
        Ok(())
    }

    /// Read the value at `key` and deserialize from JSON.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::KeyNotFound`] if the key does not exist.
    /// Returns [`DbError::Serialization`] if deserialization fails.
    /// Returns [`DbError::Dragonfly`] if the read fails.
    pub async fn get_json<T: DeserializeOwned>(&self, key: &str) -> Result<T, DbError> {
        let value: Option<String> = self.client.get(key).await?;
        value.map_or_else(
            || Err(DbError::KeyNotFound(key.to_owned())),
            |s| Ok(serde_json::from_str(&s)?),
        )
    }

    // =========================================================================
    // World clock -- world:clock
    // =========================================================================

    /// Persist the simulation clock checkpoint (`world:clock`).
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] if serialization or write fails.
    pub async fn set_world_clock(&self, time_ms: u64) -> Result<(), DbError> {
        self.set_json(CLOCK_KEY, &time_ms).await
    }

    /// Last persisted clock checkpoint, if any.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] if deserialization or the read fails.
    pub async fn get_world_clock(&self) -> Result<Option<u64>, DbError> {
        match self.get_json(CLOCK_KEY).await {
            Ok(time_ms) => Ok(Some(time_ms)),
            Err(DbError::KeyNotFound(_)) => Ok(None),
            Err(e) => Err(e),
        }
    }

    // =========================================================================
    // World objects -- object:{id}, object:{id}:version, world:objects:{KIND}
    // =========================================================================

    /// Persist a new object under a freshly assigned id such as `MINEABLE7`.
    ///
    /// The id and lock fields of `object` are replaced: new objects are
    /// always stored unlocked at version 1.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] if serialization or any write fails.
    pub async fn write_new_object(&self, object: &WorldObject) -> Result<ObjectId, DbError> {
        let counter: u64 = self.client.incr(OBJECT_COUNTER_KEY).await?;
        let kind = object.kind();
        let id = ObjectId(format!("{kind}{counter}"));
        let stored = WorldObject {
            id: id.clone(),
            lock: LockFields::default(),
            body: object.body.clone(),
        };
        let json = serde_json::to_string(&stored)?;

        let keys = vec![object_key(&id), version_key(&id), index_key(kind)];
        let args = vec![json, id.to_string()];
        let _: i64 = self.client.eval(INSERT_SCRIPT, keys, args).await?;

        tracing::debug!(object = %id, "Object written");
        Ok(id)
    }

    /// Read one object together with its CAS version.
    ///
    /// The version is read before the document, so the pair can only be
    /// stale in the safe direction: a later CAS with it fails rather than
    /// overwriting a newer document.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] if a read or deserialization fails, or
    /// [`DbError::InvalidRecord`] if the version exists without a document.
    pub async fn read_object(&self, id: &ObjectId) -> Result<Option<(u64, WorldObject)>, DbError> {
        let version: Option<u64> = self.client.get(version_key(id)).await?;
        let Some(version) = version else {
            return Ok(None);
        };
        let key = object_key(id);
        let document: Option<String> = self.client.get(key.as_str()).await?;
        let document = document.ok_or_else(|| DbError::InvalidRecord {
            key,
            reason: format!("version {version} present but document missing"),
        })?;
        Ok(Some((version, serde_json::from_str(&document)?)))
    }

    /// Every object of `kind`.
    ///
    /// Index entries whose document has vanished are skipped.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] if a read or deserialization fails.
    pub async fn query_objects_by_type(&self, kind: ObjectKind) -> Result<Vec<WorldObject>, DbError> {
        let mut ids: Vec<String> = self.client.smembers(index_key(kind)).await?;
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        ids.sort();
        let keys: Vec<String> = ids
            .iter()
            .map(|id| format!("object:{id}"))
            .collect();
        let documents: Vec<Option<String>> = self.client.mget(keys).await?;

        let mut objects = Vec::with_capacity(documents.len());
        for document in documents.into_iter().flatten() {
            objects.push(serde_json::from_str(&document)?);
        }
        Ok(objects)
    }

    /// Replace an object only if its stored version is `expected_version`.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] if serialization or the script fails.
    pub async fn compare_and_swap(
        &self,
        id: &ObjectId,
        expected_version: u64,
        object: &WorldObject,
    ) -> Result<SwapResult, DbError> {
        let stored = WorldObject {
            id: id.clone(),
            ..object.clone()
        };
        let json = serde_json::to_string(&stored)?;
        let keys = vec![object_key(id), version_key(id)];
        let args = vec![expected_version.to_string(), json];
        let outcome: i64 = self.client.eval(CAS_SCRIPT, keys, args).await?;

        match outcome {
            -1 => Ok(SwapResult::Missing),
            0 => Ok(SwapResult::Conflict),
            v => u64::try_from(v)
                .map(SwapResult::Swapped)
                .map_err(|_err| DbError::InvalidRecord {
                    key: version_key(id),
                    reason: format!("script returned {v}"),
                }),
        }
    }

    /// Every object whose lock flag is set.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] if a read or deserialization fails.
    pub async fn locked_objects(&self) -> Result<Vec<WorldObject>, DbError> {
        let mut locked = Vec::new();
        for &kind in ObjectKind::ALL {
            locked.extend(
                self.query_objects_by_type(kind)
                    .await?
                    .into_iter()
                    .filter(|o| o.lock.locked),
            );
        }
        Ok(locked)
    }

    /// Clear the lock on every locked object. Returns how many were cleared.
    ///
    /// Each object is cleared through CAS, retrying on conflict.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] if a read or write fails.
    pub async fn force_unlock_all(&self) -> Result<usize, DbError> {
        let mut cleared: usize = 0;
        for object in self.locked_objects().await? {
            for _ in 0..UNLOCK_ALL_ATTEMPTS {
                let Some((version, mut current)) = self.read_object(&object.id).await? else {
                    break;
                };
                if !current.lock.locked {
                    break;
                }
                current.lock = LockFields::default();
                match self.compare_and_swap(&object.id, version, &current).await? {
                    SwapResult::Swapped(_) => {
                        cleared = cleared.saturating_add(1);
                        break;
                    }
                    SwapResult::Missing => break,
                    SwapResult::Conflict => {}
                }
            }
        }
        Ok(cleared)
    }

    // =========================================================================
    // Inventories -- inventory:{user}
    // =========================================================================

    /// Atomically add `item.quantity` to the owner's stack.
    ///
    /// Returns the new stack size.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::Dragonfly`] if the write fails, or
    /// [`DbError::InvalidRecord`] if the stack leaves the `u32` range.
    pub async fn add_to_inventory(&self, item: &InventoryItem) -> Result<u32, DbError> {
        let key = inventory_key(&item.user_name);
        let total: i64 = self
            .client
            .hincrby(key.as_str(), item.unique_name.as_str(), i64::from(item.quantity))
            .await?;
        u32::try_from(total).map_err(|_err| DbError::InvalidRecord {
            key,
            reason: format!("stack size {total} out of range"),
        })
    }

    /// All stacks owned by `user_name`, ordered by item.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::Dragonfly`] if the read fails, or
    /// [`DbError::InvalidRecord`] for an unknown item or a bad count.
    pub async fn user_inventory(&self, user_name: &str) -> Result<Vec<InventoryItem>, DbError> {
        let key = inventory_key(user_name);
        let raw: HashMap<String, i64> = self.client.hgetall(key.as_str()).await?;

        let mut stacks: BTreeMap<ItemName, u32> = BTreeMap::new();
        for (name, quantity) in raw {
            let item = name.parse::<ItemName>().map_err(|e| DbError::InvalidRecord {
                key: key.clone(),
                reason: e.to_string(),
            })?;
            let quantity = u32::try_from(quantity).map_err(|_err| DbError::InvalidRecord {
                key: key.clone(),
                reason: format!("{name} has count {quantity}"),
            })?;
            stacks.insert(item, quantity);
        }
        Ok(stacks
            .into_iter()
            .map(|(unique_name, quantity)| InventoryItem {
                unique_name,
                user_name: user_name.to_owned(),
                quantity,
            })
            .collect())
    }

    // =========================================================================
    // Players -- player:{user}
    // =========================================================================

    /// The player's record, if they have ever earned experience.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::Dragonfly`] if the read fails.
    pub async fn get_player(&self, user_name: &str) -> Result<Option<PlayerRecord>, DbError> {
        let xp: Option<u64> = self.client.hget(player_key(user_name), XP_FIELD).await?;
        Ok(xp.map(|xp| PlayerRecord {
            user_name: user_name.to_owned(),
            xp,
        }))
    }

    /// Atomically add experience. Returns the new total.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::Dragonfly`] if the write fails, or
    /// [`DbError::InvalidRecord`] if the stored total is negative.
    pub async fn add_player_xp(&self, user_name: &str, xp: u32) -> Result<u64, DbError> {
        let key = player_key(user_name);
        let total: i64 = self
            .client
            .hincrby(key.as_str(), XP_FIELD, i64::from(xp))
            .await?;
        u64::try_from(total).map_err(|_err| DbError::InvalidRecord {
            key,
            reason: format!("xp total {total} is negative"),
        })
    }

    // =========================================================================
    // Maintenance
    // =========================================================================

    /// Flush all keys from the `Dragonfly` instance.
    ///
    /// **WARNING:** This deletes all data. Only use for testing.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::Dragonfly`] if the flush fails.
    pub async fn flush_all(&self) -> Result<(), DbError> {
        let _: () = self.client.flushall(false).await?;
        Ok(())
    }
}
