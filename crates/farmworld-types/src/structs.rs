//! Core entity structs: poses, world objects, inventory and player records.
//!
//! Field names serialize in `camelCase` to match the client protocol and the
//! persisted JSON documents, except for [`Transform`] whose rotation fields
//! keep their `rot_*` names.

use serde::{Deserialize, Serialize};

use crate::enums::{
    ItemName, MineableSize, MineableSubType, MineableType, ObjectKind, PlantableType,
};
use crate::ids::ObjectId;

// ---------------------------------------------------------------------------
// Transform
// ---------------------------------------------------------------------------

/// Position and rotation of a player or world object.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Transform {
    /// X position.
    pub x: f32,
    /// Y position.
    pub y: f32,
    /// Z position.
    pub z: f32,
    /// Rotation quaternion X.
    pub rot_x: f32,
    /// Rotation quaternion Y.
    pub rot_y: f32,
    /// Rotation quaternion Z.
    pub rot_z: f32,
    /// Rotation quaternion W.
    pub rot_w: f32,
}

impl Transform {
    /// Whether every component is exactly zero.
    ///
    /// Clients send an all-zero transform before their avatar has spawned;
    /// such poses are never stored or relayed.
    #[allow(clippy::float_cmp)]
    pub fn is_all_zero(&self) -> bool {
        [
            self.x, self.y, self.z, self.rot_x, self.rot_y, self.rot_z, self.rot_w,
        ]
        .iter()
        .all(|c| *c == 0.0)
    }
}

// ---------------------------------------------------------------------------
// World objects
// ---------------------------------------------------------------------------

/// Exclusive-access fields carried by every world object.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LockFields {
    /// Whether a player currently holds the object.
    #[serde(default)]
    pub locked: bool,
    /// Username of the holder, empty when unlocked.
    #[serde(default)]
    pub locked_by: String,
    /// Simulation time (ms) at which the lock was taken.
    #[serde(default)]
    pub lock_start_time: u64,
}

impl LockFields {
    /// Lock fields held by `holder` since `now`.
    pub fn held_by(holder: &str, now: u64) -> Self {
        Self {
            locked: true,
            locked_by: holder.to_owned(),
            lock_start_time: now,
        }
    }
}

/// A resource node that players mine for items and XP.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Mineable {
    /// Broad category.
    pub mineable_type: MineableType,
    /// Material; determines the reward item.
    pub sub_mineable_type: MineableSubType,
    /// Size class.
    pub size: MineableSize,
    /// Remaining quantity. Stamped by the server on normal placement.
    #[serde(default)]
    pub quantity: u32,
    /// Where the object sits in the world.
    pub transform: Transform,
}

/// A crop or sapling that becomes harvestable after its growth time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Plantable {
    /// What is growing.
    pub plantable_type: PlantableType,
    /// Milliseconds from planting until harvestable. Stamped by the server.
    #[serde(default)]
    pub growth_time: u64,
    /// Simulation time (ms) at which it was planted. Stamped by the server.
    #[serde(default)]
    pub time_planted: u64,
    /// Where the object sits in the world.
    pub transform: Transform,
}

/// Kind-specific payload of a [`WorldObject`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ObjectBody {
    /// A mineable resource node.
    #[serde(rename = "MINEABLE")]
    Mineable(Mineable),
    /// A growing plant.
    #[serde(rename = "PLANTABLE")]
    Plantable(Plantable),
}

impl ObjectBody {
    /// The persisted kind of this payload.
    pub const fn kind(&self) -> ObjectKind {
        match self {
            Self::Mineable(_) => ObjectKind::Mineable,
            Self::Plantable(_) => ObjectKind::Plantable,
        }
    }
}

/// A persisted, shared world entity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorldObject {
    /// Store-assigned id.
    pub id: ObjectId,
    /// Exclusive-access fields.
    #[serde(flatten)]
    pub lock: LockFields,
    /// Kind-specific payload.
    #[serde(flatten)]
    pub body: ObjectBody,
}

impl WorldObject {
    /// Build an unlocked object with a placeholder id.
    ///
    /// The store replaces the id on first write.
    pub fn unplaced(body: ObjectBody) -> Self {
        Self {
            id: ObjectId::default(),
            lock: LockFields::default(),
            body,
        }
    }

    /// The persisted kind of this object.
    pub const fn kind(&self) -> ObjectKind {
        self.body.kind()
    }

    /// The mineable payload, if this is a mineable.
    pub const fn as_mineable(&self) -> Option<&Mineable> {
        match &self.body {
            ObjectBody::Mineable(m) => Some(m),
            ObjectBody::Plantable(_) => None,
        }
    }

    /// The plantable payload, if this is a plantable.
    pub const fn as_plantable(&self) -> Option<&Plantable> {
        match &self.body {
            ObjectBody::Plantable(p) => Some(p),
            ObjectBody::Mineable(_) => None,
        }
    }
}

// ---------------------------------------------------------------------------
// Players
// ---------------------------------------------------------------------------

/// A quantity of one item owned by one player.
///
/// Also used as an inventory delta: persisting one adds `quantity` to the
/// player's existing stack, creating it if absent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InventoryItem {
    /// Which item.
    pub unique_name: ItemName,
    /// Owner.
    #[serde(default)]
    pub user_name: String,
    /// Stack size or delta.
    pub quantity: u32,
}

/// Persistent per-player progress.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerRecord {
    /// Unique username.
    pub user_name: String,
    /// Total experience earned.
    #[serde(default)]
    pub xp: u64,
}

impl PlayerRecord {
    /// A fresh record for a player who has never earned XP.
    pub fn new(user_name: impl Into<String>) -> Self {
        Self {
            user_name: user_name.into(),
            xp: 0,
        }
    }
}
