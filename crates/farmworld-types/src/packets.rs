//! Protocol messages exchanged between game clients and the server.
//!
//! Both directions use an internally tagged JSON representation
//! (`{"type": "StartMining", "id": ..., "userName": ...}`). Client messages
//! carry some enums as raw strings so the server can reject unknown values
//! as validation failures rather than decode failures.

use serde::{Deserialize, Serialize};

use crate::enums::{MineableSubType, MineableType, PlantableType, Reliability, Zone};
use crate::ids::ObjectId;
use crate::structs::{InventoryItem, Mineable, Plantable, PlayerRecord, Transform, WorldObject};

/// A message sent by a game client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all_fields = "camelCase")]
pub enum ClientMessage {
    /// Claim an identity for this connection.
    Login {
        /// Requested username.
        user_name: String,
    },
    /// Latest avatar pose.
    PlayerTransform {
        /// Sender's username.
        user_name: String,
        /// Current pose.
        transform: Transform,
    },
    /// Begin mining a world object.
    StartMining {
        /// Target object.
        id: ObjectId,
        /// Sender's username.
        user_name: String,
        /// Wire string of the [`MineableType`].
        mineable_type: String,
        /// Wire string of the [`MineableSubType`].
        sub_mineable_type: String,
    },
    /// Progress report while mining.
    MinedQuantity {
        /// Object being mined.
        id: ObjectId,
        /// Sender's username.
        user_name: String,
        /// Item and amount mined since the last report.
        item: InventoryItem,
    },
    /// Finish mining and collect the reward.
    EndMining {
        /// Object being mined.
        id: ObjectId,
        /// Sender's username.
        user_name: String,
        /// Client's view of the reward; the server resolves its own.
        #[serde(default)]
        item: Option<InventoryItem>,
    },
    /// Stop mining without a reward.
    AbortMining {
        /// Object being mined.
        id: ObjectId,
        /// Sender's username.
        user_name: String,
    },
    /// Cosmetic planting animation.
    StartPlanting {
        /// Sender's username.
        user_name: String,
        /// Wire string of the [`PlantableType`].
        plantable_type: String,
    },
    /// Place a new mineable in the world.
    PlaceMinableObject {
        /// Object to place; quantity is ignored.
        mineable: Mineable,
    },
    /// Place a new mineable, keeping the client-supplied quantity.
    DeveloperPlaceMinableObject {
        /// Object to place.
        mineable: Mineable,
    },
    /// Plant something new in the world.
    PlacePlantableObject {
        /// Plant to place; growth fields are ignored.
        plantable: Plantable,
    },
    /// Begin casting.
    FishThrowBobbler {
        /// Sender's username.
        user_name: String,
    },
    /// The bobbler landed in a zone.
    FishBobblerInWater {
        /// Sender's username.
        user_name: String,
        /// Wire string of the [`Zone`].
        zone: String,
    },
    /// Outcome of the catch minigame.
    FishCaught {
        /// Sender's username.
        user_name: String,
        /// Whether the player landed the fish.
        success: bool,
    },
    /// Reel in without catching anything.
    AbortFishing {
        /// Sender's username.
        user_name: String,
    },
}

impl ClientMessage {
    /// Wire name of the message, for logging.
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Login { .. } => "Login",
            Self::PlayerTransform { .. } => "PlayerTransform",
            Self::StartMining { .. } => "StartMining",
            Self::MinedQuantity { .. } => "MinedQuantity",
            Self::EndMining { .. } => "EndMining",
            Self::AbortMining { .. } => "AbortMining",
            Self::StartPlanting { .. } => "StartPlanting",
            Self::PlaceMinableObject { .. } => "PlaceMinableObject",
            Self::DeveloperPlaceMinableObject { .. } => "DeveloperPlaceMinableObject",
            Self::PlacePlantableObject { .. } => "PlacePlantableObject",
            Self::FishThrowBobbler { .. } => "FishThrowBobbler",
            Self::FishBobblerInWater { .. } => "FishBobblerInWater",
            Self::FishCaught { .. } => "FishCaught",
            Self::AbortFishing { .. } => "AbortFishing",
        }
    }

    /// The username the message claims to come from, if it carries one.
    pub fn claimed_user(&self) -> Option<&str> {
        match self {
            Self::Login { user_name }
            | Self::PlayerTransform { user_name, .. }
            | Self::StartMining { user_name, .. }
            | Self::MinedQuantity { user_name, .. }
            | Self::EndMining { user_name, .. }
            | Self::AbortMining { user_name, .. }
            | Self::StartPlanting { user_name, .. }
            | Self::FishThrowBobbler { user_name }
            | Self::FishBobblerInWater { user_name, .. }
            | Self::FishCaught { user_name, .. }
            | Self::AbortFishing { user_name } => Some(user_name),
            Self::PlaceMinableObject { .. }
            | Self::DeveloperPlaceMinableObject { .. }
            | Self::PlacePlantableObject { .. } => None,
        }
    }
}

/// A message sent by the server to one or more clients.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all_fields = "camelCase")]
pub enum ServerMessage {
    /// Everything a freshly logged-in player needs about themselves.
    LoginInitialPlayerState {
        /// Persistent progress.
        player: PlayerRecord,
    },
    /// Full inventory of the receiving player.
    UserInventory {
        /// Every stack the player owns.
        items: Vec<InventoryItem>,
    },
    /// All live world objects.
    WorldSnapshot {
        /// Mineables and plantables.
        objects: Vec<WorldObject>,
    },
    /// Authoritative simulation time.
    CurrentServerTime {
        /// Milliseconds of simulation time.
        time_ms: u64,
    },
    /// A player left.
    PlayerExited {
        /// Who left.
        user_name: String,
    },
    /// Another player's pose.
    PlayerTransform {
        /// Whose pose.
        user_name: String,
        /// The pose.
        transform: Transform,
    },
    /// Another player started mining.
    StartMining {
        /// Object being mined.
        id: ObjectId,
        /// Miner.
        user_name: String,
        /// Broad category.
        mineable_type: MineableType,
        /// Material.
        sub_mineable_type: MineableSubType,
    },
    /// The requested object is held by someone else.
    MiningLockFailed {
        /// Object that could not be locked.
        id: ObjectId,
        /// Requester.
        user_name: String,
    },
    /// Another player's mining progress.
    MinedQuantity {
        /// Object being mined.
        id: ObjectId,
        /// Miner.
        user_name: String,
        /// Item and amount mined.
        item: InventoryItem,
    },
    /// Another player finished mining.
    EndMining {
        /// Object that was mined.
        id: ObjectId,
        /// Miner.
        user_name: String,
        /// Reward granted.
        item: InventoryItem,
    },
    /// Another player stopped mining.
    AbortMining {
        /// Object that was being mined.
        id: ObjectId,
        /// Miner.
        user_name: String,
    },
    /// A player earned experience.
    #[serde(rename = "ReceivedXP")]
    ReceivedXp {
        /// Who earned it.
        user_name: String,
        /// Amount just earned.
        xp: u32,
        /// New total.
        total_xp: u64,
    },
    /// Another player is planting.
    StartPlanting {
        /// Planter.
        user_name: String,
        /// What is being planted.
        plantable_type: PlantableType,
    },
    /// A mineable was placed.
    PlaceMinableObject {
        /// The persisted object.
        object: WorldObject,
    },
    /// A plantable was placed.
    PlacePlantableObject {
        /// The persisted object.
        object: WorldObject,
    },
    /// Another player cast.
    FishThrowBobbler {
        /// Angler.
        user_name: String,
    },
    /// Another player's bobbler landed.
    FishBobblerInWater {
        /// Angler.
        user_name: String,
        /// Where it landed.
        zone: Zone,
    },
    /// A fish is on the line.
    FishBiting {
        /// Angler.
        user_name: String,
    },
    /// Outcome of a catch.
    FishCaught {
        /// Angler.
        user_name: String,
        /// Whether the catch succeeded.
        success: bool,
        /// Item granted on success.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        item: Option<InventoryItem>,
    },
    /// Another player reeled in.
    AbortFishing {
        /// Angler.
        user_name: String,
    },
}

impl ServerMessage {
    /// Delivery class the transport must use for this message.
    pub const fn reliability(&self) -> Reliability {
        match self {
            Self::PlayerTransform { .. }
            | Self::PlaceMinableObject { .. }
            | Self::PlacePlantableObject { .. } => Reliability::ReliableSequenced,
            Self::WorldSnapshot { .. } | Self::CurrentServerTime { .. } => {
                Reliability::ReliableUnordered
            }
            Self::LoginInitialPlayerState { .. }
            | Self::UserInventory { .. }
            | Self::PlayerExited { .. }
            | Self::StartMining { .. }
            | Self::MiningLockFailed { .. }
            | Self::MinedQuantity { .. }
            | Self::EndMining { .. }
            | Self::AbortMining { .. }
            | Self::ReceivedXp { .. }
            | Self::StartPlanting { .. }
            | Self::FishThrowBobbler { .. }
            | Self::FishBobblerInWater { .. }
            | Self::FishBiting { .. }
            | Self::FishCaught { .. }
            | Self::AbortFishing { .. } => Reliability::ReliableOrdered,
        }
    }

    /// Wire name of the message, for logging.
    pub const fn name(&self) -> &'static str {
        match self {
            Self::LoginInitialPlayerState { .. } => "LoginInitialPlayerState",
            Self::UserInventory { .. } => "UserInventory",
            Self::WorldSnapshot { .. } => "WorldSnapshot",
            Self::CurrentServerTime { .. } => "CurrentServerTime",
            Self::PlayerExited { .. } => "PlayerExited",
            Self::PlayerTransform { .. } => "PlayerTransform",
            Self::StartMining { .. } => "StartMining",
            Self::MiningLockFailed { .. } => "MiningLockFailed",
            Self::MinedQuantity { .. } => "MinedQuantity",
            Self::EndMining { .. } => "EndMining",
            Self::AbortMining { .. } => "AbortMining",
            Self::ReceivedXp { .. } => "ReceivedXP",
            Self::StartPlanting { .. } => "StartPlanting",
            Self::PlaceMinableObject { .. } => "PlaceMinableObject",
            Self::PlacePlantableObject { .. } => "PlacePlantableObject",
            Self::FishThrowBobbler { .. } => "FishThrowBobbler",
            Self::FishBobblerInWater { .. } => "FishBobblerInWater",
            Self::FishBiting { .. } => "FishBiting",
            Self::FishCaught { .. } => "FishCaught",
            Self::AbortFishing { .. } => "AbortFishing",
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn client_message_decodes_tagged_json() {
        let json = r#"{"type":"StartMining","id":"MINEABLE1","userName":"alice",
            "mineableType":"ROCK","subMineableType":"IRON"}"#;
        let msg: ClientMessage = serde_json::from_str(json).unwrap();
        assert_eq!(msg.name(), "StartMining");
        assert_eq!(msg.claimed_user(), Some("alice"));
        match msg {
            ClientMessage::StartMining { id, sub_mineable_type, .. } => {
                assert_eq!(id.as_str(), "MINEABLE1");
                assert_eq!(sub_mineable_type, "IRON");
            }
            other => panic!("unexpected message: {other:?}"),
        }
    }

    #[test]
    fn end_mining_item_is_optional() {
        let json = r#"{"type":"EndMining","id":"MINEABLE1","userName":"alice"}"#;
        let msg: ClientMessage = serde_json::from_str(json).unwrap();
        assert!(matches!(msg, ClientMessage::EndMining { item: None, .. }));
    }

    #[test]
    fn received_xp_uses_upper_case_tag() {
        let msg = ServerMessage::ReceivedXp {
            user_name: "bob".to_owned(),
            xp: 2,
            total_xp: 10,
        };
        let value = serde_json::to_value(&msg).unwrap();
        assert_eq!(value["type"], "ReceivedXP");
        assert_eq!(value["totalXp"], 10);
        assert_eq!(msg.name(), "ReceivedXP");
    }

    #[test]
    fn reliability_classes() {
        let transform = ServerMessage::PlayerTransform {
            user_name: "a".to_owned(),
            transform: Transform::default(),
        };
        assert_eq!(transform.reliability(), Reliability::ReliableSequenced);
        let time = ServerMessage::CurrentServerTime { time_ms: 5 };
        assert_eq!(time.reliability(), Reliability::ReliableUnordered);
        let lock = ServerMessage::MiningLockFailed {
            id: ObjectId::from("MINEABLE1"),
            user_name: "a".to_owned(),
        };
        assert_eq!(lock.reliability(), Reliability::ReliableOrdered);
    }

    #[test]
    fn placement_messages_carry_no_identity() {
        let json = r#"{"type":"PlacePlantableObject","plantable":{"plantableType":"WHEAT",
            "transform":{"x":1.0,"y":0.0,"z":0.0,"rot_x":0.0,"rot_y":0.0,"rot_z":0.0,"rot_w":1.0}}}"#;
        let msg: ClientMessage = serde_json::from_str(json).unwrap();
        assert_eq!(msg.claimed_user(), None);
    }
}
