//! Shared type definitions for the `FarmWorld` server.
//!
//! This crate is the single source of truth for the types that cross crate
//! boundaries: the wire protocol, persisted world objects, and the
//! identifiers that key them.
//!
//! # Modules
//!
//! - [`ids`] -- Connection and world-object identifiers
//! - [`enums`] -- Object kinds, materials, items, zones, reliability classes
//! - [`structs`] -- Transforms, world objects, inventory and player records
//! - [`packets`] -- Client and server protocol messages

pub mod enums;
pub mod ids;
pub mod packets;
pub mod structs;

// Re-export all public types at crate root for convenience.
pub use enums::{
    ItemName, MineableSize, MineableSubType, MineableType, ObjectKind, PlantableType, Reliability,
    UnknownVariant, Zone,
};
pub use ids::{ConnectionId, ObjectId};
pub use packets::{ClientMessage, ServerMessage};
pub use structs::{
    InventoryItem, LockFields, Mineable, ObjectBody, Plantable, PlayerRecord, Transform,
    WorldObject,
};
