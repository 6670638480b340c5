//! Game balance tables.
//!
//! Rewards, experience, starting quantities and growth times are all pure
//! lookups keyed by the object's type enums.

use farmworld_types::{ItemName, MineableSize, MineableSubType, MineableType, PlantableType};

/// Item granted for a successful catch.
pub const FISHING_REWARD: ItemName = ItemName::Herring;

/// Quantity granted for a successful catch.
pub const FISHING_REWARD_QUANTITY: u32 = 1;

/// Scale factor applied to quantity and XP by object size.
pub const fn size_multiplier(size: MineableSize) -> u32 {
    match size {
        MineableSize::Small => 1,
        MineableSize::Medium => 2,
        MineableSize::Large => 4,
    }
}

/// The broad category every object of a material belongs to.
pub const fn category_of(sub: MineableSubType) -> MineableType {
    match sub {
        MineableSubType::Oak => MineableType::Tree,
        MineableSubType::Iron | MineableSubType::Stone => MineableType::Rock,
    }
}

/// Item produced by mining a material.
pub const fn reward_item(sub: MineableSubType) -> ItemName {
    match sub {
        MineableSubType::Oak => ItemName::Wood,
        MineableSubType::Iron | MineableSubType::Stone => ItemName::Ore,
    }
}

/// Experience for mining a small object of a material.
pub const fn base_mining_xp(sub: MineableSubType) -> u32 {
    match sub {
        MineableSubType::Stone | MineableSubType::Iron | MineableSubType::Oak => 1,
    }
}

/// Experience for finishing a mining session on an object.
pub const fn mining_xp(sub: MineableSubType, size: MineableSize) -> u32 {
    base_mining_xp(sub).saturating_mul(size_multiplier(size))
}

/// Quantity a small object of a material starts with.
pub const fn base_starting_quantity(sub: MineableSubType) -> u32 {
    match sub {
        MineableSubType::Iron => 5,
        MineableSubType::Stone | MineableSubType::Oak => 20,
    }
}

/// Quantity stamped on a newly placed mineable.
pub const fn starting_quantity(sub: MineableSubType, size: MineableSize) -> u32 {
    base_starting_quantity(sub).saturating_mul(size_multiplier(size))
}

/// Milliseconds a plant needs before it can be harvested (5 and 30 minutes).
pub const fn growth_time_ms(plant: PlantableType) -> u64 {
    match plant {
        PlantableType::Wheat => 300_000,
        PlantableType::Tree => 1_800_000,
    }
}
