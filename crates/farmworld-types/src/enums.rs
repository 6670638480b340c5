//! Enumeration types shared between the server core and its clients.
//!
//! Every enum here crosses the wire as a fixed string. Clients send some of
//! them as free-form strings (e.g. the mineable type in `StartMining`), so
//! each enum also parses from its wire string via [`core::str::FromStr`].

use serde::{Deserialize, Serialize};

/// Error returned when a wire string names no known variant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownVariant {
    /// Name of the enum that failed to parse.
    pub kind: &'static str,
    /// The rejected input.
    pub value: String,
}

impl core::fmt::Display for UnknownVariant {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "unknown {} '{}'", self.kind, self.value)
    }
}

impl std::error::Error for UnknownVariant {}

/// Generates a fieldless enum with a fixed wire string per variant.
macro_rules! wire_enum {
    (
        $(#[$meta:meta])*
        $name:ident {
            $(
                $(#[$vmeta:meta])*
                $variant:ident => $wire:literal
            ),+ $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        pub enum $name {
            $(
                $(#[$vmeta])*
                #[serde(rename = $wire)]
                $variant,
            )+
        }

        impl $name {
            /// All variants in declaration order.
            pub const ALL: &'static [Self] = &[$(Self::$variant),+];

            /// The string used for this variant on the wire and in the store.
            pub const fn as_str(self) -> &'static str {
                match self {
                    $(Self::$variant => $wire,)+
                }
            }
        }

        impl core::fmt::Display for $name {
            fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl core::str::FromStr for $name {
            type Err = UnknownVariant;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($wire => Ok(Self::$variant),)+
                    _ => Err(UnknownVariant {
                        kind: stringify!($name),
                        value: s.to_owned(),
                    }),
                }
            }
        }
    };
}

// ---------------------------------------------------------------------------
// World objects
// ---------------------------------------------------------------------------

wire_enum! {
    /// Persisted world-object kind; also the prefix of store-assigned ids.
    ObjectKind {
        /// A resource node that can be mined.
        Mineable => "MINEABLE",
        /// A crop or sapling that grows over time.
        Plantable => "PLANTABLE",
    }
}

wire_enum! {
    /// Broad category of a mineable object.
    MineableType {
        /// Rock outcrop.
        Rock => "ROCK",
        /// Tree that can be chopped.
        Tree => "TREE",
    }
}

wire_enum! {
    /// Material of a mineable object; determines its reward item.
    MineableSubType {
        /// Stone rock, yields ore.
        Stone => "STONE",
        /// Iron rock, yields ore.
        Iron => "IRON",
        /// Oak tree, yields wood.
        Oak => "OAK",
    }
}

wire_enum! {
    /// Size class of a mineable object; scales quantity and XP.
    MineableSize {
        /// Multiplier 1.
        Small => "SMALL",
        /// Multiplier 2.
        Medium => "MEDIUM",
        /// Multiplier 4.
        Large => "LARGE",
    }
}

wire_enum! {
    /// What a plantable object grows into.
    PlantableType {
        /// Wheat crop.
        Wheat => "WHEAT",
        /// Tree sapling.
        Tree => "TREE",
    }
}

// ---------------------------------------------------------------------------
// Items and zones
// ---------------------------------------------------------------------------

wire_enum! {
    /// Unique name of an inventory item.
    ItemName {
        /// Raw ore from rocks.
        Ore => "Ore",
        /// Rare geode from rocks.
        Geode => "Geode",
        /// Lumber from trees.
        Wood => "Wood",
        /// Fish caught while fishing.
        Herring => "Herring",
    }
}

wire_enum! {
    /// Named fishing zone.
    Zone {
        /// The area new players spawn into.
        StartingArea => "StartingArea",
    }
}

// ---------------------------------------------------------------------------
// Transport
// ---------------------------------------------------------------------------

wire_enum! {
    /// Delivery guarantee requested for an outbound message.
    Reliability {
        /// Delivered once, in send order relative to other ordered messages.
        ReliableOrdered => "ReliableOrdered",
        /// Delivered once; stale messages are discarded in favor of newer ones.
        ReliableSequenced => "ReliableSequenced",
        /// Delivered once, in any order.
        ReliableUnordered => "ReliableUnordered",
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn parses_wire_strings() {
        assert_eq!("IRON".parse::<MineableSubType>().unwrap(), MineableSubType::Iron);
        assert_eq!("ROCK".parse::<MineableType>().unwrap(), MineableType::Rock);
        assert_eq!("StartingArea".parse::<Zone>().unwrap(), Zone::StartingArea);
    }

    #[test]
    fn rejects_unknown_strings() {
        let err = "iron".parse::<MineableSubType>().unwrap_err();
        assert_eq!(err.kind, "MineableSubType");
        assert_eq!(err.to_string(), "unknown MineableSubType 'iron'");
    }

    #[test]
    fn serde_matches_as_str() {
        for size in MineableSize::ALL {
            let json = serde_json::to_string(size).unwrap();
            assert_eq!(json, format!("\"{}\"", size.as_str()));
        }
        let item: ItemName = serde_json::from_str("\"Herring\"").unwrap();
        assert_eq!(item, ItemName::Herring);
    }
}
