//! Type-safe identifier wrappers.
//!
//! World objects are keyed by store-assigned string ids (`MINEABLE12`), while
//! transport connections are keyed by process-local integers. Keeping both
//! behind newtypes prevents a connection handle from being passed where an
//! object id is expected.

use serde::{Deserialize, Serialize};

/// Generates a newtype wrapper around a `u64` counter value.
macro_rules! define_counter_id {
    (
        $(#[$meta:meta])*
        $name:ident
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        pub struct $name(pub u64);

        impl core::fmt::Display for $name {
            fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<u64> for $name {
            fn from(id: u64) -> Self {
                Self(id)
            }
        }

        impl From<$name> for u64 {
            fn from(id: $name) -> Self {
                id.0
            }
        }
    };
}

define_counter_id! {
    /// Opaque handle for one transport connection.
    ///
    /// Allocated by the transport when a client connects and never reused
    /// for the lifetime of the process.
    ConnectionId
}

/// Identifier of a persisted world object.
///
/// Assigned by the store on first write from the object kind prefix and a
/// global counter, e.g. `MINEABLE3` or `PLANTABLE17`.
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ObjectId(pub String);

impl ObjectId {
    /// Wrap an existing id string.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Borrow the id as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether the id is the empty string (never valid on the wire).
    pub const fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl core::fmt::Display for ObjectId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ObjectId {
    fn from(id: &str) -> Self {
        Self(id.to_owned())
    }
}

impl From<String> for ObjectId {
    fn from(id: String) -> Self {
        Self(id)
    }
}
