//! Dragonfly persistence for the `FarmWorld` server.
//!
//! `Dragonfly` is the only durable store. It holds every placed world
//! object with its lock fields and CAS version, every player's inventory
//! and experience, and the last simulation clock checkpoint.
//!
//! # Modules
//!
//! - [`dragonfly`] -- `Dragonfly` (Redis-compatible) operations
//! - [`error`] -- Shared error types

pub mod dragonfly;
pub mod error;

// Re-export primary types for convenience.
pub use dragonfly::{DragonflyPool, SwapResult};
pub use error::DbError;
