//! Error types for the server binary.
//!
//! [`ServerError`] is the top-level error type that wraps every failure
//! mode during startup and while the tick loop runs.

/// Top-level error for the server binary.
///
/// Each variant wraps a specific subsystem error, providing a single
/// error type that `main` can propagate with `?`.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    /// Configuration loading failed.
    #[error("config error: {source}")]
    Config {
        /// The underlying config error.
        #[from]
        source: farmworld_core::config::ConfigError,
    },

    /// Connecting to or reading from `Dragonfly` failed.
    #[error("database error: {source}")]
    Db {
        /// The underlying data layer error.
        #[from]
        source: farmworld_db::DbError,
    },

    /// Startup lock recovery failed.
    #[error("store error: {source}")]
    Store {
        /// The underlying store error.
        #[from]
        source: farmworld_core::store::StoreError,
    },

    /// Server state could not be assembled.
    #[error("tick error: {source}")]
    Tick {
        /// The underlying tick error.
        #[from]
        source: farmworld_core::tick::TickError,
    },

    /// The tick loop failed.
    #[error("runner error: {source}")]
    Runner {
        /// The underlying runner error.
        #[from]
        source: farmworld_core::runner::RunnerError,
    },

    /// The `WebSocket` listener could not start.
    #[error("listener error: {message}")]
    Listener {
        /// Description of the failure.
        message: String,
    },
}
