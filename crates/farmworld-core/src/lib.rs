//! Game clock, tick loop, sessions and gameplay workflows for the `FarmWorld`
//! server.
//!
//! This crate is transport- and database-agnostic. Clients reach it as
//! [`InboundEvent`]s; it answers through a [`Transport`] and persists
//! through a [`WorldStore`]. Everything else runs synchronously inside one
//! tick.
//!
//! # Modules
//!
//! - [`activity`] -- Per-player activity state machine driven by a
//!   transition table.
//! - [`broadcast`] -- [`Transport`] trait and all / others / one fan-out.
//! - [`clock`] -- Monotonic simulation clock with checkpoint cadence.
//! - [`config`] -- Configuration loading from `farmworld-config.yaml`.
//! - [`dispatch`] -- Routing of events to workflows and the error policy.
//! - [`locks`] -- Optimistic object locking over compare-and-swap.
//! - [`runner`] -- Fixed-rate async tick loop.
//! - [`scheduler`] -- Cancellable delayed events keyed by simulation time.
//! - [`session`] -- Registry of logged-in players.
//! - [`statistics`] -- Rewards, XP and growth tables.
//! - [`store`] -- [`WorldStore`] trait and the in-memory store.
//! - [`tick`] -- One tick: advance, dispatch, relay, sweep, checkpoint.
//! - [`workflows`] -- Login, mining, fishing and placement handlers.
//!
//! [`InboundEvent`]: dispatch::InboundEvent
//! [`Transport`]: broadcast::Transport
//! [`WorldStore`]: store::WorldStore

pub mod activity;
pub mod broadcast;
pub mod clock;
pub mod config;
pub mod dispatch;
pub mod locks;
pub mod runner;
pub mod scheduler;
pub mod session;
pub mod statistics;
pub mod store;
pub mod tick;
pub mod workflows;
