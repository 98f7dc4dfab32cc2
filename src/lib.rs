//! LuaBot – run Lua robot programs inside a real-time control host
//!
//! This crate provides:
//! - A lifecycle bridge that runs a robot script on a worker thread while the
//!   host's main loop owns the controlling thread
//! - Bounded shutdown: the robot is asked to end, then joined or abandoned
//! - A Lua engine whose state is only ever touched by its worker thread
//! - A host contract plus an in-process simulation host

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

/// Session orchestration: slot, worker runner and bridge state machine
pub mod bridge;
/// Configuration loading
pub mod config;
/// Lua engine and cross-thread engine handles
pub mod engine;
/// Host runtime contract and simulation host
pub mod host;

// Re-export key types for convenience
pub use bridge::{BridgeConfig, LifecycleBridge, SessionOutcome, Termination};
pub use config::LuabotConfig;
pub use host::{Diagnostic, Host, SimHost};

/// Current version of LuaBot
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
