//! nimbus-core: shared types for the nimbus cluster orchestrator.
//!
//! Holds the `nimbus.toml` configuration model, the typed instance
//! snapshot returned by inventory queries, the derived cluster topology,
//! and the cancellable pause used by every polling loop.

pub mod config;
pub mod error;
pub mod poll;
pub mod types;

pub use config::ClusterConfig;
pub use error::{ConfigError, CoreError, CoreResult};
pub use poll::{Cancel, never, pause};
pub use types::*;
