//! nimbus-cluster: cluster lifecycle orchestration.
//!
//! `ClusterController` launches instances, polls the provider until the
//! running count reaches the configured size, resolves the master by
//! listing position, bootstraps it over the remote channel, and hands
//! the node set to the engine dispatcher.
//!
//! # Flow
//!
//! ```text
//! start:  launch → wait_for_quorum → resolve_topology → bootstrap → engine_start?
//! stop:   confirm("yes") → list → terminate running → grace → list
//! engine: resolve_topology → connect → probe version → plugin op
//! ```

pub mod bootstrap;
pub mod controller;
pub mod engine;
pub mod error;
pub mod launch;
pub mod state;

pub use controller::{ClusterController, StartReport, StopOutcome, confirmed};
pub use error::{ClusterError, ClusterResult};
pub use launch::launch_plan;
pub use state::ClusterState;
