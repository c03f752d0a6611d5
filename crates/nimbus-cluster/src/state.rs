//! Cluster lifecycle phases.

use std::fmt;

use serde::Serialize;

/// Where a controller is in the provisioning lifecycle.
///
/// ```text
/// NotStarted → Launching → WaitingForQuorum → QuorumReached
///            → TopologyResolved → Bootstrapping → Running
/// Running → Stopping → Stopped
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ClusterState {
    NotStarted,
    Launching,
    WaitingForQuorum,
    QuorumReached,
    TopologyResolved,
    Bootstrapping,
    Running,
    Stopping,
    Stopped,
}

impl ClusterState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ClusterState::NotStarted => "not_started",
            ClusterState::Launching => "launching",
            ClusterState::WaitingForQuorum => "waiting_for_quorum",
            ClusterState::QuorumReached => "quorum_reached",
            ClusterState::TopologyResolved => "topology_resolved",
            ClusterState::Bootstrapping => "bootstrapping",
            ClusterState::Running => "running",
            ClusterState::Stopping => "stopping",
            ClusterState::Stopped => "stopped",
        }
    }
}

impl fmt::Display for ClusterState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
