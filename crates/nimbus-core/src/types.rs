//! Domain types shared across nimbus crates.

use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Provider-assigned instance identifier.
pub type InstanceId = String;

// ── Instance ──────────────────────────────────────────────────────

/// Lifecycle state reported by the provider for one instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InstanceState {
    Pending,
    Running,
    Terminated,
    /// Any other provider state (`shutting-down`, `stopped`, ...).
    Other(String),
}

impl InstanceState {
    pub fn parse(raw: &str) -> Self {
        match raw.trim() {
            "pending" => InstanceState::Pending,
            "running" => InstanceState::Running,
            "terminated" => InstanceState::Terminated,
            other => InstanceState::Other(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            InstanceState::Pending => "pending",
            InstanceState::Running => "running",
            InstanceState::Terminated => "terminated",
            InstanceState::Other(s) => s,
        }
    }
}

impl fmt::Display for InstanceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One instance as seen by a single inventory poll.
///
/// Snapshots are never cached; every query re-fetches them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Instance {
    pub id: InstanceId,
    pub image_id: String,
    /// Public DNS name, used to reach the node from outside.
    pub public_addr: String,
    /// Private DNS name, used as the inter-node hostname.
    pub private_addr: String,
    pub state: InstanceState,
}

// ── Filters ───────────────────────────────────────────────────────

/// Set of image ids that identify members of this cluster.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ImageIdSet(BTreeSet<String>);

impl ImageIdSet {
    pub fn contains(&self, image_id: &str) -> bool {
        self.0.contains(image_id)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }
}

impl<S: Into<String>> FromIterator<S> for ImageIdSet {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Self(iter.into_iter().map(Into::into).collect())
    }
}

/// Which instance states an inventory query retains.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StateFilter {
    /// Readiness checks: only fully running instances count.
    Running,
    /// Topology resolution: the master may still be transitioning.
    RunningOrPending,
}

impl StateFilter {
    pub fn matches(&self, state: &InstanceState) -> bool {
        match self {
            StateFilter::Running => *state == InstanceState::Running,
            StateFilter::RunningOrPending => {
                matches!(state, InstanceState::Running | InstanceState::Pending)
            }
        }
    }
}

// ── Topology ──────────────────────────────────────────────────────

/// Master/worker split derived from one inventory snapshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClusterTopology {
    pub master: Instance,
    pub workers: Vec<Instance>,
}

impl ClusterTopology {
    /// Resolve a topology from a snapshot in provider listing order.
    ///
    /// The first `running`/`pending` instance is the master. Returns
    /// `None` when no such instance exists ("nothing to do").
    pub fn from_snapshot(instances: &[Instance]) -> Option<Self> {
        let mut live = instances
            .iter()
            .filter(|i| StateFilter::RunningOrPending.matches(&i.state))
            .cloned();
        let master = live.next()?;
        Some(Self {
            master,
            workers: live.collect(),
        })
    }

    /// Every node, master first, in listing order.
    pub fn nodes(&self) -> impl Iterator<Item = &Instance> {
        std::iter::once(&self.master).chain(self.workers.iter())
    }

    pub fn len(&self) -> usize {
        1 + self.workers.len()
    }

    pub fn is_empty(&self) -> bool {
        false
    }

    /// Host-list artifact: one worker private hostname per line.
    pub fn hosts_file_contents(&self) -> String {
        let mut out = String::new();
        for worker in &self.workers {
            out.push_str(&worker.private_addr);
            out.push('\n');
        }
        out
    }
}
