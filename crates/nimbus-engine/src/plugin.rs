//! The node-setup capability every engine generation provides.

use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;

use nimbus_core::Cancel;
use nimbus_remote::RemoteNode;

use crate::dispatch::EngineGeneration;
use crate::error::EngineResult;

/// Settings shared by all plugins for one cluster.
#[derive(Debug, Clone)]
pub struct EngineContext {
    /// Cluster name, half of the connector cache key.
    pub cluster_name: String,
    /// Provider region, the other half of the cache key.
    pub region: String,
    /// Local directory for downloaded connector files.
    pub cache_dir: PathBuf,
    /// Re-check interval while waiting for the readiness artifact.
    pub readiness_interval: Duration,
    /// Wait between the graceful stop and the forced kill.
    pub stop_grace: Duration,
    pub cancel: Cancel,
}

impl EngineContext {
    /// Local path of the cached connector file for this cluster.
    pub fn connector_cache_path(&self) -> PathBuf {
        self.cache_dir
            .join(format!("{}-{}.json", self.cluster_name, self.region))
    }
}

/// Configures the distributed engine across a node set.
///
/// Every configuration write regenerates the complete artifact from
/// the node set passed in; callers must serialize topology changes.
#[async_trait]
pub trait EngineSetupPlugin: Send + Sync {
    fn generation(&self) -> EngineGeneration;

    /// Initial bootstrap. Returns post-install instructions for the user.
    async fn run(&self, nodes: &[RemoteNode], master: &RemoteNode, user: &str)
    -> EngineResult<String>;

    /// `node` joined; `nodes` is the complete current node set.
    async fn on_add_node(
        &self,
        node: &RemoteNode,
        nodes: &[RemoteNode],
        master: &RemoteNode,
        user: &str,
    ) -> EngineResult<()>;

    /// `node` is leaving; `nodes` still contains it.
    async fn on_remove_node(
        &self,
        node: &RemoteNode,
        nodes: &[RemoteNode],
        master: &RemoteNode,
        user: &str,
    ) -> EngineResult<()>;

    /// Stop the controller and all engines. Safe to repeat.
    async fn stop(&self, nodes: &[RemoteNode], master: &RemoteNode, user: &str)
    -> EngineResult<()>;
}

/// `nodes` with `node` appended when it is not already present.
pub(crate) fn with_node(nodes: &[RemoteNode], node: &RemoteNode) -> Vec<RemoteNode> {
    let mut all = nodes.to_vec();
    if !all.iter().any(|n| n.id() == node.id()) {
        all.push(node.clone());
    }
    all
}

/// `nodes` minus `node`, compared by instance id.
pub(crate) fn without_node(nodes: &[RemoteNode], node: &RemoteNode) -> Vec<RemoteNode> {
    nodes
        .iter()
        .filter(|n| n.id() != node.id())
        .cloned()
        .collect()
}
