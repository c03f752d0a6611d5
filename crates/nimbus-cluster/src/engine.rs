//! Engine lifecycle on a running cluster.
//!
//! Each call resolves the current topology, connects to every node,
//! and lets the dispatcher pick a plugin by probing the master. With
//! no master the call does nothing and returns `None`.

use tracing::info;

use nimbus_core::{Cancel, ClusterTopology};
use nimbus_engine::{EngineContext, EngineDispatcher, EngineSetupPlugin};
use nimbus_provider::CloudProvider;
use nimbus_remote::{Connector, RemoteNode};

use crate::controller::ClusterController;
use crate::error::{ClusterError, ClusterResult};

/// Everything an engine call needs, resolved once per call.
struct EngineSession {
    master: RemoteNode,
    nodes: Vec<RemoteNode>,
    plugin: Box<dyn EngineSetupPlugin>,
}

impl EngineSession {
    fn node(&self, id: &str) -> ClusterResult<&RemoteNode> {
        self.nodes
            .iter()
            .find(|n| n.id() == id)
            .ok_or_else(|| ClusterError::NodeNotFound(id.to_string()))
    }
}

impl<P: CloudProvider, C: Connector> ClusterController<P, C> {
    pub fn engine_context(&self, cancel: Cancel) -> EngineContext {
        let config = self.config();
        EngineContext {
            cluster_name: config.cluster.name.clone(),
            region: config.provider.region.clone(),
            cache_dir: config.cache_dir(),
            readiness_interval: self.intervals().readiness,
            stop_grace: self.intervals().stop_grace,
            cancel,
        }
    }

    async fn engine_session(&self, action: &str, cancel: Cancel) -> ClusterResult<Option<EngineSession>> {
        let Some(topology) = self.resolve_topology().await? else {
            self.no_master(action);
            return Ok(None);
        };
        Ok(Some(self.session_for(&topology, cancel).await?))
    }

    async fn session_for(&self, topology: &ClusterTopology, cancel: Cancel) -> ClusterResult<EngineSession> {
        let (master, nodes) = self.connect_all(topology);
        let dispatcher = EngineDispatcher::new(self.engine_context(cancel));
        let plugin = dispatcher.select(&master).await?;
        Ok(EngineSession {
            master,
            nodes,
            plugin,
        })
    }

    /// Start the engine across all nodes. Returns the plugin's
    /// instructions for the user.
    pub async fn engine_start(&self, cancel: Cancel) -> ClusterResult<Option<String>> {
        let Some(session) = self.engine_session("engine start", cancel).await? else {
            return Ok(None);
        };
        let user = &self.config().cluster.user;
        info!(generation = %session.plugin.generation(), nodes = session.nodes.len(), "starting engine");
        let message = session
            .plugin
            .run(&session.nodes, &session.master, user)
            .await?;
        Ok(Some(message))
    }

    pub async fn engine_stop(&self, cancel: Cancel) -> ClusterResult<Option<()>> {
        let Some(session) = self.engine_session("engine stop", cancel).await? else {
            return Ok(None);
        };
        let user = &self.config().cluster.user;
        session
            .plugin
            .stop(&session.nodes, &session.master, user)
            .await?;
        Ok(Some(()))
    }

    /// Grow the engine onto `instance_id`, which must already be a
    /// running or pending cluster instance.
    pub async fn engine_add_node(&self, instance_id: &str, cancel: Cancel) -> ClusterResult<Option<()>> {
        let Some(session) = self.engine_session("engine add-node", cancel).await? else {
            return Ok(None);
        };
        let node = session.node(instance_id)?;
        let user = &self.config().cluster.user;
        session
            .plugin
            .on_add_node(node, &session.nodes, &session.master, user)
            .await?;
        info!(node = %instance_id, "node added to engine");
        Ok(Some(()))
    }

    /// Shrink the engine off `instance_id`. The instance itself keeps
    /// running.
    pub async fn engine_remove_node(&self, instance_id: &str, cancel: Cancel) -> ClusterResult<Option<()>> {
        let Some(session) = self.engine_session("engine remove-node", cancel).await? else {
            return Ok(None);
        };
        let node = session.node(instance_id)?;
        let user = &self.config().cluster.user;
        session
            .plugin
            .on_remove_node(node, &session.nodes, &session.master, user)
            .await?;
        info!(node = %instance_id, "node removed from engine");
        Ok(Some(()))
    }
}
