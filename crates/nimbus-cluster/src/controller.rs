//! Cluster controller: drives the provisioning state machine.
//!
//! A controller is built per invocation from the config, a provider,
//! and a connector. Every query re-lists instances from the provider;
//! the only state kept between calls is the lifecycle phase.

use std::fmt;

use tracing::{debug, info, warn};

use nimbus_core::config::Intervals;
use nimbus_core::{Cancel, ClusterConfig, ClusterTopology, ImageIdSet, Instance, StateFilter, pause};
use nimbus_provider::{CloudProvider, InventoryClient, RawRecord, Reservation};
use nimbus_remote::{Connector, NodeRole, RemoteNode};

use crate::bootstrap::{bootstrap_master, write_hosts_file};
use crate::error::{ClusterError, ClusterResult};
use crate::launch::launch_plan;
use crate::state::ClusterState;

/// Summary printed once `start` completes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StartReport {
    pub master_addr: String,
    pub cluster_user: String,
    /// Post-install instructions from the engine plugin, when one ran.
    pub engine: Option<String>,
}

impl StartReport {
    pub fn login_hint(&self) -> String {
        format!("ssh {}@{}", self.cluster_user, self.master_addr)
    }
}

impl fmt::Display for StartReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "The cluster has been started. The master node is {}.", self.master_addr)?;
        writeln!(f, "Log in as {} with:", self.cluster_user)?;
        writeln!(f)?;
        writeln!(f, "    $ {}", self.login_hint())?;
        if let Some(engine) = &self.engine {
            writeln!(f)?;
            write!(f, "{engine}")?;
        }
        Ok(())
    }
}

/// How a stop request ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StopOutcome {
    /// Confirmation was not `yes`; nothing was touched.
    Aborted,
    Terminated {
        /// Instance ids termination was requested for, possibly none.
        ids: Vec<String>,
        /// Raw listing before termination.
        before: Vec<RawRecord>,
        /// Raw listing after the grace period.
        after: Vec<RawRecord>,
    },
}

/// Only the literal answer `yes` confirms a destructive stop.
pub fn confirmed(answer: &str) -> bool {
    answer.trim_end_matches(['\r', '\n']) == "yes"
}

pub struct ClusterController<P, C> {
    config: ClusterConfig,
    intervals: Intervals,
    images: ImageIdSet,
    inventory: InventoryClient<P>,
    connector: C,
    state: ClusterState,
}

impl<P: CloudProvider, C: Connector> ClusterController<P, C> {
    pub fn new(config: ClusterConfig, provider: P, connector: C) -> ClusterResult<Self> {
        let intervals = config.intervals()?;
        let images = config.image_ids();
        Ok(Self {
            config,
            intervals,
            images,
            inventory: InventoryClient::new(provider),
            connector,
            state: ClusterState::NotStarted,
        })
    }

    pub fn config(&self) -> &ClusterConfig {
        &self.config
    }

    pub fn intervals(&self) -> Intervals {
        self.intervals
    }

    pub fn inventory(&self) -> &InventoryClient<P> {
        &self.inventory
    }

    pub fn connector(&self) -> &C {
        &self.connector
    }

    pub fn state(&self) -> ClusterState {
        self.state
    }

    fn transition(&mut self, next: ClusterState) {
        info!(cluster = %self.config.cluster.name, from = %self.state, to = %next, "cluster state");
        self.state = next;
    }

    /// Full provisioning run: launch, wait for quorum, bootstrap, and
    /// start the engine when one is configured.
    pub async fn start(&mut self, cancel: Cancel) -> ClusterResult<StartReport> {
        info!(cluster = %self.config.cluster.name, size = self.config.cluster.size, "starting cluster");
        self.launch().await?;
        self.wait_for_quorum(cancel.clone()).await?;

        let topology = self.resolve_topology().await?.ok_or(ClusterError::NoMaster)?;
        info!(master = %topology.master.public_addr, workers = topology.workers.len(), "master node resolved");
        self.transition(ClusterState::TopologyResolved);

        self.bootstrap(&topology).await?;

        let engine = if self.config.engine.is_some() {
            self.engine_start(cancel).await?
        } else {
            None
        };

        self.transition(ClusterState::Running);
        Ok(StartReport {
            master_addr: topology.master.public_addr.clone(),
            cluster_user: self.config.cluster.user.clone(),
            engine,
        })
    }

    /// Issue every launch request in order. The first failure aborts
    /// the remaining requests; already launched instances are kept.
    pub async fn launch(&mut self) -> ClusterResult<Vec<Reservation>> {
        self.transition(ClusterState::Launching);
        let mut reservations = Vec::new();
        for request in launch_plan(&self.config.cluster) {
            reservations.push(self.inventory.launch(&request).await?);
        }
        Ok(reservations)
    }

    /// Running instances of the cluster's images.
    pub async fn running_instances(&self) -> ClusterResult<Vec<Instance>> {
        Ok(self
            .inventory
            .list_instances(&self.images, StateFilter::Running)
            .await?)
    }

    /// True when the running matching count equals the desired size exactly.
    pub async fn is_cluster_up(&self) -> ClusterResult<bool> {
        let running = self.running_instances().await?.len();
        let desired = self.config.cluster.size as usize;
        debug!(running, desired, "quorum check");
        Ok(running == desired)
    }

    /// Poll until the cluster is up. There is no timeout; only `cancel`
    /// ends the wait early.
    pub async fn wait_for_quorum(&mut self, mut cancel: Cancel) -> ClusterResult<()> {
        self.transition(ClusterState::WaitingForQuorum);
        while !self.is_cluster_up().await? {
            pause(self.intervals.quorum, &mut cancel).await?;
        }
        self.transition(ClusterState::QuorumReached);
        Ok(())
    }

    /// Master/worker split from a `running|pending` listing, or `None`
    /// when nothing is up.
    pub async fn resolve_topology(&self) -> ClusterResult<Option<ClusterTopology>> {
        let live = self
            .inventory
            .list_instances(&self.images, StateFilter::RunningOrPending)
            .await?;
        Ok(ClusterTopology::from_snapshot(&live))
    }

    /// Public address of the current master.
    pub async fn master_address(&self) -> ClusterResult<Option<String>> {
        Ok(self
            .resolve_topology()
            .await?
            .map(|t| t.master.public_addr))
    }

    /// Shell onto one node as the configured login user.
    pub fn connect(&self, instance: &Instance, role: NodeRole) -> RemoteNode {
        RemoteNode::connect(&self.connector, instance, role, &self.config.cluster.login_user)
    }

    /// Master handle plus every node (master first).
    pub fn connect_all(&self, topology: &ClusterTopology) -> (RemoteNode, Vec<RemoteNode>) {
        let master = self.connect(&topology.master, NodeRole::Master);
        let mut nodes = vec![master.clone()];
        nodes.extend(
            topology
                .workers
                .iter()
                .map(|w| self.connect(w, NodeRole::Worker)),
        );
        (master, nodes)
    }

    /// Write the host list and provision the master.
    pub async fn bootstrap(&mut self, topology: &ClusterTopology) -> ClusterResult<()> {
        self.transition(ClusterState::Bootstrapping);
        let hosts_file = write_hosts_file(&self.config, topology)?;
        let master = self.connect(&topology.master, NodeRole::Master);
        bootstrap_master(&self.config, &master, &hosts_file).await
    }

    /// Raw describe rows, every state and image included.
    pub async fn list(&self) -> ClusterResult<Vec<RawRecord>> {
        Ok(self.inventory.describe().await?)
    }

    /// Terminate every running cluster instance once `answer` confirms.
    pub async fn stop_cluster(&mut self, answer: &str, cancel: Cancel) -> ClusterResult<StopOutcome> {
        if !confirmed(answer) {
            info!("stop not confirmed, leaving instances running");
            return Ok(StopOutcome::Aborted);
        }
        self.terminate_running(false, cancel).await
    }

    /// Terminate every running cluster instance except the master. No
    /// confirmation is asked.
    pub async fn stop_workers(&mut self, cancel: Cancel) -> ClusterResult<StopOutcome> {
        self.terminate_running(true, cancel).await
    }

    async fn terminate_running(&mut self, keep_master: bool, mut cancel: Cancel) -> ClusterResult<StopOutcome> {
        self.transition(ClusterState::Stopping);
        let before = self.list().await?;

        let running = self.running_instances().await?;
        let skip = usize::from(keep_master);
        let ids: Vec<String> = running.into_iter().skip(skip).map(|i| i.id).collect();

        if ids.is_empty() {
            info!("no running instances to terminate");
        } else {
            self.inventory.terminate_instances(&ids).await?;
            info!(count = ids.len(), grace = ?self.intervals.termination_grace, "waiting for shutdown");
            pause(self.intervals.termination_grace, &mut cancel).await?;
        }

        let after = self.list().await?;
        if keep_master {
            self.transition(ClusterState::Running);
        } else {
            self.transition(ClusterState::Stopped);
        }
        Ok(StopOutcome::Terminated { ids, before, after })
    }

    /// Log and report that a command found nothing to act on.
    pub(crate) fn no_master(&self, action: &str) {
        warn!(cluster = %self.config.cluster.name, %action, "no master node found");
    }
}
