//! Generation A: FURL-based engine (0.10.x).
//!
//! A single `ipcluster ssh` controller reads a cluster file mapping each
//! hostname to its engine count and starts the engines itself. Added
//! nodes start their own engines against the controller's FURL file.

use async_trait::async_trait;
use tracing::info;

use nimbus_remote::{ExecOptions, RemoteNode};

use crate::dispatch::EngineGeneration;
use crate::error::EngineResult;
use crate::plugin::{EngineContext, EngineSetupPlugin, with_node, without_node};
use crate::stop::{StopPlan, stop_engine};

pub const CLUSTER_FILE: &str = "/etc/clusterfile.py";

const STOP_PLAN: StopPlan = StopPlan {
    graceful: "pkill -INT -f 'ipcluster ssh'",
    controller_pattern: "ipcontroller",
    engine_pattern: "ipengine",
};

pub struct FurlEngine {
    ctx: EngineContext,
}

impl FurlEngine {
    pub fn new(ctx: EngineContext) -> Self {
        Self { ctx }
    }

    /// Rewrite the cluster file on the master from `nodes`.
    async fn write_cluster_file(&self, master: &RemoteNode, nodes: &[RemoteNode]) -> EngineResult<()> {
        let mut engines = Vec::with_capacity(nodes.len());
        for node in nodes {
            engines.push((node.hostname().to_string(), node.num_processors().await?));
        }

        let mut file = master.remote_file(CLUSTER_FILE, Some(0o644));
        file.write_str(&render_cluster_file(&engines));
        file.close().await?;
        info!(path = CLUSTER_FILE, hosts = engines.len(), "wrote cluster file");
        Ok(())
    }
}

#[async_trait]
impl EngineSetupPlugin for FurlEngine {
    fn generation(&self) -> EngineGeneration {
        EngineGeneration::Furl
    }

    async fn run(&self, nodes: &[RemoteNode], master: &RemoteNode, user: &str) -> EngineResult<String> {
        self.write_cluster_file(master, nodes).await?;

        info!("starting ipcluster");
        master
            .execute(&as_user_detached(
                user,
                &format!("ipcluster ssh --clusterfile {CLUSTER_FILE}"),
            ))
            .await?;

        let message = started_message(&self.ctx.cluster_name, user);
        info!("{message}");
        Ok(message)
    }

    async fn on_add_node(
        &self,
        node: &RemoteNode,
        nodes: &[RemoteNode],
        master: &RemoteNode,
        user: &str,
    ) -> EngineResult<()> {
        info!(node = %node.id(), "adding node to ipcluster");
        self.write_cluster_file(master, &with_node(nodes, node)).await?;

        let home = node.home_dir(user).await?;
        let furl = format!("{home}/.ipython/security/ipcontroller-engine.furl");
        let engines = node.num_processors().await?;
        for _ in 0..engines {
            node.execute(&as_user_detached(user, &format!("ipengine --furl-file {furl}")))
                .await?;
        }
        info!(node = %node.id(), engines, "engines started");
        Ok(())
    }

    async fn on_remove_node(
        &self,
        node: &RemoteNode,
        nodes: &[RemoteNode],
        master: &RemoteNode,
        _user: &str,
    ) -> EngineResult<()> {
        info!(node = %node.id(), "removing node from ipcluster");
        self.write_cluster_file(master, &without_node(nodes, node)).await?;
        node.execute_with("pkill ipengine", ExecOptions::default().ignore_exit_status())
            .await?;
        Ok(())
    }

    async fn stop(&self, nodes: &[RemoteNode], master: &RemoteNode, user: &str) -> EngineResult<()> {
        stop_engine(&STOP_PLAN, &self.ctx, nodes, master, user).await
    }
}

/// Run `command` as `user` inside a detached screen session so it
/// outlives the connection that started it.
fn as_user_detached(user: &str, command: &str) -> String {
    format!("su - {user} -c 'screen -d -m {command}'")
}

/// Two-line cluster file: FURL flag plus a hostname → engine-count map.
pub fn render_cluster_file(engines: &[(String, u32)]) -> String {
    let entries: Vec<String> = engines
        .iter()
        .map(|(host, count)| format!("{}: {count}", py_str(host)))
        .collect();
    format!("send_furl = True\nengines = {{{}}}\n", entries.join(", "))
}

/// Python single-quoted string literal.
fn py_str(s: &str) -> String {
    format!("'{}'", s.replace('\\', "\\\\").replace('\'', "\\'"))
}

fn started_message(cluster: &str, user: &str) -> String {
    format!(
        "\
The parallel engine (0.10) is running on {cluster} for user '{user}'.

Log in to the master node as '{user}':

    $ nimbus sshmaster -u {user}

then start IPython and connect a client:

    $ ipython
    [~]> from IPython.kernel import client
    [~]> mec = client.MultiEngineClient()
    [~]> mec.get_ids()
"
    )
}
