//! Generation B: ZeroMQ engine (0.11+).
//!
//! The controller and engines are launched independently through the
//! grid engine queue. Configuration lives in four profile files on the
//! master; readiness is signalled by the client connector JSON.

use async_trait::async_trait;
use tracing::{debug, info};

use nimbus_core::pause;
use nimbus_remote::{ExecOptions, RemoteNode};

use crate::dispatch::EngineGeneration;
use crate::error::EngineResult;
use crate::plugin::{EngineContext, EngineSetupPlugin};
use crate::stop::{StopPlan, stop_engine};

const STOP_PLAN: StopPlan = StopPlan {
    graceful: "ipcluster stop",
    controller_pattern: "ipcontrollerapp.py",
    engine_pattern: "ipengineapp.py",
};

pub struct ZmqEngine {
    ctx: EngineContext,
}

/// One generated profile file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProfileFile {
    pub name: &'static str,
    pub contents: String,
}

impl ZmqEngine {
    pub fn new(ctx: EngineContext) -> Self {
        Self { ctx }
    }

    async fn profile_dir(&self, master: &RemoteNode, user: &str) -> EngineResult<String> {
        let home = master.home_dir(user).await?;
        Ok(format!("{home}/.ipython/profile_default"))
    }

    /// Regenerate every profile file on the master as the engine user.
    async fn write_config(&self, master: &RemoteNode, user: &str) -> EngineResult<String> {
        let profile_dir = self.profile_dir(master, user).await?;
        let master_user = master.as_user(user);

        info!(%profile_dir, "writing engine profile");
        master_user
            .execute_with("ipython profile create", ExecOptions::default().source_profile())
            .await?;
        for file in render_profile(master.hostname(), master.public_addr()) {
            let mut f = master_user.remote_file(&format!("{profile_dir}/{}", file.name), None);
            f.write_str(&file.contents);
            f.close().await?;
        }
        Ok(profile_dir)
    }

    /// Start the controller plus `engines` engines and wait for the
    /// connector file. Returns the local cached copy's path.
    async fn start_cluster(
        &self,
        master: &RemoteNode,
        user: &str,
        engines: u32,
        profile_dir: &str,
    ) -> EngineResult<std::path::PathBuf> {
        let master_user = master.as_user(user);
        info!(engines, "starting engine cluster");

        // Stale connector files would satisfy the readiness check early.
        master_user
            .execute(&format!("rm -f {profile_dir}/security/*.json"))
            .await?;
        master_user
            .execute_with(
                &format!("ipcluster start --n={engines} --delay=5 --daemonize"),
                ExecOptions::default().source_profile(),
            )
            .await?;

        let connector = format!("{profile_dir}/security/ipcontroller-client.json");
        info!(path = %connector, "waiting for connector file");
        let mut cancel = self.ctx.cancel.clone();
        while !master_user.is_file(&connector).await? {
            debug!("connector file not present yet");
            pause(self.ctx.readiness_interval, &mut cancel).await?;
        }

        if !self.ctx.cache_dir.is_dir() {
            info!(dir = %self.ctx.cache_dir.display(), "creating connector cache directory");
            std::fs::create_dir_all(&self.ctx.cache_dir)?;
        }
        let local = self.ctx.connector_cache_path();
        info!(path = %local.display(), "saving connector file");
        master_user.shell().get_file(&connector, &local).await?;
        Ok(local)
    }
}

#[async_trait]
impl EngineSetupPlugin for ZmqEngine {
    fn generation(&self) -> EngineGeneration {
        EngineGeneration::Zmq
    }

    async fn run(&self, nodes: &[RemoteNode], master: &RemoteNode, user: &str) -> EngineResult<String> {
        let mut slots = 0u32;
        for node in nodes {
            slots += node.num_processors().await?;
        }
        // One slot is left for the controller.
        let engines = slots.saturating_sub(1).max(1);

        let profile_dir = self.write_config(master, user).await?;
        let connector = self
            .start_cluster(master, user, engines, &profile_dir)
            .await?;

        let message = started_message(&self.ctx.cluster_name, user, &connector.display().to_string());
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
        // The profile only names the master, so the node set does not
        // change what is written.
        debug!(nodes = nodes.len() + 1, "regenerating profile");
        self.write_config(master, user).await?;

        let engines = node.num_processors().await?;
        info!(node = %node.id(), engines, "adding engines");
        node.as_user(user)
            .execute_with(
                &format!("ipcluster engines --n={engines} --daemonize"),
                ExecOptions::default().source_profile(),
            )
            .await?;
        Ok(())
    }

    async fn on_remove_node(
        &self,
        node: &RemoteNode,
        nodes: &[RemoteNode],
        master: &RemoteNode,
        user: &str,
    ) -> EngineResult<()> {
        debug!(nodes = nodes.len().saturating_sub(1), "regenerating profile");
        self.write_config(master, user).await?;
        // Engines on a detached node drop out of the hub on their own.
        info!(node = %node.id(), "node removed from engine cluster");
        Ok(())
    }

    async fn stop(&self, nodes: &[RemoteNode], master: &RemoteNode, user: &str) -> EngineResult<()> {
        stop_engine(&STOP_PLAN, &self.ctx, nodes, master, user).await
    }
}

/// The four profile files: controller, cluster launcher, engine, session.
pub fn render_profile(master_private: &str, master_public: &str) -> Vec<ProfileFile> {
    let file = |name, lines: &[String]| ProfileFile {
        name,
        contents: format!("c = get_config()\n{}\n", lines.join("\n")),
    };
    vec![
        file(
            "ipcontroller_config.py",
            &[
                format!("c.HubFactory.ip='{master_private}'"),
                format!("c.IPControllerApp.ssh_server='{master_public}'"),
            ],
        ),
        file(
            "ipcluster_config.py",
            &[
                "c.IPClusterStart.controller_launcher_class='SGEControllerLauncher'".to_string(),
                format!("c.SGEControllerLauncher.queue='all.q@{master_private}'"),
                "c.IPClusterEngines.engine_launcher_class='SGEEngineSetLauncher'".to_string(),
            ],
        ),
        file(
            "ipengine_config.py",
            &[
                "c.EngineFactory.timeout = 10".to_string(),
                "c.IPEngineApp.wait_for_url_file = 30".to_string(),
            ],
        ),
        file(
            "ipython_config.py",
            &[
                "c.Session.packer='pickle'".to_string(),
                "c.EngineFactory.timeout = 10".to_string(),
                "c.IPEngineApp.wait_for_url_file = 30".to_string(),
            ],
        ),
    ]
}

fn started_message(cluster: &str, user: &str, connector: &str) -> String {
    format!(
        "\
The parallel engine (0.11+) is running on {cluster} for user '{user}'.

Log in to the master node as '{user}' and create a client:

    $ nimbus sshmaster -u {user}
    $ ipython
    [~]> from IPython.parallel import Client
    [~]> rc = Client(packer='pickle')
    [~]> view = rc[:]

Or connect from this machine with the cached connector file:

    {connector}
"
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn profile_has_four_files_each_starting_with_get_config() {
        let files = render_profile("ip-10-0-0-1.internal", "ec2-1.example");
        let names: Vec<_> = files.iter().map(|f| f.name).collect();
        assert_eq!(
            names,
            vec![
                "ipcontroller_config.py",
                "ipcluster_config.py",
                "ipengine_config.py",
                "ipython_config.py"
            ]
        );
        for f in &files {
            let mut lines = f.contents.lines();
            assert_eq!(lines.next(), Some("c = get_config()"));
            assert!(lines.all(|l| l.starts_with("c.")), "{}", f.contents);
        }
    }

    #[test]
    fn controller_config_points_at_master() {
        let files = render_profile("ip-10-0-0-1.internal", "ec2-1.example");
        assert_eq!(
            files[0].contents,
            "c = get_config()\nc.HubFactory.ip='ip-10-0-0-1.internal'\nc.IPControllerApp.ssh_server='ec2-1.example'\n"
        );
    }
}
