//! Master-node bootstrap: host list, cluster key, helper scripts.
//!
//! Steps run in order and stop at the first failure. Nothing already
//! transferred is undone.

use std::path::{Path, PathBuf};

use tracing::info;

use nimbus_core::{ClusterConfig, ClusterTopology};
use nimbus_remote::RemoteNode;

use crate::error::ClusterResult;

/// Remote path of the cluster key, relative to the cluster user's home.
pub const REMOTE_KEY_PATH: &str = ".ssh/id_rsa";

/// Write the worker host list into the local work directory.
pub fn write_hosts_file(config: &ClusterConfig, topology: &ClusterTopology) -> ClusterResult<PathBuf> {
    let work_dir = config.work_dir();
    std::fs::create_dir_all(&work_dir)?;
    let path = work_dir.join(&config.bootstrap.hosts_file);
    std::fs::write(&path, topology.hosts_file_contents())?;
    info!(path = %path.display(), workers = topology.workers.len(), "wrote host list");
    Ok(path)
}

/// Provision the master from a freshly written host list.
pub async fn bootstrap_master(
    config: &ClusterConfig,
    master: &RemoteNode,
    hosts_file: &Path,
) -> ClusterResult<()> {
    let cluster = &config.cluster;
    let bootstrap = &config.bootstrap;

    info!(user = %cluster.user, "uploading cluster key");
    let as_user = master.as_user(&cluster.user);
    as_user
        .shell()
        .put_file(&cluster.key_location, REMOTE_KEY_PATH)
        .await?;
    as_user
        .execute(&format!("chmod 600 {REMOTE_KEY_PATH}"))
        .await?;

    info!(dest = %bootstrap.hosts_dest, "uploading host list");
    master.shell().put_file(hosts_file, &bootstrap.hosts_dest).await?;

    for script in &bootstrap.helper_scripts {
        info!(script = %script.display(), dest = %bootstrap.scripts_dest, "uploading helper script");
        master.shell().put_file(script, &bootstrap.scripts_dest).await?;
    }

    info!(command = %bootstrap.setup_command, "running host setup");
    master.execute(&bootstrap.setup_command).await?;
    Ok(())
}
