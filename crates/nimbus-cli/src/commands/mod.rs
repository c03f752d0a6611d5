pub mod cluster;
pub mod engine;

use std::path::Path;

use anyhow::Context as _;
use tracing::debug;

use nimbus_cluster::ClusterController;
use nimbus_core::ClusterConfig;
use nimbus_provider::AwsCliProvider;
use nimbus_remote::SshConnector;

pub type Controller = ClusterController<AwsCliProvider, SshConnector>;

/// Loaded config plus a controller wired to the real backends.
pub struct Context {
    pub controller: Controller,
}

impl Context {
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let config = ClusterConfig::from_file(path)
            .with_context(|| format!("loading {}", path.display()))?;
        debug!(config = %path.display(), cluster = %config.cluster.name, "config loaded");

        let provider = AwsCliProvider::new(&config.provider);
        let connector = SshConnector::new(&config.cluster.key_location);
        let controller = ClusterController::new(config, provider, connector)?;
        Ok(Self { controller })
    }
}
