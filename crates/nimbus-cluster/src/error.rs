//! Cluster lifecycle error types.

use thiserror::Error;

use nimbus_core::{ConfigError, CoreError};
use nimbus_engine::EngineError;
use nimbus_provider::ProviderError;
use nimbus_remote::RemoteError;

/// Result type alias for cluster lifecycle operations.
pub type ClusterResult<T> = Result<T, ClusterError>;

#[derive(Debug, Error)]
pub enum ClusterError {
    #[error("config error: {0}")]
    Config(#[from] ConfigError),

    #[error("provider error: {0}")]
    Provider(#[from] ProviderError),

    #[error("remote error: {0}")]
    Remote(#[from] RemoteError),

    #[error("engine error: {0}")]
    Engine(#[from] EngineError),

    #[error("local io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("operation cancelled")]
    Cancelled,

    #[error("no running or pending instance found after quorum")]
    NoMaster,

    #[error("instance {0} is not part of the cluster")]
    NodeNotFound(String),
}

impl From<CoreError> for ClusterError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::Cancelled => ClusterError::Cancelled,
        }
    }
}
