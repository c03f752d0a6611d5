//! The provider operations the orchestrator depends on.

use async_trait::async_trait;

use nimbus_core::Instance;

use crate::error::ProviderResult;
use crate::record::RawRecord;

/// A single launch call: `min_count..=max_count` instances of one image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchRequest {
    pub image_id: String,
    pub min_count: u32,
    pub max_count: u32,
    pub key_name: String,
}

/// What the provider returns for one launch call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reservation {
    pub id: String,
    pub instances: Vec<Instance>,
}

/// Cloud instance API.
///
/// Credentials are opaque to nimbus; implementations pass them through.
#[async_trait]
pub trait CloudProvider: Send + Sync {
    /// Request instances. Not retried by callers.
    async fn launch_instances(&self, request: &LaunchRequest) -> ProviderResult<Reservation>;

    /// Describe every instance visible to the account, as tagged rows.
    async fn describe_instances(&self) -> ProviderResult<Vec<RawRecord>>;

    /// Request termination. Returns before the state transition completes.
    async fn terminate_instances(&self, ids: &[String]) -> ProviderResult<()>;
}
