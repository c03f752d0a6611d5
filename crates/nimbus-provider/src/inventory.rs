//! Inventory client: typed, filtered views over the provider listing.

use tracing::{debug, info};

use nimbus_core::{ImageIdSet, Instance, StateFilter};

use crate::error::ProviderResult;
use crate::provider::{CloudProvider, LaunchRequest, Reservation};
use crate::record::RawRecord;

/// Wraps a `CloudProvider` and converts its rows into `Instance`s.
///
/// Every query goes to the provider; nothing is cached between polls.
pub struct InventoryClient<P> {
    provider: P,
}

impl<P: CloudProvider> InventoryClient<P> {
    pub fn new(provider: P) -> Self {
        Self { provider }
    }

    /// Access the underlying provider.
    pub fn provider(&self) -> &P {
        &self.provider
    }

    /// Raw describe rows, reservation headers included.
    pub async fn describe(&self) -> ProviderResult<Vec<RawRecord>> {
        self.provider.describe_instances().await
    }

    /// Every instance regardless of image or state.
    pub async fn all_instances(&self) -> ProviderResult<Vec<Instance>> {
        let records = self.describe().await?;
        Ok(records.iter().filter_map(RawRecord::to_instance).collect())
    }

    /// Instances carrying one of `images` whose state passes `filter`.
    ///
    /// An empty provider listing yields an empty vector, not an error.
    pub async fn list_instances(
        &self,
        images: &ImageIdSet,
        filter: StateFilter,
    ) -> ProviderResult<Vec<Instance>> {
        let records = self.describe().await?;
        let instances = filter_instances(&records, images, filter);
        debug!(
            records = records.len(),
            matched = instances.len(),
            ?filter,
            "listed instances"
        );
        Ok(instances)
    }

    pub async fn launch(&self, request: &LaunchRequest) -> ProviderResult<Reservation> {
        info!(
            image = %request.image_id,
            min = request.min_count,
            max = request.max_count,
            "launching instances"
        );
        let reservation = self.provider.launch_instances(request).await?;
        info!(
            reservation = %reservation.id,
            instances = reservation.instances.len(),
            "launch accepted"
        );
        Ok(reservation)
    }

    /// Fire-and-forget termination; callers poll to observe the result.
    pub async fn terminate_instances(&self, ids: &[String]) -> ProviderResult<()> {
        if ids.is_empty() {
            return Ok(());
        }
        for id in ids {
            info!(instance = %id, "terminating instance");
        }
        self.provider.terminate_instances(ids).await
    }
}

/// Keep instance rows matching both the image set and the state filter,
/// preserving input order.
pub fn filter_instances(
    records: &[RawRecord],
    images: &ImageIdSet,
    filter: StateFilter,
) -> Vec<Instance> {
    records
        .iter()
        .filter_map(RawRecord::to_instance)
        .filter(|i| images.contains(&i.image_id) && filter.matches(&i.state))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryProvider;
    use nimbus_core::InstanceState;

    fn row(id: &str, image: &str, state: &str) -> RawRecord {
        let public = format!("{id}.public");
        let private = format!("{id}.internal");
        RawRecord::new([
            "INSTANCE",
            id,
            image,
            public.as_str(),
            private.as_str(),
            state,
        ])
    }

    fn images() -> ImageIdSet {
        ["ami-worker", "ami-master"].into_iter().collect()
    }

    #[test]
    fn filter_keeps_matching_image_and_state_in_order() {
        let records = vec![
            RawRecord::reservation("r-1", "owner"),
            row("i-1", "ami-worker", "running"),
            row("i-2", "ami-other", "running"),
            row("i-3", "ami-master", "pending"),
            row("i-4", "ami-worker", "terminated"),
            RawRecord::reservation("r-2", "owner"),
            row("i-5", "ami-master", "running"),
        ];

        let running = filter_instances(&records, &images(), StateFilter::Running);
        let ids: Vec<_> = running.iter().map(|i| i.id.as_str()).collect();
        assert_eq!(ids, vec!["i-1", "i-5"]);

        let live = filter_instances(&records, &images(), StateFilter::RunningOrPending);
        let ids: Vec<_> = live.iter().map(|i| i.id.as_str()).collect();
        assert_eq!(ids, vec!["i-1", "i-3", "i-5"]);
    }

    #[test]
    fn filter_on_empty_listing_is_empty() {
        assert!(filter_instances(&[], &images(), StateFilter::Running).is_empty());
    }

    #[tokio::test]
    async fn list_instances_queries_provider_each_time() {
        let provider = MemoryProvider::new();
        provider.insert(Instance {
            id: "i-1".to_string(),
            image_id: "ami-worker".to_string(),
            public_addr: "p1".to_string(),
            private_addr: "q1".to_string(),
            state: InstanceState::Pending,
        });
        let inventory = InventoryClient::new(provider.clone());

        let first = inventory
            .list_instances(&images(), StateFilter::Running)
            .await
            .unwrap();
        assert!(first.is_empty());

        provider.set_state("i-1", InstanceState::Running);
        let second = inventory
            .list_instances(&images(), StateFilter::Running)
            .await
            .unwrap();
        assert_eq!(second.len(), 1);
        assert_eq!(provider.describe_calls(), 2);
    }

    #[tokio::test]
    async fn terminate_with_no_ids_skips_provider() {
        let provider = MemoryProvider::new();
        let inventory = InventoryClient::new(provider.clone());
        inventory.terminate_instances(&[]).await.unwrap();
        assert!(provider.terminations().is_empty());
    }
}
