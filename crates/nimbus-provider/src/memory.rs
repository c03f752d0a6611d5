//! In-memory provider for tests and dry runs.
//!
//! Launched instances start `pending` and turn `running` after a
//! configurable number of describe calls. Terminated instances report
//! `shutting-down` on the next describe and `terminated` after that.

use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;

use nimbus_core::{Instance, InstanceState};

use crate::error::{ProviderError, ProviderResult};
use crate::provider::{CloudProvider, LaunchRequest, Reservation};
use crate::record::RawRecord;

#[derive(Debug, Clone)]
struct Slot {
    reservation: String,
    instance: Instance,
    /// Describe calls left before a pending instance becomes running.
    boot_polls: u32,
    shutting_down: bool,
}

#[derive(Debug, Default)]
struct Cloud {
    slots: Vec<Slot>,
    launches: Vec<LaunchRequest>,
    terminations: Vec<Vec<String>>,
    describe_calls: u32,
    boot_polls: u32,
    /// Instances to fulfil per launch instead of `max_count`.
    fulfilment: Option<u32>,
    fail_launch_image: Option<String>,
    next_id: u32,
}

/// Shared, cloneable in-memory cloud.
#[derive(Debug, Clone, Default)]
pub struct MemoryProvider {
    cloud: Arc<Mutex<Cloud>>,
}

impl MemoryProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of describe calls a launched instance stays `pending`.
    pub fn with_boot_polls(self, polls: u32) -> Self {
        self.lock().boot_polls = polls;
        self
    }

    /// Fulfil `count` instances per launch (clamped to the request range).
    pub fn with_fulfilment(self, count: u32) -> Self {
        self.lock().fulfilment = Some(count);
        self
    }

    /// Reject every launch of `image_id`.
    pub fn fail_launches_of(&self, image_id: &str) {
        self.lock().fail_launch_image = Some(image_id.to_string());
    }

    /// Seed an existing instance.
    pub fn insert(&self, instance: Instance) {
        self.lock().slots.push(Slot {
            reservation: "r-seed".to_string(),
            instance,
            boot_polls: 0,
            shutting_down: false,
        });
    }

    pub fn set_state(&self, id: &str, state: InstanceState) {
        let mut cloud = self.lock();
        if let Some(slot) = cloud.slots.iter_mut().find(|s| s.instance.id == id) {
            slot.instance.state = state;
            slot.shutting_down = false;
        }
    }

    pub fn instances(&self) -> Vec<Instance> {
        self.lock().slots.iter().map(|s| s.instance.clone()).collect()
    }

    pub fn launches(&self) -> Vec<LaunchRequest> {
        self.lock().launches.clone()
    }

    pub fn terminations(&self) -> Vec<Vec<String>> {
        self.lock().terminations.clone()
    }

    pub fn describe_calls(&self) -> u32 {
        self.lock().describe_calls
    }

    fn lock(&self) -> MutexGuard<'_, Cloud> {
        self.cloud.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl CloudProvider for MemoryProvider {
    async fn launch_instances(&self, request: &LaunchRequest) -> ProviderResult<Reservation> {
        let mut cloud = self.lock();
        cloud.launches.push(request.clone());

        if cloud.fail_launch_image.as_deref() == Some(request.image_id.as_str()) {
            return Err(ProviderError::Launch(format!(
                "insufficient capacity for {}",
                request.image_id
            )));
        }

        let count = cloud
            .fulfilment
            .unwrap_or(request.max_count)
            .clamp(request.min_count, request.max_count);
        let reservation = format!("r-{:08x}", cloud.launches.len());
        let boot_polls = cloud.boot_polls;
        let mut instances = Vec::with_capacity(count as usize);

        for _ in 0..count {
            cloud.next_id += 1;
            let n = cloud.next_id;
            let instance = Instance {
                id: format!("i-{n:08x}"),
                image_id: request.image_id.clone(),
                public_addr: format!("ec2-{n}.compute-1.amazonaws.com"),
                private_addr: format!("ip-10-0-0-{n}.ec2.internal"),
                state: if boot_polls == 0 {
                    InstanceState::Running
                } else {
                    InstanceState::Pending
                },
            };
            instances.push(instance.clone());
            cloud.slots.push(Slot {
                reservation: reservation.clone(),
                instance,
                boot_polls,
                shutting_down: false,
            });
        }

        Ok(Reservation {
            id: reservation,
            instances,
        })
    }

    async fn describe_instances(&self) -> ProviderResult<Vec<RawRecord>> {
        let mut cloud = self.lock();
        cloud.describe_calls += 1;

        for slot in cloud.slots.iter_mut() {
            if slot.shutting_down {
                slot.instance.state = InstanceState::Terminated;
                slot.shutting_down = false;
            } else if slot.instance.state == InstanceState::Pending && slot.boot_polls > 0 {
                slot.boot_polls -= 1;
                if slot.boot_polls == 0 {
                    slot.instance.state = InstanceState::Running;
                }
            }
        }

        let mut records = Vec::new();
        let mut current: Option<&str> = None;
        for slot in &cloud.slots {
            if current != Some(slot.reservation.as_str()) {
                records.push(RawRecord::reservation(&slot.reservation, "000000000000"));
                current = Some(slot.reservation.as_str());
            }
            records.push(RawRecord::instance(&slot.instance));
        }
        Ok(records)
    }

    async fn terminate_instances(&self, ids: &[String]) -> ProviderResult<()> {
        let mut cloud = self.lock();
        cloud.terminations.push(ids.to_vec());
        for slot in cloud.slots.iter_mut() {
            if ids.contains(&slot.instance.id) {
                slot.instance.state = InstanceState::Other("shutting-down".to_string());
                slot.shutting_down = true;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(image: &str, min: u32, max: u32) -> LaunchRequest {
        LaunchRequest {
            image_id: image.to_string(),
            min_count: min,
            max_count: max,
            key_name: "kp".to_string(),
        }
    }

    #[tokio::test]
    async fn launched_instances_boot_after_polls() {
        let provider = MemoryProvider::new().with_boot_polls(2);
        let reservation = provider
            .launch_instances(&request("ami-w", 1, 2))
            .await
            .unwrap();
        assert_eq!(reservation.instances.len(), 2);

        let first = provider.describe_instances().await.unwrap();
        let states: Vec<_> = first.iter().filter_map(RawRecord::to_instance).map(|i| i.state).collect();
        assert!(states.iter().all(|s| *s == InstanceState::Pending));

        let second = provider.describe_instances().await.unwrap();
        let states: Vec<_> = second.iter().filter_map(RawRecord::to_instance).map(|i| i.state).collect();
        assert!(states.iter().all(|s| *s == InstanceState::Running));
    }

    #[tokio::test]
    async fn fulfilment_is_clamped_to_request() {
        let provider = MemoryProvider::new().with_fulfilment(1);
        let reservation = provider
            .launch_instances(&request("ami-w", 2, 3))
            .await
            .unwrap();
        assert_eq!(reservation.instances.len(), 2);
    }

    #[tokio::test]
    async fn failed_launch_is_recorded() {
        let provider = MemoryProvider::new();
        provider.fail_launches_of("ami-w");
        let err = provider
            .launch_instances(&request("ami-w", 1, 1))
            .await
            .unwrap_err();
        assert!(matches!(err, ProviderError::Launch(_)));
        assert_eq!(provider.launches().len(), 1);
    }

    #[tokio::test]
    async fn termination_completes_on_next_describe() {
        let provider = MemoryProvider::new();
        let reservation = provider
            .launch_instances(&request("ami-w", 1, 1))
            .await
            .unwrap();
        let id = reservation.instances[0].id.clone();

        provider.terminate_instances(std::slice::from_ref(&id)).await.unwrap();
        assert_eq!(
            provider.instances()[0].state,
            InstanceState::Other("shutting-down".to_string())
        );

        provider.describe_instances().await.unwrap();
        assert_eq!(provider.instances()[0].state, InstanceState::Terminated);
    }

    #[tokio::test]
    async fn describe_groups_rows_under_reservations() {
        let provider = MemoryProvider::new();
        provider.launch_instances(&request("ami-m", 1, 1)).await.unwrap();
        provider.launch_instances(&request("ami-w", 2, 2)).await.unwrap();

        let rows = provider.describe_instances().await.unwrap();
        let tags: Vec<_> = rows.iter().map(|r| r.tag().to_string()).collect();
        assert_eq!(
            tags,
            vec!["RESERVATION", "INSTANCE", "RESERVATION", "INSTANCE", "INSTANCE"]
        );
    }
}
