//! Launch planning.
//!
//! With a dedicated master image the master is requested on its own
//! and workers fill the remaining `n - 1` slots; otherwise a single
//! request of the worker image covers the whole cluster. Minimums are
//! half the target so a partially fulfilled request is still accepted.

use nimbus_core::config::ClusterSection;
use nimbus_provider::LaunchRequest;

/// Launch requests for a cluster of `cluster.size` instances, in the
/// order they must be issued.
pub fn launch_plan(cluster: &ClusterSection) -> Vec<LaunchRequest> {
    let n = cluster.size;
    let request = |image_id: &str, min_count: u32, max_count: u32| LaunchRequest {
        image_id: image_id.to_string(),
        min_count,
        max_count,
        key_name: cluster.key_name.clone(),
    };

    match &cluster.master_image_id {
        Some(master_image) => vec![
            request(master_image, 1, 1),
            request(
                &cluster.worker_image_id,
                (n.saturating_sub(1) / 2).max(1),
                n.saturating_sub(1).max(1),
            ),
        ],
        None => vec![request(&cluster.worker_image_id, (n / 2).max(1), n.max(1))],
    }
}
