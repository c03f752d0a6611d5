//! nimbus-provider: the cloud provider boundary.
//!
//! The orchestrator only ever calls three provider operations: launch,
//! describe, and terminate. `CloudProvider` captures those, and
//! `InventoryClient` turns raw describe rows into typed, filtered
//! `Instance` snapshots.
//!
//! # Backends
//!
//! ```text
//! CloudProvider
//!   ├── AwsCliProvider  (shells out to `aws ec2 ...`, JSON output)
//!   └── MemoryProvider  (in-process, for tests and dry runs)
//! ```

pub mod aws;
pub mod error;
pub mod inventory;
pub mod memory;
pub mod provider;
pub mod record;

pub use aws::AwsCliProvider;
pub use error::{ProviderError, ProviderResult};
pub use inventory::InventoryClient;
pub use memory::MemoryProvider;
pub use provider::{CloudProvider, LaunchRequest, Reservation};
pub use record::RawRecord;
