//! nimbus-remote: the channel to provisioned machines.
//!
//! A `RemoteShell` runs commands and moves files on one host as one
//! login user. A `RemoteNode` pairs a shell with the instance identity
//! and cluster role of the machine behind it. `Connector`s hand out
//! shells by address, so callers never construct transports directly.
//!
//! # Backends
//!
//! ```text
//! Connector
//!   ├── SshConnector     → SshShell     (ssh/scp child processes)
//!   └── MemoryConnector  → MemoryShell  (scripted, in-process)
//! ```

pub mod error;
pub mod file;
pub mod memory;
pub mod node;
pub mod shell;
pub mod ssh;

pub use error::{RemoteError, RemoteResult};
pub use file::RemoteFile;
pub use memory::{MemoryConnector, MemoryHost};
pub use node::{NodeRole, RemoteNode};
pub use shell::{CommandOutput, Connector, ExecOptions, RemoteShell};
pub use ssh::{SshConnector, SshShell};
