//! nimbus-engine: bootstrap of the distributed parallel engine.
//!
//! The engine runtime installed on the cluster image comes in two
//! mutually incompatible protocol generations. Each generation is an
//! [`EngineSetupPlugin`]; the [`EngineDispatcher`] probes the version on
//! the master and picks one. Nothing outside `dispatch` branches on
//! the version.
//!
//! # Generations
//!
//! ```text
//! EngineGeneration::Furl   (0.10.x)
//!   └── one `ipcluster ssh` controller driven by /etc/clusterfile.py
//! EngineGeneration::Zmq    (0.11+)
//!   ├── four profile config files
//!   ├── `ipcluster start --daemonize` (controller + N engines)
//!   └── readiness: ipcontroller-client.json on the master
//! ```

pub mod dispatch;
pub mod error;
pub mod furl;
pub mod plugin;
pub mod stop;
pub mod zmq;

pub use dispatch::{EngineDispatcher, EngineGeneration, select_generation};
pub use error::{EngineError, EngineResult};
pub use furl::FurlEngine;
pub use plugin::{EngineContext, EngineSetupPlugin};
pub use zmq::ZmqEngine;
