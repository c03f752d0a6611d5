//! Version probing and generation selection.

use std::fmt;

use tracing::{info, warn};

use nimbus_remote::{ExecOptions, RemoteNode};

use crate::error::EngineResult;
use crate::furl::FurlEngine;
use crate::plugin::{EngineContext, EngineSetupPlugin};
use crate::zmq::ZmqEngine;

const VERSION_PROBE: &str = "python -c 'import IPython; print(IPython.__version__)'";

/// Protocol generation of the installed engine runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineGeneration {
    /// 0.10.x: FURL files and a cluster file.
    Furl,
    /// 0.11 and later: ZeroMQ profile configs.
    Zmq,
}

impl EngineGeneration {
    pub fn plugin(self, ctx: EngineContext) -> Box<dyn EngineSetupPlugin> {
        match self {
            EngineGeneration::Furl => Box::new(FurlEngine::new(ctx)),
            EngineGeneration::Zmq => Box::new(ZmqEngine::new(ctx)),
        }
    }
}

impl fmt::Display for EngineGeneration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EngineGeneration::Furl => write!(f, "furl (0.10)"),
            EngineGeneration::Zmq => write!(f, "zmq (0.11+)"),
        }
    }
}

/// Leading `major.minor` of a version string; trailing components and
/// suffixes such as `rc1` or `.dev` are ignored.
fn parse_major_minor(version: &str) -> Option<(u64, u64)> {
    let mut parts = version.trim().split('.');
    let major = parts.next()?.parse().ok()?;
    let minor_part = parts.next()?;
    let digits: String = minor_part.chars().take_while(char::is_ascii_digit).collect();
    let minor = digits.parse().ok()?;
    Some((major, minor))
}

/// Pick the generation for a reported version.
///
/// `0.11` and later 0.x releases are ZeroMQ; `0.10` is FURL. Anything
/// else, unparsable output included, falls back to FURL with a warning.
pub fn select_generation(version: &str) -> EngineGeneration {
    match parse_major_minor(version) {
        Some((0, minor)) if minor >= 11 => EngineGeneration::Zmq,
        Some((0, 10)) => EngineGeneration::Furl,
        _ => {
            warn!(%version, "unrecognised engine version, falling back to furl");
            EngineGeneration::Furl
        }
    }
}

/// Probes the master and builds the matching plugin.
pub struct EngineDispatcher {
    ctx: EngineContext,
}

impl EngineDispatcher {
    pub fn new(ctx: EngineContext) -> Self {
        Self { ctx }
    }

    /// First line printed by the version probe, empty if nothing was printed.
    pub async fn probe_version(&self, master: &RemoteNode) -> EngineResult<String> {
        let output = master
            .execute_with(
                VERSION_PROBE,
                ExecOptions::default().source_profile().ignore_exit_status(),
            )
            .await?;
        Ok(output.first_line().unwrap_or_default().to_string())
    }

    pub async fn select(&self, master: &RemoteNode) -> EngineResult<Box<dyn EngineSetupPlugin>> {
        let version = self.probe_version(master).await?;
        let generation = select_generation(&version);
        info!(%version, %generation, "selected engine generation");
        Ok(generation.plugin(self.ctx.clone()))
    }
}

#[cfg(test)]
mod tests {
    use std::io;
    use std::sync::{Arc, Mutex};

    use super::*;

    #[test]
    fn ten_is_furl() {
        assert_eq!(select_generation("0.10.2"), EngineGeneration::Furl);
        assert_eq!(select_generation("0.10"), EngineGeneration::Furl);
    }

    #[test]
    fn eleven_and_later_is_zmq() {
        assert_eq!(select_generation("0.11.0"), EngineGeneration::Zmq);
        assert_eq!(select_generation("0.12"), EngineGeneration::Zmq);
        assert_eq!(select_generation("0.13.1rc1"), EngineGeneration::Zmq);
    }

    #[test]
    fn unknown_versions_fall_back_to_furl() {
        assert_eq!(select_generation("1.0"), EngineGeneration::Furl);
        assert_eq!(select_generation("0.9.1"), EngineGeneration::Furl);
        assert_eq!(select_generation(""), EngineGeneration::Furl);
        assert_eq!(select_generation("garbage"), EngineGeneration::Furl);
    }

    #[derive(Clone, Default)]
    struct Captured(Arc<Mutex<Vec<u8>>>);

    impl io::Write for Captured {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    fn logged_while(version: &str) -> (EngineGeneration, String) {
        let captured = Captured::default();
        let writer = captured.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_ansi(false)
            .with_writer(move || writer.clone())
            .finish();
        let generation = tracing::subscriber::with_default(subscriber, || select_generation(version));
        let bytes = captured.0.lock().unwrap().clone();
        (generation, String::from_utf8(bytes).unwrap())
    }

    #[test]
    fn fallback_is_logged_as_a_warning() {
        let (generation, logs) = logged_while("1.0");
        assert_eq!(generation, EngineGeneration::Furl);
        assert!(logs.contains("WARN"), "{logs}");
        assert!(logs.contains("falling back to furl"), "{logs}");
        assert!(logs.contains("version=1.0"), "{logs}");
    }

    #[test]
    fn known_versions_do_not_warn() {
        for version in ["0.10.2", "0.11.0"] {
            let (_, logs) = logged_while(version);
            assert!(!logs.contains("WARN"), "{version}: {logs}");
        }
    }

    #[test]
    fn major_minor_ignores_suffixes() {
        assert_eq!(parse_major_minor(" 0.11.dev \n"), Some((0, 11)));
        assert_eq!(parse_major_minor("0.12rc2"), Some((0, 12)));
        assert_eq!(parse_major_minor("7"), None);
    }
}
