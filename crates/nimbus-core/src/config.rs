//! nimbus.toml configuration parser.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::ConfigError;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClusterConfig {
    pub cluster: ClusterSection,
    pub provider: ProviderSection,
    #[serde(default)]
    pub bootstrap: BootstrapSection,
    #[serde(default)]
    pub polling: PollingSection,
    /// Present when a parallel engine should be started after bootstrap.
    pub engine: Option<EngineSection>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClusterSection {
    pub name: String,
    /// Desired number of running instances (master included).
    pub size: u32,
    pub master_image_id: Option<String>,
    pub worker_image_id: String,
    pub key_name: String,
    pub key_location: PathBuf,
    /// Account the engine and the login hint run under.
    pub user: String,
    #[serde(default = "default_login_user")]
    pub login_user: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderSection {
    pub region: String,
    pub access_key_id: Option<String>,
    pub secret_access_key: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BootstrapSection {
    #[serde(default = "default_hosts_file")]
    pub hosts_file: String,
    #[serde(default = "default_hosts_dest")]
    pub hosts_dest: String,
    #[serde(default = "default_helper_scripts")]
    pub helper_scripts: Vec<PathBuf>,
    #[serde(default = "default_scripts_dest")]
    pub scripts_dest: String,
    #[serde(default = "default_setup_command")]
    pub setup_command: String,
    /// Local directory the host-list artifact is written to before upload.
    pub work_dir: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PollingSection {
    #[serde(default = "default_quorum_interval")]
    pub quorum_interval: String,
    #[serde(default = "default_termination_grace")]
    pub termination_grace: String,
    #[serde(default = "default_readiness_interval")]
    pub readiness_interval: String,
    #[serde(default = "default_stop_grace")]
    pub stop_grace: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EngineSection {
    pub cache_dir: Option<PathBuf>,
}

fn default_login_user() -> String {
    "root".to_string()
}

fn default_hosts_file() -> String {
    "mpd.hosts".to_string()
}

fn default_hosts_dest() -> String {
    "/etc/".to_string()
}

fn default_helper_scripts() -> Vec<PathBuf> {
    vec![PathBuf::from("ssh.py"), PathBuf::from("create_hosts.py")]
}

fn default_scripts_dest() -> String {
    "/home/".to_string()
}

fn default_setup_command() -> String {
    "python /home/create_hosts.py".to_string()
}

fn default_quorum_interval() -> String {
    "15s".to_string()
}

fn default_termination_grace() -> String {
    "5s".to_string()
}

fn default_readiness_interval() -> String {
    "1s".to_string()
}

fn default_stop_grace() -> String {
    "2s".to_string()
}

impl Default for BootstrapSection {
    fn default() -> Self {
        Self {
            hosts_file: default_hosts_file(),
            hosts_dest: default_hosts_dest(),
            helper_scripts: default_helper_scripts(),
            scripts_dest: default_scripts_dest(),
            setup_command: default_setup_command(),
            work_dir: None,
        }
    }
}

impl Default for PollingSection {
    fn default() -> Self {
        Self {
            quorum_interval: default_quorum_interval(),
            termination_grace: default_termination_grace(),
            readiness_interval: default_readiness_interval(),
            stop_grace: default_stop_grace(),
        }
    }
}

/// Parsed polling intervals.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Intervals {
    pub quorum: Duration,
    pub termination_grace: Duration,
    pub readiness: Duration,
    pub stop_grace: Duration,
}

impl ClusterConfig {
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        debug!(path = %path.display(), "loading cluster config");
        Self::from_toml(&content)
    }

    /// Parse and validate a config document.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: ClusterConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.cluster.size < 1 {
            return Err(ConfigError::Invalid("cluster.size must be at least 1".into()));
        }
        if self.cluster.worker_image_id.trim().is_empty() {
            return Err(ConfigError::Invalid("cluster.worker_image_id is empty".into()));
        }
        if self.cluster.user.trim().is_empty() {
            return Err(ConfigError::Invalid("cluster.user is empty".into()));
        }
        self.intervals()?;
        Ok(())
    }

    pub fn intervals(&self) -> Result<Intervals, ConfigError> {
        let p = &self.polling;
        Ok(Intervals {
            quorum: required_duration("polling.quorum_interval", &p.quorum_interval)?,
            termination_grace: required_duration(
                "polling.termination_grace",
                &p.termination_grace,
            )?,
            readiness: required_duration("polling.readiness_interval", &p.readiness_interval)?,
            stop_grace: required_duration("polling.stop_grace", &p.stop_grace)?,
        })
    }

    /// Image ids an instance must carry to count as part of this cluster.
    pub fn image_ids(&self) -> crate::ImageIdSet {
        let mut ids = vec![self.cluster.worker_image_id.clone()];
        if let Some(master) = &self.cluster.master_image_id {
            ids.push(master.clone());
        }
        ids.into_iter().collect()
    }

    /// Directory the readiness connector file is cached in.
    ///
    /// Defaults to `$HOME/.nimbus/ipcluster`.
    pub fn cache_dir(&self) -> PathBuf {
        if let Some(dir) = self.engine.as_ref().and_then(|e| e.cache_dir.clone()) {
            return dir;
        }
        let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
        Path::new(&home).join(".nimbus").join("ipcluster")
    }

    /// Local directory for generated artifacts prior to upload.
    pub fn work_dir(&self) -> PathBuf {
        self.bootstrap
            .work_dir
            .clone()
            .unwrap_or_else(|| PathBuf::from("."))
    }
}

fn required_duration(field: &str, value: &str) -> Result<Duration, ConfigError> {
    parse_duration(value)
        .ok_or_else(|| ConfigError::Invalid(format!("{field}: cannot parse duration {value:?}")))
}

/// Parse an interval such as "15s", "500ms", "2m", "1h", or a bare
/// number of seconds. Values that overflow a `u64` of seconds are rejected.
pub fn parse_duration(s: &str) -> Option<Duration> {
    let s = s.trim();
    let split = s.find(|c: char| !c.is_ascii_digit()).unwrap_or(s.len());
    let (digits, unit) = s.split_at(split);
    if digits.is_empty() {
        return None;
    }
    let n: u64 = digits.parse().ok()?;
    match unit {
        "" | "s" => Some(Duration::from_secs(n)),
        "ms" => Some(Duration::from_millis(n)),
        "m" => n.checked_mul(60).map(Duration::from_secs),
        "h" => n.checked_mul(3600).map(Duration::from_secs),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL: &str = r#"
[cluster]
name = "demo"
size = 4
worker_image_id = "ami-worker"
key_name = "gsg-keypair"
key_location = "/keys/gsg.pem"
user = "sgeadmin"

[provider]
region = "us-east-1"
"#;

    #[test]
    fn parse_minimal_applies_defaults() {
        let config = ClusterConfig::from_toml(MINIMAL).unwrap();
        assert_eq!(config.cluster.name, "demo");
        assert_eq!(config.cluster.login_user, "root");
        assert_eq!(config.bootstrap.hosts_file, "mpd.hosts");
        assert_eq!(config.bootstrap.setup_command, "python /home/create_hosts.py");
        assert!(config.engine.is_none());

        let intervals = config.intervals().unwrap();
        assert_eq!(intervals.quorum, Duration::from_secs(15));
        assert_eq!(intervals.termination_grace, Duration::from_secs(5));
        assert_eq!(intervals.readiness, Duration::from_secs(1));
    }

    #[test]
    fn zero_size_rejected() {
        let doc = MINIMAL.replace("size = 4", "size = 0");
        let err = ClusterConfig::from_toml(&doc).unwrap_err();
        assert!(err.to_string().contains("cluster.size"));
    }

    #[test]
    fn bad_duration_rejected() {
        let doc = format!("{MINIMAL}\n[polling]\nquorum_interval = \"soon\"\n");
        assert!(matches!(
            ClusterConfig::from_toml(&doc),
            Err(ConfigError::Invalid(_))
        ));
    }

    #[test]
    fn image_ids_include_master_when_set() {
        let doc = MINIMAL.replace(
            "worker_image_id",
            "master_image_id = \"ami-master\"\nworker_image_id",
        );
        let config = ClusterConfig::from_toml(&doc).unwrap();
        let ids = config.image_ids();
        assert!(ids.contains("ami-master"));
        assert!(ids.contains("ami-worker"));
        assert!(!ids.contains("ami-other"));
    }

    #[test]
    fn engine_cache_dir_override() {
        let doc = format!("{MINIMAL}\n[engine]\ncache_dir = \"/tmp/ipc\"\n");
        let config = ClusterConfig::from_toml(&doc).unwrap();
        assert_eq!(config.cache_dir(), PathBuf::from("/tmp/ipc"));
    }

    #[test]
    fn from_file_reads_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nimbus.toml");
        std::fs::write(&path, MINIMAL).unwrap();
        let config = ClusterConfig::from_file(&path).unwrap();
        assert_eq!(config.cluster.size, 4);
    }

    #[test]
    fn parse_duration_units() {
        assert_eq!(parse_duration("15s"), Some(Duration::from_secs(15)));
        assert_eq!(parse_duration("500ms"), Some(Duration::from_millis(500)));
        assert_eq!(parse_duration("2m"), Some(Duration::from_secs(120)));
        assert_eq!(parse_duration("10"), Some(Duration::from_secs(10)));
        assert_eq!(parse_duration("later"), None);
        assert_eq!(parse_duration("1h"), Some(Duration::from_secs(3600)));
        assert_eq!(parse_duration(" 3s "), Some(Duration::from_secs(3)));
    }

    #[test]
    fn parse_duration_rejects_bad_units_and_overflow() {
        assert_eq!(parse_duration("5d"), None);
        assert_eq!(parse_duration("ms"), None);
        assert_eq!(parse_duration("-5s"), None);
        assert_eq!(parse_duration(&format!("{}m", u64::MAX)), None);
        assert_eq!(parse_duration(&format!("{}h", u64::MAX / 60)), None);
        assert_eq!(parse_duration("99999999999999999999999s"), None);
    }
}
