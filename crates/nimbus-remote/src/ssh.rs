//! ssh/scp backend.
//!
//! Each operation is one `ssh` or `scp` child process authenticated
//! with the cluster key. Host keys are not checked: cluster nodes are
//! freshly provisioned and their keys are unknown in advance.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::debug;

use crate::error::{RemoteError, RemoteResult};
use crate::shell::{
    CommandOutput, Connector, ExecOptions, RemoteShell, file_test_result, shell_quote,
};

const PROFILE_PREFIX: &str = "source /etc/profile && ";

/// Shell on a remote host over OpenSSH.
#[derive(Debug, Clone)]
pub struct SshShell {
    host: String,
    user: String,
    key: PathBuf,
}

impl SshShell {
    pub fn new(host: &str, user: &str, key: &Path) -> Self {
        Self {
            host: host.to_string(),
            user: user.to_string(),
            key: key.to_path_buf(),
        }
    }

    fn target(&self) -> String {
        format!("{}@{}", self.user, self.host)
    }

    fn base_args(&self) -> Vec<String> {
        vec![
            "-i".to_string(),
            self.key.display().to_string(),
            "-o".to_string(),
            "StrictHostKeyChecking=no".to_string(),
            "-o".to_string(),
            "UserKnownHostsFile=/dev/null".to_string(),
            "-o".to_string(),
            "LogLevel=ERROR".to_string(),
        ]
    }

    fn ssh(&self) -> Command {
        let mut cmd = Command::new("ssh");
        cmd.args(self.base_args()).arg("-o").arg("BatchMode=yes");
        cmd
    }

    async fn scp(&self, from: &str, to: &str) -> RemoteResult<()> {
        debug!(host = %self.host, %from, %to, "scp");
        let output = Command::new("scp")
            .args(self.base_args())
            .arg(from)
            .arg(to)
            .output()
            .await
            .map_err(|source| RemoteError::Spawn {
                program: "scp".to_string(),
                source,
            })?;
        if !output.status.success() {
            return Err(RemoteError::Transfer {
                host: self.host.clone(),
                detail: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        Ok(())
    }

    /// Open an interactive login shell with inherited stdio.
    pub async fn interactive(&self) -> RemoteResult<i32> {
        let status = Command::new("ssh")
            .args(self.base_args())
            .arg(self.target())
            .stdin(Stdio::inherit())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit())
            .status()
            .await
            .map_err(|source| RemoteError::Spawn {
                program: "ssh".to_string(),
                source,
            })?;
        Ok(status.code().unwrap_or(-1))
    }
}

#[async_trait]
impl RemoteShell for SshShell {
    fn host(&self) -> &str {
        &self.host
    }

    fn user(&self) -> &str {
        &self.user
    }

    async fn run(&self, command: &str, options: ExecOptions) -> RemoteResult<CommandOutput> {
        let remote_cmd = if options.source_profile {
            format!("{PROFILE_PREFIX}{command}")
        } else {
            command.to_string()
        };

        let output = self
            .ssh()
            .arg(self.target())
            .arg(&remote_cmd)
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|source| RemoteError::Spawn {
                program: "ssh".to_string(),
                source,
            })?;

        let lines = String::from_utf8_lossy(&output.stdout)
            .lines()
            .map(str::to_string)
            .collect();
        Ok(CommandOutput {
            lines,
            status: output.status.code().unwrap_or(-1),
        })
    }

    async fn is_file(&self, path: &str) -> RemoteResult<bool> {
        let command = format!("test -f {}", shell_quote(path));
        let output = self.run(&command, ExecOptions::default()).await?;
        file_test_result(&self.host, &command, output)
    }

    async fn put_file(&self, local: &Path, remote: &str) -> RemoteResult<()> {
        let to = format!("{}:{}", self.target(), remote);
        self.scp(&local.display().to_string(), &to).await
    }

    async fn get_file(&self, remote: &str, local: &Path) -> RemoteResult<()> {
        let from = format!("{}:{}", self.target(), remote);
        self.scp(&from, &local.display().to_string()).await
    }

    async fn write_file(&self, path: &str, contents: &[u8], mode: Option<u32>) -> RemoteResult<()> {
        let mut remote_cmd = format!("cat > {}", shell_quote(path));
        if let Some(mode) = mode {
            remote_cmd.push_str(&format!(" && chmod {mode:o} {}", shell_quote(path)));
        }

        let mut child = self
            .ssh()
            .arg(self.target())
            .arg(&remote_cmd)
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|source| RemoteError::Spawn {
                program: "ssh".to_string(),
                source,
            })?;

        if let Some(mut stdin) = child.stdin.take() {
            stdin.write_all(contents).await?;
            stdin.shutdown().await?;
        }

        let output = child.wait_with_output().await?;
        if !output.status.success() {
            return Err(RemoteError::Transfer {
                host: self.host.clone(),
                detail: format!(
                    "writing {path}: {}",
                    String::from_utf8_lossy(&output.stderr).trim()
                ),
            });
        }
        Ok(())
    }

    fn as_user(&self, user: &str) -> Arc<dyn RemoteShell> {
        Arc::new(Self::new(&self.host, user, &self.key))
    }
}

/// Opens [`SshShell`]s with a fixed private key.
#[derive(Debug, Clone)]
pub struct SshConnector {
    key: PathBuf,
}

impl SshConnector {
    pub fn new(key: &Path) -> Self {
        Self {
            key: key.to_path_buf(),
        }
    }

    /// Concrete shell, for callers that need `interactive()`.
    pub fn shell(&self, host: &str, user: &str) -> SshShell {
        SshShell::new(host, user, &self.key)
    }
}

impl Connector for SshConnector {
    fn connect(&self, host: &str, user: &str) -> Arc<dyn RemoteShell> {
        Arc::new(self.shell(host, user))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn target_and_key_args() {
        let shell = SshShell::new("ec2-1.example", "root", Path::new("/keys/gsg.pem"));
        assert_eq!(shell.target(), "root@ec2-1.example");
        let args = shell.base_args();
        assert_eq!(args[0], "-i");
        assert_eq!(args[1], "/keys/gsg.pem");
        assert!(args.contains(&"StrictHostKeyChecking=no".to_string()));
    }

    #[test]
    fn as_user_keeps_host_and_key() {
        let shell = SshShell::new("ec2-1.example", "root", Path::new("/keys/gsg.pem"));
        let other = shell.as_user("sgeadmin");
        assert_eq!(other.host(), "ec2-1.example");
        assert_eq!(other.user(), "sgeadmin");
    }
}
