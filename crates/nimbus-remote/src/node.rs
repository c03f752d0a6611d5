//! A provisioned machine: identity, role, and a shell to reach it.

use std::sync::Arc;

use tracing::debug;

use nimbus_core::Instance;

use crate::error::{RemoteError, RemoteResult};
use crate::file::RemoteFile;
use crate::shell::{CommandOutput, Connector, ExecOptions, RemoteShell, shell_quote};

/// Role a node plays in the cluster.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeRole {
    Master,
    Worker,
}

/// One cluster machine reachable through a [`RemoteShell`].
#[derive(Clone)]
pub struct RemoteNode {
    instance: Instance,
    role: NodeRole,
    shell: Arc<dyn RemoteShell>,
}

impl RemoteNode {
    pub fn new(instance: Instance, role: NodeRole, shell: Arc<dyn RemoteShell>) -> Self {
        Self {
            instance,
            role,
            shell,
        }
    }

    /// Connect to `instance` through its public address.
    pub fn connect(
        connector: &dyn Connector,
        instance: &Instance,
        role: NodeRole,
        user: &str,
    ) -> Self {
        let shell = connector.connect(&instance.public_addr, user);
        Self::new(instance.clone(), role, shell)
    }

    pub fn id(&self) -> &str {
        &self.instance.id
    }

    /// Hostname other nodes use to reach this one.
    pub fn hostname(&self) -> &str {
        &self.instance.private_addr
    }

    pub fn public_addr(&self) -> &str {
        &self.instance.public_addr
    }

    pub fn instance(&self) -> &Instance {
        &self.instance
    }

    pub fn role(&self) -> NodeRole {
        self.role
    }

    pub fn is_master(&self) -> bool {
        self.role == NodeRole::Master
    }

    pub fn shell(&self) -> &Arc<dyn RemoteShell> {
        &self.shell
    }

    /// The same node reached as a different login user.
    pub fn as_user(&self, user: &str) -> Self {
        Self {
            instance: self.instance.clone(),
            role: self.role,
            shell: self.shell.as_user(user),
        }
    }

    pub async fn execute(&self, command: &str) -> RemoteResult<CommandOutput> {
        self.shell.execute(command, ExecOptions::default()).await
    }

    pub async fn execute_with(
        &self,
        command: &str,
        options: ExecOptions,
    ) -> RemoteResult<CommandOutput> {
        self.shell.execute(command, options).await
    }

    pub async fn is_file(&self, path: &str) -> RemoteResult<bool> {
        self.shell.is_file(path).await
    }

    pub fn remote_file(&self, path: &str, mode: Option<u32>) -> RemoteFile {
        RemoteFile::new(self.shell.clone(), path, mode)
    }

    /// Processor count as reported by `nproc`.
    pub async fn num_processors(&self) -> RemoteResult<u32> {
        let output = self.execute("nproc").await?;
        let count = output
            .first_line()
            .and_then(|l| l.parse::<u32>().ok())
            .ok_or_else(|| RemoteError::Unexpected {
                host: self.shell.host().to_string(),
                detail: format!("nproc printed {:?}", output.lines),
            })?;
        debug!(node = %self.id(), count, "processor count");
        Ok(count)
    }

    /// Home directory of `user` from the passwd database, falling back
    /// to `/home/<user>`.
    pub async fn home_dir(&self, user: &str) -> RemoteResult<String> {
        let output = self
            .execute_with(
                &format!("getent passwd {}", shell_quote(user)),
                ExecOptions::default().ignore_exit_status(),
            )
            .await?;
        let home = output
            .first_line()
            .and_then(|line| line.split(':').nth(5))
            .filter(|h| !h.is_empty())
            .map(str::to_string);
        Ok(home.unwrap_or_else(|| format!("/home/{user}")))
    }
}

impl std::fmt::Debug for RemoteNode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RemoteNode")
            .field("id", &self.instance.id)
            .field("role", &self.role)
            .field("host", &self.shell.host())
            .field("user", &self.shell.user())
            .finish()
    }
}
