//! The remote execution boundary.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use crate::error::{RemoteError, RemoteResult};

/// Per-command execution options.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExecOptions {
    /// Source the login profile before running (PATH for user installs).
    pub source_profile: bool,
    /// Treat a non-zero exit status as success.
    pub ignore_exit_status: bool,
}

impl ExecOptions {
    pub fn source_profile(mut self) -> Self {
        self.source_profile = true;
        self
    }

    pub fn ignore_exit_status(mut self) -> Self {
        self.ignore_exit_status = true;
        self
    }
}

/// Captured result of one remote command.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    pub lines: Vec<String>,
    pub status: i32,
}

impl CommandOutput {
    pub fn new<S: Into<String>>(lines: impl IntoIterator<Item = S>, status: i32) -> Self {
        Self {
            lines: lines.into_iter().map(Into::into).collect(),
            status,
        }
    }

    pub fn success(&self) -> bool {
        self.status == 0
    }

    pub fn first_line(&self) -> Option<&str> {
        self.lines.first().map(|l| l.trim())
    }
}

/// Command execution and file transfer against one host as one user.
///
/// There is no built-in timeout: a hung remote command blocks the caller.
#[async_trait]
pub trait RemoteShell: Send + Sync {
    fn host(&self) -> &str;

    fn user(&self) -> &str;

    /// Run a command and report its exit status without judging it.
    async fn run(&self, command: &str, options: ExecOptions) -> RemoteResult<CommandOutput>;

    async fn is_file(&self, path: &str) -> RemoteResult<bool>;

    async fn put_file(&self, local: &Path, remote: &str) -> RemoteResult<()>;

    async fn get_file(&self, remote: &str, local: &Path) -> RemoteResult<()>;

    /// Replace `path` with `contents`, optionally setting its mode.
    async fn write_file(&self, path: &str, contents: &[u8], mode: Option<u32>) -> RemoteResult<()>;

    /// A shell on the same host logged in as `user`.
    fn as_user(&self, user: &str) -> Arc<dyn RemoteShell>;

    /// Run a command; a non-zero exit status is an error unless the
    /// options opt out.
    async fn execute(&self, command: &str, options: ExecOptions) -> RemoteResult<CommandOutput> {
        debug!(host = %self.host(), user = %self.user(), %command, "executing");
        let output = self.run(command, options).await?;
        if !output.success() && !options.ignore_exit_status {
            return Err(RemoteError::CommandFailed {
                host: self.host().to_string(),
                command: command.to_string(),
                status: output.status,
                output: output.lines,
            });
        }
        Ok(output)
    }
}

/// Opens shells by host address.
pub trait Connector: Send + Sync {
    fn connect(&self, host: &str, user: &str) -> Arc<dyn RemoteShell>;
}

/// Interpret the exit status of `test -f <path>`.
///
/// 0 means present and 1 absent. Anything else (ssh itself exits 255
/// when the host is unreachable) is a failure, not an absent file.
pub fn file_test_result(host: &str, command: &str, output: CommandOutput) -> RemoteResult<bool> {
    match output.status {
        0 => Ok(true),
        1 => Ok(false),
        status => Err(RemoteError::CommandFailed {
            host: host.to_string(),
            command: command.to_string(),
            status,
            output: output.lines,
        }),
    }
}

/// Quote `s` for a POSIX shell.
pub fn shell_quote(s: &str) -> String {
    format!("'{}'", s.replace('\'', r"'\''"))
}
