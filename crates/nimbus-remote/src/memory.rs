//! In-memory remote hosts for tests and dry runs.
//!
//! Every command is recorded. Responses are scripted by substring
//! match, most recently registered first; unmatched commands succeed
//! with no output. A script can also create a file when its command
//! runs, which is how tests simulate a readiness artifact appearing.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;

use crate::error::{RemoteError, RemoteResult};
use crate::shell::{
    CommandOutput, Connector, ExecOptions, RemoteShell, file_test_result, shell_quote,
};

/// One command observed by a memory host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecRecord {
    pub user: String,
    pub command: String,
    pub options: ExecOptions,
}

#[derive(Debug, Clone)]
struct Script {
    pattern: String,
    output: CommandOutput,
    creates: Option<(String, String)>,
}

#[derive(Debug, Default)]
struct HostState {
    files: BTreeMap<String, (Vec<u8>, Option<u32>)>,
    commands: Vec<ExecRecord>,
    scripts: Vec<Script>,
    uploads: Vec<(String, String)>,
    downloads: Vec<(String, String)>,
    /// Exit status every file check reports instead of consulting `files`.
    file_check_status: Option<i32>,
}

type Shared<T> = Arc<Mutex<T>>;

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Handle on one simulated host, for scripting and inspection.
#[derive(Debug, Clone)]
pub struct MemoryHost {
    name: String,
    state: Shared<HostState>,
    defaults: Shared<Vec<Script>>,
}

impl MemoryHost {
    fn new(name: &str, defaults: Shared<Vec<Script>>) -> Self {
        Self {
            name: name.to_string(),
            state: Arc::default(),
            defaults,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Reply with `lines` to any command containing `pattern`.
    pub fn respond<S: Into<String>>(&self, pattern: &str, lines: impl IntoIterator<Item = S>) {
        self.respond_status(pattern, 0, lines);
    }

    pub fn respond_status<S: Into<String>>(
        &self,
        pattern: &str,
        status: i32,
        lines: impl IntoIterator<Item = S>,
    ) {
        lock(&self.state).scripts.push(Script {
            pattern: pattern.to_string(),
            output: CommandOutput::new(lines, status),
            creates: None,
        });
    }

    /// Create `path` when a command containing `pattern` runs.
    pub fn on_command_create(&self, pattern: &str, path: &str, contents: &str) {
        lock(&self.state).scripts.push(Script {
            pattern: pattern.to_string(),
            output: CommandOutput::default(),
            creates: Some((path.to_string(), contents.to_string())),
        });
    }

    /// Make every `is_file` exit with `status`, as ssh does (255) when
    /// the host cannot be reached.
    pub fn fail_file_checks(&self, status: i32) {
        lock(&self.state).file_check_status = Some(status);
    }

    pub fn put(&self, path: &str, contents: &str) {
        lock(&self.state)
            .files
            .insert(path.to_string(), (contents.as_bytes().to_vec(), None));
    }

    pub fn file(&self, path: &str) -> Option<String> {
        lock(&self.state)
            .files
            .get(path)
            .map(|(bytes, _)| String::from_utf8_lossy(bytes).into_owned())
    }

    pub fn file_mode(&self, path: &str) -> Option<u32> {
        lock(&self.state).files.get(path).and_then(|(_, mode)| *mode)
    }

    pub fn commands(&self) -> Vec<ExecRecord> {
        lock(&self.state).commands.clone()
    }

    /// Command strings only, in execution order.
    pub fn command_lines(&self) -> Vec<String> {
        lock(&self.state)
            .commands
            .iter()
            .map(|c| c.command.clone())
            .collect()
    }

    /// `(local, remote)` pairs for every `put_file`.
    pub fn uploads(&self) -> Vec<(String, String)> {
        lock(&self.state).uploads.clone()
    }

    /// `(remote, local)` pairs for every `get_file`.
    pub fn downloads(&self) -> Vec<(String, String)> {
        lock(&self.state).downloads.clone()
    }

    fn exec(&self, user: &str, command: &str, options: ExecOptions) -> CommandOutput {
        let mut state = lock(&self.state);
        state.commands.push(ExecRecord {
            user: user.to_string(),
            command: command.to_string(),
            options,
        });

        let script = state
            .scripts
            .iter()
            .rev()
            .find(|s| command.contains(&s.pattern))
            .cloned()
            .or_else(|| {
                lock(&self.defaults)
                    .iter()
                    .rev()
                    .find(|s| command.contains(&s.pattern))
                    .cloned()
            });

        match script {
            Some(script) => {
                if let Some((path, contents)) = script.creates {
                    state.files.insert(path, (contents.into_bytes(), None));
                }
                script.output
            }
            None => CommandOutput::default(),
        }
    }
}

/// Shell on a [`MemoryHost`].
pub struct MemoryShell {
    host: MemoryHost,
    user: String,
}

#[async_trait]
impl RemoteShell for MemoryShell {
    fn host(&self) -> &str {
        &self.host.name
    }

    fn user(&self) -> &str {
        &self.user
    }

    async fn run(&self, command: &str, options: ExecOptions) -> RemoteResult<CommandOutput> {
        Ok(self.host.exec(&self.user, command, options))
    }

    async fn is_file(&self, path: &str) -> RemoteResult<bool> {
        let state = lock(&self.host.state);
        match state.file_check_status {
            Some(status) => file_test_result(
                &self.host.name,
                &format!("test -f {}", shell_quote(path)),
                CommandOutput::new([format!("ssh: connect to host {}: Connection refused", self.host.name)], status),
            ),
            None => Ok(state.files.contains_key(path)),
        }
    }

    async fn put_file(&self, local: &Path, remote: &str) -> RemoteResult<()> {
        let bytes = std::fs::read(local)?;
        let target = if remote.ends_with('/') {
            let name = local
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            format!("{remote}{name}")
        } else {
            remote.to_string()
        };
        let mut state = lock(&self.host.state);
        state
            .uploads
            .push((local.display().to_string(), remote.to_string()));
        state.files.insert(target, (bytes, None));
        Ok(())
    }

    async fn get_file(&self, remote: &str, local: &Path) -> RemoteResult<()> {
        let bytes = {
            let mut state = lock(&self.host.state);
            state
                .downloads
                .push((remote.to_string(), local.display().to_string()));
            state.files.get(remote).map(|(bytes, _)| bytes.clone())
        };
        match bytes {
            Some(bytes) => {
                std::fs::write(local, bytes)?;
                Ok(())
            }
            None => Err(RemoteError::Transfer {
                host: self.host.name.clone(),
                detail: format!("{remote}: no such file"),
            }),
        }
    }

    async fn write_file(&self, path: &str, contents: &[u8], mode: Option<u32>) -> RemoteResult<()> {
        lock(&self.host.state)
            .files
            .insert(path.to_string(), (contents.to_vec(), mode));
        Ok(())
    }

    fn as_user(&self, user: &str) -> Arc<dyn RemoteShell> {
        Arc::new(MemoryShell {
            host: self.host.clone(),
            user: user.to_string(),
        })
    }
}

/// Hands out shells on lazily created memory hosts.
#[derive(Debug, Clone, Default)]
pub struct MemoryConnector {
    hosts: Shared<BTreeMap<String, MemoryHost>>,
    defaults: Shared<Vec<Script>>,
}

impl MemoryConnector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get (creating if needed) the host named `name`.
    pub fn host(&self, name: &str) -> MemoryHost {
        lock(&self.hosts)
            .entry(name.to_string())
            .or_insert_with(|| MemoryHost::new(name, self.defaults.clone()))
            .clone()
    }

    /// Script a response on every host, present and future.
    ///
    /// Host-specific scripts take precedence.
    pub fn respond_all<S: Into<String>>(&self, pattern: &str, lines: impl IntoIterator<Item = S>) {
        lock(&self.defaults).push(Script {
            pattern: pattern.to_string(),
            output: CommandOutput::new(lines, 0),
            creates: None,
        });
    }

    pub fn host_names(&self) -> Vec<String> {
        lock(&self.hosts).keys().cloned().collect()
    }
}

impl Connector for MemoryConnector {
    fn connect(&self, host: &str, user: &str) -> Arc<dyn RemoteShell> {
        Arc::new(MemoryShell {
            host: self.host(host),
            user: user.to_string(),
        })
    }
}
