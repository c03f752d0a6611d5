//! Buffered remote file writer.

use std::fmt;
use std::sync::Arc;

use crate::error::RemoteResult;
use crate::shell::RemoteShell;

/// A writable handle on a remote path.
///
/// Content is buffered locally and transferred when the caller invokes
/// [`RemoteFile::close`]. Dropping the handle without closing discards
/// the content and leaves the remote file untouched.
pub struct RemoteFile {
    shell: Arc<dyn RemoteShell>,
    path: String,
    mode: Option<u32>,
    buf: String,
}

impl RemoteFile {
    pub fn new(shell: Arc<dyn RemoteShell>, path: &str, mode: Option<u32>) -> Self {
        Self {
            shell,
            path: path.to_string(),
            mode,
            buf: String::new(),
        }
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn write_str(&mut self, s: &str) {
        self.buf.push_str(s);
    }

    /// Write each line followed by a newline.
    pub fn write_lines<S: AsRef<str>>(&mut self, lines: impl IntoIterator<Item = S>) {
        for line in lines {
            self.buf.push_str(line.as_ref());
            self.buf.push('\n');
        }
    }

    /// Transfer the buffered content, replacing the remote file.
    pub async fn close(self) -> RemoteResult<()> {
        self.shell
            .write_file(&self.path, self.buf.as_bytes(), self.mode)
            .await
    }
}

impl fmt::Write for RemoteFile {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        self.buf.push_str(s);
        Ok(())
    }
}
