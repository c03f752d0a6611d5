//! Remote channel error types.

use thiserror::Error;

/// Result type alias for remote operations.
pub type RemoteResult<T> = Result<T, RemoteError>;

#[derive(Debug, Error)]
pub enum RemoteError {
    #[error("command `{command}` on {host} exited with {status}")]
    CommandFailed {
        host: String,
        command: String,
        status: i32,
        output: Vec<String>,
    },

    #[error("failed to spawn {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("file transfer failed on {host}: {detail}")]
    Transfer { host: String, detail: String },

    #[error("unexpected output from {host}: {detail}")]
    Unexpected { host: String, detail: String },

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}
