//! Provider error types.

use thiserror::Error;

/// Result type alias for provider operations.
pub type ProviderResult<T> = Result<T, ProviderError>;

/// Errors surfaced by launch, describe, or terminate calls.
///
/// None of these are retried.
#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("failed to run provider command {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("provider command `{command}` exited with {status}: {stderr}")]
    Command {
        command: String,
        status: i32,
        stderr: String,
    },

    #[error("failed to parse provider response: {0}")]
    Parse(String),

    #[error("launch rejected: {0}")]
    Launch(String),
}
