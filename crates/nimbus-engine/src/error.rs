//! Engine setup error types.

use thiserror::Error;

use nimbus_core::CoreError;
use nimbus_remote::RemoteError;

/// Result type alias for engine setup operations.
pub type EngineResult<T> = Result<T, EngineError>;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("remote error: {0}")]
    Remote(#[from] RemoteError),

    #[error("local io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("engine setup cancelled")]
    Cancelled,
}

impl From<CoreError> for EngineError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::Cancelled => EngineError::Cancelled,
        }
    }
}
