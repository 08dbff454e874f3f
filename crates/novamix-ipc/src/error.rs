//! IPC error types.

use thiserror::Error;
use tokio_util::codec::LinesCodecError;

/// IPC error type.
#[derive(Debug, Error)]
pub enum IpcError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Connection closed")]
    ConnectionClosed,

    #[error("Request timeout")]
    Timeout,

    #[error("Server error {code}: {message}")]
    ServerError { code: i32, message: String },

    #[error("Message exceeds {0} bytes")]
    MessageTooLong(usize),
}

impl From<LinesCodecError> for IpcError {
    fn from(e: LinesCodecError) -> Self {
        match e {
            LinesCodecError::MaxLineLengthExceeded => {
                Self::MessageTooLong(crate::codec::MAX_LINE_LENGTH)
            }
            LinesCodecError::Io(e) => Self::Io(e),
        }
    }
}

/// Result type for IPC operations.
pub type IpcResult<T> = Result<T, IpcError>;
