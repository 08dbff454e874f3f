//! PipeWire error types.

use thiserror::Error;

/// PipeWire error type.
#[derive(Debug, Error)]
pub enum PwError {
    #[error("PipeWire connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Sink not found: {0}")]
    SinkNotFound(String),

    #[error("Registry error: {0}")]
    RegistryError(String),

    #[error("MainLoop error: {0}")]
    MainLoopError(String),

    #[error("Volume control failed: {0}")]
    VolumeControlFailed(String),

    #[error("Command failed: {0}")]
    CommandFailed(String),

    #[error("Loopback failed: {0}")]
    LoopbackFailed(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

/// Result type for PipeWire operations.
pub type PwResult<T> = Result<T, PwError>;
