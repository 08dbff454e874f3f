//! HID error types.

use thiserror::Error;

/// HID error type.
#[derive(Debug, Error)]
pub enum HidError {
    #[error("Device not found")]
    DeviceNotFound,

    #[error("Permission denied - check udev rules")]
    PermissionDenied,

    #[error("Device disconnected")]
    DeviceDisconnected,

    #[error("USB error: {0}")]
    UsbError(String),

    #[error("Protocol error: {0}")]
    ProtocolError(#[from] novamix_core::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

impl HidError {
    /// Whether retrying the open can help.
    #[must_use]
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::DeviceNotFound | Self::DeviceDisconnected | Self::UsbError(_))
    }
}

/// Result type for HID operations.
pub type HidResult<T> = Result<T, HidError>;
