//! Raw report I/O.

use tracing::warn;

use crate::error::{HidError, HidResult};

/// A handle that can exchange raw reports with the base station.
///
/// Implemented for [`hidapi::HidDevice`]; tests substitute scripted handles.
pub trait Transport: Send + 'static {
    /// Block until a report arrives and copy it into `buf`.
    ///
    /// # Errors
    /// Returns [`HidError::DeviceDisconnected`] once the device is gone.
    fn read(&self, buf: &mut [u8]) -> HidResult<usize>;

    /// Send a full report.
    ///
    /// # Errors
    /// Returns an error if the write fails.
    fn write(&self, report: &[u8]) -> HidResult<usize>;
}

impl Transport for hidapi::HidDevice {
    fn read(&self, buf: &mut [u8]) -> HidResult<usize> {
        hidapi::HidDevice::read(self, buf).map_err(|e| {
            warn!(error = %e, "HID read failed");
            HidError::DeviceDisconnected
        })
    }

    fn write(&self, report: &[u8]) -> HidResult<usize> {
        hidapi::HidDevice::write(self, report).map_err(|e| HidError::UsbError(e.to_string()))
    }
}
