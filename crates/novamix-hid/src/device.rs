//! Base station discovery and opening.

use std::ffi::CString;

use hidapi::{HidApi, HidDevice};
use novamix_core::protocol::{CONTROL_INTERFACE, NOVA_PRO_WIRELESS_PID, STEELSERIES_VID};
use tracing::{debug, info};

use crate::control::DeviceControl;
use crate::error::{HidError, HidResult};
use crate::reader::ReportReader;

/// USB identity of the interface to open.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceIds {
    pub vendor_id: u16,
    pub product_id: u16,
    /// `bInterfaceNumber` of the vendor control interface
    pub interface: i32,
}

impl Default for DeviceIds {
    fn default() -> Self {
        Self {
            vendor_id: STEELSERIES_VID,
            product_id: NOVA_PRO_WIRELESS_PID,
            interface: CONTROL_INTERFACE,
        }
    }
}

/// An opened Arctis Nova Pro Wireless base station.
///
/// Holds two handles to the same hidraw node so the blocking reader can
/// live on its own thread while commands are written from the daemon loop.
pub struct NovaProWireless {
    reader: HidDevice,
    control: HidDevice,
    serial: Option<String>,
    path: CString,
}

impl NovaProWireless {
    /// Find and open the base station's control interface.
    ///
    /// # Errors
    /// Returns [`HidError::DeviceNotFound`] if no matching interface is
    /// present and [`HidError::PermissionDenied`] if the hidraw node is not
    /// accessible to the current user.
    pub fn open(api: &mut HidApi, ids: DeviceIds) -> HidResult<Self> {
        api.refresh_devices().map_err(|e| HidError::UsbError(e.to_string()))?;

        let info = api
            .device_list()
            .find(|d| {
                d.vendor_id() == ids.vendor_id
                    && d.product_id() == ids.product_id
                    && d.interface_number() == ids.interface
            })
            .ok_or(HidError::DeviceNotFound)?;

        let path = info.path().to_owned();
        let serial = info.serial_number().map(String::from);

        let reader = api.open_path(&path).map_err(|e| classify_open_error(&e.to_string()))?;
        let control = api.open_path(&path).map_err(|e| classify_open_error(&e.to_string()))?;
        reader.set_blocking_mode(true).map_err(|e| HidError::UsbError(e.to_string()))?;

        info!(
            path = %path.to_string_lossy(),
            serial = serial.as_deref().unwrap_or("unknown"),
            "Base station opened"
        );

        Ok(Self { reader, control, serial, path })
    }

    /// Device serial number, if the descriptor has one.
    #[must_use]
    pub fn serial(&self) -> Option<&str> {
        self.serial.as_deref()
    }

    /// hidraw path of the opened interface.
    #[must_use]
    pub fn path(&self) -> String {
        self.path.to_string_lossy().into_owned()
    }

    /// Split into the listener's reader and the daemon's command handle.
    #[must_use]
    pub fn split(self) -> (ReportReader<HidDevice>, DeviceControl<HidDevice>) {
        (ReportReader::new(self.reader), DeviceControl::new(self.control))
    }
}

/// Map an open failure onto the error kinds the daemon distinguishes.
fn classify_open_error(message: &str) -> HidError {
    let lower = message.to_ascii_lowercase();
    if lower.contains("permission denied") || lower.contains("eacces") {
        HidError::PermissionDenied
    } else if lower.contains("no such file") || lower.contains("no such device") {
        HidError::DeviceNotFound
    } else {
        HidError::UsbError(message.to_string())
    }
}

/// Check if a device with the given ids is currently on the USB bus.
#[must_use]
pub fn is_device_connected(vendor_id: u16, product_id: u16) -> bool {
    let devices = match rusb::devices() {
        Ok(d) => d,
        Err(e) => {
            debug!(error = %e, "Failed to enumerate USB devices");
            return false;
        }
    };

    devices.iter().any(|device| {
        device
            .device_descriptor()
            .is_ok_and(|desc| desc.vendor_id() == vendor_id && desc.product_id() == product_id)
    })
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    #[test]
    fn test_default_ids_match_nova_pro_wireless() {
        let ids = DeviceIds::default();
        assert_eq!(ids.vendor_id, 0x1038);
        assert_eq!(ids.product_id, 0x12E0);
        assert_eq!(ids.interface, 4);
    }

    #[test]
    fn test_classify_permission_denied() {
        assert_matches!(
            classify_open_error(
                "Failed to open a device with path '/dev/hidraw3': Permission denied (os error 13)"
            ),
            HidError::PermissionDenied
        );
    }

    #[test]
    fn test_classify_vanished_device() {
        assert_matches!(
            classify_open_error("No such file or directory (os error 2)"),
            HidError::DeviceNotFound
        );
    }

    #[test]
    fn test_classify_other_errors() {
        assert_matches!(
            classify_open_error("hid_error is not implemented yet"),
            HidError::UsbError(_)
        );
    }
}
