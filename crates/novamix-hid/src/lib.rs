//! Novamix HID - Arctis Nova Pro Wireless base station integration.
//!
//! The base station exposes a vendor HID interface that streams 64-byte
//! reports whenever a dial or setting changes, and accepts commands of the
//! same shape. Opening the device yields a blocking [`ReportReader`] for the
//! listener thread and a [`DeviceControl`] for sending commands.

pub mod control;
pub mod device;
pub mod error;
pub mod listener;
pub mod reader;
pub mod transport;

pub use control::DeviceControl;
pub use device::{DeviceIds, NovaProWireless, is_device_connected};
pub use error::{HidError, HidResult};
pub use listener::{HidListener, ListenerEvent};
pub use reader::{ReportReader, Reports};
pub use transport::Transport;
