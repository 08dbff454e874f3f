//! Commands for state mutations.
//!
//! Commands are returned by IPC handlers to request changes that the main
//! daemon loop processes with mutable access to the device.

use crate::protocol::DeviceCommand;

/// A command representing a state mutation request.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Command {
    /// Forward a command to the base station
    Device(DeviceCommand),
    /// Request shutdown
    Shutdown,
}
