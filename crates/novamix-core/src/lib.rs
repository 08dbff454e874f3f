//! Novamix Core - ChatMix translation, headset protocol, and daemon state.
//!
//! This crate contains the domain models shared between the daemon, the
//! HID listener, and the control client. Everything here is pure: no I/O,
//! no threads.

pub mod backoff;
pub mod command;
pub mod error;
pub mod mixer;
pub mod protocol;
pub mod state;

pub use backoff::Backoff;
pub use command::Command;
pub use error::{Error, Result};
pub use mixer::{MixCurve, MixLevels, MixRatio, Volume};
pub use protocol::{DeviceCommand, HeadsetMessage};
pub use state::{DaemonEvent, DaemonState, HeadsetStatus, StateSnapshot};
