//! IPC message types.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::events::{Event, EventType};

/// Request envelope sent from client to daemon.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Request {
    /// Unique request ID for matching responses
    pub id: u64,
    /// The method to invoke
    pub method: Method,
}

/// Response envelope sent from daemon to client.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Response {
    /// Request ID this is responding to
    pub id: u64,
    /// Result of the request
    pub result: Result<Value, ErrorInfo>,
}

impl Response {
    #[must_use]
    pub fn ok(id: u64, value: Value) -> Self {
        Self { id, result: Ok(value) }
    }
}

/// Error information in a response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorInfo {
    /// Error code
    pub code: i32,
    /// Human-readable error message
    pub message: String,
}

impl ErrorInfo {
    /// Create a new error.
    #[must_use]
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self { code, message: message.into() }
    }
}

/// Error codes carried in [`ErrorInfo`].
pub mod codes {
    /// Parameters out of range
    pub const INVALID_PARAMS: i32 = 400;
    /// The base station is not open
    pub const DEVICE_UNAVAILABLE: i32 = 503;
    /// Writing to the base station failed
    pub const DEVICE_ERROR: i32 = 500;
}

/// Methods that can be invoked via IPC.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "params")]
pub enum Method {
    // State queries
    /// Get the current daemon state snapshot
    GetState,
    /// Get device connection status
    GetDeviceStatus,
    /// Get the last dial position and applied levels
    GetMix,

    // Device control
    /// Show or hide the Sonar icon on the base station
    SetSonarIcon { enabled: bool },
    /// Allow or forbid switching the dial into ChatMix mode
    SetChatMixControls { enabled: bool },
    /// Set headset volume attenuation (higher is quieter)
    SetHeadsetVolume { attenuation: u8 },
    /// Select an EQ preset
    SetEqPreset { preset: u8 },
    /// Set a custom EQ band gain in dB
    SetEqBand { band: u8, gain_db: f32 },

    // Subscriptions
    /// Subscribe to event types; an empty list means all of them
    Subscribe { events: Vec<EventType> },
    /// Unsubscribe from event types; an empty list means all of them
    Unsubscribe { events: Vec<EventType> },

    // System
    /// Request graceful shutdown
    Shutdown,
}

/// Anything the daemon writes to a client.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ServerMessage {
    Response(Response),
    Event(Event),
}
