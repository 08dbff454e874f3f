//! IPC event types (server to client).

use novamix_core::protocol::HeadsetMessage;
use novamix_core::{DaemonState, MixLevels, MixRatio};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Event sent from daemon to subscribed clients.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    /// Event type
    pub event: EventType,
    /// Event data
    pub data: Value,
}

impl Event {
    /// Build an event from any serializable payload.
    pub fn new(event: EventType, data: &impl Serialize) -> Self {
        Self { event, data: serde_json::to_value(data).unwrap_or_default() }
    }
}

/// Types of events that can be subscribed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    /// Daemon state changed
    StateChanged,
    /// Base station opened
    DeviceConnected,
    /// Base station lost
    DeviceDisconnected,
    /// New ChatMix levels applied
    MixChanged,
    /// Any decoded report from the base station
    HeadsetReport,
    /// A ChatMix sink was absent when applying levels
    SinkMissing,
    /// Error occurred
    Error,
}

impl EventType {
    /// Every event type.
    pub const ALL: [Self; 7] = [
        Self::StateChanged,
        Self::DeviceConnected,
        Self::DeviceDisconnected,
        Self::MixChanged,
        Self::HeadsetReport,
        Self::SinkMissing,
        Self::Error,
    ];
}

/// State changed event data.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateChangedData {
    pub state: DaemonState,
}

/// Device connected event data.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceConnectedData {
    pub serial: Option<String>,
    pub path: String,
}

/// Device disconnected event data.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceDisconnectedData {
    pub reason: String,
}

/// Mix changed event data.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MixChangedData {
    pub ratio: MixRatio,
    pub levels: MixLevels,
}

/// Headset report event data.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HeadsetReportData {
    pub message: HeadsetMessage,
    /// Human-readable rendering of the report
    pub text: String,
}

/// Sink missing event data.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SinkMissingData {
    pub sink: String,
}

/// Error event data.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorData {
    pub code: i32,
    pub message: String,
    pub source: String,
}
