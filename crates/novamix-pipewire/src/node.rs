//! Sink node information.

use serde::{Deserialize, Serialize};

/// Channel count assumed when a sink does not advertise one.
pub const DEFAULT_CHANNELS: u32 = 2;

/// Information about an `Audio/Sink` node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SinkInfo {
    /// PipeWire object ID
    pub id: u32,
    /// Node name
    pub name: String,
    /// Node description
    pub description: Option<String>,
    /// Number of audio channels
    pub channels: u32,
}

impl SinkInfo {
    /// Build sink info from registry properties.
    ///
    /// Returns `None` unless `media.class` is `Audio/Sink`.
    #[must_use]
    pub fn from_props<'a>(id: u32, get: impl Fn(&str) -> Option<&'a str>) -> Option<Self> {
        if get("media.class") != Some("Audio/Sink") {
            return None;
        }

        Some(Self {
            id,
            name: get("node.name").unwrap_or("unknown").to_string(),
            description: get("node.description").map(String::from),
            channels: get("audio.channels")
                .and_then(|c| c.parse().ok())
                .filter(|&c| c > 0)
                .unwrap_or(DEFAULT_CHANNELS),
        })
    }
}
