//! Daemon state machine and event handling.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::mixer::{MixCurve, MixLevels, MixRatio};

/// Current state of the daemon.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DaemonState {
    /// Loading configuration, opening the device for the first time
    #[default]
    Starting,
    /// Blocked on the next HID report
    Listening,
    /// Applying volumes for the last report
    Applying,
    /// Device missing or disconnected, waiting to retry
    DeviceLost,
    /// Graceful shutdown in progress
    ShuttingDown,
    /// Cleanup finished
    Stopped,
}

/// Events that can trigger state transitions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DaemonEvent {
    DeviceOpened,
    OpenFailed,
    ReportReceived,
    ApplyFinished,
    ReadFailed,
    ShutdownRequested,
    CleanupFinished,
}

impl DaemonState {
    /// Compute the state that follows `event`.
    ///
    /// Events that make no sense in the current state leave it unchanged.
    #[must_use]
    pub fn next(self, event: DaemonEvent) -> Self {
        use DaemonEvent as E;

        match (self, event) {
            (Self::Stopped, _) => Self::Stopped,
            (Self::ShuttingDown, E::CleanupFinished) => Self::Stopped,
            (Self::ShuttingDown, _) => Self::ShuttingDown,
            (_, E::ShutdownRequested) => Self::ShuttingDown,

            (Self::Starting | Self::DeviceLost, E::DeviceOpened) => Self::Listening,
            (Self::Starting | Self::DeviceLost, E::OpenFailed) => Self::DeviceLost,

            (Self::Listening, E::ReportReceived) => Self::Applying,
            (Self::Applying, E::ApplyFinished) => Self::Listening,
            (Self::Listening | Self::Applying, E::ReadFailed) => Self::DeviceLost,

            (state, _) => state,
        }
    }
}

impl fmt::Display for DaemonState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Starting => "starting",
            Self::Listening => "listening",
            Self::Applying => "applying",
            Self::DeviceLost => "device_lost",
            Self::ShuttingDown => "shutting_down",
            Self::Stopped => "stopped",
        };
        f.write_str(name)
    }
}

/// Last known headset settings, as reported by the base station.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HeadsetStatus {
    /// Sonar icon shown
    pub sonar_icon: bool,
    /// Dial can switch into ChatMix mode
    pub chatmix_controls: bool,
    /// Headset volume attenuation
    pub attenuation: Option<u8>,
    /// Active EQ preset
    pub eq_preset: Option<u8>,
}

/// Complete snapshot of the daemon's current state.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StateSnapshot {
    /// Current daemon state
    pub state: DaemonState,
    /// Whether the base station is open
    pub device_connected: bool,
    /// Serial number of the open base station
    pub device_serial: Option<String>,
    /// hidraw path of the open base station
    pub device_path: Option<String>,
    /// Active mix curve
    pub curve: MixCurve,
    /// Last dial position
    pub ratio: Option<MixRatio>,
    /// Last levels applied
    pub levels: Option<MixLevels>,
    /// Game sink node name
    pub game_sink: String,
    /// Chat sink node name
    pub chat_sink: String,
    /// Sinks that were missing on the last apply
    pub missing_sinks: Vec<String>,
    /// Headset settings
    pub headset: HeadsetStatus,
    /// Failed reconnect attempts since the device was lost
    pub reconnect_attempts: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_happy_path() {
        let state = DaemonState::Starting
            .next(DaemonEvent::DeviceOpened)
            .next(DaemonEvent::ReportReceived);
        assert_eq!(state, DaemonState::Applying);
        assert_eq!(state.next(DaemonEvent::ApplyFinished), DaemonState::Listening);
    }

    #[test]
    fn test_device_lost_and_recovered() {
        let state = DaemonState::Listening.next(DaemonEvent::ReadFailed);
        assert_eq!(state, DaemonState::DeviceLost);
        assert_eq!(state.next(DaemonEvent::OpenFailed), DaemonState::DeviceLost);
        assert_eq!(state.next(DaemonEvent::DeviceOpened), DaemonState::Listening);
    }

    #[test]
    fn test_read_failure_while_applying() {
        assert_eq!(DaemonState::Applying.next(DaemonEvent::ReadFailed), DaemonState::DeviceLost);
    }

    #[test]
    fn test_start_without_device() {
        assert_eq!(DaemonState::Starting.next(DaemonEvent::OpenFailed), DaemonState::DeviceLost);
    }

    #[test]
    fn test_shutdown_from_any_state() {
        for state in [
            DaemonState::Starting,
            DaemonState::Listening,
            DaemonState::Applying,
            DaemonState::DeviceLost,
        ] {
            let state = state.next(DaemonEvent::ShutdownRequested);
            assert_eq!(state, DaemonState::ShuttingDown);
            assert_eq!(state.next(DaemonEvent::DeviceOpened), DaemonState::ShuttingDown);
            assert_eq!(state.next(DaemonEvent::CleanupFinished), DaemonState::Stopped);
        }
    }

    #[test]
    fn test_stopped_is_terminal() {
        assert_eq!(DaemonState::Stopped.next(DaemonEvent::DeviceOpened), DaemonState::Stopped);
        assert_eq!(DaemonState::Stopped.next(DaemonEvent::ShutdownRequested), DaemonState::Stopped);
    }

    #[test]
    fn test_irrelevant_events_are_ignored() {
        assert_eq!(DaemonState::Listening.next(DaemonEvent::ApplyFinished), DaemonState::Listening);
        assert_eq!(
            DaemonState::DeviceLost.next(DaemonEvent::ReportReceived),
            DaemonState::DeviceLost
        );
        assert_eq!(DaemonState::Starting.next(DaemonEvent::ReadFailed), DaemonState::Starting);
    }

    #[test]
    fn test_snapshot_serializes_state_name() {
        let snapshot = StateSnapshot { state: DaemonState::DeviceLost, ..Default::default() };
        let json = serde_json::to_value(&snapshot).unwrap();
        assert_eq!(json["state"], "device_lost");
        assert_eq!(json["curve"], "balanced");
    }
}
