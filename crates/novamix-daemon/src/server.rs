//! Request handling for the IPC server.

use novamix_core::{Command, DeviceCommand, StateSnapshot};
use novamix_ipc::messages::codes;
use novamix_ipc::{ErrorInfo, Method};
use serde_json::{Value, json};
use tracing::{debug, info};

/// Result of handling a request.
pub struct HandleResult {
    /// Response to send back to the client
    pub response: Result<Value, ErrorInfo>,
    /// Command for the main loop to execute, if any
    pub command: Option<Command>,
}

impl HandleResult {
    fn reply(response: Result<Value, ErrorInfo>) -> Self {
        Self { response, command: None }
    }

    fn with_command(response: Value, command: Command) -> Self {
        Self { response: Ok(response), command: Some(command) }
    }
}

/// Handle an IPC request against the current state snapshot.
///
/// Queries are answered directly. Device writes are validated and returned
/// as a [`Command`]; the main loop performs the write and may still replace
/// the response with an error.
pub fn handle_request(method: &Method, state: &StateSnapshot) -> HandleResult {
    match method {
        Method::GetState => HandleResult::reply(to_json(state)),

        Method::GetDeviceStatus => HandleResult::reply(Ok(json!({
            "connected": state.device_connected,
            "state": state.state,
            "serial": state.device_serial,
            "path": state.device_path,
            "reconnect_attempts": state.reconnect_attempts,
            "headset": state.headset,
        }))),

        Method::GetMix => HandleResult::reply(Ok(json!({
            "curve": state.curve,
            "ratio": state.ratio,
            "levels": state.levels,
            "game_sink": state.game_sink,
            "chat_sink": state.chat_sink,
            "missing_sinks": state.missing_sinks,
        }))),

        Method::SetSonarIcon { enabled } => {
            device_command(state, DeviceCommand::SetSonarIcon { enabled: *enabled })
        }

        Method::SetChatMixControls { enabled } => {
            device_command(state, DeviceCommand::SetChatMixControls { enabled: *enabled })
        }

        Method::SetHeadsetVolume { attenuation } => {
            device_command(state, DeviceCommand::SetVolume { attenuation: *attenuation })
        }

        Method::SetEqPreset { preset } => {
            device_command(state, DeviceCommand::SetEqPreset { preset: *preset })
        }

        Method::SetEqBand { band, gain_db } => {
            device_command(state, DeviceCommand::SetEqBand { band: *band, gain_db: *gain_db })
        }

        // Answered by the IPC server per connection; only reachable from a
        // misbehaving caller
        Method::Subscribe { events } | Method::Unsubscribe { events } => {
            debug!(?events, "Subscription request reached the daemon loop");
            HandleResult::reply(Ok(json!({"success": true})))
        }

        Method::Shutdown => {
            info!("Shutdown requested via IPC");
            HandleResult::with_command(json!({"success": true}), Command::Shutdown)
        }
    }
}

fn device_command(state: &StateSnapshot, command: DeviceCommand) -> HandleResult {
    if let Err(e) = command.encode() {
        return HandleResult::reply(Err(ErrorInfo::new(codes::INVALID_PARAMS, e.to_string())));
    }

    if !state.device_connected {
        return HandleResult::reply(Err(ErrorInfo::new(
            codes::DEVICE_UNAVAILABLE,
            format!("Base station not connected (state: {})", state.state),
        )));
    }

    debug!(?command, "Device command accepted");
    HandleResult::with_command(json!({"success": true}), Command::Device(command))
}

fn to_json(value: &impl serde::Serialize) -> Result<Value, ErrorInfo> {
    serde_json::to_value(value).map_err(|e| ErrorInfo::new(codes::DEVICE_ERROR, e.to_string()))
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use novamix_core::{DaemonState, MixCurve, MixRatio};

    use super::*;

    fn connected() -> StateSnapshot {
        StateSnapshot {
            state: DaemonState::Listening,
            device_connected: true,
            device_serial: Some("ABC123".into()),
            ..Default::default()
        }
    }

    #[test]
    fn test_get_state_returns_snapshot() {
        let result = handle_request(&Method::GetState, &connected());

        let value = result.response.unwrap();
        assert_eq!(value["state"], "listening");
        assert_eq!(value["device_connected"], true);
        assert!(result.command.is_none());
    }

    #[test]
    fn test_get_device_status() {
        let value = handle_request(&Method::GetDeviceStatus, &connected()).response.unwrap();

        assert_eq!(value["connected"], true);
        assert_eq!(value["serial"], "ABC123");
        assert_eq!(value["state"], "listening");
    }

    #[test]
    fn test_get_mix() {
        let curve = MixCurve::Linear;
        let ratio = MixRatio::new(150);
        let state = StateSnapshot {
            curve,
            ratio: Some(ratio),
            levels: Some(curve.translate(ratio)),
            game_sink: "input.NovaGame".into(),
            missing_sinks: vec!["input.NovaChat".into()],
            ..connected()
        };

        let value = handle_request(&Method::GetMix, &state).response.unwrap();
        assert_eq!(value["curve"], "linear");
        assert_eq!(value["ratio"], 150);
        assert_eq!(value["levels"]["chat"], 75);
        assert_eq!(value["levels"]["game"], 25);
        assert_eq!(value["missing_sinks"][0], "input.NovaChat");
    }

    #[test]
    fn test_device_commands_need_a_device() {
        let state = StateSnapshot { state: DaemonState::DeviceLost, ..Default::default() };
        let result = handle_request(&Method::SetSonarIcon { enabled: true }, &state);

        assert_matches!(result.response, Err(ErrorInfo { code: codes::DEVICE_UNAVAILABLE, .. }));
        assert!(result.command.is_none());
    }

    #[test]
    fn test_device_command_is_forwarded() {
        let result = handle_request(&Method::SetHeadsetVolume { attenuation: 12 }, &connected());

        assert!(result.response.is_ok());
        assert_eq!(
            result.command,
            Some(Command::Device(DeviceCommand::SetVolume { attenuation: 12 }))
        );
    }

    #[test]
    fn test_out_of_range_eq_gain_is_rejected() {
        let result = handle_request(&Method::SetEqBand { band: 3, gain_db: 12.5 }, &connected());

        assert_matches!(result.response, Err(ErrorInfo { code: codes::INVALID_PARAMS, .. }));
        assert!(result.command.is_none());
    }

    #[test]
    fn test_shutdown_returns_command() {
        let result = handle_request(&Method::Shutdown, &StateSnapshot::default());

        assert!(result.response.is_ok());
        assert_eq!(result.command, Some(Command::Shutdown));
    }
}
