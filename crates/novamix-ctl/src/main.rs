//! novamix-ctl - talk to a running Novamix daemon.

use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand, ValueEnum};
use novamix_ipc::{Event, EventType, HeadsetReportData, IpcClient, Method, socket_path};
use serde_json::Value;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "novamix-ctl")]
#[command(about = "Control the Novamix ChatMix daemon")]
#[command(version)]
struct Cli {
    /// Daemon socket (defaults to $XDG_RUNTIME_DIR/novamix/daemon.sock)
    #[arg(long)]
    socket: Option<PathBuf>,

    #[command(subcommand)]
    command: Cmd,
}

#[derive(Debug, Subcommand)]
enum Cmd {
    /// Show base station and daemon status
    Status,
    /// Show the current ChatMix position and sink volumes
    Mix,
    /// Print daemon events as they happen
    Watch {
        /// Only print headset reports, one line each
        #[arg(long)]
        raw: bool,
    },
    /// Show or hide the Sonar icon on the base station
    SonarIcon { state: Toggle },
    /// Enable or disable the ChatMix dial
    ChatmixControls { state: Toggle },
    /// Set headset volume attenuation (0 is loudest)
    Volume { attenuation: u8 },
    /// Select an EQ preset
    EqPreset { preset: u8 },
    /// Set the gain of one band of the custom EQ
    EqBand {
        band: u8,
        /// Gain in dB, -10 to 10 in 0.5 steps
        #[arg(allow_negative_numbers = true)]
        gain_db: f32,
    },
    /// Stop the daemon
    Shutdown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Toggle {
    On,
    Off,
}

impl Toggle {
    fn enabled(self) -> bool {
        self == Self::On
    }
}

impl Cmd {
    /// The request a one-shot command sends. `None` for `watch`.
    fn method(&self) -> Option<Method> {
        let method = match *self {
            Self::Status => Method::GetDeviceStatus,
            Self::Mix => Method::GetMix,
            Self::Watch { .. } => return None,
            Self::SonarIcon { state } => Method::SetSonarIcon { enabled: state.enabled() },
            Self::ChatmixControls { state } => {
                Method::SetChatMixControls { enabled: state.enabled() }
            }
            Self::Volume { attenuation } => Method::SetHeadsetVolume { attenuation },
            Self::EqPreset { preset } => Method::SetEqPreset { preset },
            Self::EqBand { band, gain_db } => Method::SetEqBand { band, gain_db },
            Self::Shutdown => Method::Shutdown,
        };
        Some(method)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let socket = cli.socket.unwrap_or_else(socket_path);

    let mut client = IpcClient::connect(&socket)
        .await
        .with_context(|| format!("Failed to connect to the daemon at {}", socket.display()))?;

    match cli.command.method() {
        Some(method) => {
            let result = client.call(method).await?;
            print_result(&result)
        }
        None => {
            let raw = matches!(cli.command, Cmd::Watch { raw: true });
            watch(&mut client, raw).await
        }
    }
}

fn print_result(result: &Value) -> Result<()> {
    match result {
        Value::Null => {}
        Value::Object(map) if map.is_empty() => {}
        other => println!("{}", serde_json::to_string_pretty(other)?),
    }
    Ok(())
}

async fn watch(client: &mut IpcClient, raw: bool) -> Result<()> {
    let events = if raw { vec![EventType::HeadsetReport] } else { Vec::new() };
    client.call(Method::Subscribe { events }).await?;

    while let Some(event) = client.events().recv().await {
        println!("{}", format_event(&event, raw)?);
    }
    bail!("Daemon closed the connection")
}

fn format_event(event: &Event, raw: bool) -> Result<String> {
    if raw && event.event == EventType::HeadsetReport {
        let report: HeadsetReportData = serde_json::from_value(event.data.clone())?;
        return Ok(report.text);
    }
    Ok(serde_json::to_string(event)?)
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use serde_json::json;

    use super::*;

    fn parse(args: &[&str]) -> Cli {
        Cli::try_parse_from(std::iter::once("novamix-ctl").chain(args.iter().copied())).unwrap()
    }

    #[test]
    fn test_toggle_commands() {
        assert_matches!(
            parse(&["sonar-icon", "off"]).command.method(),
            Some(Method::SetSonarIcon { enabled: false })
        );
        assert_matches!(
            parse(&["chatmix-controls", "on"]).command.method(),
            Some(Method::SetChatMixControls { enabled: true })
        );
        assert!(Cli::try_parse_from(["novamix-ctl", "sonar-icon", "maybe"]).is_err());
    }

    #[test]
    fn test_negative_eq_gain() {
        let method = parse(&["eq-band", "3", "-4.5"]).command.method();
        assert_matches!(
            method,
            Some(Method::SetEqBand { band: 3, gain_db }) if (gain_db + 4.5).abs() < f32::EPSILON
        );
    }

    #[test]
    fn test_watch_has_no_request() {
        let cli = parse(&["--socket", "/tmp/n.sock", "watch", "--raw"]);
        assert_eq!(cli.socket, Some(PathBuf::from("/tmp/n.sock")));
        assert_matches!(cli.command, Cmd::Watch { raw: true });
        assert!(cli.command.method().is_none());
    }

    #[test]
    fn test_volume_out_of_range_rejected() {
        assert!(Cli::try_parse_from(["novamix-ctl", "volume", "300"]).is_err());
    }

    #[test]
    fn test_raw_headset_report() {
        let event = Event {
            event: EventType::HeadsetReport,
            data: json!({
                "message": {"type": "chat_mix", "game": 100, "chat": 40},
                "text": "ChatMix game=100 chat=40",
            }),
        };
        assert_eq!(format_event(&event, true).unwrap(), "ChatMix game=100 chat=40");
        assert!(format_event(&event, false).unwrap().starts_with("{\"event\":\"headset_report\""));
    }
}
