//! Daemon configuration.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use directories::ProjectDirs;
use novamix_core::protocol::{CONTROL_INTERFACE, NOVA_PRO_WIRELESS_PID, STEELSERIES_VID};
use novamix_core::{Backoff, MixCurve};
use novamix_hid::DeviceIds;
use novamix_pipewire::SinkPair;
use novamix_pipewire::loopback::sink_node_name;
use serde::{Deserialize, Deserializer, Serialize};
use tracing::info;

/// Daemon configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// Daemon settings
    #[serde(default)]
    pub daemon: DaemonConfig,
    /// Device settings
    #[serde(default)]
    pub device: DeviceConfig,
    /// ChatMix settings
    #[serde(default)]
    pub mix: MixConfig,
    /// Sink settings
    #[serde(default)]
    pub sinks: SinksConfig,
    /// Reconnect policy
    #[serde(default)]
    pub reconnect: ReconnectConfig,
}

/// Daemon-specific settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DaemonConfig {
    /// Log level for the novamix crates
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Log line format
    #[serde(default)]
    pub log_format: LogFormat,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self { log_level: default_log_level(), log_format: LogFormat::default() }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

/// Device settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceConfig {
    /// USB Vendor ID (hex)
    #[serde(default = "default_vid")]
    pub vendor_id: String,
    /// USB Product ID (hex)
    #[serde(default = "default_pid")]
    pub product_id: String,
    /// HID interface number
    #[serde(default = "default_interface")]
    pub interface: i32,
    /// Show the Sonar icon while the daemon runs
    #[serde(default = "default_true")]
    pub sonar_icon: bool,
    /// Let the dial switch into ChatMix mode while the daemon runs
    #[serde(default = "default_true")]
    pub chatmix_controls: bool,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            vendor_id: default_vid(),
            product_id: default_pid(),
            interface: default_interface(),
            sonar_icon: true,
            chatmix_controls: true,
        }
    }
}

impl DeviceConfig {
    /// Parsed USB identity.
    ///
    /// # Errors
    /// Returns an error if either id is not a 16-bit hex number.
    pub fn ids(&self) -> Result<DeviceIds> {
        Ok(DeviceIds {
            vendor_id: parse_hex_id(&self.vendor_id).context("Invalid device.vendor_id")?,
            product_id: parse_hex_id(&self.product_id).context("Invalid device.product_id")?,
            interface: self.interface,
        })
    }
}

fn default_vid() -> String {
    format!("{STEELSERIES_VID:04x}")
}

fn default_pid() -> String {
    format!("{NOVA_PRO_WIRELESS_PID:04x}")
}

fn default_interface() -> i32 {
    CONTROL_INTERFACE
}

fn default_true() -> bool {
    true
}

/// Parse `"1038"` or `"0x1038"`.
fn parse_hex_id(value: &str) -> Result<u16> {
    let value = value.trim();
    let digits = value.strip_prefix("0x").or_else(|| value.strip_prefix("0X")).unwrap_or(value);
    u16::from_str_radix(digits, 16).with_context(|| format!("{value:?} is not a hex USB id"))
}

/// ChatMix settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MixConfig {
    /// Dial-to-volume curve.
    ///
    /// `"balanced"` (default) mirrors the base station: both sinks stay at
    /// 100% until the dial passes center, so the midpoint is 100/100.
    /// `"linear"` is a plain crossfade with a 50/50 midpoint.
    #[serde(default)]
    pub curve: MixCurve,
}

/// Which sink backend sets volumes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// Native PipeWire, falling back to pactl if the connection fails
    #[default]
    PipeWire,
    /// pactl only
    Pactl,
}

/// Sink settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SinksConfig {
    #[serde(default)]
    pub backend: BackendKind,
    /// Game sink. A loopback name when `create_loopbacks` is set, otherwise
    /// the node name of an existing sink.
    #[serde(default = "default_game_sink")]
    pub game: String,
    /// Chat sink, same rules as `game`
    #[serde(default = "default_chat_sink")]
    pub chat: String,
    /// Real sink the loopbacks play into. Defaults to the headset's own
    /// output; an empty string follows the system default sink instead.
    #[serde(default = "default_output_sink", deserialize_with = "empty_as_none")]
    pub output: Option<String>,
    /// Spawn `pw-loopback` sinks for game and chat
    #[serde(default = "default_true")]
    pub create_loopbacks: bool,
}

impl Default for SinksConfig {
    fn default() -> Self {
        Self {
            backend: BackendKind::default(),
            game: default_game_sink(),
            chat: default_chat_sink(),
            output: default_output_sink(),
            create_loopbacks: true,
        }
    }
}

impl SinksConfig {
    /// Node names the volumes are applied to.
    #[must_use]
    pub fn pair(&self) -> SinkPair {
        if self.create_loopbacks {
            SinkPair { game: sink_node_name(&self.game), chat: sink_node_name(&self.chat) }
        } else {
            SinkPair { game: self.game.clone(), chat: self.chat.clone() }
        }
    }
}

fn empty_as_none<'de, D>(deserializer: D) -> std::result::Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = String::deserialize(deserializer)?;
    let value = value.trim();
    Ok((!value.is_empty()).then(|| value.to_string()))
}

fn default_game_sink() -> String {
    "NovaGame".to_string()
}

fn default_chat_sink() -> String {
    "NovaChat".to_string()
}

#[allow(clippy::unnecessary_wraps)]
fn default_output_sink() -> Option<String> {
    Some("alsa_output.usb-SteelSeries_Arctis_Nova_Pro_Wireless-00.7.iec958-stereo".to_string())
}

/// Reconnect policy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReconnectConfig {
    #[serde(default = "default_initial_ms")]
    pub initial_ms: u64,
    #[serde(default = "default_max_ms")]
    pub max_ms: u64,
    #[serde(default = "default_multiplier")]
    pub multiplier: f64,
    /// Give up (and exit non-zero) after this many failed attempts
    #[serde(default)]
    pub max_attempts: Option<u32>,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            initial_ms: default_initial_ms(),
            max_ms: default_max_ms(),
            multiplier: default_multiplier(),
            max_attempts: None,
        }
    }
}

impl ReconnectConfig {
    #[must_use]
    pub fn backoff(&self) -> Backoff {
        Backoff::new(
            Duration::from_millis(self.initial_ms),
            Duration::from_millis(self.max_ms),
            self.multiplier,
            self.max_attempts,
        )
    }
}

fn default_initial_ms() -> u64 {
    500
}

fn default_max_ms() -> u64 {
    30_000
}

fn default_multiplier() -> f64 {
    2.0
}

/// Load configuration from file or defaults.
pub fn load_config() -> Result<Config> {
    load_from(&config_path()?)
}

/// Load configuration from a specific file, or defaults if it is missing.
pub fn load_from(config_path: &Path) -> Result<Config> {
    if config_path.exists() {
        let content = std::fs::read_to_string(config_path)
            .with_context(|| format!("Failed to read config file: {config_path:?}"))?;
        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {config_path:?}"))?;
        config.device.ids()?;
        Ok(config)
    } else {
        info!(?config_path, "Config file not found, using defaults");
        Ok(Config::default())
    }
}

/// Get the configuration file path.
fn config_path() -> Result<PathBuf> {
    let dirs = ProjectDirs::from("com", "novamix", "Novamix")
        .context("Could not determine config directory")?;
    Ok(dirs.config_dir().join("config.toml"))
}
