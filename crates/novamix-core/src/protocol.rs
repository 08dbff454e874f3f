//! Arctis Nova Pro Wireless base station protocol.
//!
//! Every report is 64 bytes. Byte 0 carries the direction, byte 1 the
//! option, and the remaining bytes the option's payload.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// SteelSeries USB Vendor ID
pub const STEELSERIES_VID: u16 = 0x1038;
/// Arctis Nova Pro Wireless base station Product ID
pub const NOVA_PRO_WIRELESS_PID: u16 = 0x12E0;
/// Vendor control interface (`bInterfaceNumber`)
pub const CONTROL_INTERFACE: i32 = 4;

/// Report payload length
pub const REPORT_LEN: usize = 64;

/// Direction byte for reports sent to the base station
pub const TX: u8 = 0x06;
/// Direction byte for reports received from the base station
pub const RX: u8 = 0x07;

/// Option bytes (byte 1 of a report)
pub mod opt {
    /// Headset volume attenuation, 1 byte
    pub const VOLUME: u8 = 37;
    /// Active EQ preset, 1 byte. Preset 4 is the custom preset.
    pub const EQ_PRESET: u8 = 46;
    /// EQ band and value, 2 bytes
    pub const EQ: u8 = 49;
    /// ChatMix game/chat levels, 2 bytes
    pub const CHATMIX: u8 = 69;
    /// Lets the volume dial switch into ChatMix mode
    pub const CHATMIX_ENABLE: u8 = 73;
    /// Sonar icon on the base station display
    pub const SONAR_ICON: u8 = 141;
}

/// EQ preset the base station uses for custom band values.
pub const CUSTOM_EQ_PRESET: u8 = 4;

const EQ_GAIN_OFFSET: f32 = 20.0;
const EQ_GAIN_MAX_DB: f32 = 10.0;

/// A decoded report from the base station.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "type")]
pub enum HeadsetMessage {
    /// ChatMix dial moved
    ChatMix { game: u8, chat: u8 },
    /// Headset volume changed (attenuation, higher is quieter)
    Volume { attenuation: u8 },
    /// An EQ band changed
    EqBand { band: u8, gain_db: f32 },
    /// EQ preset changed
    EqPreset { preset: u8 },
    /// ChatMix controls toggled
    ChatMixControls { enabled: bool },
    /// Sonar icon toggled
    SonarIcon { enabled: bool },
    /// Anything else
    Unknown { direction: u8, option: u8 },
}

impl HeadsetMessage {
    /// Decode a raw report.
    ///
    /// # Errors
    /// Returns an error if the report is shorter than the four bytes every
    /// known message needs.
    pub fn decode(report: &[u8]) -> Result<Self> {
        let [direction, option, a, b, ..] = *report else {
            return Err(Error::ShortReport(report.len()));
        };

        if direction != RX {
            return Ok(Self::Unknown { direction, option });
        }

        Ok(match option {
            opt::CHATMIX => Self::ChatMix { game: a, chat: b },
            opt::VOLUME => Self::Volume { attenuation: a },
            opt::EQ => Self::EqBand { band: a, gain_db: (f32::from(b) - EQ_GAIN_OFFSET) / 2.0 },
            opt::EQ_PRESET => Self::EqPreset { preset: a },
            opt::CHATMIX_ENABLE => Self::ChatMixControls { enabled: a != 0 },
            opt::SONAR_ICON => Self::SonarIcon { enabled: a != 0 },
            _ => Self::Unknown { direction, option },
        })
    }
}

impl fmt::Display for HeadsetMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ChatMix { game, chat } => write!(f, "Game Volume: {game} - Chat Volume: {chat}"),
            Self::Volume { attenuation } => write!(f, "Volume: -{attenuation}"),
            Self::EqBand { band, gain_db } => write!(f, "EQ: Bar: {band} - Value: {gain_db}"),
            Self::EqPreset { preset } => write!(f, "EQ Preset: {preset}"),
            Self::ChatMixControls { enabled } => write!(f, "ChatMix controls: {enabled}"),
            Self::SonarIcon { enabled } => write!(f, "Sonar icon: {enabled}"),
            Self::Unknown { direction, option } => {
                write!(f, "Unknown Message (direction {direction:#04x}, option {option})")
            }
        }
    }
}

/// A command sent to the base station.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "type")]
pub enum DeviceCommand {
    /// Enable or disable switching the dial into ChatMix mode
    SetChatMixControls { enabled: bool },
    /// Show or hide the Sonar icon
    SetSonarIcon { enabled: bool },
    /// Set headset volume attenuation
    SetVolume { attenuation: u8 },
    /// Select an EQ preset
    SetEqPreset { preset: u8 },
    /// Set a custom EQ band gain (-10.0 to 10.0 dB, 0.5 dB steps)
    SetEqBand { band: u8, gain_db: f32 },
}

impl DeviceCommand {
    /// Encode the command as a full-length report.
    ///
    /// # Errors
    /// Returns an error if an EQ gain is outside the supported range.
    pub fn encode(&self) -> Result<[u8; REPORT_LEN]> {
        let mut report = [0u8; REPORT_LEN];
        report[0] = TX;

        match *self {
            Self::SetChatMixControls { enabled } => {
                report[1] = opt::CHATMIX_ENABLE;
                report[2] = u8::from(enabled);
            }
            Self::SetSonarIcon { enabled } => {
                report[1] = opt::SONAR_ICON;
                report[2] = u8::from(enabled);
            }
            Self::SetVolume { attenuation } => {
                report[1] = opt::VOLUME;
                report[2] = attenuation;
            }
            Self::SetEqPreset { preset } => {
                report[1] = opt::EQ_PRESET;
                report[2] = preset;
            }
            Self::SetEqBand { band, gain_db } => {
                if !gain_db.is_finite() || gain_db.abs() > EQ_GAIN_MAX_DB {
                    return Err(Error::InvalidEqGain(gain_db));
                }
                report[1] = opt::EQ;
                report[2] = band;
                #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
                let raw = (gain_db * 2.0 + EQ_GAIN_OFFSET).round() as u8;
                report[3] = raw;
            }
        }

        Ok(report)
    }
}
