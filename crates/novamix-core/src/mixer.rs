//! ChatMix translation: dial position to game/chat volume levels.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// A sink volume in percent, always within `0..=100`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Volume(u8);

impl Volume {
    /// Silence.
    pub const MIN: Self = Self(0);
    /// Full volume.
    pub const MAX: Self = Self(100);

    /// Create a volume, clamping anything outside `0..=100`.
    #[must_use]
    pub fn new(percent: i32) -> Self {
        Self(u8::try_from(percent.clamp(0, 100)).unwrap_or(100))
    }

    /// Volume as an integer percentage.
    #[must_use]
    pub fn percent(self) -> u8 {
        self.0
    }

    /// Volume as a linear factor (0.0 - 1.0).
    #[must_use]
    pub fn linear(self) -> f32 {
        f32::from(self.0) / 100.0
    }

    /// Volume on PipeWire's cubic channel-volume scale.
    ///
    /// `pactl set-sink-volume <sink> 50%` stores `0.5^3` in the node's
    /// `channelVolumes`, so native writes use the same mapping.
    #[must_use]
    pub fn cubic(self) -> f32 {
        self.linear().powi(3)
    }
}

impl Default for Volume {
    fn default() -> Self {
        Self::MAX
    }
}

impl fmt::Display for Volume {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}%", self.0)
    }
}

/// Position of the ChatMix dial.
///
/// Measured in half-percent steps: 0 is fully towards game, 200 is fully
/// towards chat, 100 is centered. The half-percent resolution lets the
/// headset's own two-byte report round-trip through a ratio without loss.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MixRatio(u8);

impl MixRatio {
    /// Dial fully towards game.
    pub const GAME: Self = Self(0);
    /// Dial centered.
    pub const CENTER: Self = Self(100);
    /// Dial fully towards chat.
    pub const CHAT: Self = Self(200);

    /// Create a ratio from half-percent steps, clamping to `0..=200`.
    #[must_use]
    pub fn new(steps: i32) -> Self {
        Self(u8::try_from(steps.clamp(0, 200)).unwrap_or(200))
    }

    /// Map a raw control value from a device range onto the ratio scale.
    ///
    /// Values outside `min..=max` are clamped to the nearest end.
    ///
    /// # Errors
    /// Returns an error if `min` is not strictly below `max`.
    pub fn from_raw(raw: i32, min: i32, max: i32) -> Result<Self> {
        if min >= max {
            return Err(Error::InvalidRange { min, max });
        }

        let span = i64::from(max) - i64::from(min);
        let offset = i64::from(raw.clamp(min, max)) - i64::from(min);
        let steps = (offset * 200 + span / 2) / span;
        Ok(Self::new(i32::try_from(steps).unwrap_or(200)))
    }

    /// Derive a ratio from the headset's native game/chat pair.
    ///
    /// The base station reports one side at 100 and the other attenuated.
    /// Levels above 100 are clamped.
    #[must_use]
    pub fn from_levels(game: u8, chat: u8) -> Self {
        let game = i32::from(game.min(100));
        let chat = i32::from(chat.min(100));
        Self::new(chat - game + 100)
    }

    /// Raw half-percent steps.
    #[must_use]
    pub fn steps(self) -> u8 {
        self.0
    }
}

impl Default for MixRatio {
    fn default() -> Self {
        Self::CENTER
    }
}

/// Target volumes for the game and chat sinks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct MixLevels {
    /// Game sink volume
    pub game: Volume,
    /// Chat sink volume
    pub chat: Volume,
}

/// Mapping from dial position to sink volumes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MixCurve {
    /// Both sides stay at full volume until the dial passes center, then
    /// the far side fades out. This is what the base station itself reports.
    #[default]
    Balanced,
    /// Straight crossfade: the two volumes always add up to 100.
    Linear,
}

impl MixCurve {
    /// Translate a dial position into game/chat volumes.
    #[must_use]
    pub fn translate(self, ratio: MixRatio) -> MixLevels {
        let r = i32::from(ratio.steps());
        match self {
            Self::Balanced => MixLevels { game: Volume::new(200 - r), chat: Volume::new(r) },
            Self::Linear => {
                let chat = (r + 1) / 2;
                MixLevels { game: Volume::new(100 - chat), chat: Volume::new(chat) }
            }
        }
    }
}

impl FromStr for MixCurve {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "balanced" => Ok(Self::Balanced),
            "linear" => Ok(Self::Linear),
            other => Err(Error::UnknownCurve(other.to_string())),
        }
    }
}

impl fmt::Display for MixCurve {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Balanced => f.write_str("balanced"),
            Self::Linear => f.write_str("linear"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use proptest::prelude::*;

    fn levels(game: i32, chat: i32) -> MixLevels {
        MixLevels { game: Volume::new(game), chat: Volume::new(chat) }
    }

    #[test]
    fn test_volume_clamps() {
        assert_eq!(Volume::new(-5), Volume::MIN);
        assert_eq!(Volume::new(250), Volume::MAX);
        assert_eq!(Volume::new(42).percent(), 42);
        assert_eq!(Volume::new(42).to_string(), "42%");
    }

    #[test]
    fn test_volume_cubic_scale() {
        assert!((Volume::new(50).cubic() - 0.125).abs() < f32::EPSILON);
        assert!((Volume::MAX.cubic() - 1.0).abs() < f32::EPSILON);
        assert!(Volume::MIN.cubic().abs() < f32::EPSILON);
    }

    #[test]
    fn test_linear_scenarios() {
        let curve = MixCurve::Linear;
        assert_eq!(curve.translate(MixRatio::GAME), levels(100, 0));
        assert_eq!(curve.translate(MixRatio::CHAT), levels(0, 100));
        assert_eq!(curve.translate(MixRatio::CENTER), levels(50, 50));
    }

    #[test]
    fn test_balanced_scenarios() {
        let curve = MixCurve::Balanced;
        assert_eq!(curve.translate(MixRatio::GAME), levels(100, 0));
        assert_eq!(curve.translate(MixRatio::CHAT), levels(0, 100));
        assert_eq!(curve.translate(MixRatio::CENTER), levels(100, 100));
    }

    #[test]
    fn test_raw_range_scenarios() {
        let min = MixRatio::from_raw(0, 0, 1023).unwrap();
        let max = MixRatio::from_raw(1023, 0, 1023).unwrap();
        let mid = MixRatio::from_raw(512, 0, 1023).unwrap();

        assert_eq!(MixCurve::Linear.translate(min), levels(100, 0));
        assert_eq!(MixCurve::Linear.translate(max), levels(0, 100));

        let mid = MixCurve::Linear.translate(mid);
        assert!((i32::from(mid.game.percent()) - 50).abs() <= 1);
        assert!((i32::from(mid.chat.percent()) - 50).abs() <= 1);
    }

    #[test]
    fn test_raw_out_of_range_is_clamped() {
        assert_eq!(MixRatio::from_raw(-400, 0, 100).unwrap(), MixRatio::GAME);
        assert_eq!(MixRatio::from_raw(9000, 0, 100).unwrap(), MixRatio::CHAT);
    }

    #[test]
    fn test_raw_invalid_range() {
        assert_matches!(
            MixRatio::from_raw(5, 10, 10),
            Err(Error::InvalidRange { min: 10, max: 10 })
        );
        assert_matches!(MixRatio::from_raw(5, 20, 10), Err(Error::InvalidRange { .. }));
    }

    #[test]
    fn test_balanced_reproduces_device_pair() {
        // Dial turned towards chat: game attenuated, chat full
        let ratio = MixRatio::from_levels(37, 100);
        assert_eq!(MixCurve::Balanced.translate(ratio), levels(37, 100));

        // Dial turned towards game
        let ratio = MixRatio::from_levels(100, 64);
        assert_eq!(MixCurve::Balanced.translate(ratio), levels(100, 64));
    }

    #[test]
    fn test_from_levels_clamps_overrange_bytes() {
        assert_eq!(MixRatio::from_levels(255, 255), MixRatio::CENTER);
        assert_eq!(MixRatio::from_levels(0, 255), MixRatio::CHAT);
    }

    #[test]
    fn test_curve_parse() {
        assert_eq!("Linear".parse::<MixCurve>().unwrap(), MixCurve::Linear);
        assert_eq!("balanced".parse::<MixCurve>().unwrap(), MixCurve::Balanced);
        assert_matches!("log".parse::<MixCurve>(), Err(Error::UnknownCurve(_)));
    }

    fn any_curve() -> impl Strategy<Value = MixCurve> {
        prop_oneof![Just(MixCurve::Balanced), Just(MixCurve::Linear)]
    }

    proptest! {
        #[test]
        fn prop_translate_stays_in_range(curve in any_curve(), steps in any::<i32>()) {
            let out = curve.translate(MixRatio::new(steps));
            prop_assert!(out.game.percent() <= 100);
            prop_assert!(out.chat.percent() <= 100);
        }

        #[test]
        fn prop_translate_is_monotonic(curve in any_curve(), a in 0i32..=200, b in 0i32..=200) {
            let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
            let lo = curve.translate(MixRatio::new(lo));
            let hi = curve.translate(MixRatio::new(hi));
            prop_assert!(hi.game <= lo.game);
            prop_assert!(hi.chat >= lo.chat);
        }

        #[test]
        fn prop_translate_is_deterministic(curve in any_curve(), steps in 0i32..=200) {
            let ratio = MixRatio::new(steps);
            prop_assert_eq!(curve.translate(ratio), curve.translate(ratio));
        }

        #[test]
        fn prop_from_raw_is_total(raw in any::<i32>(), min in -1000i32..1000, span in 1i32..5000) {
            let ratio = MixRatio::from_raw(raw, min, min + span).unwrap();
            prop_assert!(ratio.steps() <= 200);
        }

        #[test]
        fn prop_linear_sums_to_full(steps in 0i32..=200) {
            let out = MixCurve::Linear.translate(MixRatio::new(steps));
            prop_assert_eq!(u32::from(out.game.percent()) + u32::from(out.chat.percent()), 100);
        }
    }
}
