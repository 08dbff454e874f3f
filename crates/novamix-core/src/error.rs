//! Error types for Novamix core.

use thiserror::Error;

/// Core error type for Novamix operations.
#[derive(Debug, Error)]
pub enum Error {
    #[error("Invalid raw range: min {min} is not below max {max}")]
    InvalidRange { min: i32, max: i32 },

    #[error("Unknown mix curve: {0}")]
    UnknownCurve(String),

    #[error("EQ gain out of range: {0} dB (must be -10.0 to 10.0)")]
    InvalidEqGain(f32),

    #[error("Report too short: {0} bytes")]
    ShortReport(usize),
}

/// Result type alias for Novamix core operations.
pub type Result<T> = std::result::Result<T, Error>;
