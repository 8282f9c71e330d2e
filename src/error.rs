//! # Error Types
//!
//! Custom error types for the joystick driver using `thiserror`.
//!
//! Hardware acquisition timeouts are absent: a timed-out axis
//! keeps its previous cached value and is never reported to the caller.

use thiserror::Error;

/// Main error type for the joystick driver
#[derive(Debug, Error)]
pub enum JoystickError {
    /// Malformed or conflicting operation arguments
    #[error("Syntax error: {0}")]
    ConfigSyntax(String),

    /// Game port address could not be resolved or opened at startup
    #[error("Game port not found: {0}")]
    HardwareNotFound(String),

    /// Stick number outside the supported range
    #[error("Bad joystick number {0}")]
    InvalidStickNumber(u8),

    /// Read requested with an unknown reason code
    #[error("Unsupported reason code {0}")]
    UnsupportedReasonCode(u8),

    /// Only one corner of the two-phase calibration has been sampled
    #[error("Joystick calibration incomplete")]
    CalibrationIncomplete,

    /// Periodic acquisition could not be started
    #[error("Poll scheduler error: {0}")]
    Scheduler(String),

    /// Configuration file errors
    #[error("Configuration error: {0}")]
    Config(#[from] toml::de::Error),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for the joystick driver
pub type Result<T> = std::result::Result<T, JoystickError>;
