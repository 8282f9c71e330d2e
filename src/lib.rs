//! # Gameport Joystick Library
//!
//! Calibrated driver core for two dual-axis resistive joysticks on a
//! PC-style game port.
//!
//! The library times the discharge of each axis's one-shot against the
//! programmable interval timer, smooths the raw timings, auto-calibrates
//! centre and dead zones at start-up, supports two-corner limit
//! calibration, and scales positions into 8-bit or 16-bit readings. A
//! background poller keeps the cached positions fresh while clients read.

pub mod config;
pub mod driver;
pub mod error;
pub mod hardware;
pub mod joystick;
