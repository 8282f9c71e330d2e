//! # Joystick Signal Processing
//!
//! Pure building blocks between the game port and the driver:
//!
//! - [`axis`]: stick/axis identifiers and the bit sets the port speaks in
//! - [`timing`]: one strobe-and-wait acquisition cycle
//! - [`smoothing`]: the adaptive per-axis low-pass filter
//! - [`scaling`]: calibration data and raw-to-output conversion
//!
//! Nothing here holds shared state; the driver owns the tables and passes
//! them in.

pub mod axis;
pub mod scaling;
pub mod smoothing;
pub mod timing;

pub use axis::{Axis, AxisMask, PerAxis, Stick, StickSet, NUM_STICKS};
pub use scaling::{AxisCalibration, Polarity};
pub use smoothing::smooth;
pub use timing::{Acquisition, TimingReader};
