//! # Scaling Engine
//!
//! Converts raw axis timings into calibrated 8-bit and 16-bit positions using
//! fixed-point scalers derived from each axis's calibration.
//!
//! ```text
//!   min              ctr_low   ctr  ctr_high             max
//!    |        <---------|       |      |--------->        |
//!     \__  __/           \_____  _____/           \__  __/
//!        \/                    \/                    \/
//!     end zone            centre zone             end zone
//! ```
//!
//! Timings inside the centre zone map to the centre value. Beyond it, the
//! offset from the zone edge is multiplied by a scaler with
//! [`SCALER_FRAC_SHIFT`] fractional bits, chosen so that the inner edge of
//! the end zone lands on full deflection. Timings inside an end zone
//! saturate at full deflection. Everything is clamped to the output range.
//!
//! ## Polarity
//!
//! X output grows with timing; Y output shrinks. This follows the wiring of
//! the sticks (longer Y timing means the stick is pulled back).

use tracing::debug;

use super::axis::Axis;

/// Fractional bits in a scaler.
pub const SCALER_FRAC_SHIFT: u32 = 14;

/// 16-bit output centre.
pub const CENTRE_16: u16 = 0x7fff;

/// Largest 8-bit output magnitude.
pub const LIMIT_8: i8 = 127;

/// Numerator of every scaler: half the 16-bit range in fixed point.
const FULL_SCALE: i64 = 32768 << SCALER_FRAC_SHIFT;

/// Shift taking `scaler * offset` to 8-bit units.
const SHIFT_8: u32 = SCALER_FRAC_SHIFT + 8;

/// Direction in which a physical axis reports increasing timing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Polarity {
    /// Longer timing, larger output
    Direct,
    /// Longer timing, smaller output
    Inverted,
}

impl Axis {
    /// Polarity of the axis as wired on the game port.
    #[must_use]
    pub fn polarity(self) -> Polarity {
        match self {
            Axis::X => Polarity::Direct,
            Axis::Y => Polarity::Inverted,
        }
    }
}

/// Calibration of one stick axis, in raw timing ticks.
///
/// The public fields are what the calibration commands set. The derived
/// zone edges and scalers only change through
/// [`AxisCalibration::recalc_coefficients`], so conversions keep using the
/// old coefficients until that is called.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AxisCalibration {
    pub min: u32,
    pub ctr: u32,
    pub max: u32,
    /// Half-width of the centre dead zone.
    pub ctr_deadzone: u32,
    /// Width of each end dead zone.
    pub end_deadzone: u32,
    /// Smoothing width used by the signal smoother.
    pub smooth_width: u32,

    ctr_low: i64,
    ctr_high: i64,
    low_end: i64,
    high_end: i64,
    low_scaler: i64,
    high_scaler: i64,
}

impl Default for AxisCalibration {
    /// Provisional calibration used before the first reinit.
    fn default() -> Self {
        Self::new(0, 800, 1600)
    }
}

impl AxisCalibration {
    /// Calibration with the given limits, no zones and no smoothing.
    ///
    /// Coefficients are computed with both zone kinds enabled.
    #[must_use]
    pub fn new(min: u32, ctr: u32, max: u32) -> Self {
        let mut calibration = Self {
            min,
            ctr,
            max,
            ctr_deadzone: 0,
            end_deadzone: 0,
            smooth_width: 0,
            ctr_low: 0,
            ctr_high: 0,
            low_end: 0,
            high_end: 0,
            low_scaler: 0,
            high_scaler: 0,
        };
        calibration.recalc_coefficients(true, true);
        calibration
    }

    /// Recomputes the zone edges and scalers from the public fields.
    ///
    /// A non-positive span yields a scaler of zero, which pins that side of
    /// the axis to the centre value.
    pub fn recalc_coefficients(&mut self, ctr_zones: bool, end_zones: bool) {
        let ctr_dz = if ctr_zones { i64::from(self.ctr_deadzone) } else { 0 };
        let end_dz = if end_zones { i64::from(self.end_deadzone) } else { 0 };

        self.ctr_low = i64::from(self.ctr) - ctr_dz;
        self.ctr_high = i64::from(self.ctr) + ctr_dz;
        self.low_end = i64::from(self.min) + end_dz;
        self.high_end = i64::from(self.max) - end_dz;
        self.low_scaler = scaler(self.ctr_low - self.low_end);
        self.high_scaler = scaler(self.high_end - self.ctr_high);

        debug!(
            "Coefficients: centre {}..{}, low scaler {}/16384, high scaler {}/16384",
            self.ctr_low, self.ctr_high, self.low_scaler, self.high_scaler
        );
    }

    /// Lower edge of the centre zone.
    #[must_use]
    pub fn ctr_low(&self) -> i64 {
        self.ctr_low
    }

    /// Upper edge of the centre zone.
    #[must_use]
    pub fn ctr_high(&self) -> i64 {
        self.ctr_high
    }

    /// Fixed-point scaler below the centre zone.
    #[must_use]
    pub fn low_scaler(&self) -> i64 {
        self.low_scaler
    }

    /// Fixed-point scaler above the centre zone.
    #[must_use]
    pub fn high_scaler(&self) -> i64 {
        self.high_scaler
    }

    /// Converts a raw timing to a signed 8-bit position (`-127..=127`).
    ///
    /// # Examples
    ///
    /// ```
    /// use gameport_joystick::joystick::scaling::{AxisCalibration, Polarity};
    ///
    /// let mut cal = AxisCalibration::new(0, 703, 1406);
    /// cal.ctr_deadzone = 48;
    /// cal.recalc_coefficients(true, true);
    ///
    /// assert_eq!(cal.convert8(703, Polarity::Direct), 0);
    /// assert_eq!(cal.convert8(0, Polarity::Direct), -127);
    /// assert_eq!(cal.convert8(1406, Polarity::Direct), 127);
    /// ```
    #[must_use]
    pub fn convert8(&self, raw: u32, polarity: Polarity) -> i8 {
        let offset = self.offset(raw, SHIFT_8, i64::from(LIMIT_8));
        let value = match polarity {
            Polarity::Direct => offset,
            Polarity::Inverted => -offset,
        };
        value.clamp(-i64::from(LIMIT_8), i64::from(LIMIT_8)) as i8
    }

    /// Converts a raw timing to an unsigned 16-bit position centred on `0x7fff`.
    ///
    /// # Examples
    ///
    /// ```
    /// use gameport_joystick::joystick::scaling::{AxisCalibration, Polarity};
    ///
    /// let mut cal = AxisCalibration::new(0, 703, 1406);
    /// cal.ctr_deadzone = 48;
    /// cal.recalc_coefficients(true, true);
    ///
    /// assert_eq!(cal.convert16(703, Polarity::Direct), 0x7fff);
    /// assert_eq!(cal.convert16(0, Polarity::Direct), 0x0000);
    /// assert_eq!(cal.convert16(1406, Polarity::Direct), 0xffff);
    /// ```
    #[must_use]
    pub fn convert16(&self, raw: u32, polarity: Polarity) -> u16 {
        let offset = self.offset(raw, SCALER_FRAC_SHIFT, 32768);
        let centre = i64::from(CENTRE_16);
        let value = match polarity {
            Polarity::Direct => centre + offset,
            Polarity::Inverted => centre - offset,
        };
        value.clamp(0, i64::from(u16::MAX)) as u16
    }

    /// Signed offset from centre before polarity, `full` at saturation.
    fn offset(&self, raw: u32, shift: u32, full: i64) -> i64 {
        let raw = i64::from(raw);

        if raw > self.ctr_high {
            if self.high_scaler == 0 {
                0
            } else if raw >= self.high_end {
                full
            } else {
                (self.high_scaler * (raw - self.ctr_high)) >> shift
            }
        } else if raw < self.ctr_low {
            if self.low_scaler == 0 {
                0
            } else if raw <= self.low_end {
                -full
            } else {
                -((self.low_scaler * (self.ctr_low - raw)) >> shift)
            }
        } else {
            0
        }
    }
}

/// `FULL_SCALE / span`, or zero for an empty or inverted span.
fn scaler(span: i64) -> i64 {
    if span > 0 {
        FULL_SCALE / span
    } else {
        0
    }
}
