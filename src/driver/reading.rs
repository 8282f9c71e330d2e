//! Read results and the calibration report.

use std::fmt;

use crate::error::{JoystickError, Result};
use crate::joystick::scaling::CENTRE_16;
use crate::joystick::{Axis, Stick};

/// Which output form a Read operation returns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ReadReason {
    /// Signed 8-bit axes plus two button bits
    Digital8 = 0,
    /// Unsigned 16-bit axes centred on `0x7fff` plus a button bitmask
    Analog16 = 1,
}

impl TryFrom<u8> for ReadReason {
    type Error = JoystickError;

    fn try_from(code: u8) -> Result<Self> {
        match code {
            0 => Ok(ReadReason::Digital8),
            1 => Ok(ReadReason::Analog16),
            other => Err(JoystickError::UnsupportedReasonCode(other)),
        }
    }
}

/// Position and buttons of one stick.
///
/// `buttons` has bit 0 set while the first fire button is held and bit 1
/// for the second.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoystickReading {
    Digital { x: i8, y: i8, buttons: u8 },
    Analog { x: u16, y: u16, buttons: u8 },
}

impl JoystickReading {
    /// Centred position with nothing pressed.
    #[must_use]
    pub fn centred(reason: ReadReason) -> Self {
        match reason {
            ReadReason::Digital8 => JoystickReading::Digital { x: 0, y: 0, buttons: 0 },
            ReadReason::Analog16 => JoystickReading::Analog {
                x: CENTRE_16,
                y: CENTRE_16,
                buttons: 0,
            },
        }
    }

    #[must_use]
    pub fn buttons(&self) -> u8 {
        match *self {
            JoystickReading::Digital { buttons, .. } | JoystickReading::Analog { buttons, .. } => {
                buttons
            }
        }
    }

    /// The reading in register layout: `(first word, second word)`.
    ///
    /// | Form | First word | Second word |
    /// |------|------------|-------------|
    /// | 8-bit | `y` in bits 0-7, `x` in bits 8-15, buttons in bits 16-17 | 0 |
    /// | 16-bit | `y` in bits 0-15, `x` in bits 16-31 | buttons |
    ///
    /// # Examples
    ///
    /// ```
    /// use gameport_joystick::driver::reading::JoystickReading;
    ///
    /// let reading = JoystickReading::Digital { x: -1, y: 2, buttons: 0b01 };
    /// assert_eq!(reading.packed(), (0x0001_ff02, 0));
    ///
    /// let reading = JoystickReading::Analog { x: 0x7fff, y: 0x7fff, buttons: 0 };
    /// assert_eq!(reading.packed(), (0x7fff_7fff, 0));
    /// ```
    #[must_use]
    pub fn packed(&self) -> (u32, u32) {
        match *self {
            JoystickReading::Digital { x, y, buttons } => (
                u32::from(y as u8) | u32::from(x as u8) << 8 | u32::from(buttons) << 16,
                0,
            ),
            JoystickReading::Analog { x, y, buttons } => {
                (u32::from(y) | u32::from(x) << 16, u32::from(buttons))
            }
        }
    }
}

/// Calibration of one axis as returned by the Info operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AxisReport {
    pub stick: Stick,
    pub axis: Axis,
    pub min: u32,
    pub ctr: u32,
    pub max: u32,
    pub ctr_deadzone: u32,
    pub end_deadzone: u32,
    pub smooth: u32,
}

/// Calibration of every axis, stick-major.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CalibrationReport {
    pub axes: Vec<AxisReport>,
}

impl CalibrationReport {
    /// Entry for one axis.
    #[must_use]
    pub fn axis(&self, stick: Stick, axis: Axis) -> Option<&AxisReport> {
        self.axes.iter().find(|r| r.stick == stick && r.axis == axis)
    }
}

impl fmt::Display for CalibrationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Axis Minimum Centre Maximum Ctr zone End zone Smooth")?;
        writeln!(f, "---- ------- ------ ------- -------- -------- ------")?;
        for r in &self.axes {
            writeln!(
                f,
                " {} {} {:>7} {:>6} {:>7} {:>8} {:>8} {:>6}",
                r.stick, r.axis, r.min, r.ctr, r.max, r.ctr_deadzone, r.end_deadzone, r.smooth
            )?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reason_codes() {
        assert_eq!(ReadReason::try_from(0).unwrap(), ReadReason::Digital8);
        assert_eq!(ReadReason::try_from(1).unwrap(), ReadReason::Analog16);
        assert!(matches!(
            ReadReason::try_from(2),
            Err(JoystickError::UnsupportedReasonCode(2))
        ));
    }

    #[test]
    fn test_centred_packing() {
        assert_eq!(JoystickReading::centred(ReadReason::Digital8).packed(), (0, 0));
        assert_eq!(
            JoystickReading::centred(ReadReason::Analog16).packed(),
            (0x7fff_7fff, 0)
        );
    }

    #[test]
    fn test_digital_packing_extremes() {
        let reading = JoystickReading::Digital { x: 127, y: -127, buttons: 0b11 };
        assert_eq!(reading.packed(), (0x0003_7f81, 0));
        assert_eq!(reading.buttons(), 0b11);
    }

    #[test]
    fn test_analog_packing() {
        let reading = JoystickReading::Analog { x: 0xffff, y: 0x0000, buttons: 0b10 };
        assert_eq!(reading.packed(), (0xffff_0000, 0b10));
    }

    #[test]
    fn test_report_table() {
        let report = CalibrationReport {
            axes: vec![AxisReport {
                stick: Stick::ZERO,
                axis: Axis::X,
                min: 0,
                ctr: 703,
                max: 1406,
                ctr_deadzone: 48,
                end_deadzone: 5,
                smooth: 4,
            }],
        };

        let text = report.to_string();
        let lines: Vec<_> = text.lines().collect();
        assert_eq!(lines[0], "Axis Minimum Centre Maximum Ctr zone End zone Smooth");
        assert_eq!(lines[2], " 0 X       0    703    1406       48        5      4");
        assert_eq!(report.axis(Stick::ZERO, Axis::X).map(|r| r.ctr), Some(703));
        assert!(report.axis(Stick::ONE, Axis::Y).is_none());
    }
}
