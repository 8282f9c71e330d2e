//! # Corner Calibration
//!
//! Two-phase calibration of the stick limits. The user holds every stick
//! in the top-right corner for one call and the bottom-left corner for the
//! other, in either order:
//!
//! | Corner | Sets | X measured from | Y measured from |
//! |--------|------|-----------------|-----------------|
//! | Top right | X max, Y min | min | max |
//! | Bottom left | X min, Y max | max | min |
//!
//! Each corner measures its end dead zone on the side facing the centre,
//! ignoring noise at the end the stick is pressed against. Reads fail until
//! both corners are done.

use bitflags::bitflags;
use tracing::{debug, info};

use super::calibration::{AxisBias, Bias};
use super::core::DriverCore;
use crate::joystick::{Axis, StickSet};

bitflags! {
    /// Which corners of the current calibration pair are done. Empty when
    /// no pair is in progress.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct CalibrationPhase: u8 {
        const TOP_RIGHT_DONE = 1 << 0;
        const BOTTOM_LEFT_DONE = 1 << 1;
    }
}

/// A calibration corner.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Corner {
    TopRight,
    BottomLeft,
}

impl Corner {
    /// Phase bit recorded once this corner is sampled.
    #[must_use]
    pub fn done(self) -> CalibrationPhase {
        match self {
            Corner::TopRight => CalibrationPhase::TOP_RIGHT_DONE,
            Corner::BottomLeft => CalibrationPhase::BOTTOM_LEFT_DONE,
        }
    }

    /// The other corner of the pair.
    #[must_use]
    pub fn opposite(self) -> Corner {
        match self {
            Corner::TopRight => Corner::BottomLeft,
            Corner::BottomLeft => Corner::TopRight,
        }
    }

    #[must_use]
    pub fn bias(self) -> AxisBias {
        match self {
            Corner::TopRight => AxisBias {
                x: Bias::PreferDistanceFromMin,
                y: Bias::PreferDistanceFromMax,
            },
            Corner::BottomLeft => AxisBias {
                x: Bias::PreferDistanceFromMax,
                y: Bias::PreferDistanceFromMin,
            },
        }
    }

    /// Whether this corner sets the maximum (rather than minimum) of `axis`.
    #[must_use]
    pub fn sets_max(self, axis: Axis) -> bool {
        matches!(
            (self, axis),
            (Corner::TopRight, Axis::X) | (Corner::BottomLeft, Axis::Y)
        )
    }
}

impl DriverCore {
    /// Samples every stick held in `corner` and advances the calibration pair.
    ///
    /// The first corner of a pair stores its dead zones directly. The
    /// second keeps the larger of the two measurements per axis,
    /// recomputes the coefficients and ends the pair. Repeating a corner
    /// before its opposite overwrites the earlier sample.
    pub fn calibrate_corner(&mut self, corner: Corner) {
        let completing = self.phase.contains(corner.opposite().done());
        debug!("Calibrating {:?} corner (phase {:?})", corner, self.phase);

        let results = self.average_sample(StickSet::all(), corner.bias());
        for (stick, axis, result) in results.iter() {
            let Some(result) = result else { continue };
            let cal = &mut self.table[(stick, axis)];

            if corner.sets_max(axis) {
                cal.max = result.centre;
            } else {
                cal.min = result.centre;
            }

            cal.end_deadzone = if completing {
                cal.end_deadzone.max(result.deviation)
            } else {
                result.deviation
            };
        }

        if completing {
            self.recalc(StickSet::all());
            self.phase = CalibrationPhase::empty();
            info!("Corner calibration complete");
        } else {
            self.phase.insert(corner.done());
        }
    }
}
