//! # Driver Context
//!
//! [`DriverCore`] owns everything the acquisition, calibration and read
//! paths share: the port, the calibration table, the cached axis values,
//! the global configuration, the mask of axes worth reading and the corner
//! calibration phase.
//!
//! It is single-threaded; [`crate::driver::Driver`] wraps it in
//! a mutex and serialises the background poller against commands.

use tracing::{debug, trace};

use super::corners::CalibrationPhase;
use super::reading::{AxisReport, CalibrationReport, JoystickReading, ReadReason};
use crate::config::GlobalConfig;
use crate::hardware::{GamePort, MonotonicClock};
use crate::joystick::{
    smooth, Acquisition, Axis, AxisCalibration, AxisMask, PerAxis, Stick, StickSet, TimingReader,
};

/// Cached value given to every axis before its first acquisition.
pub const PROVISIONAL_TIMING: u32 = 800;

/// Manual calibration override; only the supplied fields change.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AxisUpdate {
    pub min: Option<u32>,
    pub ctr: Option<u32>,
    pub max: Option<u32>,
    pub ctr_deadzone: Option<u32>,
    pub end_deadzone: Option<u32>,
    pub smooth_width: Option<u32>,
}

/// Shared state of the joystick driver.
pub struct DriverCore {
    port: Box<dyn GamePort>,
    clock: Box<dyn MonotonicClock>,
    pub(crate) config: GlobalConfig,
    pub(crate) table: PerAxis<AxisCalibration>,
    pub(crate) cache: PerAxis<u32>,
    pub(crate) axes_mask: AxisMask,
    pub(crate) phase: CalibrationPhase,
}

impl std::fmt::Debug for DriverCore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DriverCore")
            .field("config", &self.config)
            .field("cache", &self.cache)
            .field("axes_mask", &self.axes_mask)
            .field("phase", &self.phase)
            .finish_non_exhaustive()
    }
}

impl DriverCore {
    /// Context with provisional calibration on every axis.
    ///
    /// No hardware is touched; the driver runs a reinit afterwards.
    pub fn new(
        port: Box<dyn GamePort>,
        clock: Box<dyn MonotonicClock>,
        config: GlobalConfig,
    ) -> Self {
        let mut table = PerAxis::splat(AxisCalibration::default());
        for stick in Stick::ALL {
            for axis in Axis::ALL {
                table[(stick, axis)].recalc_coefficients(config.ctr_zones, config.end_zones);
            }
        }

        Self {
            port,
            clock,
            config,
            table,
            cache: PerAxis::splat(PROVISIONAL_TIMING),
            axes_mask: AxisMask::all(),
            phase: CalibrationPhase::empty(),
        }
    }

    #[must_use]
    pub fn config(&self) -> GlobalConfig {
        self.config
    }

    #[must_use]
    pub fn calibration(&self, stick: Stick, axis: Axis) -> &AxisCalibration {
        &self.table[(stick, axis)]
    }

    /// Last (possibly smoothed) timing of an axis.
    #[must_use]
    pub fn cached(&self, stick: Stick, axis: Axis) -> u32 {
        self.cache[(stick, axis)]
    }

    /// Axes the poller reads; those that consistently timed out at the
    /// last reinit are left out.
    #[must_use]
    pub fn axes_mask(&self) -> AxisMask {
        self.axes_mask
    }

    #[must_use]
    pub fn phase(&self) -> CalibrationPhase {
        self.phase
    }

    /// One acquisition of `mask`, smoothed into the cache if enabled.
    pub fn acquire(&mut self, mask: AxisMask) -> Acquisition {
        let smoothing = self.config.smoothing;
        self.sample(mask, smoothing)
    }

    /// One acquisition of every axis not excluded by the last reinit.
    pub fn poll(&mut self) -> Acquisition {
        self.acquire(self.axes_mask)
    }

    /// Acquisition with smoothing forced on or off.
    ///
    /// Timed-out and discarded axes keep their cached value.
    pub(crate) fn sample(&mut self, mask: AxisMask, smoothing: bool) -> Acquisition {
        let reader = TimingReader::new(self.config.tolerance, self.config.timeout);
        let acquisition = reader.read(self.port.as_mut(), mask);

        for (stick, axis, timing) in acquisition.timings.iter() {
            if let Some(raw) = *timing {
                let width = if smoothing { self.table[(stick, axis)].smooth_width } else { 0 };
                let cached = &mut self.cache[(stick, axis)];
                *cached = smooth(*cached, raw, width);
            }
        }

        trace!(
            "Cache after acquisition: {:?} (timed out {:?})",
            self.cache,
            acquisition.timed_out
        );
        acquisition
    }

    /// Busy-waits for the centisecond clock to move past `last`.
    pub(crate) fn wait_past(&self, last: u32) -> u32 {
        self.clock.wait_past(last)
    }

    pub(crate) fn now_cs(&self) -> u32 {
        self.clock.centiseconds()
    }

    /// Recomputes scaling coefficients for both axes of `sticks`.
    pub fn recalc(&mut self, sticks: StickSet) {
        let (ctr_zones, end_zones) = (self.config.ctr_zones, self.config.end_zones);
        for stick in sticks.sticks() {
            for axis in Axis::ALL {
                self.table[(stick, axis)].recalc_coefficients(ctr_zones, end_zones);
            }
        }
    }

    /// Resets every cached value to its axis's centre.
    pub fn reseed_cache(&mut self) {
        let table = &self.table;
        self.cache = PerAxis::from_fn(|stick, axis| table[(stick, axis)].ctr);
        debug!("Reseeded cached axis values to centre");
    }

    /// Applies a manual override to one axis and recomputes that stick.
    pub fn set_axis(&mut self, stick: Stick, axis: Axis, update: &AxisUpdate) {
        let cal = &mut self.table[(stick, axis)];
        if let Some(min) = update.min {
            cal.min = min;
        }
        if let Some(ctr) = update.ctr {
            cal.ctr = ctr;
        }
        if let Some(max) = update.max {
            cal.max = max;
        }
        if let Some(ctr_deadzone) = update.ctr_deadzone {
            cal.ctr_deadzone = ctr_deadzone;
        }
        if let Some(end_deadzone) = update.end_deadzone {
            cal.end_deadzone = end_deadzone;
        }
        if let Some(smooth_width) = update.smooth_width {
            cal.smooth_width = smooth_width;
        }
        debug!("Manual calibration of stick {} axis {}: {:?}", stick, axis, update);
        self.recalc(StickSet::from(stick));
    }

    /// Pressed fire buttons of `stick` (bit 0 first button, bit 1 second).
    pub fn buttons(&mut self, stick: Stick) -> u8 {
        let status = self.port.read_status();
        stick
            .button_bits()
            .into_iter()
            .enumerate()
            .filter(|&(_, bit)| status & bit == 0)
            .fold(0u8, |buttons, (index, _)| buttons | 1 << index)
    }

    /// Converts the cached values of a stick into a reading.
    ///
    /// Stick numbers beyond the supported pair read as centred with
    /// nothing pressed.
    pub fn reading(&mut self, reason: ReadReason, stick: u8) -> JoystickReading {
        let stick = match Stick::new(stick) {
            Ok(stick) => stick,
            Err(_) => return JoystickReading::centred(reason),
        };

        let (x_cal, y_cal) = (self.table[(stick, Axis::X)], self.table[(stick, Axis::Y)]);
        let (x_raw, y_raw) = (self.cache[(stick, Axis::X)], self.cache[(stick, Axis::Y)]);
        let buttons = self.buttons(stick);

        match reason {
            ReadReason::Digital8 => JoystickReading::Digital {
                x: x_cal.convert8(x_raw, Axis::X.polarity()),
                y: y_cal.convert8(y_raw, Axis::Y.polarity()),
                buttons,
            },
            ReadReason::Analog16 => JoystickReading::Analog {
                x: x_cal.convert16(x_raw, Axis::X.polarity()),
                y: y_cal.convert16(y_raw, Axis::Y.polarity()),
                buttons,
            },
        }
    }

    /// Current calibration of every axis.
    #[must_use]
    pub fn report(&self) -> CalibrationReport {
        CalibrationReport {
            axes: self
                .table
                .iter()
                .map(|(stick, axis, cal)| AxisReport {
                    stick,
                    axis,
                    min: cal.min,
                    ctr: cal.ctr,
                    max: cal.max,
                    ctr_deadzone: cal.ctr_deadzone,
                    end_deadzone: cal.end_deadzone,
                    smooth: cal.smooth_width,
                })
                .collect(),
        }
    }
}
