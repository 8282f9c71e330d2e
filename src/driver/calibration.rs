//! # Calibration Engine
//!
//! Averaged sampling with settle detection, and the auto-detect reinit that
//! runs at driver start.
//!
//! ## Averaging
//!
//! Capacitors need a moment to recover after a strobe, so every cycle is
//! followed by a one-centisecond wait. Sampling first waits (at most
//! [`SETTLE_ATTEMPTS`] cycles) until two consecutive readings of every
//! requested stick lie within twice its smoothing width, then accumulates
//! [`NUM_TEST_RUNS`] readings into a mean and an observed min/max.
//!
//! ## Reinit
//!
//! 1. Provisional cache value and no smoothing for the chosen sticks
//! 2. [`NUM_TEST_RUNS`] raw cycles: the largest jump between consecutive
//!    readings becomes the smoothing width, and axes that never finish are
//!    excluded from future reads
//! 3. An unbiased average sets the centre and centre dead zone
//! 4. Limits are guessed as `0..=2·centre` until a corner calibration

use tracing::{debug, info};

use super::core::{DriverCore, PROVISIONAL_TIMING};
use crate::joystick::{Axis, AxisMask, PerAxis, Stick, StickSet};

/// Cycles accumulated per average, and cycles in the reinit jump scan.
pub const NUM_TEST_RUNS: u32 = 32;

/// Cycles to wait for readings to settle before averaging anyway.
pub const SETTLE_ATTEMPTS: u32 = 8;

/// Which side of the observed spread an axis's deviation is measured on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Bias {
    /// Smaller of the two distances
    #[default]
    NoBias,
    /// Distance from the mean down to the lowest reading
    PreferDistanceFromMin,
    /// Distance from the mean up to the highest reading
    PreferDistanceFromMax,
}

/// Bias for the X and Y axis of every sampled stick.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct AxisBias {
    pub x: Bias,
    pub y: Bias,
}

impl AxisBias {
    pub const NONE: AxisBias = AxisBias {
        x: Bias::NoBias,
        y: Bias::NoBias,
    };

    #[must_use]
    pub fn for_axis(&self, axis: Axis) -> Bias {
        match axis {
            Axis::X => self.x,
            Axis::Y => self.y,
        }
    }
}

/// Averaged position of one axis and the spread around it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SampleResult {
    pub centre: u32,
    pub deviation: u32,
}

/// Running sum and extremes of one axis.
#[derive(Debug, Clone, Copy)]
struct Accumulator {
    total: u64,
    low: u32,
    high: u32,
}

impl Default for Accumulator {
    fn default() -> Self {
        Self {
            total: 0,
            low: u32::MAX,
            high: 0,
        }
    }
}

impl Accumulator {
    fn add(&mut self, value: u32) {
        self.total += u64::from(value);
        self.low = self.low.min(value);
        self.high = self.high.max(value);
    }

    fn finish(&self, runs: u32, bias: Bias) -> SampleResult {
        let centre = u32::try_from(self.total / u64::from(runs.max(1))).unwrap_or(u32::MAX);
        let below = centre.saturating_sub(self.low);
        let above = self.high.saturating_sub(centre);
        let deviation = match bias {
            Bias::NoBias => below.min(above),
            Bias::PreferDistanceFromMin => below,
            Bias::PreferDistanceFromMax => above,
        };
        SampleResult { centre, deviation }
    }
}

impl DriverCore {
    /// Averages the settled position of `sticks`.
    ///
    /// Only axes in the current axes mask are read; the others average
    /// their cached value. The result has an entry for both axes of every
    /// requested stick and `None` elsewhere.
    pub fn average_sample(
        &mut self,
        sticks: StickSet,
        bias: AxisBias,
    ) -> PerAxis<Option<SampleResult>> {
        let read_axes = AxisMask::of_sticks(sticks) & self.axes_mask;
        debug!("Averaging sticks {:?}, reading axes {:?}", sticks, read_axes);

        let mut accumulators = PerAxis::splat(Accumulator::default());
        let mut previous: PerAxis<Option<u32>> = PerAxis::splat(None);
        let mut settle_budget = SETTLE_ATTEMPTS;
        let mut runs = 0;
        let mut last_time = self.now_cs();

        while runs < NUM_TEST_RUNS {
            let acquisition = self.acquire(read_axes);

            if settle_budget == 0 {
                for stick in sticks.sticks() {
                    for axis in Axis::ALL {
                        accumulators[(stick, axis)].add(self.cache[(stick, axis)]);
                    }
                }
                runs += 1;
            } else {
                let mut settled = StickSet::empty();
                for stick in sticks.sticks() {
                    let lost = acquisition.lost.contains(stick.into());
                    if !lost && self.has_settled(stick, &previous) {
                        settled.insert(stick.into());
                    }
                    for axis in Axis::ALL {
                        previous[(stick, axis)] = Some(self.cache[(stick, axis)]);
                    }
                }

                if settled == sticks {
                    debug!("Readings settled with {} attempts left", settle_budget);
                    settle_budget = 0;
                } else {
                    settle_budget -= 1;
                    if settle_budget == 0 {
                        debug!("Readings did not settle, averaging anyway");
                    }
                }
            }

            last_time = self.wait_past(last_time);
        }

        let mut results = PerAxis::splat(None);
        for stick in sticks.sticks() {
            for axis in Axis::ALL {
                let result = accumulators[(stick, axis)].finish(runs, bias.for_axis(axis));
                debug!(
                    "Stick {} axis {}: average {} deviation {}",
                    stick, axis, result.centre, result.deviation
                );
                results[(stick, axis)] = Some(result);
            }
        }
        results
    }

    /// Whether both axes of `stick` moved by at most twice their smoothing
    /// width since the previous cycle. A stick with no previous cycle has
    /// not settled.
    fn has_settled(&self, stick: Stick, previous: &PerAxis<Option<u32>>) -> bool {
        Axis::ALL.into_iter().all(|axis| match previous[(stick, axis)] {
            Some(last) => {
                let limit = self.table[(stick, axis)].smooth_width.saturating_mul(2);
                last.abs_diff(self.cache[(stick, axis)]) <= limit
            }
            None => false,
        })
    }

    /// Re-runs auto-detection for `sticks`.
    ///
    /// Sets the smoothing width, centre, centre dead zone and provisional
    /// limits of every axis of `sticks` and rebuilds the axes mask for them.
    pub fn reinit(&mut self, sticks: StickSet) {
        info!("Initialising joysticks {:?}", sticks);
        let stick_mask = AxisMask::of_sticks(sticks);

        for (stick, axis) in stick_mask.axes() {
            self.cache[(stick, axis)] = PROVISIONAL_TIMING;
            self.table[(stick, axis)].smooth_width = 0;
        }

        let mut completed = AxisMask::empty();
        let mut previous: PerAxis<Option<u32>> = PerAxis::splat(None);
        let mut last_time = self.now_cs();

        for _ in 0..NUM_TEST_RUNS {
            let acquisition = self.sample(stick_mask, false);
            completed.insert(stick_mask & !acquisition.timed_out);

            for (stick, axis) in stick_mask.axes() {
                let value = self.cache[(stick, axis)];
                if let Some(last) = previous[(stick, axis)] {
                    let width = &mut self.table[(stick, axis)].smooth_width;
                    *width = (*width).max(last.abs_diff(value));
                }
                previous[(stick, axis)] = Some(value);
            }

            last_time = self.wait_past(last_time);
        }

        self.axes_mask = (self.axes_mask & !stick_mask) | (completed & stick_mask);
        debug!("Axes to be read in future: {:?}", self.axes_mask);

        let results = self.average_sample(sticks, AxisBias::NONE);
        for (stick, axis, result) in results.iter() {
            if let Some(result) = result {
                let cal = &mut self.table[(stick, axis)];
                cal.ctr = result.centre;
                cal.ctr_deadzone = result.deviation;
                cal.min = 0;
                cal.max = result.centre.saturating_mul(2);
            }
        }

        self.recalc(sticks);
    }
}
