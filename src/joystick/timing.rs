//! # Timing Reader
//!
//! One acquisition cycle: strobe the port, then poll the status byte until
//! every requested axis has discharged or the timeout expires.
//!
//! Each status read is paired with a counter latch inside an [`IrqGuard`]
//! window. An axis that finishes is only trusted if the gap since the
//! previous sample is within the tolerance; a longer gap means something
//! (an interrupt, a stalled bus) delayed the sample and the elapsed time
//! overstates the real discharge time.

use tracing::trace;

use super::axis::{AxisMask, PerAxis, StickSet};
use crate::hardware::{GamePort, IrqGuard};

/// Default maximum sample gap, in counter ticks.
pub const DEFAULT_TOLERANCE: u32 = 30;

/// Default acquisition timeout, in counter ticks (1 ms).
pub const DEFAULT_TIMEOUT: u32 = 2000;

/// Value written to start a charge cycle. The port ignores the data.
const STROBE: u8 = 0xff;

/// Outcome of one acquisition cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Acquisition {
    /// Raw timing of every requested axis that finished with a trusted sample.
    pub timings: PerAxis<Option<u32>>,
    /// Requested axes still charging when the timeout expired.
    pub timed_out: AxisMask,
    /// Sticks with at least one axis discarded for a late sample.
    pub lost: StickSet,
}

impl Acquisition {
    /// Axes that produced a timing.
    #[must_use]
    pub fn completed(&self) -> AxisMask {
        self.timings
            .iter()
            .filter(|(_, _, timing)| timing.is_some())
            .fold(AxisMask::empty(), |mask, (stick, axis, _)| {
                mask | AxisMask::axis(stick, axis)
            })
    }
}

/// Times axis discharge against the port's wrapping down-counter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimingReader {
    tolerance: u32,
    timeout: u32,
}

impl Default for TimingReader {
    fn default() -> Self {
        Self::new(DEFAULT_TOLERANCE, DEFAULT_TIMEOUT)
    }
}

impl TimingReader {
    #[must_use]
    pub fn new(tolerance: u32, timeout: u32) -> Self {
        Self { tolerance, timeout }
    }

    /// Runs one acquisition cycle for the `requested` axes.
    ///
    /// Timeouts are not errors: a timed-out axis simply has no timing in
    /// the result. An empty request touches no hardware.
    ///
    /// # Arguments
    ///
    /// * `port` - Game port to strobe and sample
    /// * `requested` - Axes to wait for
    pub fn read(&self, port: &mut dyn GamePort, requested: AxisMask) -> Acquisition {
        let mut result = Acquisition::default();
        if requested.is_empty() {
            return result;
        }

        let modulus = u64::from(port.counter_modulus());
        let mut start = {
            let mut masked = IrqGuard::new(port);
            masked.write_strobe(STROBE);
            u64::from(masked.read_counter())
        };
        let mut prev = start;
        let mut pending = requested;
        let mut elapsed = 0u64;

        while !pending.is_empty() && elapsed < u64::from(self.timeout) {
            let (status, now) = {
                let mut masked = IrqGuard::new(port);
                (masked.read_status(), u64::from(masked.read_counter()))
            };

            // Counter counts down, so a larger value means it wrapped
            if now > prev {
                start += modulus;
                prev += modulus;
            }
            elapsed = start.saturating_sub(now);
            let interval = prev.saturating_sub(now);
            prev = now;

            let finished = AxisMask::from_bits_truncate(!status) & pending;
            if finished.is_empty() {
                continue;
            }

            for (stick, axis) in finished.axes() {
                if interval <= u64::from(self.tolerance) {
                    result.timings[(stick, axis)] =
                        Some(u32::try_from(elapsed).unwrap_or(u32::MAX));
                } else {
                    trace!(
                        "Discarding stick {} axis {}: sample gap {} > {}",
                        stick,
                        axis,
                        interval,
                        self.tolerance
                    );
                    result.lost.insert(stick.into());
                }
            }
            pending.remove(finished);
        }

        result.timed_out = pending;
        if !pending.is_empty() {
            trace!("Acquisition timed out with axes {:?} pending", pending);
        }
        result
    }
}
