//! # Signal Smoothing
//!
//! Adaptive low-pass filter applied to each new raw timing.
//!
//! The further a new reading lands from the previous value, measured in
//! multiples of the axis's smoothing width, the more weight it gets:
//!
//! | Distance from previous | Result |
//! |------------------------|--------|
//! | `≤ width` | `(3·prev + new) / 4` |
//! | `≤ 2·width` | `(prev + new) / 2` |
//! | `≤ 4·width` | `(prev + 3·new) / 4` |
//! | further | `new` |
//!
//! Small changes are almost certainly jitter; large ones are deliberate
//! movement and pass straight through.

use tracing::trace;

/// Smooths `new` against `prev` using the tier table above.
///
/// A `width` of zero disables smoothing and returns `new` unchanged.
///
/// # Examples
///
/// ```
/// use gameport_joystick::joystick::smoothing::smooth;
///
/// assert_eq!(smooth(100, 104, 4), 101); // jitter, heavy damping
/// assert_eq!(smooth(100, 200, 4), 200); // real movement
/// assert_eq!(smooth(100, 104, 0), 104); // disabled
/// ```
#[must_use]
pub fn smooth(prev: u32, new: u32, width: u32) -> u32 {
    if width == 0 {
        return new;
    }

    let (prev64, new64, width64) = (u64::from(prev), u64::from(new), u64::from(width));
    let delta = prev64.abs_diff(new64);

    let value = if delta <= width64 {
        trace!("much smoothing of value {}", new);
        (prev64 * 3 + new64) / 4
    } else if delta <= width64 * 2 {
        trace!("moderate smoothing of value {}", new);
        (prev64 + new64) / 2
    } else if delta <= width64 * 4 {
        trace!("slight smoothing of value {}", new);
        (prev64 + new64 * 3) / 4
    } else {
        new64
    };

    // A weighted mean of two u32 values always fits
    value as u32
}
