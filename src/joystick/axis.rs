//! # Stick and Axis Identifiers
//!
//! Typed names for the two supported sticks and their two axes, plus the
//! bit sets the hardware speaks in.
//!
//! | Bit | Axis |
//! |-----|------|
//! | 0 | Stick 0 X |
//! | 1 | Stick 0 Y |
//! | 2 | Stick 1 X |
//! | 3 | Stick 1 Y |

use std::fmt;
use std::ops::{Index, IndexMut};
use std::str::FromStr;

use bitflags::bitflags;

use crate::error::{JoystickError, Result};

/// Number of sticks the driver supports.
pub const NUM_STICKS: usize = 2;

/// One physical axis of a stick.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Axis {
    X,
    Y,
}

impl Axis {
    pub const ALL: [Axis; 2] = [Axis::X, Axis::Y];

    #[must_use]
    pub fn index(self) -> usize {
        match self {
            Axis::X => 0,
            Axis::Y => 1,
        }
    }
}

impl fmt::Display for Axis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Axis::X => f.write_str("X"),
            Axis::Y => f.write_str("Y"),
        }
    }
}

impl FromStr for Axis {
    type Err = JoystickError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "x" | "X" => Ok(Axis::X),
            "y" | "Y" => Ok(Axis::Y),
            other => Err(JoystickError::ConfigSyntax(format!(
                "axis must be X or Y, not '{}'",
                other
            ))),
        }
    }
}

/// A supported stick number (0 or 1).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Stick(u8);

impl Stick {
    pub const ZERO: Stick = Stick(0);
    pub const ONE: Stick = Stick(1);
    pub const ALL: [Stick; NUM_STICKS] = [Stick::ZERO, Stick::ONE];

    /// Validates a caller-supplied stick number.
    ///
    /// # Errors
    ///
    /// Returns [`JoystickError::InvalidStickNumber`] for anything but 0 or 1.
    pub fn new(number: u8) -> Result<Self> {
        if usize::from(number) < NUM_STICKS {
            Ok(Stick(number))
        } else {
            Err(JoystickError::InvalidStickNumber(number))
        }
    }

    #[must_use]
    pub fn index(self) -> usize {
        usize::from(self.0)
    }

    #[must_use]
    pub fn number(self) -> u8 {
        self.0
    }

    /// Status bits of this stick's two fire buttons.
    #[must_use]
    pub fn button_bits(self) -> [u8; 2] {
        let first = 4 + self.0 * 2;
        [1 << first, 1 << (first + 1)]
    }
}

impl fmt::Display for Stick {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

bitflags! {
    /// Set of axes, in the hardware's status-bit layout.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct AxisMask: u8 {
        const STICK0_X = 1 << 0;
        const STICK0_Y = 1 << 1;
        const STICK1_X = 1 << 2;
        const STICK1_Y = 1 << 3;
    }
}

impl AxisMask {
    /// The single bit for one axis.
    #[must_use]
    pub fn axis(stick: Stick, axis: Axis) -> Self {
        AxisMask::from_bits_truncate(1 << (stick.index() * 2 + axis.index()))
    }

    /// Both axes of every stick in `sticks`.
    #[must_use]
    pub fn of_sticks(sticks: StickSet) -> Self {
        sticks.sticks().fold(AxisMask::empty(), |mask, stick| {
            mask | AxisMask::axis(stick, Axis::X) | AxisMask::axis(stick, Axis::Y)
        })
    }

    /// Axes in the set, stick-major.
    pub fn axes(self) -> impl Iterator<Item = (Stick, Axis)> {
        Stick::ALL
            .into_iter()
            .flat_map(|stick| Axis::ALL.into_iter().map(move |axis| (stick, axis)))
            .filter(move |&(stick, axis)| self.contains(AxisMask::axis(stick, axis)))
    }
}

bitflags! {
    /// Set of sticks.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct StickSet: u8 {
        const STICK0 = 1 << 0;
        const STICK1 = 1 << 1;
    }
}

impl StickSet {
    /// Sticks in the set, in number order.
    pub fn sticks(self) -> impl Iterator<Item = Stick> {
        Stick::ALL
            .into_iter()
            .filter(move |&stick| self.contains(StickSet::from(stick)))
    }
}

impl From<Stick> for StickSet {
    fn from(stick: Stick) -> Self {
        StickSet::from_bits_truncate(1 << stick.0)
    }
}

/// One value per stick and axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PerAxis<T>([[T; 2]; NUM_STICKS]);

impl<T> PerAxis<T> {
    pub fn from_fn(mut f: impl FnMut(Stick, Axis) -> T) -> Self {
        PerAxis(std::array::from_fn(|s| {
            std::array::from_fn(|a| f(Stick::ALL[s], Axis::ALL[a]))
        }))
    }

    /// Entries in stick-major order.
    pub fn iter(&self) -> impl Iterator<Item = (Stick, Axis, &T)> {
        Stick::ALL.into_iter().flat_map(move |stick| {
            Axis::ALL
                .into_iter()
                .map(move |axis| (stick, axis, &self.0[stick.index()][axis.index()]))
        })
    }
}

impl<T: Copy> PerAxis<T> {
    #[must_use]
    pub fn splat(value: T) -> Self {
        PerAxis([[value; 2]; NUM_STICKS])
    }
}

impl<T> Index<(Stick, Axis)> for PerAxis<T> {
    type Output = T;

    fn index(&self, (stick, axis): (Stick, Axis)) -> &T {
        &self.0[stick.index()][axis.index()]
    }
}

impl<T> IndexMut<(Stick, Axis)> for PerAxis<T> {
    fn index_mut(&mut self, (stick, axis): (Stick, Axis)) -> &mut T {
        &mut self.0[stick.index()][axis.index()]
    }
}
