//! # Hardware Module
//!
//! Register-level access to the game port and the timers the driver needs.
//!
//! This module handles:
//! - The [`GamePort`] register interface (strobe, status byte, counter latch)
//! - Interrupt masking around register/counter sample pairs via [`IrqGuard`]
//! - The centisecond [`MonotonicClock`] used for calibration settle delays
//! - Resolving the game port address at startup
//!
//! ## Status byte layout
//!
//! | Bit | Meaning |
//! |-----|---------|
//! | 0 | Stick 0 X still charging |
//! | 1 | Stick 0 Y still charging |
//! | 2 | Stick 1 X still charging |
//! | 3 | Stick 1 Y still charging |
//! | 4/5 | Stick 0 buttons (low = pressed) |
//! | 6/7 | Stick 1 buttons (low = pressed) |

pub mod devport;
pub mod sim;

use std::ops::{Deref, DerefMut};
use std::time::Instant;

use tracing::debug;

use crate::error::{JoystickError, Result};

/// Modulus of the free-running down-counter (2 MHz, 19999 → 0).
pub const DEFAULT_COUNTER_MODULUS: u32 = 20000;

/// Environment variable consulted before the configured port address.
pub const PORT_ADDRESS_ENV: &str = "GAMEPORT_ADDRESS";

/// Register interface to a PC-style game port plus its timing counter.
///
/// The counter counts *down* by one every half microsecond and wraps at
/// [`GamePort::counter_modulus`].
#[cfg_attr(test, mockall::automock)]
pub trait GamePort: Send {
    /// Mask interrupts on the current control flow.
    fn disable_interrupts(&mut self);

    /// Restore interrupts masked by [`GamePort::disable_interrupts`].
    fn enable_interrupts(&mut self);

    /// Write to the port, starting a capacitor charge on every axis.
    fn write_strobe(&mut self, value: u8);

    /// Read the raw status byte.
    fn read_status(&mut self) -> u8;

    /// Latch and read the current counter value.
    fn read_counter(&mut self) -> u32;

    /// Value at which the counter wraps.
    fn counter_modulus(&self) -> u32 {
        DEFAULT_COUNTER_MODULUS
    }
}

/// Keeps interrupts masked for as long as it is alive.
///
/// Dereferences to the port so that the masked window reads naturally:
///
/// ```
/// use gameport_joystick::hardware::{IrqGuard, GamePort};
/// use gameport_joystick::hardware::sim::SimulatedGamePort;
///
/// let mut port = SimulatedGamePort::new();
/// let (status, now) = {
///     let mut masked = IrqGuard::new(&mut port);
///     (masked.read_status(), masked.read_counter())
/// };
/// # let _ = (status, now);
/// ```
pub struct IrqGuard<'a> {
    port: &'a mut dyn GamePort,
}

impl<'a> IrqGuard<'a> {
    /// Masks interrupts on `port` until the guard is dropped.
    pub fn new(port: &'a mut dyn GamePort) -> Self {
        port.disable_interrupts();
        Self { port }
    }
}

impl<'a> Deref for IrqGuard<'a> {
    type Target = dyn GamePort + 'a;

    fn deref(&self) -> &Self::Target {
        &*self.port
    }
}

impl<'a> DerefMut for IrqGuard<'a> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut *self.port
    }
}

impl Drop for IrqGuard<'_> {
    fn drop(&mut self) {
        self.port.enable_interrupts();
    }
}

/// Centisecond clock that never goes backwards (apart from wrapping).
pub trait MonotonicClock: Send {
    /// Centiseconds since an arbitrary epoch.
    fn centiseconds(&self) -> u32;

    /// Busy-waits until the clock reads a value other than `last`, returning it.
    fn wait_past(&self, last: u32) -> u32 {
        loop {
            let now = self.centiseconds();
            if now != last {
                return now;
            }
            std::hint::spin_loop();
        }
    }
}

/// Wall-clock backed [`MonotonicClock`].
#[derive(Debug, Clone, Copy)]
pub struct SystemClock {
    epoch: Instant,
}

impl SystemClock {
    #[must_use]
    pub fn new() -> Self {
        Self { epoch: Instant::now() }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl MonotonicClock for SystemClock {
    fn centiseconds(&self) -> u32 {
        (self.epoch.elapsed().as_millis() / 10) as u32
    }
}

/// Resolves the game port I/O address.
///
/// The `GAMEPORT_ADDRESS` environment variable wins over `configured`.
/// Accepted spellings are `&201`, `0x201` and bare hex `201`.
///
/// # Errors
///
/// Returns [`JoystickError::HardwareNotFound`] when neither source supplies
/// a parsable address.
pub fn resolve_port_address(configured: Option<&str>) -> Result<u16> {
    let from_env = std::env::var(PORT_ADDRESS_ENV).ok();
    let source = from_env.as_deref().or(configured).ok_or_else(|| {
        JoystickError::HardwareNotFound(format!(
            "no game port address configured and {} is unset",
            PORT_ADDRESS_ENV
        ))
    })?;

    let address = parse_port_address(source)?;
    debug!("Resolved game port address &{:x}", address);
    Ok(address)
}

/// Parses a hex port address in one of the accepted spellings.
///
/// # Errors
///
/// Returns [`JoystickError::HardwareNotFound`] for anything unparsable.
pub fn parse_port_address(text: &str) -> Result<u16> {
    let trimmed = text.trim();
    let digits = trimmed
        .strip_prefix('&')
        .or_else(|| trimmed.strip_prefix("0x"))
        .or_else(|| trimmed.strip_prefix("0X"))
        .unwrap_or(trimmed);

    u16::from_str_radix(digits, 16).map_err(|_| {
        JoystickError::HardwareNotFound(format!("invalid game port address '{}'", text))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockall::Sequence;

    #[test]
    fn test_parse_port_address_spellings() {
        assert_eq!(parse_port_address("&201").unwrap(), 0x201);
        assert_eq!(parse_port_address("0x201").unwrap(), 0x201);
        assert_eq!(parse_port_address("0X3F8").unwrap(), 0x3f8);
        assert_eq!(parse_port_address(" 201 ").unwrap(), 0x201);
    }

    #[test]
    fn test_parse_port_address_invalid() {
        for text in ["", "&", "gameport", "0x10000"] {
            match parse_port_address(text) {
                Err(JoystickError::HardwareNotFound(msg)) => assert!(msg.contains(text)),
                other => panic!("Expected HardwareNotFound for {:?}, got {:?}", text, other),
            }
        }
    }

    #[test]
    fn test_irq_guard_masks_for_its_lifetime() {
        let mut port = MockGamePort::new();
        let mut seq = Sequence::new();

        port.expect_disable_interrupts().times(1).in_sequence(&mut seq).return_const(());
        port.expect_read_status().times(1).in_sequence(&mut seq).return_const(0xf0u8);
        port.expect_enable_interrupts().times(1).in_sequence(&mut seq).return_const(());

        let status = {
            let mut masked = IrqGuard::new(&mut port);
            masked.read_status()
        };
        assert_eq!(status, 0xf0);
    }

    #[test]
    fn test_wait_past_returns_later_value() {
        let clock = sim::SimulatedClock::new();
        let first = clock.centiseconds();
        let next = clock.wait_past(first);
        assert_ne!(next, first);
    }

    #[test]
    fn test_system_clock_starts_near_zero() {
        let clock = SystemClock::new();
        assert!(clock.centiseconds() < 100);
    }
}
