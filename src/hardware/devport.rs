//! Linux `/dev/port` backend.
//!
//! Byte I/O at the game port address goes through the kernel's port device.
//! There is no programmable down-counter in user space, so the counter is
//! synthesised from the monotonic clock at the same 2 MHz rate. Interrupts
//! cannot be masked from user space; the mask calls only keep a nesting
//! count so misuse shows up in the logs.

use std::fs::{File, OpenOptions};
use std::os::unix::fs::FileExt;
use std::time::Instant;

use tracing::{info, warn};

use super::{GamePort, DEFAULT_COUNTER_MODULUS};
use crate::error::{JoystickError, Result};

const DEV_PORT_PATH: &str = "/dev/port";

/// Counter ticks per second (half-microsecond resolution).
const COUNTER_HZ: u128 = 2_000_000;

/// Game port accessed through `/dev/port`.
pub struct DevPortGamePort {
    file: File,
    address: u16,
    epoch: Instant,
    modulus: u32,
    mask_depth: u32,
}

impl std::fmt::Debug for DevPortGamePort {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DevPortGamePort")
            .field("address", &format_args!("&{:x}", self.address))
            .field("modulus", &self.modulus)
            .finish_non_exhaustive()
    }
}

impl DevPortGamePort {
    /// Open the port device for the game port at `address`.
    ///
    /// # Errors
    ///
    /// Returns [`JoystickError::HardwareNotFound`] if `/dev/port` cannot be
    /// opened (missing, or insufficient privileges) or the first status read
    /// fails.
    pub fn open(address: u16) -> Result<Self> {
        Self::open_with_modulus(address, DEFAULT_COUNTER_MODULUS)
    }

    /// Like [`DevPortGamePort::open`] with a custom counter modulus.
    pub fn open_with_modulus(address: u16, modulus: u32) -> Result<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(DEV_PORT_PATH)
            .map_err(|e| {
                JoystickError::HardwareNotFound(format!("Failed to open {}: {}", DEV_PORT_PATH, e))
            })?;

        let mut probe = [0u8; 1];
        file.read_exact_at(&mut probe, u64::from(address)).map_err(|e| {
            JoystickError::HardwareNotFound(format!(
                "No game port responding at &{:x}: {}",
                address, e
            ))
        })?;

        info!("Opened game port at &{:x} via {}", address, DEV_PORT_PATH);
        Ok(Self {
            file,
            address,
            epoch: Instant::now(),
            modulus: modulus.max(2),
            mask_depth: 0,
        })
    }

    /// The I/O address this port talks to.
    pub fn address(&self) -> u16 {
        self.address
    }
}

impl GamePort for DevPortGamePort {
    fn disable_interrupts(&mut self) {
        self.mask_depth += 1;
    }

    fn enable_interrupts(&mut self) {
        if self.mask_depth == 0 {
            warn!("Unbalanced interrupt unmask on game port &{:x}", self.address);
        }
        self.mask_depth = self.mask_depth.saturating_sub(1);
    }

    fn write_strobe(&mut self, value: u8) {
        if let Err(e) = self.file.write_all_at(&[value], u64::from(self.address)) {
            warn!("Failed to strobe game port: {}", e);
        }
    }

    fn read_status(&mut self) -> u8 {
        let mut byte = [0xffu8; 1];
        if let Err(e) = self.file.read_exact_at(&mut byte, u64::from(self.address)) {
            // All axes charging and no buttons: the read simply times out
            warn!("Failed to read game port status: {}", e);
            return 0xff;
        }
        byte[0]
    }

    fn read_counter(&mut self) -> u32 {
        let ticks = self.epoch.elapsed().as_nanos() * COUNTER_HZ / 1_000_000_000;
        let modulus = u128::from(self.modulus);
        (modulus - 1 - ticks % modulus) as u32
    }

    fn counter_modulus(&self) -> u32 {
        self.modulus
    }
}
