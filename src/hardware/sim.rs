//! Simulated game port and clock.
//!
//! Each axis discharges after a scripted number of counter ticks. The
//! counter advances by `ticks_per_sample` on every latch, so a read loop
//! sees time pass exactly as fast as it samples. Noise, interrupt stalls,
//! counter wrap position and button presses can all be scripted through a
//! [`SimHandle`] while the port itself is owned by the driver.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use super::{GamePort, MonotonicClock, DEFAULT_COUNTER_MODULUS};
use crate::joystick::axis::{Axis, PerAxis, Stick};

/// Discharge delay used for every axis by [`SimulatedGamePort::new`].
pub const SIM_DEFAULT_POSITION: u32 = 703;

#[derive(Debug)]
struct SimState {
    modulus: u32,
    counter: u32,
    elapsed: u32,
    ticks_per_sample: u32,
    positions: PerAxis<Option<u32>>,
    noise: Vec<i32>,
    strobes: usize,
    latches_since_strobe: usize,
    stall: Option<(usize, u32)>,
    pressed: u8,
    masked: bool,
    unmasked_samples: usize,
}

impl SimState {
    fn current_noise(&self) -> i32 {
        if self.noise.is_empty() || self.strobes == 0 {
            0
        } else {
            self.noise[(self.strobes - 1) % self.noise.len()]
        }
    }

    fn charging(&self, stick: Stick, axis: Axis) -> bool {
        match self.positions[(stick, axis)] {
            Some(delay) => {
                let delay = (i64::from(delay) + i64::from(self.current_noise())).max(0);
                i64::from(self.elapsed) < delay
            }
            None => true,
        }
    }
}

fn lock(state: &Mutex<SimState>) -> MutexGuard<'_, SimState> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

/// In-process stand-in for game port hardware.
#[derive(Debug)]
pub struct SimulatedGamePort {
    state: Arc<Mutex<SimState>>,
}

/// Shared control handle for a [`SimulatedGamePort`].
#[derive(Debug, Clone)]
pub struct SimHandle {
    state: Arc<Mutex<SimState>>,
}

impl SimulatedGamePort {
    /// All four axes connected and resting at [`SIM_DEFAULT_POSITION`].
    #[must_use]
    pub fn new() -> Self {
        Self::with_modulus(DEFAULT_COUNTER_MODULUS)
    }

    /// Like [`SimulatedGamePort::new`] with a custom counter modulus.
    #[must_use]
    pub fn with_modulus(modulus: u32) -> Self {
        let modulus = modulus.max(2);
        Self {
            state: Arc::new(Mutex::new(SimState {
                modulus,
                counter: modulus - 1,
                elapsed: 0,
                ticks_per_sample: 1,
                positions: PerAxis::splat(Some(SIM_DEFAULT_POSITION)),
                noise: Vec::new(),
                strobes: 0,
                latches_since_strobe: 0,
                stall: None,
                pressed: 0,
                masked: false,
                unmasked_samples: 0,
            })),
        }
    }

    /// Handle for scripting the port after it has been boxed into a driver.
    #[must_use]
    pub fn handle(&self) -> SimHandle {
        SimHandle { state: Arc::clone(&self.state) }
    }
}

impl Default for SimulatedGamePort {
    fn default() -> Self {
        Self::new()
    }
}

impl SimHandle {
    /// Sets the discharge delay of one axis; `None` disconnects it.
    pub fn set_position(&self, stick: Stick, axis: Axis, delay: Option<u32>) {
        lock(&self.state).positions[(stick, axis)] = delay;
    }

    /// Sets the same X and Y delays on both sticks.
    pub fn set_all_positions(&self, x: u32, y: u32) {
        let mut state = lock(&self.state);
        for stick in Stick::ALL {
            state.positions[(stick, Axis::X)] = Some(x);
            state.positions[(stick, Axis::Y)] = Some(y);
        }
    }

    /// Offsets added to every axis delay, cycled once per strobe.
    pub fn set_noise(&self, pattern: &[i32]) {
        lock(&self.state).noise = pattern.to_vec();
    }

    /// Makes the `latch`-th counter read after the next strobe jump by
    /// `extra` ticks, as if an interrupt fired between samples.
    pub fn stall_at(&self, latch: usize, extra: u32) {
        lock(&self.state).stall = Some((latch, extra));
    }

    /// Moves the counter to `value` (modulo the counter modulus).
    pub fn set_counter(&self, value: u32) {
        let mut state = lock(&self.state);
        state.counter = value % state.modulus;
    }

    /// Ticks the counter advances per latch.
    pub fn set_ticks_per_sample(&self, ticks: u32) {
        lock(&self.state).ticks_per_sample = ticks.max(1);
    }

    /// Presses or releases a fire button (`button` is 0 or 1).
    pub fn set_button(&self, stick: Stick, button: u8, pressed: bool) {
        let bit = 1u8 << (4 + stick.index() * 2 + usize::from(button & 1));
        let mut state = lock(&self.state);
        if pressed {
            state.pressed |= bit;
        } else {
            state.pressed &= !bit;
        }
    }

    /// Number of strobes written so far.
    #[must_use]
    pub fn strobes(&self) -> usize {
        lock(&self.state).strobes
    }

    /// Counter latches taken while interrupts were not masked.
    #[must_use]
    pub fn unmasked_samples(&self) -> usize {
        lock(&self.state).unmasked_samples
    }

    /// Whether interrupts are currently masked.
    #[must_use]
    pub fn interrupts_masked(&self) -> bool {
        lock(&self.state).masked
    }
}

impl GamePort for SimulatedGamePort {
    fn disable_interrupts(&mut self) {
        lock(&self.state).masked = true;
    }

    fn enable_interrupts(&mut self) {
        lock(&self.state).masked = false;
    }

    fn write_strobe(&mut self, _value: u8) {
        let mut state = lock(&self.state);
        state.strobes += 1;
        state.elapsed = 0;
        state.latches_since_strobe = 0;
    }

    fn read_status(&mut self) -> u8 {
        let state = lock(&self.state);
        let mut status = !state.pressed & 0xf0;
        for (bit, (stick, axis)) in Stick::ALL
            .iter()
            .flat_map(|&stick| Axis::ALL.iter().map(move |&axis| (stick, axis)))
            .enumerate()
        {
            if state.charging(stick, axis) {
                status |= 1 << bit;
            }
        }
        status
    }

    fn read_counter(&mut self) -> u32 {
        let mut state = lock(&self.state);
        state.latches_since_strobe += 1;
        if !state.masked {
            state.unmasked_samples += 1;
        }

        let mut advance = state.ticks_per_sample;
        if let Some((latch, extra)) = state.stall {
            if latch == state.latches_since_strobe {
                advance += extra;
                state.stall = None;
            }
        }

        state.elapsed = state.elapsed.saturating_add(advance);
        let modulus = state.modulus;
        state.counter = (state.counter + modulus - advance % modulus) % modulus;
        state.counter
    }

    fn counter_modulus(&self) -> u32 {
        lock(&self.state).modulus
    }
}

/// Clock that moves forward one centisecond every time it is read.
#[derive(Debug, Default)]
pub struct SimulatedClock {
    now: AtomicU32,
}

impl SimulatedClock {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl MonotonicClock for SimulatedClock {
    fn centiseconds(&self) -> u32 {
        self.now.fetch_add(1, Ordering::Relaxed)
    }
}
