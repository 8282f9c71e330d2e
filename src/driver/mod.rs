//! # Joystick Driver
//!
//! The public face of the crate. A [`Driver`] owns the game port, runs the
//! start-up calibration, polls in the background while clients read, and
//! exposes the driver operations:
//!
//! | Operation | Method |
//! |-----------|--------|
//! | Read | [`Driver::read`] |
//! | CalibrateTopRight / CalibrateBottomLeft | [`Driver::calibrate_top_right`], [`Driver::calibrate_bottom_left`] |
//! | Config | [`Driver::config`], [`Driver::configure`] |
//! | Calibrate axis | [`Driver::calibrate_axis`] |
//! | Reinit | [`Driver::reinit`] |
//! | Info | [`Driver::info`] |
//!
//! ## Locking
//!
//! Shared state lives behind two mutexes, always taken scheduler first,
//! then core. The background acquirer only takes the core. Corner
//! calibration holds the scheduler for its whole run after pausing
//! polling, so it never overlaps an acquisition.
//!
//! ## Example
//!
//! ```no_run
//! use gameport_joystick::driver::{Driver, DriverOptions};
//! use gameport_joystick::hardware::sim::{SimulatedClock, SimulatedGamePort};
//!
//! # #[tokio::main]
//! # async fn main() -> gameport_joystick::error::Result<()> {
//! let driver = Driver::new(
//!     Box::new(SimulatedGamePort::new()),
//!     Box::new(SimulatedClock::new()),
//!     DriverOptions::default(),
//! );
//! let (position, buttons) = driver.read(1, 0)?.packed();
//! println!("{:08x} {:x}", position, buttons);
//! # Ok(())
//! # }
//! ```

pub mod calibration;
pub mod core;
pub mod corners;
pub mod reading;
pub mod scheduler;

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::runtime::{Handle, RuntimeFlavor};
use tokio::task::JoinHandle;
use tracing::info;

use crate::config::{Config, ConfigUpdate, GlobalConfig};
use crate::error::Result;
use crate::hardware::{GamePort, MonotonicClock};
use crate::joystick::{Axis, Stick, StickSet};

pub use self::core::{AxisUpdate, DriverCore};
pub use corners::{CalibrationPhase, Corner};
pub use reading::{CalibrationReport, JoystickReading, ReadReason};
pub use scheduler::{PollScheduler, PollState};

/// Default inactivity-monitor interval in centiseconds.
pub const DEFAULT_MONITOR_INTERVAL_CS: u32 = 1000;

/// Locks a mutex, recovering the data if a holder panicked.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Runs calibration work that busy-waits on the centisecond clock.
///
/// On a multi-threaded runtime the current worker hands its other tasks
/// off first. `block_in_place` panics on a current-thread runtime, so
/// there the work just runs inline.
fn blocking<R>(work: impl FnOnce() -> R) -> R {
    match Handle::try_current() {
        Ok(handle) if handle.runtime_flavor() == RuntimeFlavor::MultiThread => {
            tokio::task::block_in_place(work)
        }
        _ => work(),
    }
}

/// Start-up settings of a [`Driver`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DriverOptions {
    pub global: GlobalConfig,
    pub monitor_interval_cs: u32,
}

impl Default for DriverOptions {
    fn default() -> Self {
        Self {
            global: GlobalConfig::default(),
            monitor_interval_cs: DEFAULT_MONITOR_INTERVAL_CS,
        }
    }
}

impl From<&Config> for DriverOptions {
    fn from(config: &Config) -> Self {
        Self {
            global: config.global(),
            monitor_interval_cs: config.polling.monitor_interval_cs,
        }
    }
}

/// Handle to a running joystick driver.
///
/// Background tasks run on the Tokio runtime current at construction.
/// Without one the driver still calibrates and reports, but reads fail
/// because polling cannot start.
#[derive(Debug)]
pub struct Driver {
    core: Arc<Mutex<DriverCore>>,
    scheduler: Arc<Mutex<PollScheduler>>,
    monitor: Mutex<Option<JoinHandle<()>>>,
}

impl Driver {
    /// Creates the driver, auto-calibrates both sticks at rest and arms
    /// the inactivity monitor.
    ///
    /// The sticks should be centred and untouched while this runs.
    ///
    /// # Blocking
    ///
    /// Calibration spans 66 to 72 centisecond ticks of the clock and
    /// busy-waits between them. Prefer `spawn_blocking` when calling from a
    /// current-thread runtime.
    pub fn new(
        port: Box<dyn GamePort>,
        clock: Box<dyn MonotonicClock>,
        options: DriverOptions,
    ) -> Self {
        info!("Joystick driver v{} starting", env!("CARGO_PKG_VERSION"));

        let mut core = DriverCore::new(port, clock, options.global);
        blocking(|| core.reinit(StickSet::all()));
        let core = Arc::new(Mutex::new(core));

        let runtime = Handle::try_current().ok();
        let scheduler = Arc::new(Mutex::new(PollScheduler::new(
            Arc::clone(&core),
            options.global.poll_interval_cs,
            runtime,
        )));
        let monitor = scheduler::spawn_monitor(
            &scheduler,
            scheduler::centiseconds(options.monitor_interval_cs),
        );

        Self {
            core,
            scheduler,
            monitor: Mutex::new(monitor),
        }
    }

    /// Reads the position and buttons of `stick`.
    ///
    /// `reason` selects the form: 0 for 8-bit, 1 for 16-bit. A stick
    /// number beyond the supported pair reads as centred. The first read
    /// after a quiet period restarts background polling from the centre
    /// positions.
    ///
    /// # Errors
    ///
    /// - [`JoystickError::UnsupportedReasonCode`] for any other `reason`
    /// - [`JoystickError::CalibrationIncomplete`] while a corner
    ///   calibration pair is half done
    /// - [`JoystickError::Scheduler`] if polling cannot be started
    ///
    /// [`JoystickError::UnsupportedReasonCode`]: crate::error::JoystickError::UnsupportedReasonCode
    /// [`JoystickError::CalibrationIncomplete`]: crate::error::JoystickError::CalibrationIncomplete
    /// [`JoystickError::Scheduler`]: crate::error::JoystickError::Scheduler
    pub fn read(&self, reason: u8, stick: u8) -> Result<JoystickReading> {
        let reason = ReadReason::try_from(reason)?;
        let mut scheduler = lock(&self.scheduler);

        if !lock(&self.core).phase().is_empty() {
            return Err(crate::error::JoystickError::CalibrationIncomplete);
        }

        scheduler.note_read();
        if scheduler.state() != PollState::Polling {
            scheduler.start()?;
            lock(&self.core).reseed_cache();
        }

        let reading = lock(&self.core).reading(reason, stick);
        Ok(reading)
    }

    /// Samples the top-right corner of both sticks.
    ///
    /// # Blocking
    ///
    /// Busy-waits for 34 to 40 centisecond ticks while holding the driver,
    /// so concurrent reads wait for it to finish.
    pub fn calibrate_top_right(&self) {
        self.calibrate_corner(Corner::TopRight);
    }

    /// Samples the bottom-left corner of both sticks.
    ///
    /// # Blocking
    ///
    /// Same as [`Driver::calibrate_top_right`].
    pub fn calibrate_bottom_left(&self) {
        self.calibrate_corner(Corner::BottomLeft);
    }

    fn calibrate_corner(&self, corner: Corner) {
        let mut scheduler = lock(&self.scheduler);
        scheduler.pause_for_calibration();
        blocking(|| lock(&self.core).calibrate_corner(corner));
    }

    /// Current global configuration.
    #[must_use]
    pub fn config(&self) -> GlobalConfig {
        lock(&self.core).config()
    }

    /// Applies a configuration update and returns the resulting settings.
    ///
    /// An empty update changes nothing. Flipping a zone switch recomputes
    /// every axis; a new poll interval takes effect immediately.
    ///
    /// # Errors
    ///
    /// Returns `ConfigSyntax` for invalid values (nothing changes) or
    /// `Scheduler` if polling could not be restarted at the new interval.
    pub fn configure(&self, update: &ConfigUpdate) -> Result<GlobalConfig> {
        let mut scheduler = lock(&self.scheduler);

        let (changes, config) = {
            let mut core = lock(&self.core);
            let changes = core.config.apply(update)?;
            if changes.zones {
                core.recalc(StickSet::all());
            }
            (changes, core.config())
        };

        if changes.poll_interval {
            scheduler.set_interval(config.poll_interval_cs)?;
        }
        Ok(config)
    }

    /// Overrides calibration fields of one axis.
    ///
    /// # Errors
    ///
    /// Returns `InvalidStickNumber` unless `stick` is 0 or 1.
    pub fn calibrate_axis(&self, stick: u8, axis: Axis, update: &AxisUpdate) -> Result<()> {
        let stick = Stick::new(stick)?;
        lock(&self.core).set_axis(stick, axis, update);
        Ok(())
    }

    /// Re-runs auto-detection on one stick, or both when `None`.
    ///
    /// # Errors
    ///
    /// Returns `InvalidStickNumber` unless `stick` is 0 or 1.
    ///
    /// # Blocking
    ///
    /// Busy-waits like [`Driver::new`] while holding the calibration table.
    pub fn reinit(&self, stick: Option<u8>) -> Result<()> {
        let sticks = match stick {
            Some(number) => StickSet::from(Stick::new(number)?),
            None => StickSet::all(),
        };
        blocking(|| lock(&self.core).reinit(sticks));
        Ok(())
    }

    /// Calibration of every axis.
    #[must_use]
    pub fn info(&self) -> CalibrationReport {
        lock(&self.core).report()
    }

    #[must_use]
    pub fn poll_state(&self) -> PollState {
        lock(&self.scheduler).state()
    }

    #[must_use]
    pub fn calibration_phase(&self) -> CalibrationPhase {
        lock(&self.core).phase()
    }

    /// Stops polling and the inactivity monitor.
    pub fn shutdown(&self) {
        lock(&self.scheduler).stop();
        if let Some(monitor) = lock(&self.monitor).take() {
            monitor.abort();
            info!("Joystick driver stopped");
        }
    }
}

impl Drop for Driver {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::JoystickError;
    use crate::hardware::sim::{SimHandle, SimulatedClock, SimulatedGamePort};
    use tokio::time::{self, Duration};
    use tokio_test::{assert_err, assert_ok};

    fn sim_driver() -> (Driver, SimHandle) {
        let port = SimulatedGamePort::new();
        let sim = port.handle();
        let driver = Driver::new(
            Box::new(port),
            Box::new(SimulatedClock::new()),
            DriverOptions::default(),
        );
        (driver, sim)
    }

    // ==================== Start-up Tests ====================

    #[test]
    fn test_new_calibrates_at_rest() {
        let (driver, _sim) = sim_driver();
        let report = driver.info();

        for entry in &report.axes {
            assert_eq!((entry.min, entry.ctr, entry.max), (0, 703, 1406));
        }
        assert_eq!(driver.poll_state(), PollState::Idle);
        assert!(driver.calibration_phase().is_empty());
    }

    #[test]
    fn test_options_from_file_config() {
        let mut config = Config::default();
        config.polling.monitor_interval_cs = 500;
        config.acquisition.smoothing = false;

        let options = DriverOptions::from(&config);
        assert_eq!(options.monitor_interval_cs, 500);
        assert!(!options.global.smoothing);
    }

    // ==================== Read Tests ====================

    #[test]
    fn test_read_without_runtime_fails_to_poll() {
        let (driver, _sim) = sim_driver();

        let result = driver.read(0, 0);

        assert!(matches!(result, Err(JoystickError::Scheduler(_))));
        assert_eq!(driver.poll_state(), PollState::Idle);
    }

    #[test]
    fn test_failed_poll_start_keeps_cache() {
        let (driver, _sim) = sim_driver();
        lock(&driver.core).cache[(Stick::ONE, Axis::X)] = 250;

        assert_err!(driver.read(1, 1));

        assert_eq!(lock(&driver.core).cached(Stick::ONE, Axis::X), 250);
    }

    #[test]
    fn test_read_rejects_reason_before_anything_else() {
        let (driver, sim) = sim_driver();
        let strobes = sim.strobes();

        assert!(matches!(driver.read(2, 0), Err(JoystickError::UnsupportedReasonCode(2))));
        assert_eq!(sim.strobes(), strobes);
    }

    #[tokio::test(start_paused = true)]
    async fn test_first_read_reseeds_and_polls() {
        let (driver, sim) = sim_driver();
        driver
            .calibrate_axis(0, Axis::X, &AxisUpdate { ctr_deadzone: Some(48), ..Default::default() })
            .unwrap();
        sim.set_position(Stick::ZERO, Axis::X, Some(1406));

        // Cached values start from the centre, whatever the stick is doing
        let reading = assert_ok!(driver.read(1, 0));
        assert_eq!(reading, JoystickReading::Analog { x: 0x7fff, y: 0x7fff, buttons: 0 });
        assert_eq!(driver.poll_state(), PollState::Polling);

        time::sleep(Duration::from_millis(200)).await;
        let reading = assert_ok!(driver.read(1, 0));
        assert_eq!(reading, JoystickReading::Analog { x: 0xffff, y: 0x7fff, buttons: 0 });
    }

    #[tokio::test(start_paused = true)]
    async fn test_polling_keeps_acquiring() {
        let (driver, sim) = sim_driver();
        assert_ok!(driver.read(0, 0));
        let strobes = sim.strobes();

        time::sleep(Duration::from_secs(1)).await;

        assert!(sim.strobes() >= strobes + 10, "strobes: {}", sim.strobes() - strobes);
    }

    #[tokio::test(start_paused = true)]
    async fn test_read_digital_with_buttons() {
        let (driver, sim) = sim_driver();
        sim.set_button(Stick::ONE, 0, true);
        sim.set_button(Stick::ONE, 1, true);

        let reading = assert_ok!(driver.read(0, 1));

        assert_eq!(reading, JoystickReading::Digital { x: 0, y: 0, buttons: 0b11 });
        assert_eq!(reading.packed(), (0x0003_0000, 0));
    }

    #[tokio::test(start_paused = true)]
    async fn test_read_unsupported_stick_is_centred() {
        let (driver, sim) = sim_driver();
        sim.set_button(Stick::ZERO, 0, true);

        assert_eq!(assert_ok!(driver.read(0, 5)).packed(), (0, 0));
        assert_eq!(assert_ok!(driver.read(1, 2)).packed(), (0x7fff_7fff, 0));
    }

    #[tokio::test(start_paused = true)]
    async fn test_inactivity_stops_polling() {
        let (driver, sim) = sim_driver();
        assert_ok!(driver.read(0, 0));

        time::sleep(Duration::from_secs(15)).await;
        assert_eq!(driver.poll_state(), PollState::Polling);

        time::sleep(Duration::from_secs(6)).await;
        assert_eq!(driver.poll_state(), PollState::Idle);

        let strobes = sim.strobes();
        time::sleep(Duration::from_secs(1)).await;
        assert_eq!(sim.strobes(), strobes);

        // Reading again restarts polling
        assert_ok!(driver.read(0, 0));
        assert_eq!(driver.poll_state(), PollState::Polling);
    }

    #[tokio::test(start_paused = true)]
    async fn test_regular_reads_keep_polling() {
        let (driver, _sim) = sim_driver();

        for _ in 0..6 {
            assert_ok!(driver.read(0, 0));
            time::sleep(Duration::from_secs(5)).await;
        }

        assert_eq!(driver.poll_state(), PollState::Polling);
    }

    // ==================== Calibration Tests ====================

    #[tokio::test(start_paused = true)]
    async fn test_calibration_pauses_and_gates_reads() {
        let (driver, sim) = sim_driver();
        assert_ok!(driver.read(0, 0));
        assert_eq!(driver.poll_state(), PollState::Polling);

        sim.set_all_positions(1400, 10);
        driver.calibrate_top_right();
        assert_eq!(driver.poll_state(), PollState::CalibrationPaused);
        assert_eq!(driver.calibration_phase(), CalibrationPhase::TOP_RIGHT_DONE);

        let strobes = sim.strobes();
        time::sleep(Duration::from_secs(1)).await;
        assert_eq!(sim.strobes(), strobes, "no polling while calibrating");
        assert!(matches!(driver.read(0, 0), Err(JoystickError::CalibrationIncomplete)));
        assert!(matches!(driver.read(1, 1), Err(JoystickError::CalibrationIncomplete)));

        sim.set_all_positions(10, 1400);
        driver.calibrate_bottom_left();
        assert!(driver.calibration_phase().is_empty());
        assert_eq!(driver.poll_state(), PollState::CalibrationPaused);

        sim.set_all_positions(1400, 1400);
        assert_ok!(driver.read(0, 0));
        assert_eq!(driver.poll_state(), PollState::Polling);

        time::sleep(Duration::from_millis(200)).await;
        let reading = assert_ok!(driver.read(0, 0));
        assert_eq!(reading, JoystickReading::Digital { x: 127, y: -127, buttons: 0 });
    }

    #[tokio::test(start_paused = true)]
    async fn test_half_calibration_blocks_reads_indefinitely() {
        let (driver, _sim) = sim_driver();
        driver.calibrate_bottom_left();

        for _ in 0..3 {
            time::sleep(Duration::from_secs(30)).await;
            assert_err!(driver.read(0, 0));
        }
        assert_eq!(driver.poll_state(), PollState::Idle);
    }

    #[test]
    fn test_calibrate_axis_validates_stick() {
        let (driver, _sim) = sim_driver();

        let result = driver.calibrate_axis(2, Axis::X, &AxisUpdate::default());
        assert!(matches!(result, Err(JoystickError::InvalidStickNumber(2))));

        assert_ok!(driver.calibrate_axis(1, Axis::Y, &AxisUpdate { min: Some(20), ..Default::default() }));
        assert_eq!(driver.info().axis(Stick::ONE, Axis::Y).map(|r| r.min), Some(20));
    }

    #[test]
    fn test_reinit_one_or_both() {
        let (driver, sim) = sim_driver();
        sim.set_all_positions(600, 600);

        assert_ok!(driver.reinit(Some(1)));
        assert_eq!(driver.info().axis(Stick::ZERO, Axis::X).map(|r| r.ctr), Some(703));
        assert_eq!(driver.info().axis(Stick::ONE, Axis::X).map(|r| r.ctr), Some(600));

        assert_ok!(driver.reinit(None));
        assert_eq!(driver.info().axis(Stick::ZERO, Axis::X).map(|r| r.ctr), Some(600));

        assert!(matches!(driver.reinit(Some(3)), Err(JoystickError::InvalidStickNumber(3))));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_calibration_on_multi_thread_runtime() {
        let (driver, sim) = sim_driver();
        assert_ok!(driver.read(0, 0));

        sim.set_all_positions(1400, 10);
        driver.calibrate_top_right();
        sim.set_all_positions(10, 1400);
        driver.calibrate_bottom_left();
        assert_ok!(driver.reinit(Some(1)));

        assert!(driver.calibration_phase().is_empty());
        let x = driver.info().axis(Stick::ZERO, Axis::X).map(|r| (r.min, r.max));
        assert_eq!(x, Some((10, 1400)));
        assert_ok!(driver.read(0, 0));
    }

    // ==================== Configuration Tests ====================

    #[test]
    fn test_configure_empty_reports_current() {
        let (driver, _sim) = sim_driver();
        let config = assert_ok!(driver.configure(&ConfigUpdate::default()));
        assert_eq!(config, GlobalConfig::default());
    }

    #[test]
    fn test_configure_zone_switch_recalculates() {
        let (driver, _sim) = sim_driver();
        assert_ok!(driver.calibrate_axis(
            0,
            Axis::X,
            &AxisUpdate { ctr_deadzone: Some(48), ..Default::default() }
        ));

        assert_ok!(driver.configure(&ConfigUpdate { ctr_zones: Some(false), ..Default::default() }));

        let core = lock(&driver.core);
        assert_eq!(core.calibration(Stick::ZERO, Axis::X).ctr_high(), 703);
    }

    #[test]
    fn test_configure_rejects_short_poll() {
        let (driver, _sim) = sim_driver();
        let result = driver.configure(&ConfigUpdate { poll_interval_cs: Some(1), ..Default::default() });
        assert!(matches!(result, Err(JoystickError::ConfigSyntax(_))));
        assert_eq!(driver.config().poll_interval_cs, 7);
    }

    #[tokio::test(start_paused = true)]
    async fn test_configure_poll_interval_while_polling() {
        let (driver, sim) = sim_driver();
        assert_ok!(driver.read(0, 0));

        let config = assert_ok!(driver.configure(&ConfigUpdate {
            poll_interval_cs: Some(50),
            ..Default::default()
        }));
        assert_eq!(config.poll_interval_cs, 50);
        assert_eq!(driver.poll_state(), PollState::Polling);

        let strobes = sim.strobes();
        time::sleep(Duration::from_millis(2005)).await;
        let polls = sim.strobes() - strobes;
        assert!((4..=5).contains(&polls), "polls: {}", polls);
    }

    // ==================== Shutdown Tests ====================

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_stops_everything() {
        let (driver, sim) = sim_driver();
        assert_ok!(driver.read(0, 0));

        driver.shutdown();
        time::sleep(Duration::from_millis(10)).await;
        let strobes = sim.strobes();
        time::sleep(Duration::from_secs(1)).await;

        assert_eq!(driver.poll_state(), PollState::Idle);
        assert_eq!(sim.strobes(), strobes);
    }
}
