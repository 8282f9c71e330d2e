//! # Poll Scheduler
//!
//! Background acquisition while clients are reading, and automatic
//! shutdown once they stop.
//!
//! ```text
//!   ticker task ──try_send──▶ [ 1 slot ] ──recv──▶ acquirer task
//!   (poll interval)                                (locks the core, reads)
//!
//!   monitor task: every monitor interval, stop polling if nobody read
//! ```
//!
//! The ticker never does any hardware work. A tick that finds an
//! acquisition still outstanding is dropped, so at most one is ever queued
//! or running.
//!
//! ## States
//!
//! | From | To | Trigger |
//! |------|----|---------|
//! | Idle | Polling | first read |
//! | Polling | Idle | monitor finds no read since its last check |
//! | Polling | CalibrationPaused | corner calibration starts |
//! | CalibrationPaused | Polling | next read |

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, TryLockError, Weak};

use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{self, Duration, Instant, MissedTickBehavior};
use tracing::{debug, info, trace};

use super::core::DriverCore;
use super::lock;
use crate::error::{JoystickError, Result};

/// Whether background acquisition is running.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PollState {
    #[default]
    Idle,
    Polling,
    /// Stopped for a corner calibration; the next read restarts it.
    CalibrationPaused,
}

/// Converts a centisecond count to a [`Duration`].
#[must_use]
pub fn centiseconds(cs: u32) -> Duration {
    Duration::from_millis(u64::from(cs) * 10)
}

/// Ticker and acquirer of one polling run; dropping aborts both.
#[derive(Debug)]
struct PollTasks {
    ticker: JoinHandle<()>,
    acquirer: JoinHandle<()>,
}

impl Drop for PollTasks {
    fn drop(&mut self) {
        self.ticker.abort();
        self.acquirer.abort();
    }
}

/// Owner of the polling tasks and the activity flag.
#[derive(Debug)]
pub struct PollScheduler {
    core: Arc<Mutex<DriverCore>>,
    runtime: Option<Handle>,
    state: PollState,
    interval_cs: u32,
    read_since_check: bool,
    tasks: Option<PollTasks>,
}

impl PollScheduler {
    /// Idle scheduler that will spawn its tasks on `runtime`.
    pub fn new(core: Arc<Mutex<DriverCore>>, interval_cs: u32, runtime: Option<Handle>) -> Self {
        Self {
            core,
            runtime,
            state: PollState::Idle,
            interval_cs,
            read_since_check: false,
            tasks: None,
        }
    }

    #[must_use]
    pub fn state(&self) -> PollState {
        self.state
    }

    #[must_use]
    pub fn interval_cs(&self) -> u32 {
        self.interval_cs
    }

    /// Records client activity for the inactivity monitor.
    pub fn note_read(&mut self) {
        self.read_since_check = true;
    }

    /// Starts periodic acquisition.
    ///
    /// # Errors
    ///
    /// Returns [`JoystickError::Scheduler`] if there is no runtime to spawn
    /// the tasks on; the state is left unchanged.
    pub fn start(&mut self) -> Result<()> {
        let runtime = self.runtime.as_ref().ok_or_else(|| {
            JoystickError::Scheduler("no async runtime available for the poll ticker".to_string())
        })?;

        let outstanding = Arc::new(AtomicBool::new(false));
        let (requests_tx, requests_rx) = mpsc::channel(1);

        let ticker = runtime.spawn(run_ticker(
            centiseconds(self.interval_cs),
            Arc::clone(&outstanding),
            requests_tx,
        ));
        let acquirer = runtime.spawn(run_acquirer(Arc::clone(&self.core), outstanding, requests_rx));

        self.tasks = Some(PollTasks { ticker, acquirer });
        self.state = PollState::Polling;
        info!("Polling joysticks every {} cs", self.interval_cs);
        Ok(())
    }

    /// Stops periodic acquisition and discards any pending request.
    pub fn stop(&mut self) {
        if self.tasks.take().is_some() {
            debug!("Stopped polling joysticks");
        }
        self.state = PollState::Idle;
    }

    /// Stops polling for the duration of a corner calibration.
    pub fn pause_for_calibration(&mut self) {
        if self.state == PollState::Polling {
            self.tasks = None;
            self.state = PollState::CalibrationPaused;
            debug!("Polling paused for calibration");
        }
    }

    /// Changes the poll interval, restarting the ticker if polling.
    ///
    /// # Errors
    ///
    /// Returns [`JoystickError::Scheduler`] if the restart fails; the
    /// scheduler is then `Idle`.
    pub fn set_interval(&mut self, interval_cs: u32) -> Result<()> {
        self.interval_cs = interval_cs;
        if self.state == PollState::Polling {
            self.stop();
            self.start()?;
        }
        Ok(())
    }

    /// One inactivity-monitor check. Returns true if polling was stopped.
    pub fn check_activity(&mut self) -> bool {
        if self.read_since_check {
            self.read_since_check = false;
            return false;
        }

        if self.state == PollState::Polling {
            self.stop();
            info!("No joystick reads recently, polling stopped");
            return true;
        }
        false
    }
}

/// Raises the outstanding flag and queues a request, unless one is
/// already outstanding. Returns whether a request was queued.
pub(crate) fn request_acquisition(outstanding: &AtomicBool, requests: &mpsc::Sender<()>) -> bool {
    if outstanding.swap(true, Ordering::AcqRel) {
        return false;
    }
    if requests.try_send(()).is_err() {
        outstanding.store(false, Ordering::Release);
        return false;
    }
    true
}

async fn run_ticker(period: Duration, outstanding: Arc<AtomicBool>, requests: mpsc::Sender<()>) {
    let mut ticker = time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        ticker.tick().await;
        if !request_acquisition(&outstanding, &requests) {
            trace!("Acquisition still outstanding, tick dropped");
        }
    }
}

async fn run_acquirer(
    core: Arc<Mutex<DriverCore>>,
    outstanding: Arc<AtomicBool>,
    mut requests: mpsc::Receiver<()>,
) {
    while requests.recv().await.is_some() {
        lock(&core).poll();
        outstanding.store(false, Ordering::Release);
    }
}

/// Spawns the inactivity monitor on the current runtime, if there is one.
///
/// The monitor holds only a weak reference and exits once the scheduler
/// is gone.
pub fn spawn_monitor(
    scheduler: &Arc<Mutex<PollScheduler>>,
    period: Duration,
) -> Option<JoinHandle<()>> {
    let runtime = Handle::try_current().ok()?;
    Some(runtime.spawn(run_monitor(Arc::downgrade(scheduler), period)))
}

async fn run_monitor(scheduler: Weak<Mutex<PollScheduler>>, period: Duration) {
    let mut ticker = time::interval_at(Instant::now() + period, period);

    loop {
        ticker.tick().await;
        let Some(shared) = scheduler.upgrade() else {
            break;
        };

        // A busy scheduler means a read or calibration is in progress
        let checked = match shared.try_lock() {
            Ok(mut guard) => {
                guard.check_activity();
                true
            }
            Err(TryLockError::Poisoned(poisoned)) => {
                poisoned.into_inner().check_activity();
                true
            }
            Err(TryLockError::WouldBlock) => false,
        };
        if !checked {
            trace!("Scheduler busy, skipping inactivity check");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::GlobalConfig;
    use crate::hardware::sim::{SimHandle, SimulatedClock, SimulatedGamePort};

    fn shared_core() -> (Arc<Mutex<DriverCore>>, SimHandle) {
        let port = SimulatedGamePort::new();
        let sim = port.handle();
        let core = DriverCore::new(
            Box::new(port),
            Box::new(SimulatedClock::new()),
            GlobalConfig::default(),
        );
        (Arc::new(Mutex::new(core)), sim)
    }

    // ==================== Tick Request Tests ====================

    #[test]
    fn test_request_when_idle() {
        let outstanding = AtomicBool::new(false);
        let (tx, mut rx) = mpsc::channel(1);

        assert!(request_acquisition(&outstanding, &tx));
        assert!(outstanding.load(Ordering::Acquire));
        assert!(rx.try_recv().is_ok());
    }

    #[test]
    fn test_tick_dropped_while_outstanding() {
        let outstanding = AtomicBool::new(false);
        let (tx, mut rx) = mpsc::channel(1);

        assert!(request_acquisition(&outstanding, &tx));
        assert!(!request_acquisition(&outstanding, &tx));
        assert!(!request_acquisition(&outstanding, &tx));

        assert!(rx.try_recv().is_ok());
        assert!(rx.try_recv().is_err(), "only one request is ever queued");
    }

    #[test]
    fn test_request_after_completion() {
        let outstanding = AtomicBool::new(false);
        let (tx, mut rx) = mpsc::channel(1);

        assert!(request_acquisition(&outstanding, &tx));
        rx.try_recv().unwrap();
        outstanding.store(false, Ordering::Release);

        assert!(request_acquisition(&outstanding, &tx));
    }

    #[test]
    fn test_request_with_closed_channel_clears_flag() {
        let outstanding = AtomicBool::new(false);
        let (tx, rx) = mpsc::channel(1);
        drop(rx);

        assert!(!request_acquisition(&outstanding, &tx));
        assert!(!outstanding.load(Ordering::Acquire));
    }

    #[test]
    fn test_centiseconds() {
        assert_eq!(centiseconds(7), Duration::from_millis(70));
        assert_eq!(centiseconds(1000), Duration::from_secs(10));
    }

    // ==================== State Machine Tests ====================

    #[test]
    fn test_start_without_runtime_stays_idle() {
        let (core, _sim) = shared_core();
        let mut scheduler = PollScheduler::new(core, 7, None);

        let result = scheduler.start();

        assert!(matches!(result, Err(JoystickError::Scheduler(_))));
        assert_eq!(scheduler.state(), PollState::Idle);
    }

    #[test]
    fn test_pause_only_from_polling() {
        let (core, _sim) = shared_core();
        let mut scheduler = PollScheduler::new(core, 7, None);

        scheduler.pause_for_calibration();
        assert_eq!(scheduler.state(), PollState::Idle);
    }

    #[test]
    fn test_check_activity_clears_flag_first() {
        let (core, _sim) = shared_core();
        let mut scheduler = PollScheduler::new(core, 7, None);
        scheduler.note_read();

        assert!(!scheduler.check_activity());
        assert!(!scheduler.check_activity(), "idle scheduler has nothing to stop");
        assert_eq!(scheduler.state(), PollState::Idle);
    }

    #[test]
    fn test_set_interval_while_idle() {
        let (core, _sim) = shared_core();
        let mut scheduler = PollScheduler::new(core, 7, None);

        scheduler.set_interval(3).unwrap();

        assert_eq!(scheduler.interval_cs(), 3);
        assert_eq!(scheduler.state(), PollState::Idle);
    }

    // ==================== Polling Tests ====================

    #[tokio::test(start_paused = true)]
    async fn test_polling_acquires_periodically() {
        let (core, sim) = shared_core();
        let mut scheduler = PollScheduler::new(Arc::clone(&core), 7, Some(Handle::current()));
        sim.set_position(crate::joystick::Stick::ZERO, crate::joystick::Axis::X, Some(250));

        scheduler.start().unwrap();
        assert_eq!(scheduler.state(), PollState::Polling);
        time::sleep(Duration::from_millis(705)).await;

        assert!(sim.strobes() >= 5, "strobes: {}", sim.strobes());
        assert_eq!(
            lock(&core).cached(crate::joystick::Stick::ZERO, crate::joystick::Axis::X),
            250
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_halts_acquisition() {
        let (core, sim) = shared_core();
        let mut scheduler = PollScheduler::new(core, 7, Some(Handle::current()));

        scheduler.start().unwrap();
        time::sleep(Duration::from_millis(200)).await;
        scheduler.stop();
        time::sleep(Duration::from_millis(10)).await;
        let strobes = sim.strobes();

        time::sleep(Duration::from_secs(1)).await;

        assert_eq!(sim.strobes(), strobes);
        assert_eq!(scheduler.state(), PollState::Idle);
    }

    #[tokio::test(start_paused = true)]
    async fn test_set_interval_restarts_polling() {
        let (core, sim) = shared_core();
        let mut scheduler = PollScheduler::new(core, 7, Some(Handle::current()));
        scheduler.start().unwrap();

        scheduler.set_interval(5).unwrap();
        assert_eq!(scheduler.state(), PollState::Polling);

        // 50 ms ticks rather than 70 ms
        let before = sim.strobes();
        time::sleep(Duration::from_millis(1005)).await;
        let polls = sim.strobes() - before;
        assert!((20..=22).contains(&polls), "polls: {}", polls);
    }

    #[tokio::test(start_paused = true)]
    async fn test_monitor_stops_idle_polling() {
        let (core, _sim) = shared_core();
        let scheduler = Arc::new(Mutex::new(PollScheduler::new(
            core,
            7,
            Some(Handle::current()),
        )));
        let monitor = spawn_monitor(&scheduler, centiseconds(1000)).unwrap();

        {
            let mut guard = lock(&scheduler);
            guard.note_read();
            guard.start().unwrap();
        }

        time::sleep(Duration::from_secs(15)).await;
        assert_eq!(lock(&scheduler).state(), PollState::Polling);

        time::sleep(Duration::from_secs(6)).await;
        assert_eq!(lock(&scheduler).state(), PollState::Idle);

        monitor.abort();
    }

    #[tokio::test(start_paused = true)]
    async fn test_monitor_exits_with_scheduler() {
        let (core, _sim) = shared_core();
        let scheduler = Arc::new(Mutex::new(PollScheduler::new(core, 7, None)));
        let monitor = spawn_monitor(&scheduler, centiseconds(100)).unwrap();

        drop(scheduler);
        time::sleep(Duration::from_secs(2)).await;

        assert!(monitor.is_finished());
    }
}
