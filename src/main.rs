//! # Gameport Joystick
//!
//! Runs the joystick driver against a real or simulated game port and
//! logs both sticks' positions until interrupted.

use std::path::Path;

use anyhow::{Context, Result};
use tokio::time::{interval, Duration};
use tracing::{debug, info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;

use gameport_joystick::config::{Backend, Config};
use gameport_joystick::driver::{Driver, DriverOptions};
use gameport_joystick::hardware::devport::DevPortGamePort;
use gameport_joystick::hardware::sim::{SimulatedClock, SimulatedGamePort};
use gameport_joystick::hardware::{resolve_port_address, GamePort, MonotonicClock, SystemClock};

/// Milliseconds between logged readings
const REPORT_INTERVAL_MS: u64 = 1000;

/// 16-bit analogue reads
const READ_REASON: u8 = 1;

/// Main entry point
///
/// Usage: `gameport-joystick [config.toml]`
///
/// # Control Flow
///
/// 1. Load configuration and set up logging
/// 2. Open the configured game port backend
/// 3. Start the driver, which calibrates both sticks at rest
/// 4. Read both sticks once per second until Ctrl+C
///
/// # Errors
///
/// Returns error if:
/// - The configuration file cannot be loaded
/// - The game port cannot be opened
#[tokio::main]
async fn main() -> Result<()> {
    let config = match std::env::args().nth(1) {
        Some(path) => Config::load(&path).with_context(|| format!("loading {}", path))?,
        None => Config::default(),
    };

    let _log_guard = init_logging(&config)?;

    info!("Gameport Joystick v{} starting...", env!("CARGO_PKG_VERSION"));
    debug!("Configuration: {:?}", config);

    let (port, clock) = open_backend(&config)?;
    info!("Calibrating joysticks, leave the sticks centred");
    let driver = Driver::new(port, clock, DriverOptions::from(&config));

    info!("Configuration: {}", driver.config());
    info!("Calibration:\n{}", driver.info());
    info!("Press Ctrl+C to exit");

    let mut report_interval = interval(Duration::from_millis(REPORT_INTERVAL_MS));

    loop {
        tokio::select! {
            _ = report_interval.tick() => {
                for stick in 0..2 {
                    match driver.read(READ_REASON, stick) {
                        Ok(reading) => {
                            let (position, buttons) = reading.packed();
                            info!("Stick {}: {:08x} buttons {:x}", stick, position, buttons);
                        }
                        Err(e) => warn!("Failed to read stick {}: {}", stick, e),
                    }
                }
            }

            _ = tokio::signal::ctrl_c() => {
                info!("Received Ctrl+C, shutting down...");
                break;
            }
        }
    }

    driver.shutdown();
    Ok(())
}

/// Sets up the tracing subscriber, writing to a file when one is configured.
///
/// `RUST_LOG` overrides the configured level. The returned guard must be
/// held until exit so buffered file output is flushed.
fn init_logging(config: &Config) -> Result<Option<WorkerGuard>> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.logging.level))
        .context("invalid log level")?;

    let Some(file) = config.logging.file.as_deref() else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
        return Ok(None);
    };

    let path = Path::new(file);
    let directory = path.parent().unwrap_or_else(|| Path::new("."));
    let file_name = path
        .file_name()
        .with_context(|| format!("log file {} has no file name", file))?;

    let appender = tracing_appender::rolling::never(directory, file_name);
    let (writer, guard) = tracing_appender::non_blocking(appender);
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(writer)
        .with_ansi(false)
        .init();
    Ok(Some(guard))
}

/// Opens the configured game port and a matching clock.
fn open_backend(config: &Config) -> Result<(Box<dyn GamePort>, Box<dyn MonotonicClock>)> {
    let modulus = config.hardware.counter_modulus;

    match config.hardware.backend {
        Backend::DevPort => {
            let address = resolve_port_address(config.hardware.port_address.as_deref())?;
            let port = DevPortGamePort::open_with_modulus(address, modulus)
                .with_context(|| format!("opening game port at {:#x}", address))?;
            info!("Game port opened at {:#x}", port.address());
            Ok((Box::new(port), Box::new(SystemClock::new())))
        }
        Backend::Simulated => {
            info!("Using simulated game port");
            Ok((
                Box::new(SimulatedGamePort::with_modulus(modulus)),
                Box::new(SimulatedClock::new()),
            ))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_read_reason_is_analog() {
        assert_eq!(READ_REASON, 1, "the report loop shows 16-bit positions");
    }

    #[test]
    fn test_open_simulated_backend() {
        let mut config = Config::default();
        config.hardware.backend = Backend::Simulated;

        let (port, _clock) = open_backend(&config).unwrap();
        assert_eq!(port.counter_modulus(), 20000);
    }

    #[test]
    fn test_simulated_backend_drives_reads() {
        let mut config = Config::default();
        config.hardware.backend = Backend::Simulated;
        let (port, clock) = open_backend(&config).unwrap();

        let driver = Driver::new(port, clock, DriverOptions::from(&config));

        let report = driver.info();
        assert_eq!(report.axes.len(), 4);
        assert!(report.axes.iter().all(|entry| entry.ctr == 703));
    }
}
