//! Board temperature service
//!
//! Polls a thermal sysfs node and publishes the temperature in degrees
//! Celsius once per interval. The kernel reports millidegrees, so a reading
//! of `48250` becomes `48.25`.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::thread;
use std::time::Duration;

use serde_json::json;

use super::{PublishHandle, ServicePlugin, SetupError};
use crate::protocol::Payload;
use crate::server::config::HubConfig;

/// Thermal zone read by default.
pub const DEFAULT_SYSFS_PATH: &str = "/sys/class/thermal/thermal_zone0/temp";

const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Publishes the board temperature while at least one client subscribes.
pub struct BoardTemperature {
    sysfs_path: PathBuf,
    poll_interval: Duration,
    stop_tx: Option<mpsc::Sender<()>>,
    worker: Option<thread::JoinHandle<()>>,
}

impl BoardTemperature {
    /// Plugin reading the default thermal zone.
    pub fn new() -> Self {
        BoardTemperature::with_path(DEFAULT_SYSFS_PATH)
    }

    /// Plugin reading an alternate sysfs node.
    pub fn with_path(path: impl Into<PathBuf>) -> Self {
        BoardTemperature {
            sysfs_path: path.into(),
            poll_interval: DEFAULT_POLL_INTERVAL,
            stop_tx: None,
            worker: None,
        }
    }

    /// Override the polling interval.
    pub fn poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }
}

impl Default for BoardTemperature {
    fn default() -> Self {
        BoardTemperature::new()
    }
}

fn read_temperature(path: &Path) -> io::Result<f64> {
    let raw = fs::read_to_string(path)?;
    let millidegrees: f64 = raw
        .trim()
        .parse()
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
    Ok(millidegrees / 1000.0)
}

impl ServicePlugin for BoardTemperature {
    fn setup(&mut self, _config: &HubConfig, publisher: PublishHandle) -> Result<(), SetupError> {
        if !self.sysfs_path.exists() {
            return Err(SetupError::new(format!(
                "Thermal sysfs node {} not found",
                self.sysfs_path.display()
            )));
        }

        let (stop_tx, stop_rx) = mpsc::channel();
        let path = self.sysfs_path.clone();
        let interval = self.poll_interval;
        let worker = thread::Builder::new()
            .name("board-temperature".to_string())
            .spawn(move || loop {
                match read_temperature(&path) {
                    Ok(celsius) => {
                        let mut values = Payload::new();
                        values.insert("temperature".to_string(), json!(celsius));
                        values.insert("unit".to_string(), json!("°C"));
                        if publisher.publish(values).is_err() {
                            break;
                        }
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, "Failed to read board temperature");
                    }
                }
                match stop_rx.recv_timeout(interval) {
                    Err(RecvTimeoutError::Timeout) => continue,
                    _ => break,
                }
            })?;

        self.stop_tx = Some(stop_tx);
        self.worker = Some(worker);
        Ok(())
    }

    fn cleanup(&mut self) {
        // The worker exits when the stop sender drops.
        self.stop_tx.take();
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                tracing::error!("Board temperature worker panicked");
            }
        }
    }
}
