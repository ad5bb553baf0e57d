//! Heartbeat service
//!
//! Publishes a monotonically increasing sequence number and the hub uptime
//! once per second. Mostly useful for smoke-testing a deployment and as the
//! smallest example of a continuous producer plugin.

use std::sync::mpsc::{self, RecvTimeoutError};
use std::thread;
use std::time::{Duration, Instant};

use serde_json::json;

use super::{PublishHandle, ServicePlugin, SetupError};
use crate::protocol::Payload;
use crate::server::config::HubConfig;

const DEFAULT_BEAT_INTERVAL: Duration = Duration::from_secs(1);

/// Publishes a beat counter while at least one client subscribes.
pub struct Heartbeat {
    beat_interval: Duration,
    stop_tx: Option<mpsc::Sender<()>>,
    worker: Option<thread::JoinHandle<()>>,
}

impl Heartbeat {
    pub fn new() -> Self {
        Heartbeat {
            beat_interval: DEFAULT_BEAT_INTERVAL,
            stop_tx: None,
            worker: None,
        }
    }

    /// Override the beat interval.
    pub fn beat_interval(mut self, interval: Duration) -> Self {
        self.beat_interval = interval;
        self
    }
}

impl Default for Heartbeat {
    fn default() -> Self {
        Heartbeat::new()
    }
}

impl ServicePlugin for Heartbeat {
    fn setup(&mut self, _config: &HubConfig, publisher: PublishHandle) -> Result<(), SetupError> {
        let (stop_tx, stop_rx) = mpsc::channel();
        let interval = self.beat_interval;
        let worker = thread::Builder::new()
            .name("heartbeat".to_string())
            .spawn(move || {
                let started = Instant::now();
                let mut seq: u64 = 0;
                loop {
                    let mut values = Payload::new();
                    values.insert("seq".to_string(), json!(seq));
                    values.insert(
                        "uptime_secs".to_string(),
                        json!(started.elapsed().as_secs()),
                    );
                    if publisher.publish(values).is_err() {
                        break;
                    }
                    seq += 1;
                    match stop_rx.recv_timeout(interval) {
                        Err(RecvTimeoutError::Timeout) => continue,
                        _ => break,
                    }
                }
            })?;

        self.stop_tx = Some(stop_tx);
        self.worker = Some(worker);
        Ok(())
    }

    fn cleanup(&mut self) {
        self.stop_tx.take();
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                tracing::error!("Heartbeat worker panicked");
            }
        }
    }
}
