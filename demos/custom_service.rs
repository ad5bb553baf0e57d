//! Hub with a custom service and a custom command
//!
//! Run with: cargo run --example custom_service [BIND_ADDR]
//!
//! Then poke it with the bundled terminal:
//!
//! ```text
//! cargo run --bin hub-terminal
//! > ping tag=hello
//! > subscribe service_name=sawtooth
//! > unsubscribe service_name=sawtooth
//! ```
//!
//! Demonstrates both extension points: a `ServicePlugin` producing a
//! simulated sensor wave from its own worker thread, and an extra `ping`
//! command registered on the router.

use std::sync::mpsc::{self, RecvTimeoutError};
use std::thread;
use std::time::Duration;

use serde_json::json;
use tracing_subscriber::EnvFilter;

use sensor_hub::{
    ConnectionGateway, HubConfig, Packet, Payload, PublishHandle, ServiceCatalog, ServicePlugin,
    SetupError,
};

/// Simulated sensor: publishes a sawtooth wave four times a second.
struct SawtoothWave {
    amplitude: u32,
    stop_tx: Option<mpsc::Sender<()>>,
    worker: Option<thread::JoinHandle<()>>,
}

impl SawtoothWave {
    fn new(amplitude: u32) -> Self {
        SawtoothWave {
            amplitude,
            stop_tx: None,
            worker: None,
        }
    }
}

impl ServicePlugin for SawtoothWave {
    fn setup(&mut self, _config: &HubConfig, publisher: PublishHandle) -> Result<(), SetupError> {
        let (stop_tx, stop_rx) = mpsc::channel();
        let amplitude = self.amplitude;
        let worker = thread::Builder::new()
            .name("sawtooth".to_string())
            .spawn(move || {
                let mut level = 0u32;
                loop {
                    let mut values = Payload::new();
                    values.insert("level".to_string(), json!(level));
                    if publisher.publish(values).is_err() {
                        break;
                    }
                    level = (level + 1) % amplitude;
                    match stop_rx.recv_timeout(Duration::from_millis(250)) {
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
            let _ = worker.join();
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env()
                .add_directive("sensor_hub=debug".parse()?)
                .add_directive("custom_service=debug".parse()?),
        )
        .init();

    let args: Vec<String> = std::env::args().collect();
    let bind_addr = match args.get(1) {
        Some(raw) => raw.parse()?,
        None => HubConfig::default().bind_addr,
    };

    let mut catalog = ServiceCatalog::builtin();
    catalog.register("sawtooth", || Ok(Box::new(SawtoothWave::new(16))));

    let config = HubConfig::default().bind(bind_addr);
    let mut gateway = ConnectionGateway::bind(config, catalog).await?;

    // Replies echo the optional tag so round trips are easy to follow.
    gateway.router_mut().register("ping", |state, id, packet| {
        let mut reply = Packet::new("pong");
        if let Some(tag) = packet.get_str("tag") {
            reply = reply.field("tag", tag);
        }
        state.reply(id, reply);
    });

    println!("Hub running on {}", gateway.local_addr());
    println!("Try: cargo run --bin hub-terminal");

    gateway
        .run_until(async {
            let _ = tokio::signal::ctrl_c().await;
            println!("\nShutting down...");
        })
        .await?;
    Ok(())
}
