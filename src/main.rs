//! sensor-hub daemon
//!
//! Runs the hub with the built-in service catalog until interrupted. The
//! first Ctrl-C shuts down gracefully (services cleaned up, sockets
//! closed); a second one exits immediately.

use std::net::{IpAddr, SocketAddr};

use tracing_subscriber::EnvFilter;

use sensor_hub::{ConnectionGateway, HubConfig, ServiceCatalog};

fn print_usage(program: &str) {
    eprintln!("Usage: {} [BIND_ADDR] [--log-level LEVEL]", program);
    eprintln!();
    eprintln!("  BIND_ADDR    address or port to listen on (default 127.0.0.1:8000)");
    eprintln!("  --log-level  log level when RUST_LOG is unset (default info)");
}

fn parse_bind_addr(raw: &str) -> Result<SocketAddr, String> {
    // Accept "localhost" wherever an IP would go
    let normalized = raw.replace("localhost", "127.0.0.1");
    let default_addr = HubConfig::default().bind_addr;

    if let Ok(addr) = normalized.parse::<SocketAddr>() {
        return Ok(addr);
    }
    if let Ok(ip) = normalized.parse::<IpAddr>() {
        return Ok(SocketAddr::new(ip, default_addr.port()));
    }
    // A bare port binds the default host
    if let Ok(port) = normalized.parse::<u16>() {
        return Ok(SocketAddr::new(default_addr.ip(), port));
    }

    Err(format!(
        "Invalid bind address '{}', expected IP:PORT, IP, PORT or 'localhost'",
        raw
    ))
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args: Vec<String> = std::env::args().collect();
    let mut bind_addr = HubConfig::default().bind_addr;
    let mut log_level = "info".to_string();

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "-h" | "--help" => {
                print_usage(&args[0]);
                return Ok(());
            }
            "--log-level" => {
                i += 1;
                match args.get(i) {
                    Some(level) => log_level = level.clone(),
                    None => {
                        print_usage(&args[0]);
                        return Err("--log-level needs a value".into());
                    }
                }
            }
            raw => bind_addr = parse_bind_addr(raw)?,
        }
        i += 1;
    }

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&log_level)),
        )
        .init();

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        addr = %bind_addr,
        "Starting sensor-hub"
    );

    let config = HubConfig::default().bind(bind_addr);
    let gateway = ConnectionGateway::bind(config, ServiceCatalog::builtin()).await?;
    gateway.run_until(shutdown_signal()).await?;

    tracing::info!("Hub stopped");
    Ok(())
}

/// Resolves on the first Ctrl-C. A watcher for a second Ctrl-C is left
/// behind so an operator can cut a slow shutdown short.
async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => {
            tracing::info!("Interrupt received, shutting down");
            tokio::spawn(async {
                if tokio::signal::ctrl_c().await.is_ok() {
                    tracing::warn!("Second interrupt, exiting immediately");
                    std::process::exit(1);
                }
            });
        }
        Err(e) => {
            tracing::error!(error = %e, "Failed to listen for shutdown signal");
            // Without a signal handler the hub just runs until killed.
            std::future::pending::<()>().await;
        }
    }
}
