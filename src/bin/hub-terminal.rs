//! Interactive terminal client for a running hub
//!
//! Reads commands from stdin and prints every packet the hub sends back.
//! Two input forms are accepted:
//!
//! ```text
//! subscribe service_name=heartbeat          shorthand, key=value pairs
//! {"event": "subscribe", "payload": {...}}  raw JSON frame
//! ```
//!
//! Values in shorthand pairs are parsed as JSON when possible, so
//! `threshold=1.5` becomes a number and `name=probe` a string.

use futures::{SinkExt, StreamExt};
use serde_json::Value;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::net::TcpStream;
use tokio_util::codec::Framed;

use sensor_hub::{Packet, PacketCodec};

const DEFAULT_ADDR: &str = "127.0.0.1:8000";

fn print_usage(program: &str) {
    eprintln!("Usage: {} [ADDR]", program);
    eprintln!();
    eprintln!("  ADDR  hub address or port (default {})", DEFAULT_ADDR);
    eprintln!();
    eprintln!("Commands are read from stdin, one per line:");
    eprintln!("  subscribe service_name=heartbeat");
    eprintln!("  unsubscribe service_name=heartbeat");
    eprintln!("  set_username username=rover1");
    eprintln!("  get_subscriptions");
    eprintln!("or a raw JSON frame starting with '{{'.");
}

fn parse_addr_arg(raw: &str) -> String {
    // A bare port goes to localhost.
    if raw.parse::<u16>().is_ok() {
        return format!("127.0.0.1:{}", raw);
    }
    raw.to_string()
}

/// Turn one stdin line into a packet, or None if it should be skipped.
fn expand_line(line: &str) -> Option<Packet> {
    let line = line.trim();
    if line.is_empty() {
        return None;
    }

    if line.starts_with('{') {
        return match Packet::parse(line) {
            Ok(packet) => Some(packet),
            Err(e) => {
                eprintln!("Invalid packet: {}", e);
                None
            }
        };
    }

    let mut parts = line.split_whitespace();
    let event = parts.next()?;
    let mut packet = Packet::new(event);
    for pair in parts {
        match pair.split_once('=') {
            Some((key, value)) => {
                let value: Value = serde_json::from_str(value)
                    .unwrap_or_else(|_| Value::String(value.to_string()));
                packet = packet.field(key, value);
            }
            None => {
                eprintln!("Ignoring '{}', expected key=value", pair);
            }
        }
    }
    Some(packet)
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args: Vec<String> = std::env::args().collect();
    let mut addr = DEFAULT_ADDR.to_string();

    for arg in &args[1..] {
        match arg.as_str() {
            "-h" | "--help" => {
                print_usage(&args[0]);
                return Ok(());
            }
            raw => addr = parse_addr_arg(raw),
        }
    }

    let stream = TcpStream::connect(&addr).await?;
    eprintln!("Connected to {}", addr);
    let mut frames = Framed::new(stream, PacketCodec::default());
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        tokio::select! {
            line = lines.next_line() => match line? {
                Some(line) => {
                    if let Some(packet) = expand_line(&line) {
                        frames.send(packet).await?;
                    }
                }
                None => break,
            },
            frame = frames.next() => match frame {
                Some(Ok(packet)) => println!("<- {}", packet),
                Some(Err(e)) => {
                    eprintln!("Connection error: {}", e);
                    break;
                }
                None => {
                    eprintln!("Connection closed by hub");
                    break;
                }
            },
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_expand_shorthand_line() {
        let packet = expand_line("subscribe service_name=heartbeat").unwrap();
        assert_eq!(packet.event, "subscribe");
        assert_eq!(packet.get_str("service_name"), Some("heartbeat"));
    }

    #[test]
    fn test_expand_parses_json_values() {
        let packet = expand_line("configure threshold=1.5 active=true").unwrap();
        assert_eq!(packet.get("threshold"), Some(&json!(1.5)));
        assert_eq!(packet.get("active"), Some(&json!(true)));
    }

    #[test]
    fn test_expand_raw_json_frame() {
        let packet =
            expand_line(r#"{"event": "subscribe", "payload": {"service_name": "x"}}"#).unwrap();
        assert_eq!(packet.event, "subscribe");
    }

    #[test]
    fn test_expand_skips_blank_and_invalid_lines() {
        assert!(expand_line("   ").is_none());
        assert!(expand_line("{not json").is_none());
    }
}
