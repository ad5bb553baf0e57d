//! Packet parsing and formatting
//!
//! A packet is `{"event": <string>, "payload": <object>}`. The event name is
//! case-insensitive on the wire and normalized to lowercase at parse time so
//! command dispatch never has to think about case. The payload is optional
//! and defaults to an empty object; unknown top-level keys are ignored.

use serde::Serialize;
use serde_json::Value;

/// Payload of a packet: a JSON object keyed by field name.
pub type Payload = serde_json::Map<String, Value>;

/// One protocol message, in either direction.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Packet {
    /// Lowercased event name, e.g. `subscribe` or `notify_values`.
    pub event: String,
    /// Event arguments. Empty when the sender omitted it.
    pub payload: Payload,
}

/// Errors produced when a text frame fails to parse as a packet.
#[derive(Debug)]
pub enum ParseError {
    /// The frame is not valid JSON at all.
    InvalidJson(serde_json::Error),
    /// The frame is valid JSON but not an object.
    NotAnObject,
    /// The object has no `event` key.
    MissingEvent,
    /// The `event` key is not a non-empty string.
    InvalidEvent,
    /// The `payload` key is present but not an object.
    InvalidPayload,
}

impl std::fmt::Display for ParseError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ParseError::InvalidJson(e) => write!(f, "Invalid JSON frame: {}", e),
            ParseError::NotAnObject => write!(f, "Frame is not a JSON object"),
            ParseError::MissingEvent => write!(f, "Missing \"event\" key in frame"),
            ParseError::InvalidEvent => write!(f, "\"event\" must be a non-empty string"),
            ParseError::InvalidPayload => write!(f, "\"payload\" must be a JSON object"),
        }
    }
}

impl std::error::Error for ParseError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ParseError::InvalidJson(e) => Some(e),
            _ => None,
        }
    }
}

impl Packet {
    /// Create a packet with an empty payload. The event name is lowercased.
    pub fn new(event: impl Into<String>) -> Self {
        Packet {
            event: event.into().to_lowercase(),
            payload: Payload::new(),
        }
    }

    /// Create a packet with the given payload.
    pub fn with_payload(event: impl Into<String>, payload: Payload) -> Self {
        Packet {
            event: event.into().to_lowercase(),
            payload,
        }
    }

    /// Add one payload field, builder style.
    pub fn field(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.payload.insert(key.into(), value.into());
        self
    }

    /// Parse one text frame into a packet.
    pub fn parse(raw: &str) -> Result<Packet, ParseError> {
        let value: Value = serde_json::from_str(raw).map_err(ParseError::InvalidJson)?;
        let mut map = match value {
            Value::Object(map) => map,
            _ => return Err(ParseError::NotAnObject),
        };

        let event = match map.remove("event") {
            Some(Value::String(s)) if !s.is_empty() => s.to_lowercase(),
            Some(_) => return Err(ParseError::InvalidEvent),
            None => return Err(ParseError::MissingEvent),
        };

        let payload = match map.remove("payload") {
            Some(Value::Object(payload)) => payload,
            Some(_) => return Err(ParseError::InvalidPayload),
            None => Payload::new(),
        };

        Ok(Packet { event, payload })
    }

    /// Serialize to the one-line wire form (without the trailing newline).
    pub fn format(&self) -> String {
        let mut frame = Payload::new();
        frame.insert("event".to_string(), Value::String(self.event.clone()));
        frame.insert("payload".to_string(), Value::Object(self.payload.clone()));
        Value::Object(frame).to_string()
    }

    /// True when the payload has the given key.
    pub fn contains(&self, key: &str) -> bool {
        self.payload.contains_key(key)
    }

    /// Payload field lookup.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.payload.get(key)
    }

    /// Payload field lookup, narrowed to string values.
    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.payload.get(key).and_then(Value::as_str)
    }
}

impl std::fmt::Display for Packet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.format())
    }
}
