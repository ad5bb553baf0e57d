//! Wire protocol: packet model and framing
//!
//! Every message in either direction is one JSON object on one line:
//!
//! ```text
//! {"event": "subscribe", "payload": {"service_name": "board_temperature"}}\n
//! ```
//!
//! [`Packet`] is the parsed form, [`PacketCodec`] maps it onto a byte stream.
//! Parsing is strict: anything that is not a JSON object with a non-empty
//! string `event` is a protocol violation and the connection that sent it
//! gets closed by the gateway.

pub mod codec;
pub mod packet;

pub use codec::{CodecError, PacketCodec};
pub use packet::{Packet, ParseError, Payload};
