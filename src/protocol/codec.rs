//! Newline-delimited packet framing
//!
//! One packet per line, UTF-8, LF terminated (a trailing CR is tolerated and
//! stripped). Blank lines between frames are ignored. Frames longer than the
//! configured limit are a protocol violation, as is any line that fails
//! [`Packet::parse`].

use std::io;

use bytes::{BufMut, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

use super::packet::{Packet, ParseError};

/// Default cap on the length of a single frame in bytes.
pub const DEFAULT_MAX_FRAME_LEN: usize = 64 * 1024;

/// Codec mapping [`Packet`]s onto a newline-delimited byte stream.
#[derive(Debug, Clone)]
pub struct PacketCodec {
    max_frame_len: usize,
}

/// Errors produced while framing or deframing packets.
#[derive(Debug)]
pub enum CodecError {
    /// Transport-level read or write failure.
    Io(io::Error),
    /// A frame contained invalid UTF-8.
    InvalidUtf8,
    /// A frame exceeded the configured length limit.
    FrameTooLong { len: usize, max: usize },
    /// A frame did not parse as a packet.
    Parse(ParseError),
}

impl std::fmt::Display for CodecError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CodecError::Io(e) => write!(f, "Transport error: {}", e),
            CodecError::InvalidUtf8 => write!(f, "Frame is not valid UTF-8"),
            CodecError::FrameTooLong { len, max } => {
                write!(f, "Frame of {} bytes exceeds limit of {} bytes", len, max)
            }
            CodecError::Parse(e) => write!(f, "Malformed packet: {}", e),
        }
    }
}

impl std::error::Error for CodecError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            CodecError::Io(e) => Some(e),
            CodecError::Parse(e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for CodecError {
    fn from(e: io::Error) -> Self {
        CodecError::Io(e)
    }
}

impl From<ParseError> for CodecError {
    fn from(e: ParseError) -> Self {
        CodecError::Parse(e)
    }
}

impl PacketCodec {
    /// Create a codec with the given frame length limit.
    pub fn new(max_frame_len: usize) -> Self {
        PacketCodec { max_frame_len }
    }

    /// Configured frame length limit in bytes.
    pub fn max_frame_len(&self) -> usize {
        self.max_frame_len
    }
}

impl Default for PacketCodec {
    fn default() -> Self {
        PacketCodec::new(DEFAULT_MAX_FRAME_LEN)
    }
}

impl Decoder for PacketCodec {
    type Item = Packet;
    type Error = CodecError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Packet>, CodecError> {
        loop {
            let pos = match src.iter().position(|&b| b == b'\n') {
                Some(pos) => pos,
                None => {
                    if src.len() > self.max_frame_len {
                        return Err(CodecError::FrameTooLong {
                            len: src.len(),
                            max: self.max_frame_len,
                        });
                    }
                    return Ok(None);
                }
            };

            if pos > self.max_frame_len {
                return Err(CodecError::FrameTooLong {
                    len: pos,
                    max: self.max_frame_len,
                });
            }

            let line = src.split_to(pos + 1);
            let mut line = &line[..pos];
            if line.last() == Some(&b'\r') {
                line = &line[..line.len() - 1];
            }

            let text = std::str::from_utf8(line).map_err(|_| CodecError::InvalidUtf8)?;
            if text.trim().is_empty() {
                continue;
            }
            return Ok(Some(Packet::parse(text)?));
        }
    }
}

impl Encoder<Packet> for PacketCodec {
    type Error = CodecError;

    fn encode(&mut self, packet: Packet, dst: &mut BytesMut) -> Result<(), CodecError> {
        let json = packet.format();
        dst.reserve(json.len() + 1);
        dst.extend_from_slice(json.as_bytes());
        dst.put_u8(b'\n');
        Ok(())
    }
}
