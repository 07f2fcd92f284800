//! Envelope type tags.
//!
//! `register` and `request` are only ever sent by the client;
//! `registered`, `response` and `error` are only ever received.

use std::fmt;

use crate::error::{FrameError, Result};

/// The `type` field of an envelope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EnvelopeType {
    /// Client pairing handshake.
    Register,
    /// Client call to a remote operation identified by a URI.
    Request,
    /// Terminal success of the pairing handshake.
    Registered,
    /// Reply to a request (or an intermediate handshake message).
    Response,
    /// Remote-reported failure.
    Error,
}

impl EnvelopeType {
    /// Wire representation of this type tag.
    pub fn as_str(self) -> &'static str {
        match self {
            EnvelopeType::Register => "register",
            EnvelopeType::Request => "request",
            EnvelopeType::Registered => "registered",
            EnvelopeType::Response => "response",
            EnvelopeType::Error => "error",
        }
    }

    /// Parse a type tag received from the device.
    ///
    /// Outbound-only tags are rejected the same way as unknown ones.
    pub fn parse_inbound(tag: &str) -> Result<Self> {
        match tag {
            "registered" => Ok(EnvelopeType::Registered),
            "response" => Ok(EnvelopeType::Response),
            "error" => Ok(EnvelopeType::Error),
            other => Err(FrameError::UnrecognizedType(other.to_string())),
        }
    }

    /// Returns true for the types that end a registration handshake.
    pub fn is_terminal_for_register(self) -> bool {
        matches!(self, EnvelopeType::Registered | EnvelopeType::Error)
    }
}

impl fmt::Display for EnvelopeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
