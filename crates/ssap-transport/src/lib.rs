//! WebSocket transport for SSAP device connections.
//!
//! This is the lowest layer of ssap. It dials the device, splits the socket
//! into an exclusively-owned read half ([`FrameSource`]) and a write half
//! ([`FrameSink`]), and hides WebSocket control traffic from the layers above.

pub mod error;
pub mod ws;

pub use error::{Result, TransportError};
pub use ws::{connect, device_url, split, FrameSink, FrameSource, Incoming, DEFAULT_PORT};
