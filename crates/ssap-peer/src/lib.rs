//! Connection multiplexer for SSAP devices.
//!
//! One [`Connection`] owns one WebSocket to a device. It assigns request
//! ids, routes replies (which may arrive in any order) back to the waiting
//! caller, runs the pairing handshake, and enforces per-call timeouts.

pub mod config;
pub mod connection;
pub mod connector;
pub mod error;
pub mod handshake;
pub mod id;
pub mod pending;

pub use config::ConnectionConfig;
pub use connection::{Connection, ConnectionState};
pub use connector::{connect, connect_with_config};
pub use error::{PeerError, Result};
pub use id::IdAllocator;
pub use pending::{DecodedPayload, ErasedShape, PendingTable, Reply, SlotGuard, SlotMode};
