//! Client for SSAP devices over WebSocket.
//!
//! ssap pairs with a device, then multiplexes concurrent request/response
//! calls over a single WebSocket connection.
//!
//! # Crate Structure
//!
//! - [`transport`]: WebSocket dialing and the split read/write halves
//! - [`frame`]: JSON envelope types and the two-phase codec
//! - [`peer`]: Connection multiplexer and pairing handshake (behind `peer` feature)

/// Re-export transport types.
pub mod transport {
    pub use ssap_transport::*;
}

/// Re-export frame types.
pub mod frame {
    pub use ssap_frame::*;
}

/// Re-export peer types (requires `peer` feature).
#[cfg(feature = "peer")]
pub mod peer {
    pub use ssap_peer::*;
}
