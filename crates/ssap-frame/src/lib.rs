//! JSON envelope codec for the SSAP request/response protocol.
//!
//! Every message on the wire is one JSON object tagged with an integer `id`
//! and a `type`. Inbound messages are decoded in two phases:
//! - the envelope (`id`, `type`, `error`) with the payload left unparsed
//! - the payload, into a shape chosen by the envelope type and, for
//!   `response`, by whoever sent the correlated request
//!
//! The codec is stateless.

pub mod codec;
pub mod envelope;
pub mod error;
pub mod kind;
pub mod shape;

pub use codec::{decode_envelope, decode_payload, encode_request};
pub use envelope::{
    AckPayload, EmptyPayload, Inbound, Manifest, OutboundEnvelope, RawEnvelope, RegisterPayload,
    RegisteredPayload, DEFAULT_PERMISSIONS, PAIRING_PROMPT,
};
pub use error::{FrameError, Result};
pub use kind::EnvelopeType;
pub use shape::{PayloadShape, Typed};
