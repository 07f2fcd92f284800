use serde::Serialize;

use crate::envelope::{EmptyPayload, Inbound, OutboundEnvelope, RawEnvelope, RegisteredPayload};
use crate::error::{FrameError, Result};
use crate::kind::EnvelopeType;
use crate::shape::{PayloadShape, Typed};

/// Encode an outgoing envelope into its JSON text form.
///
/// Fails only if the payload cannot be represented as JSON, in which case
/// nothing should be written to the socket.
pub fn encode_request<P: Serialize>(envelope: &OutboundEnvelope<'_, P>) -> Result<String> {
    serde_json::to_string(envelope).map_err(FrameError::Encode)
}

/// Decode the common envelope fields, leaving the payload unparsed.
pub fn decode_envelope(bytes: &[u8]) -> Result<RawEnvelope> {
    serde_json::from_slice(bytes).map_err(FrameError::Decode)
}

/// Decode the payload of an inbound envelope.
///
/// `response` payloads go through `shape`; `registered` and `error` have
/// fixed shapes. Any other type is rejected with
/// [`FrameError::UnrecognizedType`].
pub fn decode_payload<S: PayloadShape>(
    envelope: &RawEnvelope,
    kind: EnvelopeType,
    shape: &S,
) -> Result<Inbound<S::Output>> {
    let json = envelope.payload_json();
    match kind {
        EnvelopeType::Response => shape
            .decode(json)
            .map(Inbound::Response)
            .map_err(|source| FrameError::Payload { kind, source }),
        EnvelopeType::Registered => Typed::<RegisteredPayload>::new()
            .decode(json)
            .map(Inbound::Registered)
            .map_err(|source| FrameError::Payload { kind, source }),
        EnvelopeType::Error => {
            Typed::<EmptyPayload>::new()
                .decode(json)
                .map_err(|source| FrameError::Payload { kind, source })?;
            Ok(Inbound::Error(envelope.error.clone().unwrap_or_default()))
        }
        EnvelopeType::Register | EnvelopeType::Request => {
            Err(FrameError::UnrecognizedType(kind.as_str().to_string()))
        }
    }
}
