use crate::kind::EnvelopeType;

/// Errors that can occur during envelope encoding/decoding.
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    /// An outgoing envelope or its payload could not be serialized.
    #[error("failed to encode envelope: {0}")]
    Encode(#[source] serde_json::Error),

    /// The inbound bytes are not a well-formed envelope.
    #[error("malformed envelope: {0}")]
    Decode(#[source] serde_json::Error),

    /// The envelope parsed but its payload does not match the expected shape.
    #[error("malformed {kind} payload: {source}")]
    Payload {
        kind: EnvelopeType,
        #[source]
        source: serde_json::Error,
    },

    /// The envelope `type` is not one a client can receive.
    #[error("unrecognized response type '{0}'")]
    UnrecognizedType(String),
}

pub type Result<T> = std::result::Result<T, FrameError>;
