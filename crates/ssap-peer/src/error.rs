use std::time::Duration;

use ssap_frame::EnvelopeType;

/// Errors that can occur in device connection operations.
#[derive(Debug, thiserror::Error)]
pub enum PeerError {
    /// Transport-level error. Always terminal for the connection.
    #[error("transport error: {0}")]
    Transport(#[from] ssap_transport::TransportError),

    /// Envelope encoding error.
    #[error("frame error: {0}")]
    Frame(#[from] ssap_frame::FrameError),

    /// The WebSocket connection was not established in time.
    #[error("connection timed out after {0:?}")]
    ConnectTimeout(Duration),

    /// No `registered` or `error` reply arrived during pairing.
    #[error("registration timed out after {0:?}")]
    RegisterTimeout(Duration),

    /// No reply arrived for a request.
    #[error("request timed out after {0:?}")]
    RequestTimeout(Duration),

    /// The device answered with an error.
    #[error("device returned error: {0}")]
    Remote(String),

    /// The connection is not open (never opened, or already closed).
    #[error("not connected")]
    NotConnected,

    /// `open` was called on a connection that has already been opened.
    #[error("connection already opened")]
    AlreadyOpened,

    /// A pending slot already exists for this request id.
    #[error("request id {0} already pending")]
    DuplicateRequestId(u64),

    /// A reply of a type the waiting call cannot use.
    #[error("unexpected {kind} reply to request {id}")]
    UnexpectedReply { id: u64, kind: EnvelopeType },
}

impl PeerError {
    /// Returns true for the timeout variants, which never close the connection.
    pub fn is_timeout(&self) -> bool {
        matches!(
            self,
            PeerError::ConnectTimeout(_) | PeerError::RegisterTimeout(_) | PeerError::RequestTimeout(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, PeerError>;
