use tokio_tungstenite::tungstenite;

/// Errors that can occur in WebSocket transport operations.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// Failed to establish the WebSocket connection.
    #[error("failed to connect to {url}: {source}")]
    Connect {
        url: String,
        source: Box<tungstenite::Error>,
    },

    /// A WebSocket protocol or I/O error on an established connection.
    #[error("websocket error: {0}")]
    WebSocket(Box<tungstenite::Error>),

    /// The connection ended without a close frame.
    #[error("connection closed")]
    ConnectionClosed,
}

impl From<tungstenite::Error> for TransportError {
    fn from(err: tungstenite::Error) -> Self {
        match err {
            tungstenite::Error::ConnectionClosed | tungstenite::Error::AlreadyClosed => {
                TransportError::ConnectionClosed
            }
            other => TransportError::WebSocket(Box::new(other)),
        }
    }
}

impl TransportError {
    /// The underlying I/O error, when the failure came from the socket.
    pub fn io_error(&self) -> Option<&std::io::Error> {
        match self {
            TransportError::Connect { source, .. } | TransportError::WebSocket(source) => {
                match source.as_ref() {
                    tungstenite::Error::Io(err) => Some(err),
                    _ => None,
                }
            }
            TransportError::ConnectionClosed => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, TransportError>;
