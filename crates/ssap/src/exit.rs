use std::fmt;
use std::io;

use ssap_frame::FrameError;
use ssap_peer::PeerError;
use ssap_transport::TransportError;

// Exit code constants aligned with rsfulmen/DDR-0002 semantics.
pub const SUCCESS: i32 = 0;
pub const FAILURE: i32 = 1;
pub const TRANSPORT_ERROR: i32 = 3;
pub const PERMISSION_DENIED: i32 = 50;
pub const DATA_INVALID: i32 = 60;
pub const USAGE: i32 = 64;
pub const TIMEOUT: i32 = 124;
pub const INTERNAL: i32 = 125;

pub type CliResult<T> = Result<T, CliError>;

#[derive(Debug)]
pub struct CliError {
    pub code: i32,
    pub message: String,
}

impl CliError {
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for CliError {}

fn io_code(kind: io::ErrorKind) -> i32 {
    match kind {
        io::ErrorKind::PermissionDenied => PERMISSION_DENIED,
        io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock => TIMEOUT,
        io::ErrorKind::NotFound => USAGE,
        _ => TRANSPORT_ERROR,
    }
}

pub fn io_error(context: &str, err: io::Error) -> CliError {
    CliError::new(io_code(err.kind()), format!("{context}: {err}"))
}

pub fn transport_error(context: &str, err: TransportError) -> CliError {
    let code = match (&err, err.io_error()) {
        (_, Some(io)) => io_code(io.kind()),
        (TransportError::ConnectionClosed, None) => FAILURE,
        _ => TRANSPORT_ERROR,
    };
    CliError::new(code, format!("{context}: {err}"))
}

pub fn frame_error(context: &str, err: FrameError) -> CliError {
    let code = match err {
        FrameError::Encode(_) | FrameError::Decode(_) | FrameError::Payload { .. } => {
            DATA_INVALID
        }
        FrameError::UnrecognizedType(_) => INTERNAL,
    };
    CliError::new(code, format!("{context}: {err}"))
}

pub fn peer_error(context: &str, err: PeerError) -> CliError {
    match err {
        PeerError::Transport(err) => transport_error(context, err),
        PeerError::Frame(err) => frame_error(context, err),
        err if err.is_timeout() => CliError::new(TIMEOUT, format!("{context}: {err}")),
        // webOS reports permission failures as "401 insufficient permissions".
        PeerError::Remote(ref message) if message.starts_with("401") => {
            CliError::new(PERMISSION_DENIED, format!("{context}: {err}"))
        }
        PeerError::Remote(_) | PeerError::NotConnected => {
            CliError::new(FAILURE, format!("{context}: {err}"))
        }
        other => CliError::new(INTERNAL, format!("{context}: {other}")),
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[test]
    fn timeouts_map_to_timeout_code() {
        for err in [
            PeerError::ConnectTimeout(Duration::from_secs(5)),
            PeerError::RegisterTimeout(Duration::from_secs(60)),
            PeerError::RequestTimeout(Duration::from_secs(10)),
        ] {
            assert_eq!(peer_error("request failed", err).code, TIMEOUT);
        }
    }

    #[test]
    fn remote_errors_map_by_message() {
        let err = peer_error(
            "request failed",
            PeerError::Remote("401 insufficient permissions".to_string()),
        );
        assert_eq!(err.code, PERMISSION_DENIED);
        assert_eq!(
            err.message,
            "request failed: device returned error: 401 insufficient permissions"
        );

        let err = peer_error("request failed", PeerError::Remote("404 no such service".into()));
        assert_eq!(err.code, FAILURE);
    }

    #[test]
    fn decode_failures_are_data_invalid() {
        let source = serde_json::from_str::<u8>("x").unwrap_err();
        let err = peer_error("request failed", PeerError::Frame(FrameError::Decode(source)));
        assert_eq!(err.code, DATA_INVALID);
    }

    #[test]
    fn closed_connection_is_failure() {
        assert_eq!(
            peer_error("request failed", PeerError::NotConnected).code,
            FAILURE
        );
        assert_eq!(
            transport_error("connect failed", TransportError::ConnectionClosed).code,
            FAILURE
        );
        assert_eq!(
            peer_error("open failed", PeerError::AlreadyOpened).code,
            INTERNAL
        );
    }

    #[test]
    fn io_errors_map_by_kind() {
        let err = io_error(
            "failed reading payload.json",
            io::Error::from(io::ErrorKind::NotFound),
        );
        assert_eq!(err.code, USAGE);
        assert_eq!(
            io_error("x", io::Error::from(io::ErrorKind::ConnectionRefused)).code,
            TRANSPORT_ERROR
        );
    }
}
