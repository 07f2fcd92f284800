use std::time::Duration;

use ssap_frame::DEFAULT_PERMISSIONS;
use ssap_transport::DEFAULT_PORT;

/// Connection policy: port, timeouts and the permission manifest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionConfig {
    /// Device WebSocket port.
    pub port: u16,
    /// Timeout for establishing the WebSocket connection.
    pub connect_timeout: Duration,
    /// Timeout for the whole pairing handshake. Covers the time a user needs
    /// to accept the prompt on the device.
    pub register_timeout: Duration,
    /// Timeout for each request.
    pub request_timeout: Duration,
    /// Capabilities requested when registering.
    pub permissions: Vec<String>,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            connect_timeout: Duration::from_secs(5),
            register_timeout: Duration::from_secs(60),
            request_timeout: Duration::from_secs(10),
            permissions: DEFAULT_PERMISSIONS.iter().map(|p| p.to_string()).collect(),
        }
    }
}
