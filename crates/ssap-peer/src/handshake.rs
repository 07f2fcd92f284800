//! Pairing handshake.
//!
//! The device answers a `register` envelope with zero or more intermediate
//! messages (typically a `response` acknowledging that a prompt is on screen)
//! followed by exactly one `registered` or `error` envelope.

use ssap_frame::{encode_request, Inbound, OutboundEnvelope, RegisterPayload};
use tracing::debug;

use crate::connection::Connection;
use crate::error::{PeerError, Result};
use crate::pending::SlotMode;

impl Connection {
    /// Pair with the device and return the client key to reuse next time.
    ///
    /// Pass an empty `client_key` for first-time pairing; the device then
    /// prompts the user and issues a new key. Waits up to the configured
    /// registration timeout for the terminal reply.
    pub async fn register(&self, client_key: &str) -> Result<String> {
        self.ensure_open()?;

        let config = &self.inner.config;
        let id = self.inner.ids.next_id();
        let payload = RegisterPayload::prompt(&config.permissions, client_key);
        let message = encode_request(&OutboundEnvelope::register(id, &payload))?;

        let mut slot = self.inner.pending.register(id, SlotMode::Stream, None)?;
        self.ensure_open()?;

        debug!(id, reuse_key = !client_key.is_empty(), "registering");
        self.inner.write(message).await?;

        let timeout = config.register_timeout;
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            let reply = match tokio::time::timeout_at(deadline, slot.recv()).await {
                Ok(Some(reply)) => reply,
                Ok(None) => return Err(PeerError::NotConnected),
                Err(_) => return Err(PeerError::RegisterTimeout(timeout)),
            };

            let kind = reply.body.envelope_type();
            if !kind.is_terminal_for_register() {
                debug!(id, %kind, "waiting for pairing to complete");
                continue;
            }

            match reply.body {
                Inbound::Registered(registered) => {
                    debug!(id, "registered");
                    return Ok(registered.client_key);
                }
                Inbound::Error(message) => {
                    let message = reply.error.unwrap_or(message);
                    return Err(PeerError::Remote(message));
                }
                Inbound::Response(_) => return Err(PeerError::UnexpectedReply { id, kind }),
            }
        }
    }
}
