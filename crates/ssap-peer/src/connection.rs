use std::net::IpAddr;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::Serialize;
use ssap_frame::{
    decode_envelope, decode_payload, encode_request, AckPayload, Inbound, OutboundEnvelope,
};
use ssap_transport::{device_url, FrameSink, FrameSource, Incoming};
use tokio::task::JoinHandle;
use tokio_util::sync::{CancellationToken, DropGuard};
use tracing::{debug, trace, warn};

use crate::config::ConnectionConfig;
use crate::error::{PeerError, Result};
use crate::id::IdAllocator;
use crate::pending::{ErasedShape, PendingTable, Reply, SlotMode};

/// Lifecycle of a connection. Moves forward only, except that a failed
/// connect attempt returns to `Unopened`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ConnectionState {
    Unopened = 0,
    Connecting = 1,
    Open = 2,
    Closed = 3,
}

impl ConnectionState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => ConnectionState::Unopened,
            1 => ConnectionState::Connecting,
            2 => ConnectionState::Open,
            _ => ConnectionState::Closed,
        }
    }
}

/// A multiplexed connection to one device.
///
/// Cheap to clone; all clones share the socket, the id allocator and the
/// pending-request table. Any number of tasks may call [`Connection::request`]
/// concurrently. Dropping the last clone stops the receive loop.
#[derive(Clone)]
pub struct Connection {
    pub(crate) inner: Arc<Inner>,
    _stop_on_drop: Arc<DropGuard>,
}

pub(crate) struct Inner {
    url: String,
    pub(crate) config: ConnectionConfig,
    state: AtomicU8,
    pub(crate) ids: IdAllocator,
    pub(crate) pending: PendingTable,
    sink: tokio::sync::Mutex<Option<FrameSink>>,
    /// Stops the receive loop.
    stop: CancellationToken,
    /// Fired once the connection reaches `Closed`.
    closed: CancellationToken,
    receiver: Mutex<Option<JoinHandle<()>>>,
}

impl Connection {
    /// Connection to the device at `ip` with default configuration.
    pub fn new(ip: IpAddr) -> Self {
        Self::with_config(ip, ConnectionConfig::default())
    }

    /// Connection to the device at `ip` with explicit configuration.
    pub fn with_config(ip: IpAddr, config: ConnectionConfig) -> Self {
        let url = device_url(ip, config.port);
        Self::with_url(url, config)
    }

    /// Connection to an explicit `ws://` URL. The configured port is ignored.
    pub fn with_url(url: impl Into<String>, config: ConnectionConfig) -> Self {
        let stop = CancellationToken::new();
        let stop_on_drop = Arc::new(stop.clone().drop_guard());
        Self {
            inner: Arc::new(Inner {
                url: url.into(),
                config,
                state: AtomicU8::new(ConnectionState::Unopened as u8),
                ids: IdAllocator::new(),
                pending: PendingTable::new(),
                sink: tokio::sync::Mutex::new(None),
                stop,
                closed: CancellationToken::new(),
                receiver: Mutex::new(None),
            }),
            _stop_on_drop: stop_on_drop,
        }
    }

    /// Device URL.
    pub fn url(&self) -> &str {
        &self.inner.url
    }

    /// Connection policy.
    pub fn config(&self) -> &ConnectionConfig {
        &self.inner.config
    }

    /// Current lifecycle state.
    pub fn state(&self) -> ConnectionState {
        self.inner.state()
    }

    /// Whether requests can currently be sent.
    pub fn is_open(&self) -> bool {
        self.state() == ConnectionState::Open
    }

    /// Number of requests waiting for a reply.
    pub fn pending_requests(&self) -> usize {
        self.inner.pending.len()
    }

    /// Resolves once the connection is closed, by either side.
    pub async fn closed(&self) {
        self.inner.closed.cancelled().await
    }

    /// Establish the WebSocket connection and start the receive loop.
    ///
    /// Races the connect attempt against `timeout`; whichever loses is
    /// discarded. A failed attempt leaves the connection unopened so it can be
    /// retried. A connection can be opened at most once.
    pub async fn open(&self, timeout: Duration) -> Result<()> {
        if self
            .inner
            .state
            .compare_exchange(
                ConnectionState::Unopened as u8,
                ConnectionState::Connecting as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_err()
        {
            return Err(PeerError::AlreadyOpened);
        }

        let (source, sink) =
            match tokio::time::timeout(timeout, ssap_transport::connect(&self.inner.url)).await {
                Ok(Ok(halves)) => halves,
                Ok(Err(err)) => {
                    self.inner.reset_unopened();
                    return Err(err.into());
                }
                Err(_) => {
                    self.inner.reset_unopened();
                    return Err(PeerError::ConnectTimeout(timeout));
                }
            };

        *self.inner.sink.lock().await = Some(sink);

        if self
            .inner
            .state
            .compare_exchange(
                ConnectionState::Connecting as u8,
                ConnectionState::Open as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_err()
        {
            // Closed while connecting.
            if let Some(mut sink) = self.inner.sink.lock().await.take() {
                let _ = sink.close().await;
            }
            return Err(PeerError::NotConnected);
        }

        let handle = tokio::spawn(receive_loop(Arc::clone(&self.inner), source));
        *self
            .inner
            .receiver
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = Some(handle);

        debug!(url = %self.inner.url, "connection open");
        Ok(())
    }

    /// Send a request to the operation at `uri` and decode the reply into `R`.
    ///
    /// Waits up to the configured request timeout. A reply carrying an error
    /// string is returned as [`PeerError::Remote`]. The pending slot is
    /// released on every outcome, so a reply arriving after a timeout is
    /// dropped.
    pub async fn request<P, R>(&self, uri: &str, payload: Option<&P>) -> Result<R>
    where
        P: Serialize,
        R: DeserializeOwned + Send + 'static,
    {
        self.ensure_open()?;

        let id = self.inner.ids.next_id();
        let message = encode_request(&OutboundEnvelope::request(id, uri, payload))?;
        let mut slot =
            self.inner
                .pending
                .register(id, SlotMode::Single, Some(ErasedShape::of::<R>()))?;
        // A close that raced the registration has already cleared the table.
        self.ensure_open()?;

        trace!(id, uri, "sending request");
        self.inner.write(message).await?;

        let timeout = self.inner.config.request_timeout;
        let reply = match tokio::time::timeout(timeout, slot.recv()).await {
            Ok(Some(reply)) => reply,
            Ok(None) => return Err(PeerError::NotConnected),
            Err(_) => {
                debug!(id, uri, ?timeout, "request timed out");
                return Err(PeerError::RequestTimeout(timeout));
            }
        };

        into_response(reply)
    }

    /// Send a request that carries no payload and decode the reply into `R`.
    pub async fn request_empty<R>(&self, uri: &str) -> Result<R>
    where
        R: DeserializeOwned + Send + 'static,
    {
        self.request::<(), R>(uri, None).await
    }

    /// Send a request whose reply carries only the generic acknowledgement.
    pub async fn request_ack<P: Serialize>(
        &self,
        uri: &str,
        payload: Option<&P>,
    ) -> Result<AckPayload> {
        self.request(uri, payload).await
    }

    /// Close the connection.
    ///
    /// Marks the connection closed, fails every waiting call with
    /// [`PeerError::NotConnected`], sends a close frame and waits for the
    /// receive loop to stop. Calling it again is a no-op.
    pub async fn close(&self) -> Result<()> {
        let was_open = self.inner.mark_closed();
        self.inner.stop.cancel();

        let sink = self.inner.sink.lock().await.take();
        let result = match sink {
            Some(mut sink) => match sink.close().await {
                Ok(()) => Ok(()),
                // The device already went away; nothing left to report.
                Err(err) if !was_open => {
                    trace!(error = %err, "close frame not sent");
                    Ok(())
                }
                Err(err) => Err(err.into()),
            },
            None => Ok(()),
        };

        let handle = self
            .inner
            .receiver
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take();
        if let Some(handle) = handle {
            let _ = handle.await;
        }

        if was_open {
            debug!(url = %self.inner.url, "connection closed by client");
        }
        result
    }

    pub(crate) fn ensure_open(&self) -> Result<()> {
        if self.is_open() {
            Ok(())
        } else {
            Err(PeerError::NotConnected)
        }
    }
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("url", &self.inner.url)
            .field("state", &self.state())
            .field("pending", &self.inner.pending.len())
            .finish()
    }
}

impl Inner {
    fn state(&self) -> ConnectionState {
        ConnectionState::from_u8(self.state.load(Ordering::Acquire))
    }

    fn reset_unopened(&self) {
        let _ = self.state.compare_exchange(
            ConnectionState::Connecting as u8,
            ConnectionState::Unopened as u8,
            Ordering::AcqRel,
            Ordering::Acquire,
        );
    }

    /// Move to `Closed` and release every waiter. Returns whether this call
    /// performed the transition.
    fn mark_closed(&self) -> bool {
        let previous = ConnectionState::from_u8(
            self.state
                .swap(ConnectionState::Closed as u8, Ordering::AcqRel),
        );
        let dropped = self.pending.clear();
        self.closed.cancel();
        if previous != ConnectionState::Closed && dropped > 0 {
            debug!(url = %self.url, dropped, "released pending requests on close");
        }
        previous != ConnectionState::Closed
    }

    /// Serialize one message onto the socket. A write failure is terminal.
    pub(crate) async fn write(&self, message: String) -> Result<()> {
        let mut sink = self.sink.lock().await;
        if self.state() != ConnectionState::Open {
            return Err(PeerError::NotConnected);
        }
        let Some(writer) = sink.as_mut() else {
            return Err(PeerError::NotConnected);
        };

        let sent = writer.send_text(message).await;
        if let Err(err) = sent {
            warn!(url = %self.url, error = %err, "write failed, closing connection");
            sink.take();
            drop(sink);
            self.mark_closed();
            self.stop.cancel();
            return Err(err.into());
        }
        Ok(())
    }

    /// Decode one inbound message and route it to its waiter.
    ///
    /// Undecodable or unrecognized messages are dropped: they cannot be
    /// attributed to a caller, who will see a timeout instead.
    fn dispatch(&self, bytes: &[u8]) {
        let envelope = match decode_envelope(bytes) {
            Ok(envelope) => envelope,
            Err(err) => {
                warn!(error = %err, size = bytes.len(), "dropping undecodable message");
                return;
            }
        };
        let id = envelope.id;

        let kind = match envelope.envelope_type() {
            Ok(kind) => kind,
            Err(err) => {
                warn!(id, error = %err, "dropping message");
                return;
            }
        };

        let shape = self
            .pending
            .shape_for(id)
            .unwrap_or_else(ErasedShape::of::<AckPayload>);
        let body = match decode_payload(&envelope, kind, &shape) {
            Ok(body) => body,
            Err(err) => {
                warn!(id, error = %err, "dropping message");
                return;
            }
        };

        let reply = Reply {
            id,
            error: envelope.error_message().map(str::to_owned),
            body,
        };
        if self.pending.deliver(reply) {
            trace!(id, %kind, "delivered reply");
        } else {
            trace!(id, %kind, "no pending request, dropped");
        }
    }
}

/// Owns the read half for the life of the connection.
async fn receive_loop(inner: Arc<Inner>, mut source: FrameSource) {
    loop {
        let frame = tokio::select! {
            biased;
            _ = inner.stop.cancelled() => break,
            frame = source.read_frame() => frame,
        };

        match frame {
            Ok(Incoming::Message(bytes)) => inner.dispatch(&bytes),
            Ok(Incoming::Close) => {
                // Keep reading so the transport can finish the closing
                // handshake; the stream ends right after.
                debug!(url = %inner.url, "device sent close frame");
                inner.mark_closed();
            }
            Err(err) => {
                debug!(url = %inner.url, error = %err, "receive loop stopped");
                break;
            }
        }
    }
    inner.mark_closed();
}

fn into_response<R: 'static>(reply: Reply) -> Result<R> {
    if let Some(message) = reply.error {
        return Err(PeerError::Remote(message));
    }

    match reply.body {
        Inbound::Response(value) => value
            .downcast::<R>()
            .map(|value| *value)
            .map_err(|_| PeerError::UnexpectedReply {
                id: reply.id,
                kind: ssap_frame::EnvelopeType::Response,
            }),
        // No response body exists to hand back, even without a message.
        Inbound::Error(_) => Err(PeerError::Remote("device reported an error".to_string())),
        Inbound::Registered(_) => Err(PeerError::UnexpectedReply {
            id: reply.id,
            kind: ssap_frame::EnvelopeType::Registered,
        }),
    }
}

#[cfg(test)]
mod tests {
    use std::net::Ipv4Addr;

    use super::*;

    #[test]
    fn new_builds_device_url() {
        let conn = Connection::new(IpAddr::V4(Ipv4Addr::new(10, 0, 0, 7)));
        assert_eq!(conn.url(), "ws://10.0.0.7:3000");
        assert_eq!(conn.state(), ConnectionState::Unopened);
        assert!(!conn.is_open());
    }

    #[tokio::test]
    async fn calls_before_open_fail_without_io() {
        let conn = Connection::with_url("ws://127.0.0.1:9", ConnectionConfig::default());
        let err = conn
            .request_empty::<AckPayload>("ssap://audio/getVolume")
            .await
            .unwrap_err();
        assert!(matches!(err, PeerError::NotConnected));
        let err = conn.register("").await.unwrap_err();
        assert!(matches!(err, PeerError::NotConnected));
        assert_eq!(conn.pending_requests(), 0);
    }

    #[tokio::test]
    async fn close_is_idempotent_and_terminal() {
        let conn = Connection::with_url("ws://127.0.0.1:9", ConnectionConfig::default());
        conn.close().await.unwrap();
        conn.close().await.unwrap();
        assert_eq!(conn.state(), ConnectionState::Closed);

        let err = conn.open(Duration::from_millis(50)).await.unwrap_err();
        assert!(matches!(err, PeerError::AlreadyOpened));
    }

    #[tokio::test]
    async fn write_failure_closes_connection_and_fails_waiters() {
        use futures_util::StreamExt;

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("ws://{}", listener.local_addr().unwrap());
        let (got_tx, got_rx) = tokio::sync::oneshot::channel::<()>();
        let (done_tx, done_rx) = tokio::sync::oneshot::channel::<()>();
        let device = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let mut ws = tokio_tungstenite::accept_async(stream).await.unwrap();
            ws.next().await.unwrap().unwrap();
            got_tx.send(()).unwrap();
            // Stops reading; the client's close frame is never answered.
            let _ = done_rx.await;
        });

        let conn = Connection::with_url(url, ConnectionConfig::default());
        conn.open(Duration::from_secs(5)).await.unwrap();

        let waiting = tokio::spawn({
            let conn = conn.clone();
            async move {
                conn.request_empty::<AckPayload>("ssap://audio/getVolume")
                    .await
            }
        });
        got_rx.await.unwrap();
        assert_eq!(conn.pending_requests(), 1);

        // Leave the socket unable to carry data frames while the state
        // still says open.
        conn.inner
            .sink
            .lock()
            .await
            .as_mut()
            .unwrap()
            .close()
            .await
            .unwrap();

        let err = conn
            .request_empty::<AckPayload>("ssap://system/turnOff")
            .await
            .unwrap_err();
        assert!(matches!(err, PeerError::Transport(_)), "got {err:?}");
        assert_eq!(conn.state(), ConnectionState::Closed);

        let err = waiting.await.unwrap().unwrap_err();
        assert!(matches!(err, PeerError::NotConnected));
        assert_eq!(conn.pending_requests(), 0);

        let err = conn
            .request_empty::<AckPayload>("ssap://system/turnOff")
            .await
            .unwrap_err();
        assert!(matches!(err, PeerError::NotConnected));

        conn.close().await.unwrap();
        done_tx.send(()).unwrap();
        device.await.unwrap();
    }

    #[test]
    fn error_string_takes_precedence() {
        let reply = Reply {
            id: 1,
            error: Some("404 no such service".to_string()),
            body: Inbound::Response(Box::new(AckPayload::default())),
        };
        let err = into_response::<AckPayload>(reply).unwrap_err();
        assert!(matches!(err, PeerError::Remote(ref m) if m == "404 no such service"));
    }

    #[test]
    fn error_envelope_without_message_still_fails() {
        let reply = Reply {
            id: 3,
            error: None,
            body: Inbound::Error(String::new()),
        };
        let err = into_response::<AckPayload>(reply).unwrap_err();
        assert!(matches!(err, PeerError::Remote(ref m) if m == "device reported an error"));
    }

    #[test]
    fn registered_body_is_unexpected_for_requests() {
        let reply = Reply {
            id: 2,
            error: None,
            body: Inbound::Registered(ssap_frame::RegisteredPayload {
                client_key: "k".to_string(),
            }),
        };
        assert!(matches!(
            into_response::<AckPayload>(reply),
            Err(PeerError::UnexpectedReply { id: 2, .. })
        ));
    }
}
