use std::net::{IpAddr, SocketAddr};

use bytes::Bytes;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::{self, Message};
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, trace};

use crate::error::{Result, TransportError};

/// Port the device's SSAP WebSocket server listens on.
pub const DEFAULT_PORT: u16 = 3000;

/// Build the `ws://` URL for a device address.
pub fn device_url(ip: IpAddr, port: u16) -> String {
    format!("ws://{}", SocketAddr::new(ip, port))
}

/// One application-level item read from the socket.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Incoming {
    /// A complete text or binary message.
    Message(Bytes),
    /// The peer sent a close frame. The WebSocket layer completes the
    /// closing handshake on its own.
    Close,
}

/// Read half of a device connection.
///
/// Owned by exactly one task; WebSocket ping/pong traffic is consumed here
/// and never surfaces to callers.
pub struct FrameSource<S = MaybeTlsStream<TcpStream>> {
    inner: SplitStream<WebSocketStream<S>>,
}

/// Write half of a device connection.
///
/// The underlying socket does not support concurrent writers, so callers
/// sharing a sink must serialize access themselves.
pub struct FrameSink<S = MaybeTlsStream<TcpStream>> {
    inner: SplitSink<WebSocketStream<S>, Message>,
}

/// Dial a device WebSocket endpoint and split it into read and write halves.
///
/// No timeout is applied here; callers race this future against their own
/// timer.
pub async fn connect(url: &str) -> Result<(FrameSource, FrameSink)> {
    debug!(url, "connecting to device websocket");
    let (stream, response) = connect_async(url)
        .await
        .map_err(|err| TransportError::Connect {
            url: url.to_string(),
            source: Box::new(err),
        })?;
    debug!(url, status = %response.status(), "websocket connected");
    Ok(split(stream))
}

/// Split an established WebSocket stream into read and write halves.
pub fn split<S>(stream: WebSocketStream<S>) -> (FrameSource<S>, FrameSink<S>)
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let (sink, source) = stream.split();
    (FrameSource { inner: source }, FrameSink { inner: sink })
}

impl<S> FrameSource<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// Read the next application message.
    ///
    /// Returns `Err(TransportError::ConnectionClosed)` when the stream ends.
    pub async fn read_frame(&mut self) -> Result<Incoming> {
        loop {
            let message = match self.inner.next().await {
                Some(Ok(message)) => message,
                Some(Err(err)) => return Err(err.into()),
                None => return Err(TransportError::ConnectionClosed),
            };

            match message {
                Message::Text(text) => return Ok(Incoming::Message(Bytes::from(text))),
                Message::Binary(data) => return Ok(Incoming::Message(Bytes::from(data))),
                Message::Close(frame) => {
                    trace!(?frame, "close frame received");
                    return Ok(Incoming::Close);
                }
                Message::Ping(_) | Message::Pong(_) | Message::Frame(_) => continue,
            }
        }
    }
}

impl<S> FrameSink<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// Send one text message.
    pub async fn send_text(&mut self, text: String) -> Result<()> {
        trace!(size = text.len(), "sending text frame");
        self.inner.send(Message::Text(text)).await?;
        Ok(())
    }

    /// Send a close frame and flush the write half.
    ///
    /// Closing an already-closed connection is not an error.
    pub async fn close(&mut self) -> Result<()> {
        match self.inner.close().await {
            Ok(())
            | Err(tungstenite::Error::ConnectionClosed)
            | Err(tungstenite::Error::AlreadyClosed) => Ok(()),
            Err(err) => Err(err.into()),
        }
    }
}
