//! Stream adapter presenting a WebSocket connection as a byte stream
//!
//! The underlying transport delivers whole messages while callers may request
//! arbitrary read sizes, so each connection keeps the undelivered tail of the
//! last message between read calls. Read and write paths are independently
//! lockable: one concurrent reader and one concurrent writer per connection.
//! Close triggers a shared cancellation token that unblocks in-flight reads
//! and writes without taking either IO lock.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use multiaddr::Multiaddr;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::Mutex;
use tokio_tungstenite::tungstenite::{protocol::Message, Error as WsError};
use tokio_tungstenite::WebSocketStream;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use crate::error::{Error, Result};
use crate::transport::ConnScope;

/// Port reported by the placeholder socket-address pair
const PLACEHOLDER_PORT: u16 = 1634;

/// Byte-stream contract the upgrade pipeline consumes
///
/// Deadline setters are accepted but inert: the underlying WebSocket
/// primitive offers no deadline control, so timeout policy belongs to
/// cancellation of the governing future.
#[async_trait]
pub trait StreamConn: Send + Sync {
    /// Read up to `buf.len()` bytes; `Ok(0)` signals end of stream
    async fn read(&self, buf: &mut [u8]) -> Result<usize>;

    /// Write `buf` as exactly one binary message
    async fn write(&self, buf: &[u8]) -> Result<usize>;

    /// Cancel in-flight reads and writes, then close the connection
    async fn close(&self) -> Result<()>;

    /// Structured local address; always the fixed placeholder
    fn local_multiaddr(&self) -> &Multiaddr;

    /// Structured remote address captured at construction
    fn remote_multiaddr(&self) -> &Multiaddr;

    /// Placeholder local socket address
    fn local_addr(&self) -> SocketAddr;

    /// Placeholder remote socket address
    fn remote_addr(&self) -> SocketAddr;

    fn set_deadline(&self, deadline: Option<Instant>) -> Result<()>;
    fn set_read_deadline(&self, deadline: Option<Instant>) -> Result<()>;
    fn set_write_deadline(&self, deadline: Option<Instant>) -> Result<()>;
}

/// Read half: message source plus the undelivered tail of the last message
struct ReadHalf<S> {
    messages: SplitStream<WebSocketStream<S>>,
    leftover: Vec<u8>,
    pos: usize,
}

/// One established WebSocket connection adapted to a byte stream
pub struct WsStream<S> {
    read: Mutex<ReadHalf<S>>,
    write: Mutex<SplitSink<WebSocketStream<S>, Message>>,
    laddr: Multiaddr,
    raddr: Multiaddr,
    // Carried for the lifetime of the connection; released by the upgrade
    // pipeline, never here.
    scope: Option<Arc<dyn ConnScope>>,
    cancel: CancellationToken,
    closed: AtomicBool,
}

impl<S> WsStream<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    /// Wrap an established WebSocket connection.
    ///
    /// `raddr` is the structured address the connection was dialed with; the
    /// local address is always `/ip4/0.0.0.0/tcp/0/ws` because there is no
    /// meaningful local socket identity in the hosting environment.
    pub fn new(
        socket: WebSocketStream<S>,
        raddr: Multiaddr,
        scope: Option<Arc<dyn ConnScope>>,
    ) -> Self {
        let (sink, stream) = socket.split();

        Self {
            read: Mutex::new(ReadHalf {
                messages: stream,
                leftover: Vec::new(),
                pos: 0,
            }),
            write: Mutex::new(sink),
            laddr: placeholder_multiaddr(),
            raddr,
            scope,
            cancel: CancellationToken::new(),
            closed: AtomicBool::new(false),
        }
    }

    /// Resource scope carried by this connection, if any
    pub fn scope(&self) -> Option<&Arc<dyn ConnScope>> {
        self.scope.as_ref()
    }

    pub async fn read(&self, buf: &mut [u8]) -> Result<usize> {
        if self.cancel.is_cancelled() {
            return Err(Error::ConnectionClosed);
        }

        let mut half = self.read.lock().await;

        // Serve buffered data first
        if half.pos < half.leftover.len() {
            return Ok(copy_leftover(&mut half, buf));
        }

        loop {
            let message = tokio::select! {
                _ = self.cancel.cancelled() => return Err(Error::ConnectionClosed),
                message = half.messages.next() => message,
            };

            match message {
                Some(Ok(Message::Binary(data))) => {
                    trace!(len = data.len(), "received binary message");
                    half.leftover = data;
                    half.pos = 0;
                    return Ok(copy_leftover(&mut half, buf));
                }
                // A peer-initiated normal closure is end of stream, not an error
                Some(Ok(Message::Close(frame))) => {
                    debug!(?frame, "peer closed websocket");
                    return Ok(0);
                }
                // Ping/pong is transport plumbing, never surfaced to callers
                Some(Ok(Message::Ping(_))) | Some(Ok(Message::Pong(_))) => continue,
                // This transport only ever exchanges binary frames
                Some(Ok(Message::Text(_))) => {
                    return Err(Error::Protocol("expected binary message, got text".into()))
                }
                Some(Ok(Message::Frame(_))) => {
                    return Err(Error::Protocol("unexpected raw frame".into()))
                }
                Some(Err(WsError::ConnectionClosed)) | Some(Err(WsError::AlreadyClosed)) => {
                    return Ok(0)
                }
                Some(Err(WsError::Io(e))) => return Err(Error::Io(e)),
                Some(Err(e)) => return Err(Error::Transport(format!("websocket read failed: {}", e))),
                None => return Ok(0),
            }
        }
    }

    pub async fn write(&self, buf: &[u8]) -> Result<usize> {
        if self.cancel.is_cancelled() {
            return Err(Error::ConnectionClosed);
        }

        let mut sink = self.write.lock().await;

        // Entire input as exactly one binary message: no chunking, no
        // coalescing across calls
        tokio::select! {
            _ = self.cancel.cancelled() => Err(Error::ConnectionClosed),
            result = sink.send(Message::Binary(buf.to_vec())) => match result {
                Ok(()) => {
                    trace!(len = buf.len(), "sent binary message");
                    Ok(buf.len())
                }
                Err(WsError::Io(e)) => Err(Error::Io(e)),
                Err(e) => Err(Error::Transport(format!("websocket write failed: {}", e))),
            },
        }
    }

    /// Close the connection. Idempotent: calls after the first return `Ok(())`.
    pub async fn close(&self) -> Result<()> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }

        // Unblock in-flight reads and writes before the close handshake
        self.cancel.cancel();
        debug!("closing websocket connection");

        let mut sink = self.write.lock().await;
        match sink.close().await {
            Ok(()) | Err(WsError::ConnectionClosed) | Err(WsError::AlreadyClosed) => Ok(()),
            Err(e) => Err(Error::Transport(format!("websocket close failed: {}", e))),
        }
    }

    pub fn local_multiaddr(&self) -> &Multiaddr {
        &self.laddr
    }

    pub fn remote_multiaddr(&self) -> &Multiaddr {
        &self.raddr
    }

    /// Fixed loopback placeholder; there is no real local endpoint to report
    pub fn local_addr(&self) -> SocketAddr {
        placeholder_socket_addr()
    }

    /// Fixed loopback placeholder; see [`WsStream::remote_multiaddr`] for the
    /// real remote identity
    pub fn remote_addr(&self) -> SocketAddr {
        placeholder_socket_addr()
    }

    pub fn set_deadline(&self, _deadline: Option<Instant>) -> Result<()> {
        Ok(())
    }

    pub fn set_read_deadline(&self, _deadline: Option<Instant>) -> Result<()> {
        Ok(())
    }

    pub fn set_write_deadline(&self, _deadline: Option<Instant>) -> Result<()> {
        Ok(())
    }
}

#[async_trait]
impl<S> StreamConn for WsStream<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    async fn read(&self, buf: &mut [u8]) -> Result<usize> {
        WsStream::read(self, buf).await
    }

    async fn write(&self, buf: &[u8]) -> Result<usize> {
        WsStream::write(self, buf).await
    }

    async fn close(&self) -> Result<()> {
        WsStream::close(self).await
    }

    fn local_multiaddr(&self) -> &Multiaddr {
        WsStream::local_multiaddr(self)
    }

    fn remote_multiaddr(&self) -> &Multiaddr {
        WsStream::remote_multiaddr(self)
    }

    fn local_addr(&self) -> SocketAddr {
        WsStream::local_addr(self)
    }

    fn remote_addr(&self) -> SocketAddr {
        WsStream::remote_addr(self)
    }

    fn set_deadline(&self, deadline: Option<Instant>) -> Result<()> {
        WsStream::set_deadline(self, deadline)
    }

    fn set_read_deadline(&self, deadline: Option<Instant>) -> Result<()> {
        WsStream::set_read_deadline(self, deadline)
    }

    fn set_write_deadline(&self, deadline: Option<Instant>) -> Result<()> {
        WsStream::set_write_deadline(self, deadline)
    }
}

fn copy_leftover<S>(half: &mut ReadHalf<S>, buf: &mut [u8]) -> usize {
    let n = (half.leftover.len() - half.pos).min(buf.len());
    buf[..n].copy_from_slice(&half.leftover[half.pos..half.pos + n]);
    half.pos += n;
    n
}

fn placeholder_multiaddr() -> Multiaddr {
    "/ip4/0.0.0.0/tcp/0/ws".parse().expect("static multiaddr")
}

fn placeholder_socket_addr() -> SocketAddr {
    SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), PLACEHOLDER_PORT)
}
