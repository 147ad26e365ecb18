//! Transport façade and collaborator contracts
//!
//! The dial-only entry point the networking stack calls into, plus the
//! narrow traits for its external collaborators: the resource manager that
//! accounts per-connection limits, and the upgrade pipeline that turns a raw
//! byte stream into an authenticated, multiplexed connection.
//!
//! Dial sequence: open resource scope → translate multiaddr to URL → open
//! the WebSocket → wrap as a byte stream → hand to the upgrader. Every
//! failure path releases the scope; on success its ownership transfers to
//! the upgrade pipeline.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use multiaddr::{Multiaddr, Protocol};
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_tungstenite::connect_async_with_config;
use tokio_tungstenite::tungstenite::protocol::WebSocketConfig;
use tracing::debug;

use crate::addr;
use crate::conn::{StreamConn, WsStream};
use crate::error::{Error, Result};

/// Opaque peer identity, supplied by the networking stack
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PeerId(String);

impl PeerId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Direction of a connection attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Outbound,
    Inbound,
}

/// Resource-accounting scope for one connection attempt.
///
/// Must be released exactly once on every exit path; on a successful dial
/// the upgrade pipeline takes over that responsibility.
pub trait ConnScope: Send + Sync {
    /// Release the scope's accounting
    fn done(&self);
}

/// External resource manager tracking connection limits
#[async_trait]
pub trait ResourceManager: Send + Sync {
    /// Open an accounting scope for a connection attempt, or refuse it
    async fn open_connection(&self, dir: Direction, addr: &Multiaddr) -> Result<Arc<dyn ConnScope>>;
}

/// Resource manager that accepts everything and accounts nothing
pub struct NullResourceManager;

struct NullScope;

impl ConnScope for NullScope {
    fn done(&self) {}
}

#[async_trait]
impl ResourceManager for NullResourceManager {
    async fn open_connection(
        &self,
        _dir: Direction,
        _addr: &Multiaddr,
    ) -> Result<Arc<dyn ConnScope>> {
        Ok(Arc::new(NullScope))
    }
}

/// External pipeline performing the security handshake and multiplexing
#[async_trait]
pub trait Upgrader: Send + Sync {
    /// Upgrade a raw byte-stream connection into a capable connection.
    ///
    /// On success the upgraded connection owns `scope` and releases it when
    /// the connection ends.
    async fn upgrade(
        &self,
        conn: Box<dyn StreamConn>,
        dir: Direction,
        peer: &PeerId,
        scope: Arc<dyn ConnScope>,
    ) -> Result<Box<dyn CapableConn>>;
}

/// A multiplexed logical stream within a capable connection
pub trait MuxedStream: AsyncRead + AsyncWrite + Unpin + Send {}

impl<T: AsyncRead + AsyncWrite + Unpin + Send> MuxedStream for T {}

/// Authenticated, multiplexed connection returned to the networking stack
#[async_trait]
pub trait CapableConn: Send + Sync {
    fn local_multiaddr(&self) -> Multiaddr;
    fn remote_multiaddr(&self) -> Multiaddr;
    fn remote_peer(&self) -> PeerId;
    fn is_closed(&self) -> bool;

    /// Open a new logical stream over the connection
    async fn open_stream(&self) -> Result<Box<dyn MuxedStream>>;

    async fn close(&self) -> Result<()>;
}

/// Explicit forwarding wrapper around the upgraded connection
pub struct CapableConnWrapper {
    inner: Box<dyn CapableConn>,
}

impl CapableConnWrapper {
    pub fn new(inner: Box<dyn CapableConn>) -> Self {
        Self { inner }
    }
}

#[async_trait]
impl CapableConn for CapableConnWrapper {
    fn local_multiaddr(&self) -> Multiaddr {
        self.inner.local_multiaddr()
    }

    fn remote_multiaddr(&self) -> Multiaddr {
        self.inner.remote_multiaddr()
    }

    fn remote_peer(&self) -> PeerId {
        self.inner.remote_peer()
    }

    fn is_closed(&self) -> bool {
        self.inner.is_closed()
    }

    async fn open_stream(&self) -> Result<Box<dyn MuxedStream>> {
        self.inner.open_stream().await
    }

    async fn close(&self) -> Result<()> {
        self.inner.close().await
    }
}

/// Transport trait for establishing outbound connections
///
/// Dialing is cancellable by dropping (or racing away) the returned future;
/// there is no separate context parameter.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Structural check: can this transport dial the address?
    fn can_dial(&self, addr: &Multiaddr) -> bool;

    /// Terminal segment tags this transport claims
    fn protocols(&self) -> &'static [&'static str];

    /// Dial a remote address and upgrade to a capable connection
    async fn dial(&self, raddr: &Multiaddr, peer: &PeerId) -> Result<Box<dyn CapableConn>>;

    /// Whether this transport relays for other peers
    fn proxy(&self) -> bool;
}

/// Transport configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TransportConfig {
    /// Maximum size of one incoming message
    pub max_message_size: usize,
    /// Maximum size of one frame within a message
    pub max_frame_size: usize,
    /// Disable Nagle's algorithm on the dialed TCP socket
    pub nodelay: bool,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            max_message_size: 64 << 20, // 64 MB
            max_frame_size: 16 << 20,   // 16 MB
            nodelay: true,
        }
    }
}

/// Dial-only WebSocket transport
pub struct WebsocketTransport {
    upgrader: Arc<dyn Upgrader>,
    rcmgr: Arc<dyn ResourceManager>,
    config: TransportConfig,
}

impl WebsocketTransport {
    /// Create a transport; without a resource manager, accounting is a no-op.
    pub fn new(upgrader: Arc<dyn Upgrader>, rcmgr: Option<Arc<dyn ResourceManager>>) -> Self {
        Self {
            upgrader,
            rcmgr: rcmgr.unwrap_or_else(|| Arc::new(NullResourceManager)),
            config: TransportConfig::default(),
        }
    }

    pub fn with_config(mut self, config: TransportConfig) -> Self {
        self.config = config;
        self
    }

    async fn dial_with_scope(
        &self,
        raddr: &Multiaddr,
        peer: &PeerId,
        scope: &Arc<dyn ConnScope>,
    ) -> Result<Box<dyn CapableConn>> {
        let conn = self.connect(raddr, scope).await?;

        let upgraded = self
            .upgrader
            .upgrade(conn, Direction::Outbound, peer, Arc::clone(scope))
            .await
            .map_err(|e| Error::Upgrade(e.to_string()))?;

        Ok(Box::new(CapableConnWrapper::new(upgraded)))
    }

    async fn connect(
        &self,
        raddr: &Multiaddr,
        scope: &Arc<dyn ConnScope>,
    ) -> Result<Box<dyn StreamConn>> {
        let url = addr::to_url(raddr)?;
        debug!(%url, "dialing websocket");

        let ws_config = WebSocketConfig {
            max_message_size: Some(self.config.max_message_size),
            max_frame_size: Some(self.config.max_frame_size),
            ..Default::default()
        };

        let (socket, _response) =
            connect_async_with_config(url.as_str(), Some(ws_config), self.config.nodelay)
                .await
                .map_err(|e| Error::Dial(e.to_string()))?;
        debug!(%url, "websocket handshake completed");

        Ok(Box::new(WsStream::new(
            socket,
            raddr.clone(),
            Some(Arc::clone(scope)),
        )))
    }
}

#[async_trait]
impl Transport for WebsocketTransport {
    fn can_dial(&self, addr: &Multiaddr) -> bool {
        is_websocket_addr(addr)
    }

    fn protocols(&self) -> &'static [&'static str] {
        &["ws", "wss"]
    }

    async fn dial(&self, raddr: &Multiaddr, peer: &PeerId) -> Result<Box<dyn CapableConn>> {
        let scope = self
            .rcmgr
            .open_connection(Direction::Outbound, raddr)
            .await
            .map_err(|e| Error::ScopeOpen(e.to_string()))?;

        match self.dial_with_scope(raddr, peer, &scope).await {
            Ok(conn) => Ok(conn),
            Err(e) => {
                scope.done();
                Err(e)
            }
        }
    }

    fn proxy(&self) -> bool {
        false
    }
}

/// Structural dial matcher: IP-or-DNS host, TCP port, then one of
/// `/ws`, `/tls/ws`, `/tls/sni/<host>/ws` or `/wss`.
fn is_websocket_addr(addr: &Multiaddr) -> bool {
    let protos: Vec<Protocol> = addr.iter().collect();

    match protos.as_slice() {
        [host, Protocol::Tcp(_), tail @ ..] if is_host_segment(host) => matches!(
            tail,
            [Protocol::Ws(_)]
                | [Protocol::Wss(_)]
                | [Protocol::Tls, Protocol::Ws(_)]
                | [Protocol::Tls, Protocol::Sni(_), Protocol::Ws(_)]
        ),
        _ => false,
    }
}

fn is_host_segment(p: &Protocol) -> bool {
    matches!(
        p,
        Protocol::Ip4(_)
            | Protocol::Ip6(_)
            | Protocol::Dns(_)
            | Protocol::Dns4(_)
            | Protocol::Dns6(_)
    )
}
