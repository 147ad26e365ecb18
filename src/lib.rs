//! wsdial - dial-only WebSocket transport for peer-to-peer stacks
//!
//! Lets a peer-to-peer networking stack establish outbound logical
//! connections over WebSocket in environments (such as a browser sandbox)
//! that cannot accept inbound TCP connections. Listening is not supported.
//!
//! # Architecture (dial pipeline)
//!
//! ```text
//! multiaddr (/dns/example.com/tcp/443/wss)
//! → Address Translator  (addr)       → wss://example.com:443
//! → WebSocket client                 → raw message socket
//! → Stream Adapter      (conn)       → byte stream + cancellation
//! → Upgrade pipeline    (external)   → capable connection
//! ```
//!
//! ## Core Principles
//!
//! - The transport only translates addresses and adapts streams; resource
//!   accounting, the security/muxing upgrade and peer identity are external
//!   collaborators behind narrow traits
//! - `/wss` is canonicalized to `/tls/ws` on input; no output re-emits it
//! - Every dial failure path releases the resource scope it acquired
//!
//! ## Module Structure
//!
//! ```text
//! src/
//! ├── addr.rs        # multiaddr ⇄ URL translation, socket-style addresses
//! ├── conn.rs        # WebSocket connection as a byte stream
//! ├── transport.rs   # dial façade + collaborator traits
//! ├── registry.rs    # explicit address-conversion registry
//! └── error.rs       # unified error types
//! ```

// Core types
pub mod addr;
pub mod error;

// Transport layers
pub mod conn;
pub mod registry;
pub mod transport;

// Re-exports for convenience
pub use addr::{from_net_addr, parse_websocket_addr, to_net_addr, to_url, NetAddr, WsAddr};
pub use conn::{StreamConn, WsStream};
pub use error::{Error, Result};
pub use registry::{register_websocket, AddrRegistry};
pub use transport::{
    CapableConn, CapableConnWrapper, ConnScope, Direction, MuxedStream, NullResourceManager,
    PeerId, ResourceManager, Transport, TransportConfig, Upgrader, WebsocketTransport,
};
