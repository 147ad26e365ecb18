//! Error types for the WebSocket transport

use thiserror::Error;

/// Main error type for the transport
#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("not a websocket multiaddr: {0}")]
    NotWebsocketAddr(String),

    #[error("invalid transport prefix: {0}")]
    InvalidPrefix(String),

    #[error("not a websocket network address")]
    NotWebsocketNetAddr,

    #[error("missing port in websocket address '{0}'")]
    MissingPort(String),

    #[error("invalid port '{0}' in websocket address")]
    InvalidPort(String),

    #[error("no address converter registered for '{0}'")]
    NoConverter(String),

    #[error("failed to open connection scope: {0}")]
    ScopeOpen(String),

    #[error("websocket dial failed: {0}")]
    Dial(String),

    #[error("failed to upgrade connection: {0}")]
    Upgrade(String),

    #[error("protocol error: {0}")]
    Protocol(String),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("connection closed")]
    ConnectionClosed,
}

/// Result type alias for the transport
pub type Result<T> = std::result::Result<T, Error>;
