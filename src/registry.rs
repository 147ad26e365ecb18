//! Address-conversion registry
//!
//! The networking stack converts between multiaddrs and socket-style
//! addresses through a lookup table of per-protocol conversion functions.
//! The table is an explicit object owned by the composition root and wired
//! up once at startup; there is no import-time global state.

use std::collections::HashMap;

use multiaddr::{Multiaddr, Protocol};

use crate::addr::{self, NetAddr};
use crate::error::{Error, Result};

/// Converts a multiaddr into a socket-style address; keyed by the
/// multiaddr's terminal segment tag
pub type ToNetAddrFn = fn(&Multiaddr) -> Result<Box<dyn NetAddr>>;

/// Converts a socket-style address into a multiaddr; keyed by the address's
/// network name
pub type FromNetAddrFn = fn(&dyn NetAddr) -> Result<Multiaddr>;

/// Lookup table of address-conversion functions
#[derive(Default)]
pub struct AddrRegistry {
    to_net: HashMap<&'static str, ToNetAddrFn>,
    from_net: HashMap<&'static str, FromNetAddrFn>,
}

impl AddrRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_to_net_addr(&mut self, tag: &'static str, f: ToNetAddrFn) {
        self.to_net.insert(tag, f);
    }

    pub fn register_from_net_addr(&mut self, network: &'static str, f: FromNetAddrFn) {
        self.from_net.insert(network, f);
    }

    /// Convert a multiaddr via the converter registered for its terminal
    /// segment
    pub fn to_net_addr(&self, addr: &Multiaddr) -> Result<Box<dyn NetAddr>> {
        let tag =
            terminal_tag(addr).ok_or_else(|| Error::NoConverter(addr.to_string()))?;
        let f = self
            .to_net
            .get(tag)
            .ok_or_else(|| Error::NoConverter(tag.to_string()))?;
        f(addr)
    }

    /// Convert a socket-style address via the converter registered for its
    /// network name
    pub fn from_net_addr(&self, addr: &dyn NetAddr) -> Result<Multiaddr> {
        let f = self
            .from_net
            .get(addr.network())
            .ok_or_else(|| Error::NoConverter(addr.network().to_string()))?;
        f(addr)
    }
}

/// Install the websocket conversions: `websocket` (socket → structured),
/// `ws` and `wss` (structured → socket).
pub fn register_websocket(registry: &mut AddrRegistry) {
    registry.register_from_net_addr("websocket", addr::from_net_addr);
    registry.register_to_net_addr("ws", |a| {
        addr::to_net_addr(a).map(|w| Box::new(w) as Box<dyn NetAddr>)
    });
    registry.register_to_net_addr("wss", |a| {
        addr::to_net_addr(a).map(|w| Box::new(w) as Box<dyn NetAddr>)
    });
}

fn terminal_tag(addr: &Multiaddr) -> Option<&'static str> {
    match addr.iter().last()? {
        Protocol::Ws(_) => Some("ws"),
        Protocol::Wss(_) => Some("wss"),
        Protocol::Tls => Some("tls"),
        Protocol::Sni(_) => Some("sni"),
        Protocol::Tcp(_) => Some("tcp"),
        Protocol::Udp(_) => Some("udp"),
        Protocol::Ip4(_) => Some("ip4"),
        Protocol::Ip6(_) => Some("ip6"),
        Protocol::Dns(_) => Some("dns"),
        Protocol::Dns4(_) => Some("dns4"),
        Protocol::Dns6(_) => Some("dns6"),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::addr::WsAddr;

    fn ma(s: &str) -> Multiaddr {
        s.parse().unwrap()
    }

    fn websocket_registry() -> AddrRegistry {
        let mut registry = AddrRegistry::new();
        register_websocket(&mut registry);
        registry
    }

    #[test]
    fn test_to_net_addr_ws_and_wss() {
        let registry = websocket_registry();

        let net = registry.to_net_addr(&ma("/dns/example.com/tcp/8080/ws")).unwrap();
        assert_eq!(net.network(), "websocket");
        assert_eq!(net.to_string(), "ws://example.com:8080");

        let net = registry.to_net_addr(&ma("/ip4/1.2.3.4/tcp/8443/wss")).unwrap();
        assert_eq!(net.to_string(), "wss://1.2.3.4:8443");
    }

    #[test]
    fn test_from_net_addr_by_network_name() {
        let registry = websocket_registry();

        let rebuilt = registry
            .from_net_addr(&WsAddr::new("ws", "10.0.0.1", "8080"))
            .unwrap();
        assert_eq!(rebuilt, ma("/ip4/10.0.0.1/tcp/8080/ws"));
    }

    #[test]
    fn test_unregistered_tag_fails() {
        let registry = websocket_registry();

        let err = registry
            .to_net_addr(&ma("/ip4/1.2.3.4/tcp/80"))
            .err()
            .unwrap();
        assert!(matches!(err, Error::NoConverter(tag) if tag == "tcp"));
    }

    #[test]
    fn test_empty_registry_has_no_converters() {
        let registry = AddrRegistry::new();

        assert!(registry.to_net_addr(&ma("/ip4/1.2.3.4/tcp/80/ws")).is_err());
        assert!(registry
            .from_net_addr(&WsAddr::new("ws", "10.0.0.1", "80"))
            .is_err());
    }
}
