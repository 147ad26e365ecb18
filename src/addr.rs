//! Address translation between websocket multiaddrs and dialable URLs
//!
//! A websocket multiaddr is an IP-or-DNS host plus a TCP port, terminated by
//! `/ws`, optionally preceded by `/tls[/sni/<hostname>]`. `/wss` is accepted
//! as sugar for `/tls/ws` and is always rewritten before further processing;
//! no output path re-emits `/wss`.

use std::any::Any;
use std::borrow::Cow;
use std::fmt;
use std::net::IpAddr;

use multiaddr::{Multiaddr, Protocol};
use tracing::debug;
use url::Url;

use crate::error::{Error, Result};

/// Intermediate form of a websocket multiaddr, valid for one translation call.
#[derive(Debug)]
pub struct ParsedWebsocketAddr {
    /// True if the address carried a TLS (or WSS) segment
    pub secure: bool,
    /// SNI hostname override for the TLS handshake and HTTP Host header
    pub sni: Option<String>,
    /// The transport prefix (host + port) with WS/WSS/TLS/SNI stripped
    pub rest: Multiaddr,
}

/// Decompose a websocket multiaddr into its transport prefix and
/// websocket-specific segments.
///
/// Fails with [`Error::NotWebsocketAddr`] if no `/ws` segment is present,
/// even after `/wss` canonicalization.
pub fn parse_websocket_addr(addr: &Multiaddr) -> Result<ParsedWebsocketAddr> {
    let mut protos: Vec<Protocol> = addr.iter().collect();

    // Canonicalize: /wss is sugar for /tls/ws
    if let Some(pos) = protos.iter().rposition(|p| matches!(p, Protocol::Wss(_))) {
        let path = match protos.remove(pos) {
            Protocol::Wss(path) => path,
            _ => unreachable!(),
        };
        protos.truncate(pos);
        protos.push(Protocol::Tls);
        protos.push(Protocol::Ws(path));
    }

    // Strip the trailing /ws segment
    let ws = protos
        .iter()
        .rposition(|p| matches!(p, Protocol::Ws(_)))
        .ok_or_else(|| Error::NotWebsocketAddr(addr.to_string()))?;
    protos.truncate(ws);

    // Walk backward from the tail: SNI is captured between the /ws and the
    // TLS segment; TLS marks the address secure and ends the walk.
    let mut secure = false;
    let mut sni = None;
    let mut prefix_len = protos.len();
    for (i, p) in protos.iter().enumerate().rev() {
        match p {
            Protocol::Sni(host) => sni = Some(host.to_string()),
            Protocol::Tls => {
                secure = true;
                prefix_len = i;
                break;
            }
            _ => {}
        }
    }

    let mut rest = Multiaddr::empty();
    for p in &protos[..prefix_len] {
        rest.push(p.clone());
    }

    Ok(ParsedWebsocketAddr { secure, sni, rest })
}

/// Translate a websocket multiaddr into a dialable URL.
///
/// The SNI hostname, when present, wins over the transport-prefix host: a
/// caller may dial by IP while presenting a specific hostname for TLS
/// certificate validation and the HTTP Host header.
pub fn to_url(addr: &Multiaddr) -> Result<Url> {
    let parsed = parse_websocket_addr(addr)?;

    let (host, port) =
        host_port(&parsed.rest).ok_or_else(|| Error::InvalidPrefix(addr.to_string()))?;
    let host = parsed.sni.unwrap_or(host);
    let scheme = if parsed.secure { "wss" } else { "ws" };

    Url::parse(&format!("{}://{}:{}", scheme, host, port))
        .map_err(|e| Error::InvalidPrefix(format!("{}: {}", addr, e)))
}

/// Resolve a transport prefix to a (host, port) pair.
///
/// The prefix must be exactly one IP-or-DNS segment followed by a TCP port.
fn host_port(rest: &Multiaddr) -> Option<(String, u16)> {
    let mut iter = rest.iter();

    let host = match iter.next()? {
        Protocol::Ip4(ip) => ip.to_string(),
        Protocol::Ip6(ip) => format!("[{}]", ip),
        Protocol::Dns(host) | Protocol::Dns4(host) | Protocol::Dns6(host) => host.to_string(),
        _ => return None,
    };

    let port = match iter.next()? {
        Protocol::Tcp(port) => port,
        _ => return None,
    };

    if iter.next().is_some() {
        return None;
    }

    Some((host, port))
}

/// Socket-style address for a network connection
///
/// A trait-object counterpart to `std::net::SocketAddr` for transports whose
/// endpoints are not plain IP sockets. Conversion functions in the
/// [`AddrRegistry`](crate::registry::AddrRegistry) are keyed by
/// [`network`](NetAddr::network).
pub trait NetAddr: fmt::Display + Send + Sync {
    /// Network name this address belongs to (e.g. `"websocket"`)
    fn network(&self) -> &'static str;

    /// Downcast support for converters that only accept their own type
    fn as_any(&self) -> &dyn Any;
}

/// Socket-style websocket address: scheme, hostname and port string
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WsAddr {
    pub scheme: String,
    pub host: String,
    pub port: String,
}

impl WsAddr {
    pub fn new(
        scheme: impl Into<String>,
        host: impl Into<String>,
        port: impl Into<String>,
    ) -> Self {
        Self {
            scheme: scheme.into(),
            host: host.into(),
            port: port.into(),
        }
    }

    /// Build from a translated URL.
    ///
    /// IPv6 hosts are stored unbracketed so they survive a literal-IP parse
    /// on reconstruction.
    pub fn from_url(url: &Url) -> Self {
        let host = match url.host() {
            Some(url::Host::Ipv4(ip)) => ip.to_string(),
            Some(url::Host::Ipv6(ip)) => ip.to_string(),
            Some(url::Host::Domain(domain)) => domain.to_string(),
            None => String::new(),
        };

        Self {
            scheme: url.scheme().to_string(),
            host,
            port: url
                .port_or_known_default()
                .map(|p| p.to_string())
                .unwrap_or_default(),
        }
    }

    /// Sentinel address (`ws://0.0.0.0:0`) for endpoints with no real
    /// translatable address
    pub fn placeholder() -> Self {
        Self::new("ws", "0.0.0.0", "0")
    }
}

impl fmt::Display for WsAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}://{}:{}", self.scheme, self.host, self.port)
    }
}

impl NetAddr for WsAddr {
    fn network(&self) -> &'static str {
        "websocket"
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Reconstruct a websocket multiaddr from a socket-style address.
///
/// The host is classified as a literal IP when a numeric parse succeeds and
/// as a DNS name otherwise. IPv6 zone identifiers are not supported: a zoned
/// literal fails the IP parse and falls through to the DNS branch.
pub fn from_net_addr(addr: &dyn NetAddr) -> Result<Multiaddr> {
    let wsa = addr
        .as_any()
        .downcast_ref::<WsAddr>()
        .ok_or(Error::NotWebsocketNetAddr)?;

    if wsa.port.is_empty() {
        return Err(Error::MissingPort(wsa.to_string()));
    }
    let port: u16 = wsa
        .port
        .parse()
        .map_err(|_| Error::InvalidPort(wsa.port.clone()))?;

    let mut out = Multiaddr::empty();
    match wsa.host.parse::<IpAddr>() {
        Ok(IpAddr::V4(ip)) => out.push(Protocol::Ip4(ip)),
        Ok(IpAddr::V6(ip)) => out.push(Protocol::Ip6(ip)),
        Err(_) => out.push(Protocol::Dns(Cow::Owned(wsa.host.clone()))),
    }
    out.push(Protocol::Tcp(port));

    match wsa.scheme.as_str() {
        "ws" => out.push(Protocol::Ws(Cow::Borrowed("/"))),
        "wss" => out.push(Protocol::Wss(Cow::Borrowed("/"))),
        _ => return Err(Error::NotWebsocketNetAddr),
    }

    Ok(out)
}

/// Best-effort conversion of a multiaddr to a socket-style address.
///
/// Dummy local addresses have no translatable endpoint, and the registry
/// contract has no error channel for them, so translation failure yields the
/// [`WsAddr::placeholder`] sentinel. Callers that need a real address must
/// use [`to_url`] instead.
pub fn to_net_addr(addr: &Multiaddr) -> Result<WsAddr> {
    match to_url(addr) {
        Ok(url) => Ok(WsAddr::from_url(&url)),
        Err(e) => {
            debug!(%addr, error = %e, "websocket addr not translatable, using placeholder");
            Ok(WsAddr::placeholder())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ma(s: &str) -> Multiaddr {
        s.parse().unwrap()
    }

    #[test]
    fn test_wss_canonicalization_equivalence() {
        let sugar = to_url(&ma("/ip4/1.2.3.4/tcp/443/wss")).unwrap();
        let canonical = to_url(&ma("/ip4/1.2.3.4/tcp/443/tls/ws")).unwrap();
        assert_eq!(sugar, canonical);
        assert_eq!(sugar.scheme(), "wss");
        assert_eq!(sugar.host_str(), Some("1.2.3.4"));
    }

    #[test]
    fn test_parse_requires_ws_segment() {
        let err = parse_websocket_addr(&ma("/ip4/1.2.3.4/tcp/80")).unwrap_err();
        assert!(matches!(err, Error::NotWebsocketAddr(_)));

        let err = parse_websocket_addr(&ma("/dns/example.com/tcp/443/tls")).unwrap_err();
        assert!(matches!(err, Error::NotWebsocketAddr(_)));
    }

    #[test]
    fn test_parse_captures_sni_and_prefix() {
        let parsed =
            parse_websocket_addr(&ma("/ip4/1.2.3.4/tcp/443/tls/sni/example.com/ws")).unwrap();
        assert!(parsed.secure);
        assert_eq!(parsed.sni.as_deref(), Some("example.com"));
        assert_eq!(parsed.rest, ma("/ip4/1.2.3.4/tcp/443"));
    }

    #[test]
    fn test_sni_overrides_url_host() {
        let url = to_url(&ma("/ip4/1.2.3.4/tcp/8443/tls/sni/example.com/ws")).unwrap();
        assert_eq!(url.scheme(), "wss");
        assert_eq!(url.host_str(), Some("example.com"));
        assert_eq!(url.port(), Some(8443));
    }

    #[test]
    fn test_to_url_plain_ws() {
        let url = to_url(&ma("/dns/example.com/tcp/8080/ws")).unwrap();
        assert_eq!(url.scheme(), "ws");
        assert_eq!(url.host_str(), Some("example.com"));
        assert_eq!(url.port(), Some(8080));

        let url = to_url(&ma("/ip6/::1/tcp/8080/ws")).unwrap();
        assert_eq!(url.host_str(), Some("[::1]"));
    }

    #[test]
    fn test_to_url_invalid_prefix() {
        // UDP is not a valid transport prefix for this transport
        let err = to_url(&ma("/ip4/1.2.3.4/udp/53/ws")).unwrap_err();
        assert!(matches!(err, Error::InvalidPrefix(_)));
    }

    #[test]
    fn test_from_net_addr_ip_host() {
        let addr = from_net_addr(&WsAddr::new("ws", "10.0.0.1", "443")).unwrap();
        assert_eq!(addr, ma("/ip4/10.0.0.1/tcp/443/ws"));

        let addr = from_net_addr(&WsAddr::new("ws", "::1", "443")).unwrap();
        assert_eq!(addr, ma("/ip6/::1/tcp/443/ws"));
    }

    #[test]
    fn test_from_net_addr_dns_host() {
        let addr = from_net_addr(&WsAddr::new("ws", "example.com", "443")).unwrap();
        assert_eq!(addr, ma("/dns/example.com/tcp/443/ws"));
    }

    #[test]
    fn test_from_net_addr_missing_port() {
        let err = from_net_addr(&WsAddr::new("ws", "example.com", "")).unwrap_err();
        assert!(matches!(err, Error::MissingPort(_)));
    }

    #[test]
    fn test_from_net_addr_invalid_port() {
        let err = from_net_addr(&WsAddr::new("ws", "example.com", "abc")).unwrap_err();
        assert!(matches!(err, Error::InvalidPort(p) if p == "abc"));
    }

    #[test]
    fn test_from_net_addr_rejects_foreign_type() {
        struct TcpNetAddr;

        impl fmt::Display for TcpNetAddr {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "127.0.0.1:80")
            }
        }

        impl NetAddr for TcpNetAddr {
            fn network(&self) -> &'static str {
                "tcp"
            }
            fn as_any(&self) -> &dyn Any {
                self
            }
        }

        let err = from_net_addr(&TcpNetAddr).unwrap_err();
        assert!(matches!(err, Error::NotWebsocketNetAddr));
    }

    #[test]
    fn test_url_round_trip_preserves_host_and_port() {
        for input in [
            "/ip4/10.0.0.1/tcp/8080/ws",
            "/ip6/::1/tcp/8080/ws",
            "/dns/example.com/tcp/8443/wss",
        ] {
            let original = ma(input);
            let url = to_url(&original).unwrap();
            let rebuilt = from_net_addr(&WsAddr::from_url(&url)).unwrap();
            assert_eq!(rebuilt, original, "round trip of {}", input);
        }
    }

    #[test]
    fn test_to_net_addr_placeholder_on_failure() {
        // A dummy local addr with no websocket segment yields the sentinel
        let wsa = to_net_addr(&ma("/ip4/1.2.3.4/tcp/80")).unwrap();
        assert_eq!(wsa, WsAddr::placeholder());
        assert_eq!(wsa.to_string(), "ws://0.0.0.0:0");
    }

    #[test]
    fn test_to_net_addr_translatable() {
        let wsa = to_net_addr(&ma("/dns/example.com/tcp/8080/ws")).unwrap();
        assert_eq!(wsa, WsAddr::new("ws", "example.com", "8080"));
        assert_eq!(wsa.network(), "websocket");
    }
}
