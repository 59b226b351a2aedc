//! Network trust boundary
//!
//! Client addresses are resolved in two steps. The direct TCP peer is always
//! known; `X-Forwarded-For` is only consulted when that peer is itself inside
//! the trusted proxy networks. Gate decisions are taken against the resulting
//! effective client address.

mod middleware;

pub use middleware::{trust_gate, RouteClass};

use crate::config::TrustSettings;
use ipnet::IpNet;
use std::net::{IpAddr, SocketAddr};

/// Header carrying the proxy-reported client chain
pub const FORWARDED_FOR: &str = "x-forwarded-for";

/// Parse a trusted network entry; bare addresses become single-host networks
pub fn parse_network(value: &str) -> Result<IpNet, ipnet::AddrParseError> {
    let value = value.trim();
    match value.parse::<IpNet>() {
        Ok(net) => Ok(net.trunc()),
        Err(e) => value
            .parse::<IpAddr>()
            .map(|ip| IpNet::from(canonical(ip)))
            .map_err(|_| e),
    }
}

/// Immutable trust boundary settings, built once at startup
#[derive(Debug, Clone, Default)]
pub struct TrustConfig {
    pub trusted_proxy_networks: Vec<IpNet>,
    pub require_trust_for_all: bool,
    pub require_trust_for_admin_only: bool,
}

impl TrustConfig {
    pub fn new(networks: Vec<IpNet>, require_for_all: bool, require_for_admin: bool) -> Self {
        Self {
            trusted_proxy_networks: networks,
            require_trust_for_all: require_for_all,
            require_trust_for_admin_only: require_for_admin,
        }
    }

    /// Build from validated settings
    pub fn from_settings(settings: &TrustSettings) -> Result<Self, ipnet::AddrParseError> {
        let networks = settings
            .trusted_proxy_cidrs
            .iter()
            .map(|cidr| parse_network(cidr))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self::new(
            networks,
            settings.require_trust_for_all,
            settings.require_trust_for_admin_only,
        ))
    }

    /// Whether `ip` lies inside any trusted network
    pub fn is_trusted(&self, ip: IpAddr) -> bool {
        is_trusted(ip, &self.trusted_proxy_networks)
    }

    /// Whether a request to a route of the given class must pass the trust check
    pub fn requires_trust(&self, route: RouteClass) -> bool {
        self.require_trust_for_all
            || (self.require_trust_for_admin_only && route == RouteClass::Admin)
    }
}

/// Outcome of resolving the caller of one request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClientAddress {
    pub direct_peer: IpAddr,
    pub effective: IpAddr,
    /// Whether `effective` was taken from a forwarded header
    pub forwarded: bool,
}

/// Step one: the address of the direct TCP peer
pub fn resolve_direct_peer(conn: &SocketAddr) -> IpAddr {
    canonical(conn.ip())
}

/// Step two: the effective client address
///
/// The forwarded header is honored only when `direct_peer` is trusted. The
/// first entry of the header is used; a missing or malformed entry falls back
/// to the direct peer.
pub fn resolve_effective_client(
    direct_peer: IpAddr,
    forwarded_header: Option<&str>,
    trusted_networks: &[IpNet],
) -> ClientAddress {
    let direct = ClientAddress {
        direct_peer,
        effective: direct_peer,
        forwarded: false,
    };

    if !is_trusted(direct_peer, trusted_networks) {
        return direct;
    }

    match forwarded_header.and_then(first_forwarded_addr) {
        Some(effective) => ClientAddress {
            direct_peer,
            effective,
            forwarded: true,
        },
        None => direct,
    }
}

fn is_trusted(ip: IpAddr, networks: &[IpNet]) -> bool {
    let ip = canonical(ip);
    networks.iter().any(|net| net.contains(&ip))
}

fn first_forwarded_addr(header: &str) -> Option<IpAddr> {
    let first = header.split(',').next()?.trim();
    if first.is_empty() {
        return None;
    }

    // Accept "ip", "ipv4:port" and "[ipv6]:port"
    first
        .parse::<IpAddr>()
        .or_else(|_| first.parse::<SocketAddr>().map(|sa| sa.ip()))
        .ok()
        .map(canonical)
}

fn canonical(ip: IpAddr) -> IpAddr {
    match ip {
        IpAddr::V6(v6) => match v6.to_ipv4_mapped() {
            Some(v4) => IpAddr::V4(v4),
            None => IpAddr::V6(v6),
        },
        v4 => v4,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn nets(cidrs: &[&str]) -> Vec<IpNet> {
        cidrs.iter().map(|c| parse_network(c).unwrap()).collect()
    }

    fn ip(s: &str) -> IpAddr {
        s.parse().unwrap()
    }

    #[test]
    fn test_parse_network() {
        assert_eq!(parse_network("10.10.0.1/32").unwrap().to_string(), "10.10.0.1/32");
        assert_eq!(parse_network(" 10.10.0.1 ").unwrap().to_string(), "10.10.0.1/32");
        assert_eq!(parse_network("10.1.2.3/8").unwrap().to_string(), "10.0.0.0/8");
        assert_eq!(parse_network("fd00::1").unwrap().to_string(), "fd00::1/128");
        assert!(parse_network("10.0.0.0/40").is_err());
        assert!(parse_network("proxy.internal").is_err());
    }

    #[test]
    fn test_untrusted_peer_ignores_forwarded_header() {
        let trusted = nets(&["10.10.0.1/32", "100.64.0.0/10"]);
        let addr = resolve_effective_client(ip("198.51.100.10"), Some("100.64.1.25"), &trusted);

        assert_eq!(addr.effective, ip("198.51.100.10"));
        assert!(!addr.forwarded);
    }

    #[test]
    fn test_trusted_peer_uses_first_forwarded_value() {
        let trusted = nets(&["10.10.0.1/32"]);
        let addr = resolve_effective_client(
            ip("10.10.0.1"),
            Some(" 100.64.2.1 , 10.10.0.1"),
            &trusted,
        );

        assert_eq!(addr.effective, ip("100.64.2.1"));
        assert_eq!(addr.direct_peer, ip("10.10.0.1"));
        assert!(addr.forwarded);
    }

    #[test]
    fn test_malformed_forwarded_header_falls_back() {
        let trusted = nets(&["10.10.0.1/32"]);
        for header in ["", " , 1.2.3.4", "unknown", "999.1.1.1"] {
            let addr = resolve_effective_client(ip("10.10.0.1"), Some(header), &trusted);
            assert_eq!(addr.effective, ip("10.10.0.1"), "header {:?}", header);
            assert!(!addr.forwarded);
        }

        let addr = resolve_effective_client(ip("10.10.0.1"), None, &trusted);
        assert_eq!(addr.effective, ip("10.10.0.1"));
    }

    #[test]
    fn test_forwarded_value_with_port() {
        let trusted = nets(&["10.10.0.1/32"]);
        let addr = resolve_effective_client(ip("10.10.0.1"), Some("203.0.113.7:51000"), &trusted);
        assert_eq!(addr.effective, ip("203.0.113.7"));

        let addr = resolve_effective_client(ip("10.10.0.1"), Some("[2001:db8::1]:443"), &trusted);
        assert_eq!(addr.effective, ip("2001:db8::1"));
    }

    #[test]
    fn test_mapped_ipv6_peer_is_canonicalized() {
        let peer: SocketAddr = "[::ffff:10.10.0.1]:40000".parse().unwrap();
        let direct = resolve_direct_peer(&peer);
        assert_eq!(direct, ip("10.10.0.1"));

        let trusted = nets(&["10.10.0.1/32"]);
        assert!(is_trusted(direct, &trusted));
    }

    #[test]
    fn test_requires_trust() {
        let admin_only = TrustConfig::new(vec![], false, true);
        assert!(admin_only.requires_trust(RouteClass::Admin));
        assert!(!admin_only.requires_trust(RouteClass::Public));

        let all = TrustConfig::new(vec![], true, false);
        assert!(all.requires_trust(RouteClass::Admin));
        assert!(all.requires_trust(RouteClass::Public));

        let none = TrustConfig::default();
        assert!(!none.requires_trust(RouteClass::Admin));
    }
}
