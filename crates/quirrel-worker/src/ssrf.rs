//! Outbound destination vetting.
//!
//! When the guard is enabled, a callback endpoint must resolve to
//! public unicast addresses only — loopback, RFC 1918, link-local,
//! CGNAT, unique-local and friends are refused. The vetted address is
//! then pinned on the HTTP client, so the connection cannot re-resolve
//! to a different host between the check and the connect (DNS
//! rebinding).

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};

use tokio::net::lookup_host;
use url::Url;

use quirrel_core::error::AppError;
use quirrel_core::result::AppResult;

/// Resolve an endpoint and require every candidate address to be
/// public unicast; returns the address to pin.
pub async fn resolve_public(url: &Url) -> AppResult<SocketAddr> {
    let host = url
        .host_str()
        .ok_or_else(|| AppError::external_service("Endpoint URL has no host"))?;
    let port = url
        .port_or_known_default()
        .ok_or_else(|| AppError::external_service("Endpoint URL has no port"))?;

    let addrs: Vec<SocketAddr> = lookup_host((host, port))
        .await
        .map_err(|e| AppError::external_service(format!("DNS resolution failed: {e}")))?
        .collect();

    if addrs.is_empty() {
        return Err(AppError::external_service(format!(
            "'{host}' resolved to no addresses"
        )));
    }

    // One private candidate poisons the whole set: a resolver answer
    // mixing public and private addresses is exactly what a rebinding
    // attack looks like.
    for addr in &addrs {
        if !is_public_unicast(addr.ip()) {
            return Err(AppError::external_service(format!(
                "'{host}' resolves to non-public address {}",
                addr.ip()
            )));
        }
    }

    Ok(addrs[0])
}

/// Whether an address is publicly routable unicast.
pub fn is_public_unicast(ip: IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => is_public_unicast_v4(v4),
        IpAddr::V6(v6) => is_public_unicast_v6(v6),
    }
}

fn is_public_unicast_v4(ip: Ipv4Addr) -> bool {
    let octets = ip.octets();
    // 100.64.0.0/10 (CGNAT), 192.0.0.0/24, 198.18.0.0/15 (benchmarking),
    // 240.0.0.0/4 (reserved) are not covered by the stable std helpers.
    let shared = octets[0] == 100 && (octets[1] & 0b1100_0000) == 64;
    let ietf = octets[0] == 192 && octets[1] == 0 && octets[2] == 0;
    let benchmarking = octets[0] == 198 && (octets[1] & 0xfe) == 18;
    let reserved = octets[0] & 0xf0 == 240;

    !(ip.is_unspecified()
        || ip.is_loopback()
        || ip.is_private()
        || ip.is_link_local()
        || ip.is_broadcast()
        || ip.is_documentation()
        || ip.is_multicast()
        || shared
        || ietf
        || benchmarking
        || reserved)
}

fn is_public_unicast_v6(ip: Ipv6Addr) -> bool {
    if let Some(mapped) = ip.to_ipv4_mapped() {
        return is_public_unicast_v4(mapped);
    }
    let segments = ip.segments();
    let unique_local = (segments[0] & 0xfe00) == 0xfc00;
    let link_local = (segments[0] & 0xffc0) == 0xfe80;
    let documentation = segments[0] == 0x2001 && segments[1] == 0xdb8;

    !(ip.is_unspecified()
        || ip.is_loopback()
        || ip.is_multicast()
        || unique_local
        || link_local
        || documentation)
}
