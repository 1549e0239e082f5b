use crate::error::ConfigurationError;
use crate::types::TargetMode;
use if_addrs::{get_if_addrs, IfAddr};
use ipnet::Ipv4Net;
use std::net::{Ipv4Addr, UdpSocket};

/// Public address used to pick the outbound interface. Nothing is ever sent to it.
const ROUTE_PROBE_ADDR: &str = "8.8.8.8:80";

/// Upper bound on hosts in one session (a /12).
pub const MAX_TARGETS: u64 = 1 << 20;

/// Expand a target mode into the ordered list of hosts to scan.
///
/// The result is ascending by numeric address in every mode, and is a pure
/// function of the input apart from `LocalSubnet`, which depends on the
/// machine's current address.
pub fn enumerate_targets(mode: &TargetMode) -> Result<Vec<Ipv4Addr>, ConfigurationError> {
    let describe = || match mode {
        TargetMode::LocalSubnet => "local subnet".to_string(),
        TargetMode::Cidr(s) => s.clone(),
        TargetMode::Range(a, b) => format!("{a}-{b}"),
    };
    let (lo, hi) = match mode {
        TargetMode::LocalSubnet => usable_bounds(ipv4_to_default_cidr(detect_outbound_ipv4()?)),
        TargetMode::Cidr(s) => usable_bounds(parse_cidr(s)?),
        TargetMode::Range(a, b) => {
            let (a, b) = (u32::from(parse_ipv4(a)?), u32::from(parse_ipv4(b)?));
            Some((a.min(b), a.max(b)))
        }
    }
    .ok_or_else(|| ConfigurationError::EmptyTargets { input: describe() })?;

    let count = u64::from(hi - lo) + 1;
    if count > MAX_TARGETS {
        return Err(ConfigurationError::TooManyTargets {
            input: describe(),
            count,
            max: MAX_TARGETS,
        });
    }
    Ok((lo..=hi).map(Ipv4Addr::from).collect())
}

/// Find the local IPv4 address the OS would route public traffic through.
///
/// Connecting a UDP socket only selects a route; no datagram leaves the host.
/// Falls back to the first non-loopback interface address when there is no
/// default route.
pub fn detect_outbound_ipv4() -> Result<Ipv4Addr, ConfigurationError> {
    let routed = UdpSocket::bind((Ipv4Addr::UNSPECIFIED, 0))
        .and_then(|sock| {
            sock.connect(ROUTE_PROBE_ADDR)?;
            sock.local_addr()
        })
        .ok()
        .and_then(|addr| match addr.ip() {
            std::net::IpAddr::V4(v4) if !v4.is_unspecified() && !v4.is_loopback() => Some(v4),
            _ => None,
        });
    if let Some(ip) = routed {
        return Ok(ip);
    }

    let ifaces = get_if_addrs().map_err(|e| ConfigurationError::LocalNetworkUnavailable {
        reason: e.to_string(),
    })?;
    ifaces
        .into_iter()
        .find_map(|iface| match iface.addr {
            IfAddr::V4(v4) if !v4.ip.is_loopback() => Some(v4.ip),
            _ => None,
        })
        .ok_or_else(|| ConfigurationError::LocalNetworkUnavailable {
            reason: "no non-loopback IPv4 interface".into(),
        })
}

/// Helper: convert an IPv4 address into its default /24 network.
pub fn ipv4_to_default_cidr(ip: Ipv4Addr) -> Ipv4Net {
    let o = ip.octets();
    Ipv4Net::new(Ipv4Addr::new(o[0], o[1], o[2], 0), 24).expect("/24 is always valid")
}

/// Parse an IPv4 network in CIDR notation. Host bits are allowed and ignored.
pub fn parse_cidr(s: &str) -> Result<Ipv4Net, ConfigurationError> {
    s.trim()
        .parse::<Ipv4Net>()
        .map(|n| n.trunc())
        .map_err(|e| ConfigurationError::InvalidCidr {
            input: s.to_string(),
            reason: e.to_string(),
        })
}

fn parse_ipv4(s: &str) -> Result<Ipv4Addr, ConfigurationError> {
    s.trim()
        .parse::<Ipv4Addr>()
        .map_err(|_| ConfigurationError::InvalidAddress {
            input: s.to_string(),
        })
}

/// First and last usable host of a network, if it has any.
fn usable_bounds(net: Ipv4Net) -> Option<(u32, u32)> {
    let start = u32::from(net.network());
    let end = u32::from(net.broadcast());
    if end <= start + 1 {
        // /31 and /32 have no usable host addresses
        return None;
    }
    Some((start + 1, end - 1))
}
