//! IP address anonymization
//!
//! Collapses client addresses into network segments so that a client holding a
//! whole range of addresses is still counted as one. IPv4 addresses are masked
//! to /24, IPv6 addresses to /48 (the usual residential or mobile allocation).
//! Every per-client-IP counter must key on `mask_ip` so they agree on grouping.

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

/// Number of leading IPv4 octets kept (/24)
const IPV4_PREFIX_OCTETS: usize = 3;

/// Number of leading IPv6 octets kept (/48)
const IPV6_PREFIX_OCTETS: usize = 6;

/// Mask an address to its network segment.
///
/// IPv4-mapped IPv6 addresses (`::ffff:a.b.c.d`) are treated as IPv4.
pub fn mask_ip(addr: &IpAddr) -> IpAddr {
	match addr {
		IpAddr::V4(ip) => IpAddr::V4(mask_ipv4(*ip)),
		IpAddr::V6(ip) => match ip.to_ipv4_mapped() {
			Some(v4) => IpAddr::V4(mask_ipv4(v4)),
			None => IpAddr::V6(mask_ipv6(*ip)),
		},
	}
}

fn mask_ipv4(ip: Ipv4Addr) -> Ipv4Addr {
	let mut octets = [0u8; 4];
	octets[..IPV4_PREFIX_OCTETS].copy_from_slice(&ip.octets()[..IPV4_PREFIX_OCTETS]);
	Ipv4Addr::from(octets)
}

fn mask_ipv6(ip: Ipv6Addr) -> Ipv6Addr {
	let mut octets = [0u8; 16];
	octets[..IPV6_PREFIX_OCTETS].copy_from_slice(&ip.octets()[..IPV6_PREFIX_OCTETS]);
	Ipv6Addr::from(octets)
}


// vim: ts=4
