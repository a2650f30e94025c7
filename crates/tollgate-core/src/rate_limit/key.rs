//! Client Key Resolution
//!
//! Derives the identity a request is rate limited under, and the client IP it
//! falls back to.

use std::net::{IpAddr, SocketAddr};

use axum::extract::ConnectInfo;
use axum::http::{HeaderMap, Request};
use tollgate_types::netutil::mask_ip;

use super::l402;
use crate::prelude::*;

/// Where the client address of a request is read from
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum IpSource {
	/// The TCP peer address (direct exposure)
	#[default]
	Peer,
	/// Forwarding headers set by a trusted front proxy, then the peer address
	Forwarded,
}

/// Resolve the rate limit key of a request
///
/// Authenticated requests are keyed by their L402 token ID
/// (`"token:<hex>"`), everything else by the anonymized client address
/// (`"ip:<network>"`).
///
/// `authenticated` must only be true after the credential was verified.
/// Keying on unverified token IDs lets an attacker mint fresh identities at
/// will and flush every legitimate client out of the bucket cache.
pub fn resolve_key<B>(req: &Request<B>, remote_ip: &IpAddr, authenticated: bool) -> String {
	if authenticated {
		match l402::token_id_from_headers(req.headers()) {
			Ok(token_id) => return format!("token:{}", token_id),
			Err(e) => {
				warn!("Authenticated request without decodable L402 token ({}), keying by IP", e);
			}
		}
	}

	format!("ip:{}", mask_ip(remote_ip))
}

/// Extract the client IP of a request
pub fn extract_client_ip<B>(req: &Request<B>, source: IpSource) -> Option<IpAddr> {
	let peer = || req.extensions().get::<ConnectInfo<SocketAddr>>().map(|ci| ci.0.ip());
	match source {
		IpSource::Peer => peer(),
		IpSource::Forwarded => forwarded_ip(req.headers()).or_else(peer),
	}
}

/// First client address found in X-Forwarded-For, X-Real-IP or Forwarded
fn forwarded_ip(headers: &HeaderMap) -> Option<IpAddr> {
	let header = |name: &str| headers.get(name).and_then(|h| h.to_str().ok());

	// X-Forwarded-For: "client, proxy1, proxy2"
	let xff = header("x-forwarded-for")
		.and_then(|s| s.split(',').next())
		.and_then(|ip| ip.trim().parse().ok());

	xff.or_else(|| header("x-real-ip").and_then(|s| s.trim().parse().ok()))
		.or_else(|| header("forwarded").and_then(parse_forwarded_for))
}

/// Parse the `for=` parameter of an RFC 7239 Forwarded header
fn parse_forwarded_for(value: &str) -> Option<IpAddr> {
	let first_hop = value.split(',').next()?;
	first_hop.split(';').find_map(|param| {
		let (name, value) = param.trim().split_once('=')?;
		if !name.eq_ignore_ascii_case("for") {
			return None;
		}
		// for=192.0.2.60, for="[2001:db8::1]", for="[2001:db8::1]:4711"
		let value = value.trim_matches('"');
		match value.strip_prefix('[') {
			Some(bracketed) => bracketed.split(']').next()?.parse().ok(),
			None => value.parse().ok().or_else(|| value.parse::<SocketAddr>().ok().map(|s| s.ip())),
		}
	})
}

#[cfg(test)]
mod tests {
	use super::super::l402::test_support::authorization;
	use super::*;
	use axum::http::{header, HeaderValue};
	use std::net::{Ipv4Addr, Ipv6Addr};

	fn request() -> Request<()> {
		Request::builder().uri("/api/test").body(()).unwrap()
	}

	fn with_authorization(value: &str) -> Request<()> {
		let mut req = request();
		req.headers_mut().insert(header::AUTHORIZATION, HeaderValue::from_str(value).unwrap());
		req
	}

	#[test]
	fn test_key_ipv4() {
		let ip = IpAddr::V4(Ipv4Addr::new(192, 168, 1, 100));
		assert_eq!(resolve_key(&request(), &ip, false), "ip:192.168.1.0");
	}

	#[test]
	fn test_key_ipv6() {
		let ip: IpAddr = "2001:db8:1234:5678::1".parse().unwrap();
		assert_eq!(resolve_key(&request(), &ip, false), "ip:2001:db8:1234::");
	}

	#[test]
	fn test_unauthenticated_ignores_l402() {
		let req = with_authorization("L402 garbage:token");
		let ip = IpAddr::V4(Ipv4Addr::new(192, 168, 1, 100));
		assert_eq!(resolve_key(&req, &ip, false), "ip:192.168.1.0");

		// Even a well-formed credential is ignored until verified
		let req = with_authorization(&authorization(5));
		assert_eq!(resolve_key(&req, &ip, false), "ip:192.168.1.0");
	}

	#[test]
	fn test_authenticated_uses_token_id() {
		let req = with_authorization(&authorization(5));
		let ip = IpAddr::V4(Ipv4Addr::new(192, 168, 1, 100));

		let token_key = resolve_key(&req, &ip, true);
		assert_eq!(token_key, format!("token:{}", "05".repeat(32)));
		assert_ne!(token_key, resolve_key(&req, &ip, false));
	}

	#[test]
	fn test_authenticated_garbage_falls_back_to_ip() {
		let req = with_authorization("L402 garbage:token");
		let ip = IpAddr::V4(Ipv4Addr::new(10, 1, 2, 3));
		assert_eq!(resolve_key(&req, &ip, true), "ip:10.1.2.0");

		assert_eq!(resolve_key(&request(), &ip, true), "ip:10.1.2.0");
	}

	#[test]
	fn test_extract_peer_ip() {
		let mut req = request();
		assert_eq!(extract_client_ip(&req, IpSource::Peer), None);

		let peer = SocketAddr::new(IpAddr::V4(Ipv4Addr::new(203, 0, 113, 7)), 4242);
		req.extensions_mut().insert(ConnectInfo(peer));
		req.headers_mut().insert("x-forwarded-for", HeaderValue::from_static("198.51.100.1"));

		assert_eq!(extract_client_ip(&req, IpSource::Peer), Some(peer.ip()));
		assert_eq!(
			extract_client_ip(&req, IpSource::Forwarded),
			Some(IpAddr::V4(Ipv4Addr::new(198, 51, 100, 1)))
		);
	}

	#[test]
	fn test_forwarded_headers() {
		let mut headers = HeaderMap::new();
		headers.insert("x-forwarded-for", HeaderValue::from_static("192.0.2.1, 10.0.0.1"));
		assert_eq!(forwarded_ip(&headers), Some(IpAddr::V4(Ipv4Addr::new(192, 0, 2, 1))));

		let mut headers = HeaderMap::new();
		headers.insert("x-real-ip", HeaderValue::from_static(" 192.0.2.2 "));
		assert_eq!(forwarded_ip(&headers), Some(IpAddr::V4(Ipv4Addr::new(192, 0, 2, 2))));

		let mut headers = HeaderMap::new();
		headers.insert("forwarded", HeaderValue::from_static("for=192.0.2.60;proto=http;by=203.0.113.43"));
		assert_eq!(forwarded_ip(&headers), Some(IpAddr::V4(Ipv4Addr::new(192, 0, 2, 60))));

		let mut headers = HeaderMap::new();
		headers.insert("forwarded", HeaderValue::from_static("For=\"[2001:db8::1]:4711\""));
		assert_eq!(
			forwarded_ip(&headers),
			Some(IpAddr::V6(Ipv6Addr::new(0x2001, 0xdb8, 0, 0, 0, 0, 0, 1)))
		);

		assert_eq!(forwarded_ip(&HeaderMap::new()), None);
	}
}

// vim: ts=4
