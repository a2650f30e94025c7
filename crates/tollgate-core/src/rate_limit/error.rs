//! Rate Limiting Denials
//!
//! Error type for a rate limited request and its wire rendering. Plain HTTP
//! clients get a 429; gRPC clients get a transport-level 200 carrying a
//! RESOURCE_EXHAUSTED status, since gRPC reports call status in its own
//! headers.

use std::fmt;
use std::time::Duration;

use axum::http::{header, HeaderMap, HeaderName, HeaderValue, Request, StatusCode};
use axum::response::{IntoResponse, Response};

/// Human-readable denial message, shared by both protocols
pub const RATE_LIMIT_MESSAGE: &str = "rate limit exceeded";

/// gRPC status code RESOURCE_EXHAUSTED
pub const GRPC_STATUS_RESOURCE_EXHAUSTED: u16 = 8;

/// Wire protocol of a request, as far as denial rendering cares
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WireProtocol {
	Http,
	Grpc,
}

impl WireProtocol {
	/// Detect gRPC by its `application/grpc[+proto|+json...]` content type
	pub fn from_headers(headers: &HeaderMap) -> Self {
		let is_grpc = headers
			.get(header::CONTENT_TYPE)
			.and_then(|v| v.to_str().ok())
			.is_some_and(|ct| ct.starts_with("application/grpc"));
		if is_grpc { WireProtocol::Grpc } else { WireProtocol::Http }
	}

	pub fn of<B>(req: &Request<B>) -> Self {
		Self::from_headers(req.headers())
	}
}

/// Whole seconds to advertise in Retry-After
///
/// Always rounds up, and never below 1, so a client honoring the header does
/// not come back before capacity exists.
pub fn retry_after_secs(retry_after: Duration) -> u64 {
	let secs = retry_after.as_secs().saturating_add(u64::from(retry_after.subsec_nanos() > 0));
	secs.max(1)
}

/// Rate limit error types
#[derive(Debug)]
pub enum RateLimitError {
	/// A matching rule has no capacity left for this client
	RateLimited {
		/// Time until every matching rule would admit the request
		retry_after: Duration,
		/// How to render the denial
		protocol: WireProtocol,
	},
}

impl RateLimitError {
	/// Denial for a request, rendered in the request's own protocol
	pub fn for_request<B>(req: &Request<B>, retry_after: Duration) -> Self {
		RateLimitError::RateLimited { retry_after, protocol: WireProtocol::of(req) }
	}
}

impl fmt::Display for RateLimitError {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			RateLimitError::RateLimited { retry_after, .. } => {
				write!(f, "{}, retry after {:?}", RATE_LIMIT_MESSAGE, retry_after)
			}
		}
	}
}

impl std::error::Error for RateLimitError {}

impl IntoResponse for RateLimitError {
	fn into_response(self) -> Response {
		match self {
			RateLimitError::RateLimited { retry_after, protocol } => {
				let retry_after = HeaderValue::from(retry_after_secs(retry_after));

				match protocol {
					WireProtocol::Http => (
						StatusCode::TOO_MANY_REQUESTS,
						[(header::RETRY_AFTER, retry_after)],
						RATE_LIMIT_MESSAGE,
					)
						.into_response(),
					WireProtocol::Grpc => (
						StatusCode::OK,
						[
							(header::CONTENT_TYPE, HeaderValue::from_static("application/grpc")),
							(header::RETRY_AFTER, retry_after),
							(
								HeaderName::from_static("grpc-status"),
								HeaderValue::from(GRPC_STATUS_RESOURCE_EXHAUSTED),
							),
							(
								HeaderName::from_static("grpc-message"),
								HeaderValue::from_static(RATE_LIMIT_MESSAGE),
							),
						],
					)
						.into_response(),
				}
			}
		}
	}
}

/// Render the denial for a rate limited request
pub fn rate_limit_response<B>(req: &Request<B>, retry_after: Duration) -> Response {
	RateLimitError::for_request(req, retry_after).into_response()
}


// vim: ts=4
