//! Rate Limiting Middleware
//!
//! Tower middleware layer applying a `RateLimiter` to Axum routes. It sits
//! behind authentication: requests the authenticator accepted carry the
//! `Authenticated` extension and are keyed by their token ID.

use std::net::{IpAddr, Ipv4Addr};
use std::sync::Arc;
use std::task::{Context, Poll};

use axum::body::Body;
use axum::http::Request;
use axum::response::IntoResponse;
use futures::future::BoxFuture;
use tower::{Layer, Service};

use super::error::RateLimitError;
use super::key::{extract_client_ip, resolve_key, IpSource};
use super::limiter::RateLimiter;
use crate::prelude::*;

/// Request extension marking a verified L402 credential
#[derive(Clone, Copy, Debug, Default)]
pub struct Authenticated;

/// Rate limit middleware layer
#[derive(Clone)]
pub struct RateLimitLayer {
	limiter: Arc<RateLimiter>,
	ip_source: IpSource,
}

impl RateLimitLayer {
	/// Create a new rate limit layer
	pub fn new(limiter: Arc<RateLimiter>, ip_source: IpSource) -> Self {
		Self { limiter, ip_source }
	}
}

impl<S> Layer<S> for RateLimitLayer {
	type Service = RateLimitService<S>;

	fn layer(&self, inner: S) -> Self::Service {
		RateLimitService { inner, limiter: self.limiter.clone(), ip_source: self.ip_source }
	}
}

/// Rate limit middleware service
#[derive(Clone)]
pub struct RateLimitService<S> {
	inner: S,
	limiter: Arc<RateLimiter>,
	ip_source: IpSource,
}

impl<S> Service<Request<Body>> for RateLimitService<S>
where
	S: Service<Request<Body>, Response = axum::response::Response> + Clone + Send + 'static,
	S::Future: Send + 'static,
{
	type Response = S::Response;
	type Error = S::Error;
	type Future = BoxFuture<'static, Result<Self::Response, Self::Error>>;

	fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
		self.inner.poll_ready(cx)
	}

	fn call(&mut self, req: Request<Body>) -> Self::Future {
		let limiter = self.limiter.clone();
		let ip_source = self.ip_source;
		let mut inner = self.inner.clone();

		Box::pin(async move {
			let remote_ip = extract_client_ip(&req, ip_source).unwrap_or_else(|| {
				debug!("No client address for {}, keying as unspecified", req.uri().path());
				IpAddr::V4(Ipv4Addr::UNSPECIFIED)
			});
			let authenticated = req.extensions().get::<Authenticated>().is_some();
			let key = resolve_key(&req, &remote_ip, authenticated);

			let (allowed, retry_after) = limiter.allow(&req, &key);
			if !allowed {
				return Ok(RateLimitError::for_request(&req, retry_after).into_response());
			}

			inner.call(req).await
		})
	}
}

// vim: ts=4
