//! Rate Limiter
//!
//! Per-client, multi-rule token bucket limiting with LRU-bounded state.
//!
//! Every rule matching a request path reserves from the client's bucket for
//! that rule's pattern. A request is admitted only if all of them admit it. Reservations are taken on
//! every matching bucket first and then either all kept or all cancelled, so a
//! client is billed against a rule if and only if the request as a whole went
//! through.

use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::http::Request;
use parking_lot::Mutex;
use tollgate_types::config::RateLimiterConfig;

use super::bucket::{Reservation, TokenBucket};
use super::cache::{BucketCache, BucketKey};
use super::metrics::RateLimitMetrics;
use super::rule::RateRule;
use crate::prelude::*;

/// Per-service rate limiter
///
/// One coarse lock covers rule matching, cache access and every reservation
/// of an `allow` call, which keeps the collect-then-commit-or-cancel step
/// atomic. Nothing under the lock blocks or does I/O.
pub struct RateLimiter {
	/// Service name, used as metrics label
	service: Box<str>,
	/// Rules, evaluated in order; read-only after construction
	rules: Vec<RateRule>,
	buckets: Mutex<BucketCache>,
	metrics: Arc<dyn RateLimitMetrics>,
}

impl RateLimiter {
	/// Create a limiter from compiled rules
	pub fn new(
		service: impl Into<Box<str>>,
		rules: Vec<RateRule>,
		max_cache_size: usize,
		metrics: Arc<dyn RateLimitMetrics>,
	) -> Self {
		let service = service.into();
		let buckets = BucketCache::new(max_cache_size);
		info!(
			"Rate limiter for {}: {} rule(s), cache capacity {}",
			service,
			rules.len(),
			buckets.capacity()
		);

		Self { service, rules, buckets: Mutex::new(buckets), metrics }
	}

	/// Compile a limiter configuration
	pub fn from_config(
		service: impl Into<Box<str>>,
		config: &RateLimiterConfig,
		metrics: Arc<dyn RateLimitMetrics>,
	) -> TgResult<Self> {
		let rules = config.rules.iter().map(RateRule::compile).collect::<TgResult<Vec<_>>>()?;
		Ok(Self::new(service, rules, config.max_cache_size, metrics))
	}

	/// Check whether a request may proceed
	///
	/// Returns `(allowed, retry_after)`; `retry_after` is zero when allowed.
	pub fn allow<B>(&self, req: &Request<B>, client_key: &str) -> (bool, Duration) {
		self.allow_path_at(req.uri().path(), client_key, Instant::now())
	}

	/// `allow` against an explicit path and clock reading
	pub fn allow_path_at(&self, path: &str, client_key: &str, now: Instant) -> (bool, Duration) {
		let mut buckets = self.buckets.lock();

		// Reserve on every matching rule before deciding anything, so a denial
		// by any rule can still roll back all of them.
		let mut reservations: Vec<(&RateRule, BucketKey, Reservation)> =
			Vec::with_capacity(self.rules.len());
		for rule in self.rules.iter().filter(|rule| rule.matches(path)) {
			let key = BucketKey::new(client_key, rule.pattern());
			let reservation = self.reserve(&mut buckets, &key, rule, now);
			reservations.push((rule, key, reservation));
		}

		if reservations.is_empty() {
			return (true, Duration::ZERO);
		}

		// The client must wait until the slowest rule would admit it
		let retry_after = reservations
			.iter()
			.filter(|(_, _, reservation)| !reservation.admits())
			.map(|(_, _, reservation)| reservation.retry_after())
			.max();

		if let Some(retry_after) = retry_after {
			for (rule, key, reservation) in reservations {
				// A bucket inserted earlier in this call may already have been
				// evicted; a fresh one starts full, so there is nothing to undo.
				if let Some(bucket) = buckets.peek(&key) {
					bucket.cancel(reservation);
				}
				self.metrics.record_denied(&self.service, rule.pattern());
			}
			debug!(
				"Rate limited {} on {} ({}), retry after {:?}",
				client_key, path, self.service, retry_after
			);
			return (false, retry_after);
		}

		for (rule, _, _) in &reservations {
			self.metrics.record_allowed(&self.service, rule.pattern());
		}
		(true, Duration::ZERO)
	}

	/// Reserve a token in a client's bucket for a rule, creating a full bucket
	/// on first use
	fn reserve(
		&self,
		buckets: &mut BucketCache,
		key: &BucketKey,
		rule: &RateRule,
		now: Instant,
	) -> Reservation {
		if let Some(bucket) = buckets.get(key) {
			return bucket.reserve(now);
		}

		let mut bucket = TokenBucket::new(rule.rate_per_second(), rule.burst(), now);
		let reservation = bucket.reserve(now);

		if buckets.put(key.clone(), bucket) {
			debug!("Rate limiter cache for {} full, evicted least recently used", self.service);
			self.metrics.record_eviction(&self.service);
		}
		self.metrics.set_cache_size(&self.service, buckets.len());

		reservation
	}

	/// Current number of buckets held
	pub fn size(&self) -> usize {
		self.buckets.lock().len()
	}

	pub fn service_name(&self) -> &str {
		&self.service
	}

	pub fn rules(&self) -> &[RateRule] {
		&self.rules
	}
}


// vim: ts=4
