//! Rate limiter metrics
//!
//! The limiter reports through an injected `RateLimitMetrics` sink rather than
//! process-wide statics, so each limiter (and each test) can own its view.

use prometheus_client::encoding::{text::encode, EncodeLabelSet};
use prometheus_client::metrics::counter::Counter;
use prometheus_client::metrics::family::Family;
use prometheus_client::metrics::gauge::Gauge;
use prometheus_client::registry::Registry;

use crate::prelude::*;

/// Sink for rate limiter observations
pub trait RateLimitMetrics: Send + Sync {
	/// A request passed the rule with this pattern
	fn record_allowed(&self, service: &str, path_pattern: &str);

	/// A request was denied while this rule matched (counted for every matched rule)
	fn record_denied(&self, service: &str, path_pattern: &str);

	/// Current number of buckets held for a service
	fn set_cache_size(&self, service: &str, size: usize);

	/// A bucket was evicted to make room for a new one
	fn record_eviction(&self, service: &str);
}

/// Discards every observation
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopMetrics;

impl RateLimitMetrics for NoopMetrics {
	fn record_allowed(&self, _service: &str, _path_pattern: &str) {}
	fn record_denied(&self, _service: &str, _path_pattern: &str) {}
	fn set_cache_size(&self, _service: &str, _size: usize) {}
	fn record_eviction(&self, _service: &str) {}
}

#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct RuleLabels {
	pub service: String,
	pub path_pattern: String,
}

#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct ServiceLabels {
	pub service: String,
}

/// Prometheus-backed metrics
pub struct PrometheusMetrics {
	registry: Registry,
	allowed: Family<RuleLabels, Counter>,
	denied: Family<RuleLabels, Counter>,
	cache_size: Family<ServiceLabels, Gauge>,
	evictions: Family<ServiceLabels, Counter>,
}

impl PrometheusMetrics {
	pub fn new() -> Self {
		let mut registry = Registry::with_prefix("tollgate_ratelimit");

		let allowed = Family::<RuleLabels, Counter>::default();
		registry.register(
			"allowed",
			"Total number of requests allowed by rate limiter",
			allowed.clone(),
		);

		let denied = Family::<RuleLabels, Counter>::default();
		registry.register(
			"denied",
			"Total number of requests denied by rate limiter",
			denied.clone(),
		);

		let cache_size = Family::<ServiceLabels, Gauge>::default();
		registry.register(
			"cache_size",
			"Current number of entries in the rate limiter cache",
			cache_size.clone(),
		);

		let evictions = Family::<ServiceLabels, Counter>::default();
		registry.register(
			"evictions",
			"Total number of rate limiter cache evictions",
			evictions.clone(),
		);

		Self { registry, allowed, denied, cache_size, evictions }
	}

	/// Render all metrics in the Prometheus text exposition format
	pub fn encode(&self) -> TgResult<String> {
		let mut buffer = String::new();
		encode(&mut buffer, &self.registry)
			.map_err(|e| Error::Internal(format!("failed to encode metrics: {}", e)))?;
		Ok(buffer)
	}

	fn rule_labels(service: &str, path_pattern: &str) -> RuleLabels {
		RuleLabels { service: service.to_string(), path_pattern: path_pattern.to_string() }
	}

	fn service_labels(service: &str) -> ServiceLabels {
		ServiceLabels { service: service.to_string() }
	}
}

impl Default for PrometheusMetrics {
	fn default() -> Self {
		Self::new()
	}
}

impl RateLimitMetrics for PrometheusMetrics {
	fn record_allowed(&self, service: &str, path_pattern: &str) {
		self.allowed.get_or_create(&Self::rule_labels(service, path_pattern)).inc();
	}

	fn record_denied(&self, service: &str, path_pattern: &str) {
		self.denied.get_or_create(&Self::rule_labels(service, path_pattern)).inc();
	}

	fn set_cache_size(&self, service: &str, size: usize) {
		let size = i64::try_from(size).unwrap_or(i64::MAX);
		self.cache_size.get_or_create(&Self::service_labels(service)).set(size);
	}

	fn record_eviction(&self, service: &str) {
		self.evictions.get_or_create(&Self::service_labels(service)).inc();
	}
}


// vim: ts=4
