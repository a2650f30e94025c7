//! Rate Limiting System
//!
//! Multi-rule, per-client token bucket rate limiting for proxied services.
//! Clients are keyed by L402 token ID once authenticated, otherwise by their
//! anonymized network (IPv4 /24, IPv6 /48). Bucket state is held in an LRU
//! cache of bounded size.

mod bucket;
mod cache;
mod error;
mod key;
pub mod l402;
mod limiter;
mod metrics;
mod middleware;
mod rule;

pub use bucket::{Reservation, TokenBucket, NO_REFILL_RETRY_AFTER};
pub use cache::{BucketCache, BucketKey};
pub use error::{
	rate_limit_response, retry_after_secs, RateLimitError, WireProtocol,
	GRPC_STATUS_RESOURCE_EXHAUSTED, RATE_LIMIT_MESSAGE,
};
pub use key::{extract_client_ip, resolve_key, IpSource};
pub use limiter::RateLimiter;
pub use metrics::{NoopMetrics, PrometheusMetrics, RateLimitMetrics, RuleLabels, ServiceLabels};
pub use middleware::{Authenticated, RateLimitLayer, RateLimitService};
pub use rule::{rate_per_second, RateRule};

// vim: ts=4
