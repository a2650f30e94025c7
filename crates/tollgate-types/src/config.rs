//! Rate Limit Configuration
//!
//! Serde-facing configuration for per-client rate limiting. Rules are loaded
//! externally (file, flags, environment) and handed to the limiter as an
//! ordered list; the limiter compiles and validates them once.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_with::skip_serializing_none;

use crate::prelude::*;

/// Default maximum number of (client, rule) buckets kept in memory
pub const DEFAULT_MAX_CACHE_SIZE: usize = 10_000;

/// A single rate limit rule
///
/// Allows `requests` per `per` window with a burst capacity of `burst`
/// (defaults to `requests`). A rule without `path_regexp` matches every path.
#[skip_serializing_none]
#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RateRuleConfig {
	/// Regular expression the request path is matched against
	pub path_regexp: Option<String>,
	/// Requests allowed per window
	pub requests: u32,
	/// Window length, e.g. "1s", "1m", "1h"
	#[serde(with = "duration_str")]
	pub per: Duration,
	/// Burst capacity
	pub burst: Option<u32>,
}

impl RateRuleConfig {
	pub fn new(requests: u32, per: Duration) -> Self {
		Self { path_regexp: None, requests, per, burst: None }
	}

	pub fn path_regexp(mut self, pattern: impl Into<String>) -> Self {
		self.path_regexp = Some(pattern.into());
		self
	}

	pub fn burst(mut self, burst: u32) -> Self {
		self.burst = Some(burst);
		self
	}
}

/// Limiter-level configuration
#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RateLimiterConfig {
	/// Maximum number of buckets kept (memory limit)
	#[serde(default = "default_max_cache_size")]
	pub max_cache_size: usize,
	/// Ordered list of rules; every matching rule must admit a request
	#[serde(default)]
	pub rules: Vec<RateRuleConfig>,
}

fn default_max_cache_size() -> usize {
	DEFAULT_MAX_CACHE_SIZE
}

impl Default for RateLimiterConfig {
	fn default() -> Self {
		Self { max_cache_size: DEFAULT_MAX_CACHE_SIZE, rules: Vec::new() }
	}
}

/// Parse a Go-style duration string ("300ms", "1.5s", "1m30s", "2h")
///
/// A bare number is taken as seconds.
pub fn parse_duration(input: &str) -> TgResult<Duration> {
	let input = input.trim();
	if input.is_empty() {
		return Err(Error::ValidationError("empty duration".into()));
	}
	if let Ok(secs) = input.parse::<f64>() {
		return Duration::try_from_secs_f64(secs)
			.map_err(|e| Error::ValidationError(format!("invalid duration {:?}: {}", input, e)));
	}

	let mut total = 0.0f64;
	let mut rest = input;
	while !rest.is_empty() {
		let num_len = rest.find(|c: char| !(c.is_ascii_digit() || c == '.')).unwrap_or(rest.len());
		if num_len == 0 {
			return Err(Error::ValidationError(format!("invalid duration {:?}", input)));
		}
		let value: f64 = rest[..num_len]
			.parse()
			.map_err(|_| Error::ValidationError(format!("invalid duration {:?}", input)))?;
		rest = &rest[num_len..];

		let unit_len = rest.find(|c: char| c.is_ascii_digit() || c == '.').unwrap_or(rest.len());
		let unit_secs = match &rest[..unit_len] {
			"ns" => 1e-9,
			"us" | "µs" => 1e-6,
			"ms" => 1e-3,
			"s" => 1.0,
			"m" => 60.0,
			"h" => 3600.0,
			unit => {
				return Err(Error::ValidationError(format!(
					"unknown unit {:?} in duration {:?}",
					unit, input
				)));
			}
		};
		rest = &rest[unit_len..];
		total += value * unit_secs;
	}

	Duration::try_from_secs_f64(total)
		.map_err(|e| Error::ValidationError(format!("invalid duration {:?}: {}", input, e)))
}

/// Format a duration the way `parse_duration` reads it back
pub fn format_duration(duration: Duration) -> String {
	if duration.subsec_nanos() == 0 {
		format!("{}s", duration.as_secs())
	} else if duration.as_nanos() % 1_000_000 == 0 {
		format!("{}ms", duration.as_millis())
	} else {
		format!("{}ns", duration.as_nanos())
	}
}

mod duration_str {
	use super::{fmt, format_duration, parse_duration, Duration};
	use serde::de::{self, Visitor};
	use serde::{Deserializer, Serializer};

	pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
	where
		S: Serializer,
	{
		serializer.serialize_str(&format_duration(*duration))
	}

	pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
	where
		D: Deserializer<'de>,
	{
		struct DurationVisitor;

		impl Visitor<'_> for DurationVisitor {
			type Value = Duration;

			fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
				formatter.write_str("a duration string like \"1s\" or a number of seconds")
			}

			fn visit_str<E>(self, value: &str) -> Result<Duration, E>
			where
				E: de::Error,
			{
				parse_duration(value).map_err(E::custom)
			}

			fn visit_u64<E>(self, value: u64) -> Result<Duration, E>
			where
				E: de::Error,
			{
				Ok(Duration::from_secs(value))
			}

			fn visit_i64<E>(self, value: i64) -> Result<Duration, E>
			where
				E: de::Error,
			{
				u64::try_from(value)
					.map(Duration::from_secs)
					.map_err(|_| E::custom("duration cannot be negative"))
			}

			fn visit_f64<E>(self, value: f64) -> Result<Duration, E>
			where
				E: de::Error,
			{
				Duration::try_from_secs_f64(value).map_err(E::custom)
			}
		}

		deserializer.deserialize_any(DurationVisitor)
	}
}


// vim: ts=4
