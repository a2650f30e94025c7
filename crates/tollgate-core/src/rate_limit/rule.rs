//! Rate Rules
//!
//! Compiled, immutable form of a `RateRuleConfig`: path matcher plus the
//! refill rate and burst size its token buckets are created with.

use std::sync::Arc;
use std::time::Duration;

use regex::Regex;
use tollgate_types::config::RateRuleConfig;

use crate::prelude::*;

/// Refill rate in tokens per second for `requests` per `per`
///
/// A zero-length window has no meaningful rate and yields 0 (no refill).
pub fn rate_per_second(requests: u32, per: Duration) -> f64 {
	if per.is_zero() {
		return 0.0;
	}
	f64::from(requests) / per.as_secs_f64()
}

/// A single compiled rate limit rule
#[derive(Debug, Clone)]
pub struct RateRule {
	/// Compiled path matcher; `None` matches every path
	matcher: Option<Regex>,
	/// Pattern text, shared by handle with every bucket key of this rule
	pattern: Arc<str>,
	requests: u32,
	per: Duration,
	burst: u32,
}

impl RateRule {
	/// Compile and validate a rule configuration
	pub fn compile(config: &RateRuleConfig) -> TgResult<Self> {
		if config.requests == 0 {
			return Err(Error::ConfigError("rate rule requests must be at least 1".into()));
		}
		if config.burst == Some(0) {
			return Err(Error::ConfigError("rate rule burst must be at least 1".into()));
		}

		let pattern_text = config.path_regexp.as_deref().unwrap_or_default();
		let matcher = match pattern_text {
			"" => None,
			pattern => Some(Regex::new(pattern)?),
		};

		Ok(Self {
			matcher,
			pattern: Arc::from(pattern_text),
			requests: config.requests,
			per: config.per,
			burst: config.burst.unwrap_or(config.requests),
		})
	}

	/// Whether a request path falls under this rule
	pub fn matches(&self, path: &str) -> bool {
		self.matcher.as_ref().is_none_or(|re| re.is_match(path))
	}

	/// Pattern text ("" for the catch-all rule)
	pub fn pattern(&self) -> &Arc<str> {
		&self.pattern
	}

	pub fn rate_per_second(&self) -> f64 {
		rate_per_second(self.requests, self.per)
	}

	pub fn burst(&self) -> u32 {
		self.burst
	}
}


// vim: ts=4
