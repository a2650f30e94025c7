//! Token Bucket
//!
//! Continuous-refill token bucket with cancellable reservations. Refill is lazy:
//! tokens are credited for the elapsed time whenever a reservation is made,
//! never by a timer.
//!
//! A reservation debits the bucket up front and reports how long the caller
//! would have to wait for that debit to be paid back by refill. The caller
//! either keeps the debit (admitted) or hands the reservation back to
//! `cancel`, which credits the same amount against the bucket's current state.
//! Buckets are not synchronized; the owning limiter serializes access.

use std::time::{Duration, Instant};

/// Advised wait when a bucket can never refill (zero-length window).
///
/// Arbitrary: there is no rate to derive a wait from, so denials still carry
/// a sane Retry-After.
pub const NO_REFILL_RETRY_AFTER: Duration = Duration::from_secs(1);

/// Outcome of a provisional debit against a token bucket
///
/// Not `Clone`: `TokenBucket::cancel` takes it by value, so a reservation can
/// be cancelled at most once.
#[derive(Debug, PartialEq)]
pub struct Reservation {
	ok: bool,
	delay: Duration,
	debit: f64,
}

impl Reservation {
	/// False when the bucket can never satisfy the request by waiting
	pub fn ok(&self) -> bool {
		self.ok
	}

	/// Time until the debited token is earned back (zero if it was available)
	pub fn delay(&self) -> Duration {
		self.delay
	}

	/// Tokens taken from the bucket by this reservation
	pub fn debit(&self) -> f64 {
		self.debit
	}

	/// Whether the request can proceed right now
	pub fn admits(&self) -> bool {
		self.ok && self.delay.is_zero()
	}

	/// Advised wait for a reservation that does not admit
	pub fn retry_after(&self) -> Duration {
		if self.ok { self.delay } else { NO_REFILL_RETRY_AFTER }
	}
}

/// Convert a token deficit into the time needed to refill it, rounded up to
/// the next nanosecond so waiting the full delay always pays the debt.
fn duration_from_tokens(tokens: f64, rate_per_second: f64) -> Duration {
	let nanos = (tokens / rate_per_second * 1e9).ceil();
	if nanos >= u64::MAX as f64 {
		Duration::MAX
	} else {
		Duration::from_nanos(nanos.max(0.0) as u64)
	}
}

#[derive(Debug, Clone)]
pub struct TokenBucket {
	rate_per_second: f64,
	burst: f64,
	tokens: f64,
	last_update: Instant,
}

impl TokenBucket {
	/// Create a full bucket
	pub fn new(rate_per_second: f64, burst: u32, now: Instant) -> Self {
		let burst = f64::from(burst);
		Self { rate_per_second, burst, tokens: burst, last_update: now }
	}

	fn refills(&self) -> bool {
		self.rate_per_second > 0.0
	}

	/// Credit tokens earned since the last update, clamped to the burst size
	fn advance(&mut self, now: Instant) {
		if now <= self.last_update {
			return;
		}
		if self.refills() {
			let elapsed = now.duration_since(self.last_update).as_secs_f64();
			self.tokens = (self.tokens + elapsed * self.rate_per_second).min(self.burst);
		}
		self.last_update = now;
	}

	/// Provisionally take one token
	pub fn reserve(&mut self, now: Instant) -> Reservation {
		self.advance(now);

		if !self.refills() {
			// Without refill a debt can never be paid: admit while the burst
			// lasts, then refuse outright without touching the bucket.
			if self.tokens >= 1.0 {
				self.tokens -= 1.0;
				return Reservation { ok: true, delay: Duration::ZERO, debit: 1.0 };
			}
			return Reservation { ok: false, delay: NO_REFILL_RETRY_AFTER, debit: 0.0 };
		}

		self.tokens -= 1.0;
		let delay = if self.tokens < 0.0 {
			duration_from_tokens(-self.tokens, self.rate_per_second)
		} else {
			Duration::ZERO
		};

		Reservation { ok: true, delay, debit: 1.0 }
	}

	/// Give back a reservation's debit
	///
	/// Applied to the current token count, not a snapshot, so reservations
	/// made after this one keep their debits.
	pub fn cancel(&mut self, reservation: Reservation) {
		self.tokens = (self.tokens + reservation.debit).min(self.burst);
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_new_bucket_is_full() {
		let now = Instant::now();
		let bucket = TokenBucket::new(10.0, 5, now);
		assert!((bucket.tokens - 5.0).abs() < f64::EPSILON);
	}

	#[test]
	fn test_reserve_until_empty() {
		let now = Instant::now();
		let mut bucket = TokenBucket::new(2.0, 3, now);

		for _ in 0..3 {
			let reservation = bucket.reserve(now);
			assert!(reservation.admits());
			assert_eq!(reservation.delay(), Duration::ZERO);
		}

		let reservation = bucket.reserve(now);
		assert!(reservation.ok());
		assert!(!reservation.admits());
		assert_eq!(reservation.delay(), Duration::from_millis(500));
	}

	#[test]
	fn test_cancel_restores_debit() {
		let now = Instant::now();
		let mut bucket = TokenBucket::new(1.0, 1, now);

		let first = bucket.reserve(now);
		assert!(first.admits());
		let second = bucket.reserve(now);
		assert!(!second.admits());
		assert!((bucket.tokens + 1.0).abs() < f64::EPSILON);

		bucket.cancel(second);
		assert!(bucket.tokens.abs() < f64::EPSILON);
	}

	#[test]
	fn test_cancel_applies_to_current_state() {
		let now = Instant::now();
		let mut bucket = TokenBucket::new(1.0, 4, now);

		let a = bucket.reserve(now);
		let b = bucket.reserve(now);
		assert!((bucket.tokens - 2.0).abs() < f64::EPSILON);

		// Cancelling the earlier reservation leaves the later debit in place
		bucket.cancel(a);
		assert!((bucket.tokens - 3.0).abs() < f64::EPSILON);
		bucket.cancel(b);
		assert!((bucket.tokens - 4.0).abs() < f64::EPSILON);
	}

	#[test]
	fn test_cancel_never_exceeds_burst() {
		let now = Instant::now();
		let mut bucket = TokenBucket::new(10.0, 2, now);

		let reservation = bucket.reserve(now);
		// A long pause refills to the cap before the cancel lands
		let _ = bucket.reserve(now + Duration::from_secs(10));
		bucket.cancel(reservation);
		assert!(bucket.tokens <= bucket.burst);
	}

	#[test]
	fn test_refill_after_delay() {
		let now = Instant::now();
		let mut bucket = TokenBucket::new(10.0, 1, now);

		assert!(bucket.reserve(now).admits());
		let denied = bucket.reserve(now);
		assert!(!denied.admits());
		let wait = denied.delay();
		bucket.cancel(denied);

		assert!(bucket.reserve(now + wait).admits());
	}

	#[test]
	fn test_refill_is_clamped_to_burst() {
		let now = Instant::now();
		let mut bucket = TokenBucket::new(100.0, 3, now);

		assert!(bucket.reserve(now).admits());
		assert!(bucket.reserve(now + Duration::from_secs(60)).admits());
		assert!((bucket.tokens - 2.0).abs() < f64::EPSILON);
	}

	#[test]
	fn test_zero_rate_drains_burst_then_refuses() {
		let now = Instant::now();
		let mut bucket = TokenBucket::new(0.0, 2, now);

		assert!(bucket.reserve(now).admits());
		assert!(bucket.reserve(now).admits());

		let later = now + Duration::from_secs(3600);
		let refused = bucket.reserve(later);
		assert!(!refused.ok());
		assert_eq!(refused.retry_after(), NO_REFILL_RETRY_AFTER);
		assert!(refused.debit().abs() < f64::EPSILON);
		assert!(bucket.tokens.abs() < f64::EPSILON);
	}

	#[test]
	fn test_earlier_instant_does_not_refill() {
		let now = Instant::now() + Duration::from_secs(1);
		let mut bucket = TokenBucket::new(1.0, 1, now);

		assert!(bucket.reserve(now).admits());
		let earlier = now.checked_sub(Duration::from_secs(1)).unwrap_or(now);
		assert!(!bucket.reserve(earlier).admits());
	}
}

// vim: ts=4
