//! Bounded Bucket Cache
//!
//! LRU map from (client, rule pattern) to token bucket with a hard entry ceiling.
//! Entries have no TTL; idle clients age out only when new ones push them past
//! the least-recently-used end.

use std::hash::{Hash, Hasher};
use std::num::NonZeroUsize;
use std::sync::Arc;

use lru::LruCache;
use tollgate_types::config::DEFAULT_MAX_CACHE_SIZE;

use super::bucket::TokenBucket;

/// Cache key: one bucket per client per rule pattern
///
/// `pattern` is the owning rule's pattern handle, not a copy of its text, so a
/// million clients under one rule share a single pattern allocation. Keys
/// compare the pattern by text: rules with the same pattern share a bucket.
#[derive(Debug, Clone)]
pub struct BucketKey {
	client_key: Box<str>,
	pattern: Arc<str>,
}

impl BucketKey {
	pub fn new(client_key: &str, pattern: &Arc<str>) -> Self {
		Self { client_key: client_key.into(), pattern: Arc::clone(pattern) }
	}
}

impl PartialEq for BucketKey {
	fn eq(&self, other: &Self) -> bool {
		self.client_key == other.client_key && *self.pattern == *other.pattern
	}
}

impl Eq for BucketKey {}

impl Hash for BucketKey {
	fn hash<H: Hasher>(&self, state: &mut H) {
		self.client_key.hash(state);
		self.pattern.hash(state);
	}
}

/// LRU-bounded bucket storage
pub struct BucketCache {
	entries: LruCache<BucketKey, TokenBucket>,
}

impl BucketCache {
	/// Create a cache holding at most `capacity` buckets (0 falls back to the default)
	pub fn new(capacity: usize) -> Self {
		let capacity = NonZeroUsize::new(capacity)
			.or(NonZeroUsize::new(DEFAULT_MAX_CACHE_SIZE))
			.unwrap_or(NonZeroUsize::MIN);

		Self { entries: LruCache::new(capacity) }
	}

	/// Look up a bucket, marking it most recently used
	pub fn get(&mut self, key: &BucketKey) -> Option<&mut TokenBucket> {
		self.entries.get_mut(key)
	}

	/// Look up a bucket without touching its recency
	pub fn peek(&mut self, key: &BucketKey) -> Option<&mut TokenBucket> {
		self.entries.peek_mut(key)
	}

	/// Insert a bucket as most recently used
	///
	/// Returns true if the least recently used entry was evicted to make room.
	pub fn put(&mut self, key: BucketKey, bucket: TokenBucket) -> bool {
		let evicts = self.entries.len() == self.entries.cap().get() && !self.entries.contains(&key);
		self.entries.put(key, bucket);
		evicts
	}

	pub fn len(&self) -> usize {
		self.entries.len()
	}

	pub fn is_empty(&self) -> bool {
		self.entries.is_empty()
	}

	pub fn capacity(&self) -> usize {
		self.entries.cap().get()
	}
}


// vim: ts=4
