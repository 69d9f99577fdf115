use std::collections::HashMap;
use std::hash::Hash;

use serde::Serialize;
use serde::de::DeserializeOwned;

/// Bound for cache keys.
///
/// Equality and hashing drive in-memory lookups. The serialized form picks
/// the disk shard, so it must be deterministic for equal keys.
///
/// Implemented automatically for every qualifying type.
///
/// # Example
///
/// ```
/// use serde::{Deserialize, Serialize};
/// use tiered_cache::CacheKey;
///
/// #[derive(Hash, Eq, PartialEq, Clone, Serialize, Deserialize)]
/// struct UserId(u64);
///
/// fn assert_key<K: CacheKey>() {}
/// assert_key::<UserId>();
/// ```
pub trait CacheKey: Hash + Eq + Clone + Serialize + DeserializeOwned + Send + Sync + 'static {}

impl<T> CacheKey for T where T: Hash + Eq + Clone + Serialize + DeserializeOwned + Send + Sync + 'static
{}

/// Bound for cached values. Values are cloned out of the cache on reads.
pub trait CacheValue: Clone + Serialize + DeserializeOwned + Send + Sync + 'static {}

impl<T> CacheValue for T where T: Clone + Serialize + DeserializeOwned + Send + Sync + 'static {}

/// The contract shared by the memory tier, the disk tier and the tiered
/// cache that composes them.
///
/// Mutations return the store itself so calls can be chained:
///
/// ```ignore
/// store.put(a, 1).put(b, 2).remove([&a]);
/// ```
pub trait CacheStore<K, V> {
	/// Look up several keys at once. Absent keys are omitted from the result.
	fn get<'a, I>(&self, keys: I) -> HashMap<K, V>
	where
		I: IntoIterator<Item = &'a K>,
		K: 'a;

	/// Insert or overwrite one entry.
	fn put(&self, key: K, value: V) -> &Self;

	/// Remove several keys. Keys that are not present are ignored.
	fn remove<'a, I>(&self, keys: I) -> &Self
	where
		I: IntoIterator<Item = &'a K>,
		K: 'a;

	/// Remove every entry.
	fn clear(&self) -> &Self;

	/// Snapshot of every entry held by the store.
	fn all(&self) -> HashMap<K, V>;

	/// Number of entries held by the store.
	fn len(&self) -> usize;

	/// Whether the store holds no entries.
	fn is_empty(&self) -> bool {
		self.len() == 0
	}
}
