use std::collections::HashMap;
use std::hash::Hash;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;
use tracing::trace;

use crate::lru::LruList;
use crate::traits::CacheStore;

/// Bounded in-memory tier with least-recently-used eviction.
///
/// Every operation runs under one mutex, so operations never interleave.
/// Reads clone values out of the store.
///
/// # Capacity
///
/// The capacity is a number of entries and should be at least 1. It is not
/// validated here: with a capacity of zero the store keeps nothing.
/// Lowering the capacity with [`set_capacity`](Self::set_capacity) is lazy;
/// the next `put` evicts down to the new bound.
pub struct MemoryCache<K, V> {
	list: Mutex<LruList<K, V>>,
	evictions: AtomicU64,
}

impl<K, V> MemoryCache<K, V>
where
	K: Hash + Eq + Clone,
	V: Clone,
{
	pub fn new(capacity: usize) -> Self {
		Self {
			list: Mutex::new(LruList::new(capacity)),
			evictions: AtomicU64::new(0),
		}
	}

	/// Return the present keys and mark each of them most recently used.
	pub fn get<'a, I>(&self, keys: I) -> HashMap<K, V>
	where
		I: IntoIterator<Item = &'a K>,
		K: 'a,
	{
		let mut list = self.list.lock();
		keys.into_iter()
			.filter_map(|key| list.get(key).map(|value| (key.clone(), value.clone())))
			.collect()
	}

	/// Insert at the head of the recency list, evicting from the tail if
	/// the store is full.
	pub fn put(&self, key: K, value: V) -> &Self {
		let evicted = self.list.lock().insert(key, value);
		if !evicted.is_empty() {
			self.evictions.fetch_add(evicted.len() as u64, Ordering::Relaxed);
			trace!(count = evicted.len(), "evicted least recently used entries");
		}
		self
	}

	pub fn remove<'a, I>(&self, keys: I) -> &Self
	where
		I: IntoIterator<Item = &'a K>,
		K: 'a,
	{
		let mut list = self.list.lock();
		for key in keys {
			list.remove(key);
		}
		self
	}

	pub fn clear(&self) -> &Self {
		self.list.lock().clear();
		self
	}

	/// Snapshot of every entry. Does not change the recency order.
	pub fn all(&self) -> HashMap<K, V> {
		self.list.lock().iter().map(|(k, v)| (k.clone(), v.clone())).collect()
	}

	/// Check for a key without marking it used.
	pub fn contains(&self, key: &K) -> bool {
		self.list.lock().contains(key)
	}

	pub fn len(&self) -> usize {
		self.list.lock().len()
	}

	pub fn is_empty(&self) -> bool {
		self.len() == 0
	}

	pub fn capacity(&self) -> usize {
		self.list.lock().capacity()
	}

	pub fn set_capacity(&self, capacity: usize) {
		self.list.lock().set_capacity(capacity);
	}

	/// Keys ordered from most to least recently used.
	pub fn keys_by_recency(&self) -> Vec<K> {
		self.list.lock().iter().map(|(k, _)| k.clone()).collect()
	}

	/// Total number of entries evicted to respect the capacity.
	pub fn evictions(&self) -> u64 {
		self.evictions.load(Ordering::Relaxed)
	}
}

impl<K, V> CacheStore<K, V> for MemoryCache<K, V>
where
	K: Hash + Eq + Clone,
	V: Clone,
{
	fn get<'a, I>(&self, keys: I) -> HashMap<K, V>
	where
		I: IntoIterator<Item = &'a K>,
		K: 'a,
	{
		MemoryCache::get(self, keys)
	}

	fn put(&self, key: K, value: V) -> &Self {
		MemoryCache::put(self, key, value)
	}

	fn remove<'a, I>(&self, keys: I) -> &Self
	where
		I: IntoIterator<Item = &'a K>,
		K: 'a,
	{
		MemoryCache::remove(self, keys)
	}

	fn clear(&self) -> &Self {
		MemoryCache::clear(self)
	}

	fn all(&self) -> HashMap<K, V> {
		MemoryCache::all(self)
	}

	fn len(&self) -> usize {
		MemoryCache::len(self)
	}
}
