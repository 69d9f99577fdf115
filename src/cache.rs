use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};

use tracing::trace;

use crate::builder::CacheBuilder;
use crate::disk::DiskCache;
use crate::error::Result;
use crate::memory::MemoryCache;
use crate::metrics::{CacheMetrics, Counters};
use crate::traits::{CacheKey, CacheStore, CacheValue};

/// Two-tier cache: a bounded in-memory LRU in front of a persistent
/// on-disk store.
///
/// Reads check memory first and fall back to disk; disk hits are promoted
/// into memory. Writes go to memory, then to disk. Memory always holds a
/// subset of what is on disk, and [`len`](Self::len) reports the disk count.
///
/// Thread-safe; share it across threads via `Arc<Cache<K, V>>`.
///
/// # Consistency
///
/// Each tier serializes its own operations, but no lock spans both tiers. A
/// `get` racing a `put` for the same key may see the new value in memory
/// before it reaches disk, or the reverse. A disk write failure after a
/// successful memory write leaves the tiers disagreeing until the key is
/// written again; `get` then serves the memory copy while `all` and `len`
/// reflect the disk. Callers needing read-after-write across tiers must
/// serialize above the cache.
pub struct Cache<K, V> {
	memory: MemoryCache<K, V>,
	disk: DiskCache<K, V>,
	track_misses: bool,
	last_miss_count: AtomicUsize,
	counters: Counters,
}

impl<K: CacheKey, V: CacheValue> Cache<K, V> {
	/// Open a cache in `dir` with the default settings.
	pub fn open(dir: impl Into<PathBuf>) -> Result<Self> {
		CacheBuilder::new(dir).build()
	}

	/// Open a cache in `dir` keeping up to `capacity` entries in memory.
	pub fn with_capacity(dir: impl Into<PathBuf>, capacity: usize) -> Result<Self> {
		CacheBuilder::new(dir).memory_capacity(capacity).build()
	}

	/// Start configuring a cache stored in `dir`.
	pub fn builder(dir: impl Into<PathBuf>) -> CacheBuilder {
		CacheBuilder::new(dir)
	}

	pub(crate) fn from_tiers(memory: MemoryCache<K, V>, disk: DiskCache<K, V>, track_misses: bool) -> Self {
		Self {
			memory,
			disk,
			track_misses,
			last_miss_count: AtomicUsize::new(0),
			counters: Counters::default(),
		}
	}

	/// Look up several keys, memory first, then disk.
	///
	/// Keys found only on disk are inserted into memory before returning.
	/// Keys found in neither tier are omitted.
	pub fn get<'a, I>(&self, keys: I) -> HashMap<K, V>
	where
		I: IntoIterator<Item = &'a K>,
		K: 'a,
	{
		self.last_miss_count.store(0, Ordering::Relaxed);

		let requested: HashSet<&K> = keys.into_iter().collect();
		let mut found = self.memory.get(requested.iter().copied());
		let missed: Vec<&K> = requested.into_iter().filter(|key| !found.contains_key(*key)).collect();

		Counters::add(&self.counters.memory_hits, found.len());
		if self.track_misses {
			self.last_miss_count.store(missed.len(), Ordering::Relaxed);
		}
		if missed.is_empty() {
			return found;
		}

		let from_disk = self.disk.get(missed.iter().copied());
		Counters::add(&self.counters.disk_hits, from_disk.len());
		Counters::add(&self.counters.misses, missed.len() - from_disk.len());

		for (key, value) in &from_disk {
			self.memory.put(key.clone(), value.clone());
		}
		Counters::add(&self.counters.promotions, from_disk.len());
		if !from_disk.is_empty() {
			trace!(count = from_disk.len(), "promoted disk hits into memory");
		}

		found.extend(from_disk);
		found
	}

	/// Every entry on disk.
	///
	/// Reads straight from the disk tier without consulting or filling the
	/// memory tier, and resets [`last_miss_count`](Self::last_miss_count) to
	/// zero even though no key was served from memory.
	pub fn all(&self) -> HashMap<K, V> {
		self.last_miss_count.store(0, Ordering::Relaxed);
		self.disk.all()
	}

	/// Write-through insert: memory first, then disk.
	///
	/// A disk failure is logged and counted; the memory copy stays.
	pub fn put(&self, key: K, value: V) -> &Self {
		self.memory.put(key.clone(), value.clone());
		self.disk.put(key, value);
		self
	}

	/// Remove keys from both tiers. Disk failures are best-effort; see
	/// [`DiskCache::try_remove`].
	pub fn remove<'a, I>(&self, keys: I) -> &Self
	where
		I: IntoIterator<Item = &'a K>,
		K: 'a,
	{
		let keys: Vec<&K> = keys.into_iter().collect();
		self.memory.remove(keys.iter().copied());
		self.disk.remove(keys);
		self
	}

	/// Remove every entry from both tiers.
	pub fn clear(&self) -> &Self {
		self.memory.clear();
		self.disk.clear();
		self
	}

	/// Number of entries on disk.
	pub fn len(&self) -> usize {
		self.disk.len()
	}

	pub fn is_empty(&self) -> bool {
		self.len() == 0
	}

	/// Keys of the most recent `get` that were not served from memory.
	///
	/// Always zero unless miss tracking is enabled, and zero after `all`.
	pub fn last_miss_count(&self) -> usize {
		self.last_miss_count.load(Ordering::Relaxed)
	}

	pub fn memory_capacity(&self) -> usize {
		self.memory.capacity()
	}

	/// Change the memory capacity. A smaller capacity takes effect on the
	/// next insert into memory.
	pub fn set_memory_capacity(&self, capacity: usize) {
		self.memory.set_capacity(capacity);
	}

	/// The memory tier, for inspection.
	pub fn memory(&self) -> &MemoryCache<K, V> {
		&self.memory
	}

	/// The disk tier, for inspection.
	pub fn disk(&self) -> &DiskCache<K, V> {
		&self.disk
	}

	pub fn metrics(&self) -> CacheMetrics {
		CacheMetrics {
			memory_hits: Counters::load(&self.counters.memory_hits),
			disk_hits: Counters::load(&self.counters.disk_hits),
			misses: Counters::load(&self.counters.misses),
			promotions: Counters::load(&self.counters.promotions),
			evictions: self.memory.evictions(),
			disk_write_failures: self.disk.write_failures(),
			memory_entries: self.memory.len(),
			memory_capacity: self.memory.capacity(),
			disk_entries: self.disk.len(),
		}
	}
}

impl<K: CacheKey, V: CacheValue> CacheStore<K, V> for Cache<K, V> {
	fn get<'a, I>(&self, keys: I) -> HashMap<K, V>
	where
		I: IntoIterator<Item = &'a K>,
		K: 'a,
	{
		Cache::get(self, keys)
	}

	fn put(&self, key: K, value: V) -> &Self {
		Cache::put(self, key, value)
	}

	fn remove<'a, I>(&self, keys: I) -> &Self
	where
		I: IntoIterator<Item = &'a K>,
		K: 'a,
	{
		Cache::remove(self, keys)
	}

	fn clear(&self) -> &Self {
		Cache::clear(self)
	}

	fn all(&self) -> HashMap<K, V> {
		Cache::all(self)
	}

	fn len(&self) -> usize {
		Cache::len(self)
	}
}
