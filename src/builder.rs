use std::path::PathBuf;

use crate::cache::Cache;
use crate::disk::{DEFAULT_SHARD_BITS, DiskCache};
use crate::error::Result;
use crate::memory::MemoryCache;
use crate::traits::{CacheKey, CacheValue};

/// Number of entries kept in memory unless configured otherwise.
pub const DEFAULT_MEMORY_CAPACITY: usize = 100;

/// Builder for configuring a [`Cache`].
///
/// # Example
///
/// ```no_run
/// use tiered_cache::{Cache, CacheBuilder};
///
/// let cache: Cache<String, Vec<u8>> = CacheBuilder::new("/var/cache/thumbnails")
///     .memory_capacity(500)
///     .track_misses(true)
///     .build()?;
/// # Ok::<(), tiered_cache::Error>(())
/// ```
#[derive(Debug, Clone)]
pub struct CacheBuilder {
	dir: PathBuf,
	memory_capacity: usize,
	track_misses: bool,
	shard_bits: u32,
}

impl CacheBuilder {
	/// Start configuring a cache stored in `dir`. The directory is created
	/// on [`build`](Self::build) if it does not exist.
	pub fn new(dir: impl Into<PathBuf>) -> Self {
		Self {
			dir: dir.into(),
			memory_capacity: DEFAULT_MEMORY_CAPACITY,
			track_misses: false,
			shard_bits: DEFAULT_SHARD_BITS,
		}
	}

	/// Set the number of entries held in memory.
	///
	/// Default: 100
	pub fn memory_capacity(mut self, capacity: usize) -> Self {
		assert!(capacity > 0, "memory_capacity must be at least 1");
		self.memory_capacity = capacity;
		self
	}

	/// Record how many keys of each `get` missed the memory tier.
	///
	/// Off by default, in which case
	/// [`last_miss_count`](Cache::last_miss_count) always reads zero.
	pub fn track_misses(mut self, enabled: bool) -> Self {
		self.track_misses = enabled;
		self
	}

	/// Set how many bits of the key digest name a shard file.
	///
	/// Fewer bits mean fewer, larger shard files shared by more keys.
	///
	/// Default: 32
	pub fn shard_bits(mut self, bits: u32) -> Self {
		assert!(bits <= 64, "shard_bits must be at most 64");
		self.shard_bits = bits;
		self
	}

	/// Open the disk tier and build the cache.
	///
	/// Fails if the directory cannot be created or its index cannot be
	/// written.
	pub fn build<K: CacheKey, V: CacheValue>(self) -> Result<Cache<K, V>> {
		let disk = DiskCache::open_with_shard_bits(self.dir, self.shard_bits)?;
		let memory = MemoryCache::new(self.memory_capacity);
		Ok(Cache::from_tiers(memory, disk, self.track_misses))
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_builder_defaults() {
		let dir = tempfile::tempdir().unwrap();
		let cache: Cache<String, String> = CacheBuilder::new(dir.path()).build().unwrap();

		assert!(cache.is_empty());
		assert_eq!(cache.memory_capacity(), DEFAULT_MEMORY_CAPACITY);
		assert_eq!(cache.disk().shard_bits(), DEFAULT_SHARD_BITS);
		assert_eq!(cache.disk().dir(), dir.path());
	}

	#[test]
	fn test_builder_settings() {
		let dir = tempfile::tempdir().unwrap();
		let cache: Cache<u32, u32> = CacheBuilder::new(dir.path())
			.memory_capacity(7)
			.shard_bits(4)
			.track_misses(true)
			.build()
			.unwrap();

		assert_eq!(cache.memory_capacity(), 7);
		assert_eq!(cache.disk().shard_bits(), 4);
	}

	#[test]
	#[should_panic(expected = "memory_capacity must be at least 1")]
	fn test_builder_rejects_zero_capacity() {
		CacheBuilder::new("unused").memory_capacity(0);
	}

	#[test]
	#[should_panic(expected = "shard_bits must be at most 64")]
	fn test_builder_rejects_wide_shards() {
		CacheBuilder::new("unused").shard_bits(65);
	}

	#[cfg(unix)]
	#[test]
	fn test_builder_fails_on_uncreatable_directory() {
		let dir = tempfile::tempdir().unwrap();
		let blocker = dir.path().join("file");
		std::fs::write(&blocker, b"").unwrap();

		let result = CacheBuilder::new(blocker.join("cache")).build::<u8, u8>();
		assert!(result.is_err());
	}
}
