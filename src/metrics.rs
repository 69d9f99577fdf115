//! Cache performance metrics.

use std::sync::atomic::{AtomicU64, Ordering};

/// Snapshot of the tiered cache's counters.
///
/// Counters accumulate for the lifetime of the [`Cache`](crate::Cache); they
/// are separate from the per-call miss count reported by
/// [`last_miss_count`](crate::Cache::last_miss_count).
///
/// # Example
///
/// ```
/// # fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let dir = tempfile::tempdir()?;
/// let cache = tiered_cache::Cache::<String, u32>::open(dir.path())?;
/// cache.put("a".to_string(), 1);
/// cache.get([&"a".to_string(), &"b".to_string()]);
///
/// let metrics = cache.metrics();
/// assert_eq!(metrics.memory_hits, 1);
/// assert_eq!(metrics.misses, 1);
/// println!("Hit rate: {:.2}%", metrics.hit_rate() * 100.0);
/// # Ok(())
/// # }
/// ```
#[non_exhaustive]
#[derive(Debug, Clone, Default)]
pub struct CacheMetrics {
	/// Keys served by the memory tier.
	pub memory_hits: u64,
	/// Keys served by the disk tier after a memory miss.
	pub disk_hits: u64,
	/// Keys found in neither tier.
	pub misses: u64,
	/// Disk hits copied into the memory tier.
	pub promotions: u64,
	/// Entries evicted from the memory tier to respect its capacity.
	pub evictions: u64,
	/// Shard or index writes that failed.
	pub disk_write_failures: u64,
	/// Entries currently held in memory.
	pub memory_entries: usize,
	/// Memory tier capacity.
	pub memory_capacity: usize,
	/// Entries currently indexed on disk.
	pub disk_entries: usize,
}

impl CacheMetrics {
	/// Fraction of looked-up keys found in either tier, between 0.0 and 1.0.
	///
	/// Returns 0.0 if there have been no lookups.
	pub fn hit_rate(&self) -> f64 {
		ratio(self.memory_hits + self.disk_hits, self.total_lookups())
	}

	/// Fraction of looked-up keys served without touching the disk.
	pub fn memory_hit_rate(&self) -> f64 {
		ratio(self.memory_hits, self.total_lookups())
	}

	/// Total keys looked up through `get`.
	pub fn total_lookups(&self) -> u64 {
		self.memory_hits + self.disk_hits + self.misses
	}
}

fn ratio(part: u64, total: u64) -> f64 {
	if total == 0 { 0.0 } else { part as f64 / total as f64 }
}

/// Live counters behind [`CacheMetrics`].
#[derive(Default)]
pub(crate) struct Counters {
	pub memory_hits: AtomicU64,
	pub disk_hits: AtomicU64,
	pub misses: AtomicU64,
	pub promotions: AtomicU64,
}

impl Counters {
	pub fn add(counter: &AtomicU64, n: usize) {
		if n > 0 {
			counter.fetch_add(n as u64, Ordering::Relaxed);
		}
	}

	pub fn load(counter: &AtomicU64) -> u64 {
		counter.load(Ordering::Relaxed)
	}
}
