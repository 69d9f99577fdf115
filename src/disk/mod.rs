//! Directory-backed tier that survives restarts.
//!
//! Layout of a cache directory:
//!
//! ```text
//! index.bin                 key -> shard id, for every stored key
//! 00000000a1b2c3d4.shard    key -> stored item, for every key in that shard
//! ...
//! ```
//!
//! Each mutation writes the shard file first and the index second. Both
//! writes are individually atomic (temporary file + rename); the pair is
//! not. A crash between them loses at most the last write.

mod file;
mod index;
mod shard;

use std::collections::HashMap;
use std::fs;
use std::marker::PhantomData;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;
use tracing::{debug, warn};

use self::index::ShardIndex;
#[cfg(test)]
use self::index::INDEX_FILE;
pub use self::shard::ShardId;
use self::shard::{ShardRecord, StoredItem};
use crate::error::{Error, Result};
use crate::traits::{CacheKey, CacheStore, CacheValue};

/// Default shard width in bits.
pub const DEFAULT_SHARD_BITS: u32 = 32;

/// Persistent tier: one index file plus one file per shard.
///
/// All operations, including their file I/O, run under a single mutex.
/// Unreadable files are treated as misses. Write failures are logged,
/// counted, and leave the affected key as it was; the `try_*` variants
/// also return them.
pub struct DiskCache<K, V> {
	dir: PathBuf,
	shard_bits: u32,
	index: Mutex<ShardIndex<K>>,
	write_failures: AtomicU64,
	_value: PhantomData<fn() -> V>,
}

impl<K: CacheKey, V: CacheValue> DiskCache<K, V> {
	/// Open the cache in `dir`, creating the directory if needed.
	pub fn open(dir: impl Into<PathBuf>) -> Result<Self> {
		Self::open_with_shard_bits(dir, DEFAULT_SHARD_BITS)
	}

	/// Open with a custom shard width.
	///
	/// Narrower shards mean fewer, larger files. A width of zero keeps every
	/// key in a single shard file. The width may change between runs: keys
	/// keep the shard recorded in the index until they are written again.
	///
	/// # Panics
	///
	/// Panics if `shard_bits` is greater than 64.
	pub fn open_with_shard_bits(dir: impl Into<PathBuf>, shard_bits: u32) -> Result<Self> {
		assert!(shard_bits <= 64, "shard_bits must be at most 64");
		let dir = dir.into();
		fs::create_dir_all(&dir).map_err(|err| Error::io(&dir, err))?;
		let index = ShardIndex::load(&dir)?;

		Ok(Self {
			dir,
			shard_bits,
			index: Mutex::new(index),
			write_failures: AtomicU64::new(0),
			_value: PhantomData,
		})
	}

	pub fn dir(&self) -> &Path {
		&self.dir
	}

	pub fn shard_bits(&self) -> u32 {
		self.shard_bits
	}

	/// The shard a key would be written to.
	pub fn shard_for(&self, key: &K) -> Result<ShardId> {
		ShardId::for_key(key, self.shard_bits)
	}

	/// Look up several keys. Keys missing from the index, or whose shard
	/// cannot be read, are omitted.
	pub fn get<'a, I>(&self, keys: I) -> HashMap<K, V>
	where
		I: IntoIterator<Item = &'a K>,
		K: 'a,
	{
		let index = self.index.lock();
		self.read_keys(&index, keys)
	}

	/// Every stored entry, read shard by shard from disk.
	pub fn all(&self) -> HashMap<K, V> {
		let index = self.index.lock();
		let keys: Vec<K> = index.keys().cloned().collect();
		self.read_keys(&index, &keys)
	}

	/// Best-effort [`try_put`](Self::try_put).
	pub fn put(&self, key: K, value: V) -> &Self {
		// Failures are logged and counted by `try_put`.
		let _ = self.try_put(key, value);
		self
	}

	/// Write one entry: update its shard record, then the index.
	///
	/// On failure the key keeps its previous value (or stays absent).
	pub fn try_put(&self, key: K, value: V) -> Result<()> {
		let result = self.put_entry(key, value);
		if let Err(err) = &result {
			self.record_failure("put", err);
		}
		result
	}

	/// Best-effort [`try_remove`](Self::try_remove).
	pub fn remove<'a, I>(&self, keys: I) -> &Self
	where
		I: IntoIterator<Item = &'a K>,
		K: 'a,
	{
		let _ = self.try_remove(keys);
		self
	}

	/// Remove several keys, persisting the index once for the batch.
	///
	/// Every key is attempted even if an earlier one fails. A key whose
	/// shard cannot be rewritten stays in the index. Returns the first
	/// failure.
	pub fn try_remove<'a, I>(&self, keys: I) -> Result<()>
	where
		I: IntoIterator<Item = &'a K>,
		K: 'a,
	{
		let mut index = self.index.lock();
		self.remove_keys(&mut index, keys)
	}

	/// Best-effort [`try_clear`](Self::try_clear).
	pub fn clear(&self) -> &Self {
		let _ = self.try_clear();
		self
	}

	/// Remove every key.
	pub fn try_clear(&self) -> Result<()> {
		let mut index = self.index.lock();
		let keys: Vec<K> = index.keys().cloned().collect();
		self.remove_keys(&mut index, &keys)
	}

	/// Whether the index holds the key. Does not read the shard.
	pub fn contains(&self, key: &K) -> bool {
		self.index.lock().contains(key)
	}

	/// Number of keys in the index.
	pub fn len(&self) -> usize {
		self.index.lock().len()
	}

	pub fn is_empty(&self) -> bool {
		self.len() == 0
	}

	/// Total number of failed shard or index writes.
	pub fn write_failures(&self) -> u64 {
		self.write_failures.load(Ordering::Relaxed)
	}

	fn shard_path(&self, shard: ShardId) -> PathBuf {
		self.dir.join(shard.file_name())
	}

	fn read_keys<'a, I>(&self, index: &ShardIndex<K>, keys: I) -> HashMap<K, V>
	where
		I: IntoIterator<Item = &'a K>,
		K: 'a,
	{
		let mut records: HashMap<ShardId, Option<ShardRecord<K, V>>> = HashMap::new();
		let mut found = HashMap::new();

		for key in keys {
			let Some(shard) = index.get(key) else {
				continue;
			};
			let record = records.entry(shard).or_insert_with(|| self.read_record(shard));
			match record.as_mut().and_then(|r| r.remove(key)) {
				Some(item) => {
					found.insert(key.clone(), item.value);
				}
				None if record.is_some() && !found.contains_key(key) => {
					debug!(shard = %shard, "indexed key missing from its shard record");
				}
				None => {}
			}
		}
		found
	}

	/// Load a shard for reading. Any failure is a miss.
	fn read_record(&self, shard: ShardId) -> Option<ShardRecord<K, V>> {
		let path = self.shard_path(shard);
		match ShardRecord::load(&path) {
			Ok(Some(record)) => Some(record),
			Ok(None) => {
				debug!(path = %path.display(), "shard file missing");
				None
			}
			Err(err) => {
				warn!(path = %path.display(), error = %err, "unreadable shard treated as a miss");
				None
			}
		}
	}

	/// Load a shard for rewriting. A corrupt shard is replaced by an empty
	/// record and flagged so the caller can drop the keys it held; other I/O
	/// failures abort the write.
	fn load_for_write(&self, path: &Path) -> Result<(ShardRecord<K, V>, bool)> {
		match ShardRecord::load(path) {
			Ok(record) => Ok((record.unwrap_or_else(ShardRecord::new), false)),
			Err(err) if err.is_corruption() => {
				warn!(path = %path.display(), error = %err, "replacing corrupt shard");
				Ok((ShardRecord::new(), true))
			}
			Err(err) => Err(err),
		}
	}

	fn put_entry(&self, key: K, value: V) -> Result<()> {
		let shard = self.shard_for(&key)?;
		let path = self.shard_path(shard);
		let mut index = self.index.lock();

		let (mut record, replaced_corrupt) = self.load_for_write(&path)?;
		let previous = record.insert(key.clone(), StoredItem::new(value));
		record.store(&path)?;

		// Keys that lived in a corrupt shard are gone with it.
		let lost = if replaced_corrupt { index.drop_shard(shard, &key) } else { Vec::new() };
		if !lost.is_empty() {
			warn!(shard = %shard, count = lost.len(), "dropped keys held by a corrupt shard");
		}

		let replaced = index.insert(key.clone(), shard);
		if let Err(err) = index.persist() {
			match replaced {
				Some(old) => index.insert(key.clone(), old),
				None => index.remove(&key),
			};
			for lost_key in lost {
				index.insert(lost_key, shard);
			}
			match previous {
				Some(item) => record.insert(key, item),
				None => record.remove(&key),
			};
			if let Err(restore) = record.store_or_delete(&path) {
				warn!(path = %path.display(), error = %restore, "failed to restore shard after index write failure");
			}
			return Err(err);
		}

		// The key moved shards because the shard width changed; drop the
		// stale copy. The index already points at the new shard.
		if let Some(old) = replaced.filter(|old| *old != shard)
			&& let Err(err) = self.remove_from_shard(old, &key)
		{
			warn!(shard = %old, error = %err, "failed to drop relocated key from its old shard");
		}
		Ok(())
	}

	fn remove_keys<'a, I>(&self, index: &mut ShardIndex<K>, keys: I) -> Result<()>
	where
		I: IntoIterator<Item = &'a K>,
		K: 'a,
	{
		let mut first_error = None;
		let mut removed = 0usize;

		for key in keys {
			let Some(shard) = index.get(key) else {
				continue;
			};
			match self.remove_from_shard(shard, key) {
				Ok(()) => {
					index.remove(key);
					removed += 1;
				}
				Err(err) => {
					self.record_failure("remove", &err);
					first_error.get_or_insert(err);
				}
			}
		}

		if removed > 0
			&& let Err(err) = index.persist()
		{
			self.record_failure("remove", &err);
			first_error.get_or_insert(err);
		}

		match first_error {
			Some(err) => Err(err),
			None => Ok(()),
		}
	}

	/// Drop one key from its shard, deleting the file once it is empty.
	fn remove_from_shard(&self, shard: ShardId, key: &K) -> Result<()> {
		let path = self.shard_path(shard);
		let mut record = match ShardRecord::<K, V>::load(&path) {
			Ok(Some(record)) => record,
			Ok(None) => return Ok(()),
			Err(err) if err.is_corruption() => {
				warn!(path = %path.display(), error = %err, "skipping corrupt shard during remove");
				return Ok(());
			}
			Err(err) => return Err(err),
		};

		if record.remove(key).is_none() {
			return Ok(());
		}
		record.store_or_delete(&path)
	}

	fn record_failure(&self, operation: &'static str, err: &Error) {
		self.write_failures.fetch_add(1, Ordering::Relaxed);
		warn!(operation, dir = %self.dir.display(), error = %err, "disk cache write failed");
	}
}

impl<K: CacheKey, V: CacheValue> CacheStore<K, V> for DiskCache<K, V> {
	fn get<'a, I>(&self, keys: I) -> HashMap<K, V>
	where
		I: IntoIterator<Item = &'a K>,
		K: 'a,
	{
		DiskCache::get(self, keys)
	}

	fn put(&self, key: K, value: V) -> &Self {
		DiskCache::put(self, key, value)
	}

	fn remove<'a, I>(&self, keys: I) -> &Self
	where
		I: IntoIterator<Item = &'a K>,
		K: 'a,
	{
		DiskCache::remove(self, keys)
	}

	fn clear(&self) -> &Self {
		DiskCache::clear(self)
	}

	fn all(&self) -> HashMap<K, V> {
		DiskCache::all(self)
	}

	fn len(&self) -> usize {
		DiskCache::len(self)
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn keys(names: &[&str]) -> Vec<String> {
		names.iter().map(|s| s.to_string()).collect()
	}

	fn shard_files(dir: &Path) -> usize {
		fs::read_dir(dir)
			.unwrap()
			.filter(|e| e.as_ref().unwrap().path().extension().is_some_and(|ext| ext == "shard"))
			.count()
	}

	#[test]
	fn test_disk_put_and_get() {
		let dir = tempfile::tempdir().unwrap();
		let cache = DiskCache::open(dir.path()).unwrap();
		cache.put("a".to_string(), 1u32).put("b".to_string(), 2u32);

		let found = cache.get(&keys(&["a", "b", "c"]));
		assert_eq!(found.len(), 2);
		assert_eq!(found["a"], 1);
		assert_eq!(found["b"], 2);
		assert_eq!(cache.len(), 2);
	}

	#[test]
	fn test_disk_survives_reopen() {
		let dir = tempfile::tempdir().unwrap();
		{
			let cache = DiskCache::open(dir.path()).unwrap();
			cache.put("k".to_string(), vec![1u8, 2, 3]);
		}

		let reopened = DiskCache::<String, Vec<u8>>::open(dir.path()).unwrap();
		assert_eq!(reopened.len(), 1);
		assert_eq!(reopened.get(&keys(&["k"]))["k"], vec![1, 2, 3]);
	}

	#[test]
	fn test_disk_creates_missing_directory() {
		let dir = tempfile::tempdir().unwrap();
		let nested = dir.path().join("a").join("b");

		let cache = DiskCache::<u32, u32>::open(&nested).unwrap();
		assert!(cache.is_empty());
		assert!(nested.join(INDEX_FILE).exists());
	}

	#[test]
	fn test_disk_overwrite() {
		let dir = tempfile::tempdir().unwrap();
		let cache = DiskCache::open(dir.path()).unwrap();
		cache.put(1u32, "one".to_string()).put(1u32, "uno".to_string());

		assert_eq!(cache.len(), 1);
		assert_eq!(cache.all()[&1], "uno");
	}

	#[test]
	fn test_disk_collisions_share_a_file() {
		let dir = tempfile::tempdir().unwrap();
		let cache = DiskCache::open_with_shard_bits(dir.path(), 0).unwrap();
		cache.put(1u32, 'a').put(2u32, 'b').put(3u32, 'c');
		assert_eq!(shard_files(dir.path()), 1);

		cache.remove(&[2]);
		assert_eq!(cache.get(&[1, 2, 3]), HashMap::from([(1, 'a'), (3, 'c')]));
		assert_eq!(shard_files(dir.path()), 1);

		cache.remove(&[1, 3]);
		assert!(cache.is_empty());
		assert_eq!(shard_files(dir.path()), 0);
	}

	#[test]
	fn test_disk_remove_is_idempotent() {
		let dir = tempfile::tempdir().unwrap();
		let cache = DiskCache::open(dir.path()).unwrap();
		cache.put(1u8, 1u8).put(2u8, 2u8);

		cache.try_remove(&[1]).unwrap();
		let once = cache.all();
		cache.try_remove(&[1]).unwrap();

		assert_eq!(cache.all(), once);
		assert_eq!(cache.len(), 1);
		assert_eq!(cache.write_failures(), 0);
	}

	#[test]
	fn test_disk_clear() {
		let dir = tempfile::tempdir().unwrap();
		let cache = DiskCache::open(dir.path()).unwrap();
		for i in 0..10u32 {
			cache.put(i, i * 10);
		}

		cache.try_clear().unwrap();
		assert_eq!(cache.len(), 0);
		assert!(cache.all().is_empty());
		assert_eq!(shard_files(dir.path()), 0);
	}

	#[test]
	fn test_disk_missing_shard_is_a_miss() {
		let dir = tempfile::tempdir().unwrap();
		let cache = DiskCache::open(dir.path()).unwrap();
		cache.put("gone".to_string(), 1u32);

		let shard = cache.shard_for(&"gone".to_string()).unwrap();
		fs::remove_file(dir.path().join(shard.file_name())).unwrap();

		assert!(cache.get(&keys(&["gone"])).is_empty());
		assert!(cache.contains(&"gone".to_string()));
	}

	#[test]
	fn test_disk_corrupt_shard_is_a_miss_and_heals_on_put() {
		let dir = tempfile::tempdir().unwrap();
		let cache = DiskCache::open(dir.path()).unwrap();
		cache.put("x".to_string(), 1u32);

		let shard = cache.shard_for(&"x".to_string()).unwrap();
		fs::write(dir.path().join(shard.file_name()), b"garbage").unwrap();
		assert!(cache.get(&keys(&["x"])).is_empty());

		cache.try_put("x".to_string(), 2).unwrap();
		assert_eq!(cache.get(&keys(&["x"]))["x"], 2);
	}

	#[test]
	fn test_disk_changed_shard_width_relocates_key() {
		let dir = tempfile::tempdir().unwrap();
		{
			let cache = DiskCache::open_with_shard_bits(dir.path(), 0).unwrap();
			cache.put(7u64, "old".to_string()).put(8u64, "other".to_string());
		}

		let cache = DiskCache::<u64, String>::open_with_shard_bits(dir.path(), 64).unwrap();
		assert_eq!(cache.get(&[7])[&7], "old");

		cache.put(7, "new".to_string());
		assert_eq!(cache.get(&[7, 8]), HashMap::from([(7, "new".to_string()), (8, "other".to_string())]));

		let zero = ShardRecord::<u64, String>::load(&dir.path().join(ShardId::for_key(&7u64, 0).unwrap().file_name()))
			.unwrap()
			.unwrap();
		assert_eq!(zero.len(), 1);
	}

	#[test]
	#[should_panic(expected = "shard_bits must be at most 64")]
	fn test_disk_rejects_wide_shards() {
		let dir = tempfile::tempdir().unwrap();
		let _ = DiskCache::<u8, u8>::open_with_shard_bits(dir.path(), 65);
	}

	#[test]
	fn test_disk_put_into_corrupt_shard_drops_its_keys() {
		let dir = tempfile::tempdir().unwrap();
		let cache = DiskCache::open_with_shard_bits(dir.path(), 0).unwrap();
		cache.put(1u32, 'a').put(2u32, 'b');

		let shard = cache.shard_for(&1).unwrap();
		fs::write(dir.path().join(shard.file_name()), b"garbage").unwrap();

		cache.try_put(3, 'c').unwrap();
		assert!(!cache.contains(&1));
		assert!(!cache.contains(&2));
		assert_eq!(cache.len(), cache.all().len());
		drop(cache);

		let reopened = DiskCache::<u32, char>::open_with_shard_bits(dir.path(), 0).unwrap();
		assert_eq!(reopened.len(), 1);
		assert_eq!(reopened.all(), HashMap::from([(3, 'c')]));
	}

	#[test]
	fn test_disk_failed_index_write_rolls_back() {
		let dir = tempfile::tempdir().unwrap();
		let cache = DiskCache::open_with_shard_bits(dir.path(), 0).unwrap();
		cache.put(1u32, 'a');

		// A directory in place of the index makes the final rename fail.
		let index_path = dir.path().join(INDEX_FILE);
		fs::remove_file(&index_path).unwrap();
		fs::create_dir(&index_path).unwrap();

		assert!(cache.try_put(2, 'b').is_err());
		assert!(cache.try_put(1, 'z').is_err());
		assert_eq!(cache.write_failures(), 2);

		assert_eq!(cache.len(), 1);
		assert!(!cache.contains(&2));
		assert_eq!(cache.get(&[1, 2]), HashMap::from([(1, 'a')]));

		let shard = cache.shard_for(&1).unwrap();
		let mut record = ShardRecord::<u32, char>::load(&dir.path().join(shard.file_name()))
			.unwrap()
			.unwrap();
		assert_eq!(record.len(), 1);
		assert_eq!(record.remove(&1).map(|item| item.value), Some('a'));
	}

	#[test]
	fn test_disk_failed_shard_write_keeps_previous_state() {
		let dir = tempfile::tempdir().unwrap();
		let cache = DiskCache::open_with_shard_bits(dir.path(), 64).unwrap();
		cache.put(1u32, 'a');

		let blocked = cache.shard_for(&2).unwrap();
		assert_ne!(blocked, cache.shard_for(&1).unwrap());
		fs::create_dir(dir.path().join(blocked.file_name())).unwrap();

		assert!(cache.try_put(2, 'b').is_err());
		assert_eq!(cache.write_failures(), 1);
		assert_eq!(cache.len(), 1);
		assert!(!cache.contains(&2));
		assert_eq!(cache.get(&[1, 2]), HashMap::from([(1, 'a')]));

		let reopened = DiskCache::<u32, char>::open_with_shard_bits(dir.path(), 64).unwrap();
		assert_eq!(reopened.all(), HashMap::from([(1, 'a')]));
	}
}
