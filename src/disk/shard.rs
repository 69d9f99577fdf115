use std::collections::HashMap;
use std::fmt;
use std::hash::Hash;
use std::path::Path;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::disk::file;
use crate::error::Result;

const SHARD_EXTENSION: &str = "shard";

/// Identifier of the shard file that holds a key.
///
/// Derived from the SHA-256 digest of the key's bincode encoding, keeping the
/// top `bits` bits. The same key always maps to the same shard across runs
/// and platforms; distinct keys may share a shard.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ShardId(u64);

impl ShardId {
	/// Compute the shard for `key` with a shard width of `bits` (0..=64).
	///
	/// A width of zero puts every key in the same shard.
	pub fn for_key<K: Serialize>(key: &K, bits: u32) -> Result<Self> {
		debug_assert!(bits <= 64);
		let encoded = bincode::serialize(key)?;
		let digest = Sha256::digest(&encoded);

		let mut prefix = [0u8; 8];
		prefix.copy_from_slice(&digest[..8]);
		let hash = u64::from_be_bytes(prefix);

		Ok(Self(hash.checked_shr(64 - bits).unwrap_or(0)))
	}

	pub fn get(&self) -> u64 {
		self.0
	}

	pub(crate) fn file_name(&self) -> String {
		format!("{:016x}.{SHARD_EXTENSION}", self.0)
	}
}

impl fmt::Display for ShardId {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{:016x}", self.0)
	}
}

/// A value as stored on disk.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub(crate) struct StoredItem<V> {
	pub value: V,
	/// Reserved in the format. Always written as `None` and never evaluated.
	pub expires_at: Option<u64>,
}

impl<V> StoredItem<V> {
	pub fn new(value: V) -> Self {
		Self {
			value,
			expires_at: None,
		}
	}
}

/// Contents of one shard file: every key that maps to the shard.
pub(crate) struct ShardRecord<K, V> {
	items: HashMap<K, StoredItem<V>>,
}

impl<K, V> ShardRecord<K, V>
where
	K: Hash + Eq + Serialize + DeserializeOwned,
	V: Serialize + DeserializeOwned,
{
	pub fn new() -> Self {
		Self {
			items: HashMap::new(),
		}
	}

	/// Load the record at `path`; `Ok(None)` when the file does not exist.
	pub fn load(path: &Path) -> Result<Option<Self>> {
		Ok(file::read(path)?.map(|items| Self {
			items,
		}))
	}

	pub fn store(&self, path: &Path) -> Result<()> {
		file::write_atomic(path, &self.items)
	}

	/// Write the record back, or delete the file once it holds nothing.
	pub fn store_or_delete(&self, path: &Path) -> Result<()> {
		if self.items.is_empty() { file::remove(path) } else { self.store(path) }
	}

	pub fn insert(&mut self, key: K, item: StoredItem<V>) -> Option<StoredItem<V>> {
		self.items.insert(key, item)
	}

	pub fn remove(&mut self, key: &K) -> Option<StoredItem<V>> {
		self.items.remove(key)
	}

	#[cfg(test)]
	pub fn len(&self) -> usize {
		self.items.len()
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_shard_id_is_deterministic() {
		let a = ShardId::for_key(&"alpha".to_string(), 32).unwrap();
		let b = ShardId::for_key(&"alpha".to_string(), 32).unwrap();
		assert_eq!(a, b);
		assert_eq!(a.file_name(), b.file_name());
	}

	#[test]
	fn test_shard_id_width() {
		let key = "alpha".to_string();
		assert_eq!(ShardId::for_key(&key, 0).unwrap().get(), 0);
		assert!(ShardId::for_key(&key, 4).unwrap().get() < 16);
		assert!(ShardId::for_key(&key, 32).unwrap().get() <= u64::from(u32::MAX));

		let full = ShardId::for_key(&key, 64).unwrap().get();
		assert_eq!(full >> 60, ShardId::for_key(&key, 4).unwrap().get());
	}

	#[test]
	fn test_shard_id_known_value() {
		// SHA-256 of bincode(0u8) = SHA-256([0x00]) starts with 6e340b9c.
		assert_eq!(ShardId::for_key(&0u8, 32).unwrap().get(), 0x6e34_0b9c);
	}

	#[test]
	fn test_file_name_is_fixed_width_hex() {
		let id = ShardId(0xab);
		assert_eq!(id.file_name(), "00000000000000ab.shard");
		assert_eq!(id.to_string(), "00000000000000ab");
	}

	#[test]
	fn test_record_roundtrip_keeps_collisions() {
		let dir = tempfile::tempdir().unwrap();
		let path = dir.path().join(ShardId(0).file_name());

		let mut record = ShardRecord::new();
		record.insert("a".to_string(), StoredItem::new(1u32));
		record.insert("b".to_string(), StoredItem::new(2u32));
		record.store(&path).unwrap();

		let mut loaded = ShardRecord::<String, u32>::load(&path).unwrap().unwrap();
		assert_eq!(loaded.len(), 2);
		assert_eq!(loaded.remove(&"b".to_string()), Some(StoredItem::new(2)));
		assert_eq!(loaded.remove(&"a".to_string()).map(|i| i.value), Some(1));
	}

	#[test]
	fn test_empty_record_deletes_file() {
		let dir = tempfile::tempdir().unwrap();
		let path = dir.path().join(ShardId(1).file_name());

		let mut record = ShardRecord::new();
		record.insert(1u64, StoredItem::new(()));
		record.store_or_delete(&path).unwrap();
		assert!(path.exists());

		record.remove(&1);
		record.store_or_delete(&path).unwrap();
		assert!(!path.exists());
	}
}
