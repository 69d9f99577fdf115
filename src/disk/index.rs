use std::collections::HashMap;
use std::hash::Hash;
use std::path::{Path, PathBuf};

use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use crate::disk::file;
use crate::disk::shard::ShardId;
use crate::error::Result;

/// Name of the index file inside the cache directory.
pub(crate) const INDEX_FILE: &str = "index.bin";

/// Persisted mapping from every stored key to the shard holding it.
///
/// The index is the only thing read at startup and the authority for which
/// keys the disk tier holds. It is rewritten in full by [`persist`].
///
/// [`persist`]: ShardIndex::persist
pub(crate) struct ShardIndex<K> {
	path: PathBuf,
	entries: HashMap<K, ShardId>,
}

impl<K> ShardIndex<K>
where
	K: Hash + Eq + Serialize + DeserializeOwned,
{
	/// Load the index from `dir`, starting empty when there is none.
	///
	/// A corrupt index is discarded. A fresh or discarded index is written
	/// back immediately, so an unwritable directory fails here rather than on
	/// the first `put`.
	pub fn load(dir: &Path) -> Result<Self> {
		let path = dir.join(INDEX_FILE);
		let loaded = match file::read(&path) {
			Ok(entries) => entries,
			Err(err) if err.is_corruption() => {
				warn!(path = %path.display(), error = %err, "discarding unreadable cache index");
				None
			}
			Err(err) => return Err(err),
		};

		match loaded {
			Some(entries) => {
				let index = Self {
					path,
					entries,
				};
				debug!(path = %index.path.display(), entries = index.len(), "loaded cache index");
				Ok(index)
			}
			None => {
				let index = Self {
					path,
					entries: HashMap::new(),
				};
				index.persist()?;
				debug!(path = %index.path.display(), "initialized empty cache index");
				Ok(index)
			}
		}
	}

	pub fn persist(&self) -> Result<()> {
		file::write_atomic(&self.path, &self.entries)
	}

	pub fn get(&self, key: &K) -> Option<ShardId> {
		self.entries.get(key).copied()
	}

	pub fn insert(&mut self, key: K, shard: ShardId) -> Option<ShardId> {
		self.entries.insert(key, shard)
	}

	pub fn remove(&mut self, key: &K) -> Option<ShardId> {
		self.entries.remove(key)
	}

	/// Remove every key mapped to `shard` except `keep`, returning them.
	pub fn drop_shard(&mut self, shard: ShardId, keep: &K) -> Vec<K>
	where
		K: Clone,
	{
		let dropped: Vec<K> = self
			.entries
			.iter()
			.filter(|(key, id)| **id == shard && *key != keep)
			.map(|(key, _)| key.clone())
			.collect();
		for key in &dropped {
			self.entries.remove(key);
		}
		dropped
	}

	pub fn contains(&self, key: &K) -> bool {
		self.entries.contains_key(key)
	}

	pub fn len(&self) -> usize {
		self.entries.len()
	}

	pub fn keys(&self) -> impl Iterator<Item = &K> {
		self.entries.keys()
	}
}
