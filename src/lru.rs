use std::collections::HashMap;
use std::hash::Hash;

use ahash::RandomState;

/// One slot of the recency list.
struct Node<K, V> {
	key: K,
	value: V,
	/// Towards the head (more recently used)
	prev: Option<usize>,
	/// Towards the tail (less recently used)
	next: Option<usize>,
}

/// Doubly linked recency list stored in an arena.
///
/// Nodes live in `slots` and link to each other by slot index, so promotion
/// and eviction are O(1) without shared references. Vacated slots are
/// recycled through `free`.
///
/// The list is not thread-safe on its own; `MemoryCache` wraps it in a
/// mutex.
pub(crate) struct LruList<K, V> {
	slots: Vec<Option<Node<K, V>>>,
	free: Vec<usize>,
	index: HashMap<K, usize, RandomState>,
	/// Most recently used
	head: Option<usize>,
	/// Least recently used
	tail: Option<usize>,
	capacity: usize,
}

impl<K, V> LruList<K, V>
where
	K: Hash + Eq + Clone,
{
	pub fn new(capacity: usize) -> Self {
		Self {
			slots: Vec::new(),
			free: Vec::new(),
			index: HashMap::with_hasher(RandomState::new()),
			head: None,
			tail: None,
			capacity,
		}
	}

	pub fn len(&self) -> usize {
		self.index.len()
	}

	pub fn capacity(&self) -> usize {
		self.capacity
	}

	/// Change the capacity. Shrinking does not evict; the next `insert`
	/// trims the list down to the new bound.
	pub fn set_capacity(&mut self, capacity: usize) {
		self.capacity = capacity;
	}

	pub fn contains(&self, key: &K) -> bool {
		self.index.contains_key(key)
	}

	/// Look up a key and mark it most recently used.
	pub fn get(&mut self, key: &K) -> Option<&V> {
		let idx = *self.index.get(key)?;
		self.move_to_front(idx);
		Some(&self.node(idx).value)
	}

	/// Insert at the head, replacing any existing node for the key.
	///
	/// Returns the keys evicted from the tail to make room. With a capacity
	/// of zero nothing is kept.
	pub fn insert(&mut self, key: K, value: V) -> Vec<K> {
		if let Some(idx) = self.index.remove(&key) {
			self.release(idx);
		}

		let mut evicted = Vec::new();
		while self.index.len() >= self.capacity {
			match self.pop_back() {
				Some((victim, _)) => evicted.push(victim),
				None => break,
			}
		}
		if self.capacity == 0 {
			return evicted;
		}

		let idx = self.allocate(Node {
			key: key.clone(),
			value,
			prev: None,
			next: None,
		});
		self.attach_front(idx);
		self.index.insert(key, idx);
		evicted
	}

	pub fn remove(&mut self, key: &K) -> Option<V> {
		let idx = self.index.remove(key)?;
		Some(self.release(idx).value)
	}

	/// Remove the least recently used entry.
	pub fn pop_back(&mut self) -> Option<(K, V)> {
		let idx = self.tail?;
		let node = self.release(idx);
		self.index.remove(&node.key);
		Some((node.key, node.value))
	}

	pub fn clear(&mut self) {
		self.slots.clear();
		self.free.clear();
		self.index.clear();
		self.head = None;
		self.tail = None;
	}

	/// Iterate from most to least recently used without touching the order.
	pub fn iter(&self) -> Iter<'_, K, V> {
		Iter {
			list: self,
			cursor: self.head,
		}
	}

	fn node(&self, idx: usize) -> &Node<K, V> {
		self.slots[idx].as_ref().expect("lru link points at a vacant slot")
	}

	fn node_mut(&mut self, idx: usize) -> &mut Node<K, V> {
		self.slots[idx].as_mut().expect("lru link points at a vacant slot")
	}

	fn allocate(&mut self, node: Node<K, V>) -> usize {
		match self.free.pop() {
			Some(idx) => {
				self.slots[idx] = Some(node);
				idx
			}
			None => {
				self.slots.push(Some(node));
				self.slots.len() - 1
			}
		}
	}

	/// Unlink a node and hand its slot back to the free list.
	///
	/// The caller is responsible for the `index` entry.
	fn release(&mut self, idx: usize) -> Node<K, V> {
		self.detach(idx);
		let node = self.slots[idx].take().expect("lru link points at a vacant slot");
		self.free.push(idx);
		node
	}

	fn detach(&mut self, idx: usize) {
		let (prev, next) = {
			let node = self.node(idx);
			(node.prev, node.next)
		};

		match prev {
			Some(p) => self.node_mut(p).next = next,
			None => self.head = next,
		}
		match next {
			Some(n) => self.node_mut(n).prev = prev,
			None => self.tail = prev,
		}

		let node = self.node_mut(idx);
		node.prev = None;
		node.next = None;
	}

	fn attach_front(&mut self, idx: usize) {
		let old_head = self.head;
		{
			let node = self.node_mut(idx);
			node.prev = None;
			node.next = old_head;
		}
		match old_head {
			Some(h) => self.node_mut(h).prev = Some(idx),
			None => self.tail = Some(idx),
		}
		self.head = Some(idx);
	}

	fn move_to_front(&mut self, idx: usize) {
		if self.head == Some(idx) {
			return;
		}
		self.detach(idx);
		self.attach_front(idx);
	}

	/// Walk the list in both directions and check it against the index.
	#[cfg(test)]
	pub fn assert_consistent(&self) {
		let mut forward = Vec::new();
		let mut cursor = self.head;
		let mut prev = None;
		while let Some(idx) = cursor {
			let node = self.node(idx);
			assert_eq!(node.prev, prev, "broken back link at slot {idx}");
			assert_eq!(self.index.get(&node.key), Some(&idx), "index disagrees with list");
			forward.push(idx);
			prev = Some(idx);
			cursor = node.next;
		}
		assert_eq!(self.tail, prev);
		assert_eq!(forward.len(), self.index.len());
		assert_eq!(self.slots.iter().filter(|s| s.is_some()).count(), forward.len());
	}
}

/// Iterator over `(key, value)` pairs from most to least recently used.
pub(crate) struct Iter<'a, K, V> {
	list: &'a LruList<K, V>,
	cursor: Option<usize>,
}

impl<'a, K, V> Iterator for Iter<'a, K, V>
where
	K: Hash + Eq + Clone,
{
	type Item = (&'a K, &'a V);

	fn next(&mut self) -> Option<Self::Item> {
		let node = self.list.node(self.cursor?);
		self.cursor = node.next;
		Some((&node.key, &node.value))
	}
}
