//! # Tiered Cache
//!
//! A two-tier key/value cache with:
//! - **Bounded memory tier** with least-recently-used eviction
//! - **Persistent disk tier** that survives process restarts
//! - **Read-through promotion**: disk hits are copied into memory
//! - **Write-through mutation**: every write reaches both tiers
//! - **Crash-safe files**: shard and index files are replaced atomically
//!
//! ## Quick Start
//!
//! ```rust
//! use serde::{Deserialize, Serialize};
//! use tiered_cache::Cache;
//!
//! #[derive(Hash, Eq, PartialEq, Clone, Debug, Serialize, Deserialize)]
//! struct UserId(u64);
//!
//! #[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
//! struct UserProfile {
//!     name: String,
//!     email: String,
//! }
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let dir = tempfile::tempdir()?;
//!
//! // Keep up to 2 profiles in memory; everything else lives on disk
//! let cache = Cache::with_capacity(dir.path(), 2)?;
//!
//! let alice = UserProfile {
//!     name: "Alice".to_string(),
//!     email: "alice@example.com".to_string(),
//! };
//! cache.put(UserId(1), alice.clone());
//!
//! let found = cache.get([&UserId(1), &UserId(2)]);
//! assert_eq!(found.get(&UserId(1)), Some(&alice));
//! assert!(!found.contains_key(&UserId(2)));
//!
//! // A new process pointed at the same directory sees the same data
//! drop(cache);
//! let reopened: Cache<UserId, UserProfile> = Cache::open(dir.path())?;
//! assert_eq!(reopened.len(), 1);
//! # Ok(())
//! # }
//! ```
//!
//! ## Thread Safety
//!
//! The cache is `Send + Sync` and can be shared across threads via `Arc`.
//! Each tier has its own lock; see [`Cache`] for the consistency window this
//! leaves between tiers.
//!
//! ## Logging
//!
//! Disk failures and recoveries are reported through [`tracing`]. Install a
//! subscriber to see them; the crate installs none.

mod builder;
mod cache;
mod disk;
mod error;
mod lru;
mod memory;
mod metrics;
mod traits;

pub use builder::{CacheBuilder, DEFAULT_MEMORY_CAPACITY};
pub use cache::Cache;
pub use disk::{DEFAULT_SHARD_BITS, DiskCache, ShardId};
pub use error::{Error, Result};
pub use memory::MemoryCache;
pub use metrics::CacheMetrics;
pub use traits::{CacheKey, CacheStore, CacheValue};
