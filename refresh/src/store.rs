use crate::entry::CacheEntry;
use crate::time;

use core::fmt;
use std::error::Error as StdError;
use std::hash::{BuildHasher, Hash, Hasher};
use std::sync::Arc;
use std::time::Duration;

use ahash::{HashMap, HashMapExt};
use crossbeam_utils::CachePadded;
use parking_lot::RwLock;
use thiserror::Error;

/// A failure reported by a [`Store`]. The engine logs these and carries on;
/// they never reach the caller.
#[derive(Debug, Error)]
pub enum StoreError {
  #[error("store unavailable: {0}")]
  Unavailable(String),
  #[error("store backend error")]
  Backend(#[source] Box<dyn StdError + Send + Sync + 'static>),
}

/// Persists cache entries by key. Stores hold no TTL logic of their own.
///
/// Implementations must tolerate arbitrary concurrent callers. `set` receives
/// the time left until hard expiry as a hint; a backend may use it for native
/// expiry, but soft expiry is always decided by the engine.
pub trait Store<V>: Send + Sync {
  fn get(&self, key: &str) -> Result<Option<Arc<CacheEntry<V>>>, StoreError>;

  /// Stores `entry`, returning whether it was accepted.
  fn set(
    &self,
    key: &str,
    entry: Arc<CacheEntry<V>>,
    expiry_hint: Option<Duration>,
  ) -> Result<bool, StoreError>;

  /// Removes `key`, returning whether an entry was present.
  fn remove(&self, key: &str) -> Result<bool, StoreError>;

  fn clear(&self) -> Result<(), StoreError>;
}

/// A helper function to hash a key using a `BuildHasher`.
#[inline]
fn hash_key<H: BuildHasher>(hasher: &H, key: &str) -> u64 {
  let mut state = hasher.build_hasher();
  key.hash(&mut state);
  state.finish()
}

struct Slot<V> {
  entry: Arc<CacheEntry<V>>,
  /// Backend-native expiry in nanoseconds since the epoch. 0 means none.
  expires_at: u64,
}

impl<V> Slot<V> {
  #[inline]
  fn is_expired(&self, now_nanos: u64) -> bool {
    self.expires_at > 0 && now_nanos >= self.expires_at
  }
}

type Shard<V> = CachePadded<RwLock<HashMap<String, Slot<V>>>>;

/// An in-memory [`Store`] partitioned into independently locked shards.
///
/// Operations on different keys rarely contend for the same lock. The expiry
/// hint passed to `set` is honoured lazily: an entry past it is dropped the
/// next time it is read, or by [`purge_expired`](Self::purge_expired).
pub struct MemoryStore<V> {
  shards: Box<[Shard<V>]>,
  hasher: ahash::RandomState,
}

impl<V> fmt::Debug for MemoryStore<V> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("MemoryStore")
      .field("num_shards", &self.shards.len())
      .finish()
  }
}

impl<V> Default for MemoryStore<V> {
  fn default() -> Self {
    Self::new()
  }
}

impl<V> MemoryStore<V> {
  /// Creates a store with a shard count derived from the number of CPUs.
  pub fn new() -> Self {
    Self::with_shards((num_cpus::get() * 4).max(1))
  }

  /// Creates a store with `num_shards` shards, rounded up to a power of two.
  pub fn with_shards(num_shards: usize) -> Self {
    let num_shards = num_shards.max(1).next_power_of_two();
    let shards = (0..num_shards)
      .map(|_| CachePadded::new(RwLock::new(HashMap::new())))
      .collect::<Vec<_>>();

    Self {
      shards: shards.into_boxed_slice(),
      hasher: ahash::RandomState::new(),
    }
  }

  #[inline]
  fn shard(&self, key: &str) -> &RwLock<HashMap<String, Slot<V>>> {
    let hash = hash_key(&self.hasher, key);
    // Shard count is a power of two.
    &self.shards[hash as usize & (self.shards.len() - 1)]
  }

  /// Number of entries currently held, including ones past their hint.
  pub fn len(&self) -> usize {
    self.shards.iter().map(|shard| shard.read().len()).sum()
  }

  pub fn is_empty(&self) -> bool {
    self.len() == 0
  }

  /// Drops every entry past its expiry hint. Returns how many were removed.
  pub fn purge_expired(&self) -> usize {
    let now = time::now_nanos();
    let mut removed = 0;
    for shard in self.shards.iter() {
      let mut guard = shard.write();
      let before = guard.len();
      guard.retain(|_, slot| !slot.is_expired(now));
      removed += before - guard.len();
    }
    removed
  }
}

impl<V: Send + Sync> Store<V> for MemoryStore<V> {
  fn get(&self, key: &str) -> Result<Option<Arc<CacheEntry<V>>>, StoreError> {
    let shard = self.shard(key);
    let now = time::now_nanos();

    // Scope the read guard so the expired path can take the write lock.
    {
      let guard = shard.read();
      match guard.get(key) {
        None => return Ok(None),
        Some(slot) if !slot.is_expired(now) => return Ok(Some(slot.entry.clone())),
        Some(_) => {}
      }
    }

    let mut guard = shard.write();
    // Re-check: a writer may have replaced the slot in between.
    if let Some(slot) = guard.get(key) {
      if !slot.is_expired(now) {
        return Ok(Some(slot.entry.clone()));
      }
      guard.remove(key);
    }
    Ok(None)
  }

  fn set(
    &self,
    key: &str,
    entry: Arc<CacheEntry<V>>,
    expiry_hint: Option<Duration>,
  ) -> Result<bool, StoreError> {
    // Hints too far out to represent mean no native expiry.
    let expires_at = expiry_hint
      .and_then(|hint| u64::try_from(hint.as_nanos()).ok())
      .and_then(|nanos| time::now_nanos().checked_add(nanos))
      .unwrap_or(0);
    self
      .shard(key)
      .write()
      .insert(key.to_owned(), Slot { entry, expires_at });
    Ok(true)
  }

  fn remove(&self, key: &str) -> Result<bool, StoreError> {
    Ok(self.shard(key).write().remove(key).is_some())
  }

  fn clear(&self) -> Result<(), StoreError> {
    for shard in self.shards.iter() {
      shard.write().clear();
    }
    Ok(())
  }
}
