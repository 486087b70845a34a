use crate::builder::RefreshCacheBuilder;
use crate::decision::{decide, Action, Freshness};
use crate::engine::Engine;
use crate::entry::CacheEntry;
use crate::error::{ConfigError, Error};
use crate::metrics::{Metrics, MetricsSnapshot};
use crate::request::CacheRequest;
use crate::task::scheduler::{Scheduler, SchedulerState};

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// The internal, thread-safe core behind every clone of a [`RefreshCache`].
pub(crate) struct RefreshShared<V> {
  pub(crate) engine: Engine<V>,
  pub(crate) scheduler: Scheduler<V>,
}

/// A thread-safe cache front that keeps values fresh according to each
/// request's [`RefreshMode`](crate::RefreshMode).
///
/// Cloning is cheap; clones share the same store, reload coordinator and
/// scheduler.
pub struct RefreshCache<V> {
  pub(crate) shared: Arc<RefreshShared<V>>,
}

impl<V> Clone for RefreshCache<V> {
  fn clone(&self) -> Self {
    Self {
      shared: self.shared.clone(),
    }
  }
}

impl<V> fmt::Debug for RefreshCache<V> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("RefreshCache")
      .field("engine", &self.shared.engine)
      .field("scheduler", &self.shared.scheduler)
      .finish()
  }
}

fn check_key(key: &str) -> Result<(), ConfigError> {
  if key.trim().is_empty() {
    return Err(ConfigError::BlankKey);
  }
  Ok(())
}

impl<V: Send + Sync + 'static> RefreshCache<V> {
  /// Starts configuring a cache. See [`RefreshCacheBuilder`].
  pub fn builder() -> RefreshCacheBuilder<V> {
    RefreshCacheBuilder::new()
  }

  /// Returns the value for `request`, loading or refreshing it as its mode
  /// dictates.
  ///
  /// Only `Block` and `Return` ever load on the calling thread, and only a
  /// synchronous load whose failure policy says [`Fallback::Propagate`]
  /// returns an error. `Async` and `Scheduled` may return `Ok(None)` while
  /// the first load is still pending.
  ///
  /// [`Fallback::Propagate`]: crate::Fallback::Propagate
  pub fn get(&self, request: &CacheRequest<V>) -> Result<Option<Arc<V>>, Error> {
    let engine = &self.shared.engine;
    let current = engine.lookup(request.key());
    let freshness = Freshness::of(current.as_deref());

    match freshness {
      Freshness::Fresh => Metrics::incr(&engine.metrics.fresh_hits),
      Freshness::Stale => Metrics::incr(&engine.metrics.stale_hits),
      Freshness::Miss => Metrics::incr(&engine.metrics.misses),
    }

    // An entry can cross its hard expiry between the lookup and the check.
    let usable = match freshness {
      Freshness::Miss => None,
      Freshness::Fresh | Freshness::Stale => current,
    };

    match decide(request.mode(), freshness) {
      Action::Serve => Ok(usable.map(|entry| entry.value())),
      Action::LoadInline => engine.load_inline(request, usable),
      Action::ServeAndReload => {
        let value = usable.as_ref().map(|entry| entry.value());
        engine.dispatch(request, usable);
        Ok(value)
      }
      Action::ServeAndSchedule => {
        // A closed scheduler declines quietly; the caller still gets what
        // the store holds.
        let _ = self.shared.scheduler.register_if_absent(request);
        Ok(usable.map(|entry| entry.value()))
      }
    }
  }

  /// Reads the entry under `key` without loading, refreshing or counting it.
  ///
  /// Hard-expired entries are evicted and read as `None`; soft-expired ones
  /// are returned as they are.
  pub fn peek(&self, key: &str) -> Option<Arc<CacheEntry<V>>> {
    self.shared.engine.lookup(key)
  }

  /// Stores `value` under `key`, usable and fresh for `ttl`.
  pub fn set(&self, key: &str, value: V, ttl: Duration) -> Result<bool, Error> {
    check_key(key)?;
    let entry = CacheEntry::new(value, ttl, ttl)?;
    Ok(self.shared.engine.put(key, entry, None))
  }

  /// Stores a pre-built entry, keeping its own soft and hard TTLs.
  pub fn set_entry(&self, key: &str, entry: CacheEntry<V>) -> Result<bool, Error> {
    check_key(key)?;
    Ok(self.shared.engine.put(key, entry, None))
  }

  /// Removes `key` from the store. A scheduled request under the same key is
  /// reloaded on the next scheduler tick.
  pub fn remove(&self, key: &str) -> bool {
    self.shared.scheduler.reset(key);
    self.shared.engine.remove(key)
  }

  /// Clears the store and makes every scheduled request due.
  pub fn remove_all(&self) {
    self.shared.engine.clear();
    self.shared.scheduler.reset_all();
  }

  /// Hands `request` to the scheduler, replacing any request under the same
  /// key. Returns `Ok(false)` when the registration was a no-op.
  ///
  /// Any mode may be scheduled; a `Scheduled` request is also registered
  /// implicitly by its first [`get`](Self::get).
  pub fn schedule(&self, request: &CacheRequest<V>) -> Result<bool, Error> {
    self.shared.scheduler.register(request)
  }

  /// Stops refreshing `key` in the background. The cached entry is kept.
  pub fn unschedule(&self, key: &str) -> bool {
    self.shared.scheduler.unregister(key)
  }

  pub fn scheduled_keys(&self) -> Vec<String> {
    self.shared.scheduler.keys()
  }

  pub fn is_scheduled(&self, key: &str) -> bool {
    self.shared.scheduler.is_registered(key)
  }

  pub fn scheduler_state(&self) -> SchedulerState {
    self.shared.scheduler.state()
  }

  /// `true` while a background reload for `key` is in flight.
  pub fn is_reloading(&self, key: &str) -> bool {
    self.shared.engine.coordinator.is_reloading(key)
  }

  pub fn metrics(&self) -> MetricsSnapshot {
    self.shared.engine.metrics.snapshot()
  }

  /// Stops the scheduler and declines new scheduler registrations.
  ///
  /// Idempotent. Background reloads already queued run to completion, and
  /// `Block`, `Return` and `Async` requests keep working.
  pub fn close(&self) {
    self.shared.scheduler.close();
  }
}
