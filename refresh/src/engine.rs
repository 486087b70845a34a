use crate::coordinator::{ReloadCoordinator, ReloadStart};
use crate::entry::CacheEntry;
use crate::error::{Error, ErrorChain, LoadError};
use crate::loader::LoadContext;
use crate::metrics::Metrics;
use crate::policy::{CacheOnError, Fallback, Invocation, LogAction};
use crate::request::CacheRequest;
use crate::store::{Store, StoreError};
use crate::time;

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// The shared core every caller, worker and the scheduler go through.
///
/// It owns all I/O against the store and the loader: lookups that absorb
/// store failures, synchronous and background loads, the failure policy and
/// guarded writes. Cloning is cheap; every field is shared.
pub(crate) struct Engine<V> {
  pub(crate) store: Arc<dyn Store<V>>,
  pub(crate) coordinator: ReloadCoordinator,
  pub(crate) metrics: Arc<Metrics>,
}

impl<V> Clone for Engine<V> {
  fn clone(&self) -> Self {
    Self {
      store: self.store.clone(),
      coordinator: self.coordinator.clone(),
      metrics: self.metrics.clone(),
    }
  }
}

impl<V> fmt::Debug for Engine<V> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("Engine")
      .field("coordinator", &self.coordinator)
      .field("metrics", &self.metrics.snapshot())
      .finish_non_exhaustive()
  }
}

fn log_store_error(metrics: &Metrics, op: &'static str, key: &str, err: &StoreError) {
  Metrics::incr(&metrics.store_errors);
  tracing::warn!(key, op, error = %ErrorChain(err), "store operation failed, continuing without it");
}

impl<V: Send + Sync + 'static> Engine<V> {
  pub(crate) fn new(store: Arc<dyn Store<V>>, coordinator: ReloadCoordinator, metrics: Arc<Metrics>) -> Self {
    Self {
      store,
      coordinator,
      metrics,
    }
  }

  /// Reads the current entry. Store failures read as a miss, and hard-expired
  /// entries are evicted and read as a miss.
  pub(crate) fn lookup(&self, key: &str) -> Option<Arc<CacheEntry<V>>> {
    match self.store.get(key) {
      Ok(Some(entry)) if entry.is_hard_expired() => {
        // Best effort: without a conditional remove on the store, a reload
        // that lands between the read and the remove is evicted with it and
        // loaded again by the next caller.
        tracing::debug!(key, "evicting hard-expired entry");
        if let Err(err) = self.store.remove(key) {
          log_store_error(&self.metrics, "remove", key, &err);
        }
        None
      }
      Ok(entry) => entry,
      Err(err) => {
        log_store_error(&self.metrics, "get", key, &err);
        None
      }
    }
  }

  /// Writes `entry`, returning whether the store accepted it.
  ///
  /// When `load_started` is given, the write is skipped if the store already
  /// holds an entry created after that instant: a slower load never replaces
  /// the result of one that started later and finished first. Values carried
  /// over by a failed load never hold off a successful one.
  pub(crate) fn put(&self, key: &str, entry: CacheEntry<V>, load_started: Option<Duration>) -> bool {
    if let Some(started) = load_started {
      if let Ok(Some(current)) = self.store.get(key) {
        if current.since() > started && !current.is_carried_over() {
          Metrics::incr(&self.metrics.writes_superseded);
          tracing::debug!(key, "store holds a newer entry, skipping write");
          return false;
        }
      }
    }

    let hint = entry.expires_in();
    match self.store.set(key, Arc::new(entry), hint) {
      Ok(accepted) => {
        if accepted {
          Metrics::incr(&self.metrics.writes);
        }
        accepted
      }
      Err(err) => {
        log_store_error(&self.metrics, "set", key, &err);
        false
      }
    }
  }

  pub(crate) fn remove(&self, key: &str) -> bool {
    self.store.remove(key).unwrap_or_else(|err| {
      log_store_error(&self.metrics, "remove", key, &err);
      false
    })
  }

  pub(crate) fn clear(&self) {
    if let Err(err) = self.store.clear() {
      log_store_error(&self.metrics, "clear", "*", &err);
    }
  }

  /// Loads on the caller's thread.
  pub(crate) fn load_inline(
    &self,
    request: &CacheRequest<V>,
    stale: Option<Arc<CacheEntry<V>>>,
  ) -> Result<Option<Arc<V>>, Error> {
    Metrics::incr(&self.metrics.sync_loads);
    self.run_loader(request, stale, Invocation::Sync)
  }

  /// Hands a reload of `request` to the coordinator.
  pub(crate) fn dispatch(&self, request: &CacheRequest<V>, stale: Option<Arc<CacheEntry<V>>>) -> ReloadStart {
    let engine = self.clone();
    let owned = request.clone();
    let outcome = self.coordinator.start_reload(request.key(), move || {
      engine.load_in_background(&owned, stale);
    });

    match outcome {
      ReloadStart::Started => Metrics::incr(&self.metrics.reloads_started),
      ReloadStart::AlreadyInFlight => Metrics::incr(&self.metrics.reloads_deduplicated),
      ReloadStart::Rejected(_) => Metrics::incr(&self.metrics.reloads_rejected),
    }
    outcome
  }

  fn load_in_background(&self, request: &CacheRequest<V>, stale: Option<Arc<CacheEntry<V>>>) {
    Metrics::incr(&self.metrics.background_loads);
    if let Err(err) = self.run_loader(request, stale, Invocation::Background) {
      // Nobody is waiting on a background load.
      tracing::debug!(key = request.key(), error = %err, "dropping background load failure");
    }
  }

  fn run_loader(
    &self,
    request: &CacheRequest<V>,
    stale: Option<Arc<CacheEntry<V>>>,
    invocation: Invocation,
  ) -> Result<Option<Arc<V>>, Error> {
    let started = time::now_duration();
    let ctx = LoadContext {
      request,
      stale: stale.as_deref(),
      invocation,
    };

    match request.loader().load(&ctx) {
      Ok(result) => {
        let value = Arc::new(result.value);
        if result.cacheable {
          let entry = CacheEntry::stamped(value.clone(), request.hard_ttl(), request.soft_ttl());
          self.put(request.key(), entry, Some(started));
        }
        request.mark_refreshed();
        Ok(Some(value))
      }
      Err(err) => {
        Metrics::incr(&self.metrics.load_failures);
        self.recover(request, stale, err, invocation, started)
      }
    }
  }

  /// Applies the request's failure policy to a loader error.
  fn recover(
    &self,
    request: &CacheRequest<V>,
    stale: Option<Arc<CacheEntry<V>>>,
    err: LoadError,
    invocation: Invocation,
    started: Duration,
  ) -> Result<Option<Arc<V>>, Error> {
    let on_failure = request.policy().select(invocation, stale.is_some());
    let key = request.key();

    match on_failure.log {
      LogAction::None => {}
      LogAction::Message => tracing::warn!(
        key,
        mode = %request.mode(),
        background = invocation.is_background(),
        error = %err,
        "loader failed"
      ),
      LogAction::FullStack => tracing::warn!(
        key,
        mode = %request.mode(),
        background = invocation.is_background(),
        error = %ErrorChain(err.as_ref()),
        "loader failed"
      ),
    }

    // Only a stale value can be written back; a miss has nothing to cache.
    // Guarded like a successful load's write.
    if let Some(stale) = &stale {
      match on_failure.cache {
        CacheOnError::DontCache => {}
        CacheOnError::CacheExpired => {
          self.put(key, stale.restamped_expired(request.hard_ttl()), Some(started));
        }
        CacheOnError::CacheFresh => {
          self.put(key, stale.restamped_fresh(request.hard_ttl(), request.soft_ttl()), Some(started));
          request.mark_refreshed();
        }
      }
    }

    match on_failure.fallback {
      Fallback::Propagate => Err(Error::Load {
        key: key.to_owned(),
        source: err,
      }),
      Fallback::ReturnNone => Ok(None),
      Fallback::ReturnStale => Ok(stale.map(|entry| entry.value())),
    }
  }
}
