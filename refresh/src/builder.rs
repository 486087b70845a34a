use crate::coordinator::ReloadCoordinator;
use crate::engine::Engine;
use crate::error::ConfigError;
use crate::handle::{RefreshCache, RefreshShared};
use crate::metrics::Metrics;
use crate::runtime::{Executor, WorkerPool, DEFAULT_QUEUE_CAPACITY};
use crate::store::{MemoryStore, Store};
use crate::task::scheduler::{Scheduler, MIN_POLL_INTERVAL};

use core::fmt;
use std::sync::Arc;
use std::time::Duration;

/// A builder for creating [`RefreshCache`] instances.
pub struct RefreshCacheBuilder<V> {
  store: Option<Arc<dyn Store<V>>>,
  executor: Option<Arc<dyn Executor>>,
  workers: usize,
  queue_capacity: usize,
  poll_interval: Duration,
}

// Manual Debug implementation for RefreshCacheBuilder.
impl<V> fmt::Debug for RefreshCacheBuilder<V> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("RefreshCacheBuilder")
      .field("has_store", &self.store.is_some())
      .field("has_executor", &self.executor.is_some())
      .field("workers", &self.workers)
      .field("queue_capacity", &self.queue_capacity)
      .field("poll_interval", &self.poll_interval)
      .finish()
  }
}

impl<V> Default for RefreshCacheBuilder<V> {
  fn default() -> Self {
    Self::new()
  }
}

impl<V> RefreshCacheBuilder<V> {
  /// Creates a new `RefreshCacheBuilder` with default settings.
  pub fn new() -> Self {
    Self {
      store: None,
      executor: None,
      workers: num_cpus::get().max(1),
      queue_capacity: DEFAULT_QUEUE_CAPACITY,
      poll_interval: MIN_POLL_INTERVAL,
    }
  }

  /// Sets the backing store. Defaults to a sharded [`MemoryStore`].
  pub fn store(mut self, store: Arc<dyn Store<V>>) -> Self {
    self.store = Some(store);
    self
  }

  /// Runs background reloads on `executor` instead of the built-in
  /// [`WorkerPool`]. `workers` and `queue_capacity` are then ignored.
  pub fn executor(mut self, executor: Arc<dyn Executor>) -> Self {
    self.executor = Some(executor);
    self
  }

  /// Number of threads in the built-in worker pool. Defaults to the number
  /// of logical CPUs.
  pub fn workers(mut self, workers: usize) -> Self {
    self.workers = workers;
    self
  }

  /// Number of reloads the built-in worker pool queues before rejecting
  /// new ones.
  pub fn queue_capacity(mut self, capacity: usize) -> Self {
    self.queue_capacity = capacity;
    self
  }

  /// How often the scheduler scans its registered requests.
  ///
  /// Must be at least [`MIN_POLL_INTERVAL`]; defaults to it.
  pub fn poll_interval(mut self, interval: Duration) -> Self {
    self.poll_interval = interval;
    self
  }

  /// Applies the sizing and timing settings of a loaded configuration.
  #[cfg(feature = "serde")]
  pub fn from_config(config: &crate::config::RefreshConfig) -> Self {
    Self::new()
      .workers(config.workers)
      .queue_capacity(config.queue_capacity)
      .poll_interval(config.poll_interval)
  }
}

impl<V: Send + Sync + 'static> RefreshCacheBuilder<V> {
  /// Builds the cache. No background thread is started until one is needed.
  pub fn build(self) -> Result<RefreshCache<V>, ConfigError> {
    if self.poll_interval < MIN_POLL_INTERVAL {
      return Err(ConfigError::PollIntervalTooShort(self.poll_interval));
    }

    let executor: Arc<dyn Executor> = match self.executor {
      Some(executor) => executor,
      None => Arc::new(WorkerPool::new(self.workers, self.queue_capacity)?),
    };
    let store = self
      .store
      .unwrap_or_else(|| Arc::new(MemoryStore::<V>::new()));

    let metrics = Arc::new(Metrics::new());
    let engine = Engine::new(store, ReloadCoordinator::new(executor), metrics);
    let scheduler = Scheduler::new(engine.clone(), self.poll_interval);

    Ok(RefreshCache {
      shared: Arc::new(RefreshShared { engine, scheduler }),
    })
  }
}
