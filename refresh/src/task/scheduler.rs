use crate::engine::Engine;
use crate::error::Error;
use crate::metrics::Metrics;
use crate::request::CacheRequest;

use std::fmt;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use ahash::{HashMap, HashMapExt};
use parking_lot::{Condvar, Mutex};

/// The shortest poll interval a scheduler accepts.
pub const MIN_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Lifecycle of the polling loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerState {
  /// No loop thread exists.
  Stopped,
  Running,
  /// `close()` was called; the loop exits after its current scan.
  Stopping,
}

struct Registration<V> {
  request: CacheRequest<V>,
  /// Scan count at registration time.
  registered_at_tick: u64,
}

struct Registry<V> {
  requests: HashMap<String, Registration<V>>,
  ticks: u64,
}

struct Control {
  state: SchedulerState,
  closed: bool,
}

/// The parts of the scheduler shared with its loop thread.
struct Shared<V> {
  engine: Engine<V>,
  registry: Mutex<Registry<V>>,
  control: Mutex<Control>,
  wake: Condvar,
  poll_interval: Duration,
}

/// Proactively refreshes requests registered in [`RefreshMode::Scheduled`].
///
/// The loop thread starts on the first registration, so a cache that never
/// schedules anything never runs one. Every `poll_interval` it scans the
/// registry and, for each request whose `last_refresh + soft_ttl` has
/// passed, asks the reload coordinator for a background reload.
///
/// [`RefreshMode::Scheduled`]: crate::RefreshMode::Scheduled
pub(crate) struct Scheduler<V> {
  shared: Arc<Shared<V>>,
  handle: Mutex<Option<JoinHandle<()>>>,
}

impl<V> fmt::Debug for Scheduler<V> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("Scheduler")
      .field("poll_interval", &self.shared.poll_interval)
      .field("state", &self.shared.control.lock().state)
      .field("registered", &self.shared.registry.lock().requests.len())
      .finish()
  }
}

impl<V: Send + Sync + 'static> Scheduler<V> {
  /// Creates a stopped scheduler. `poll_interval` is validated by the builder.
  pub(crate) fn new(engine: Engine<V>, poll_interval: Duration) -> Self {
    Self {
      shared: Arc::new(Shared {
        engine,
        registry: Mutex::new(Registry {
          requests: HashMap::new(),
          ticks: 0,
        }),
        control: Mutex::new(Control {
          state: SchedulerState::Stopped,
          closed: false,
        }),
        wake: Condvar::new(),
        poll_interval,
      }),
      handle: Mutex::new(None),
    }
  }

  pub(crate) fn state(&self) -> SchedulerState {
    self.shared.control.lock().state
  }

  pub(crate) fn is_registered(&self, key: &str) -> bool {
    self.shared.registry.lock().requests.contains_key(key)
  }

  pub(crate) fn keys(&self) -> Vec<String> {
    self.shared.registry.lock().requests.keys().cloned().collect()
  }

  /// Registers `request` unless its key is already registered.
  ///
  /// Returns `Ok(true)` if the request was added.
  pub(crate) fn register_if_absent(&self, request: &CacheRequest<V>) -> Result<bool, Error> {
    self.ensure_open(request.key())?;
    let added = {
      let mut registry = self.shared.registry.lock();
      if registry.requests.contains_key(request.key()) {
        false
      } else {
        let registered_at_tick = registry.ticks;
        registry.requests.insert(
          request.key().to_owned(),
          Registration {
            request: request.clone(),
            registered_at_tick,
          },
        );
        true
      }
    };
    if added {
      self.ensure_running();
    }
    Ok(added)
  }

  /// Registers `request`, replacing any request under the same key.
  ///
  /// A replacement starts with a reset refresh timestamp, so it is refreshed
  /// on the next scan. Registering again before the scheduler has scanned
  /// since the first registration is a no-op, as is re-registering the very
  /// same request.
  pub(crate) fn register(&self, request: &CacheRequest<V>) -> Result<bool, Error> {
    self.ensure_open(request.key())?;
    let changed = {
      let mut registry = self.shared.registry.lock();
      let ticks = registry.ticks;
      let replacing = match registry.requests.get(request.key()) {
        Some(existing) if existing.request.same_as(request) || existing.registered_at_tick == ticks => None,
        Some(_) => Some(true),
        None => Some(false),
      };

      match replacing {
        None => {
          tracing::debug!(key = request.key(), "request already registered, keeping it");
          false
        }
        Some(replacing) => {
          if replacing {
            request.reset_last_refresh();
          }
          registry.requests.insert(
            request.key().to_owned(),
            Registration {
              request: request.clone(),
              registered_at_tick: ticks,
            },
          );
          true
        }
      }
    };
    if changed {
      self.ensure_running();
    }
    Ok(changed)
  }

  pub(crate) fn unregister(&self, key: &str) -> bool {
    self.shared.registry.lock().requests.remove(key).is_some()
  }

  /// Makes the request under `key` due on the next scan.
  pub(crate) fn reset(&self, key: &str) {
    if let Some(registration) = self.shared.registry.lock().requests.get(key) {
      registration.request.reset_last_refresh();
    }
  }

  pub(crate) fn reset_all(&self) {
    for registration in self.shared.registry.lock().requests.values() {
      registration.request.reset_last_refresh();
    }
  }

  fn ensure_open(&self, key: &str) -> Result<(), Error> {
    if self.shared.control.lock().closed {
      tracing::debug!(key, "scheduler is closed, declining registration");
      return Err(Error::Closed);
    }
    Ok(())
  }

  /// Starts the loop thread if it is not running yet.
  fn ensure_running(&self) {
    let mut control = self.shared.control.lock();
    if control.closed || control.state != SchedulerState::Stopped {
      return;
    }

    let shared = self.shared.clone();
    let spawned = thread::Builder::new()
      .name("fibre-refresh-scheduler".into())
      .spawn(move || Self::run(shared));

    match spawned {
      Ok(handle) => {
        control.state = SchedulerState::Running;
        *self.handle.lock() = Some(handle);
        tracing::debug!(poll_interval = ?self.shared.poll_interval, "scheduler started");
      }
      Err(err) => {
        // Registrations stay; the next one retries the spawn.
        tracing::warn!(error = %err, "failed to spawn scheduler thread");
      }
    }
  }

  /// The loop body: sleep for the poll interval, then scan, until stopped.
  fn run(shared: Arc<Shared<V>>) {
    loop {
      {
        let mut control = shared.control.lock();
        let deadline = Instant::now() + shared.poll_interval;
        while control.state == SchedulerState::Running {
          if shared.wake.wait_until(&mut control, deadline).timed_out() {
            break;
          }
        }
        if control.state != SchedulerState::Running {
          break;
        }
      }

      Self::scan(&shared);
    }

    shared.control.lock().state = SchedulerState::Stopped;
    tracing::debug!("scheduler stopped");
  }

  /// Triggers a reload for every registered request that is due.
  ///
  /// Each request is handled on its own; a failure for one never stops the
  /// scan of the rest.
  fn scan(shared: &Shared<V>) {
    let due: Vec<CacheRequest<V>> = {
      let mut registry = shared.registry.lock();
      registry.ticks += 1;
      registry
        .requests
        .values()
        .filter(|registration| registration.request.is_refresh_due())
        .map(|registration| registration.request.clone())
        .collect()
    };

    for request in due {
      let stale = shared.engine.lookup(request.key());
      let outcome = shared.engine.dispatch(&request, stale);
      tracing::trace!(key = request.key(), ?outcome, "scheduled refresh");
    }

    Metrics::incr(&shared.engine.metrics.scheduler_ticks);
  }

  /// Stops the loop and declines further registrations. Idempotent.
  ///
  /// The loop is woken immediately and exits after any scan in progress.
  /// Reloads already handed to the executor are left to finish.
  pub(crate) fn close(&self) {
    {
      let mut control = self.shared.control.lock();
      if control.closed {
        return;
      }
      control.closed = true;
      if control.state == SchedulerState::Running {
        control.state = SchedulerState::Stopping;
      }
    }
    self.shared.wake.notify_all();

    if let Some(handle) = self.handle.lock().take() {
      if handle.thread().id() == thread::current().id() {
        return;
      }
      if handle.join().is_err() {
        tracing::warn!("scheduler thread exited with a panic");
      }
    }
  }
}

impl<V> Drop for Scheduler<V> {
  fn drop(&mut self) {
    // Mirrors `close` without the bounds; the loop exits on its own.
    let mut control = self.shared.control.lock();
    control.closed = true;
    if control.state == SchedulerState::Running {
      control.state = SchedulerState::Stopping;
    }
    drop(control);
    self.shared.wake.notify_all();
  }
}
