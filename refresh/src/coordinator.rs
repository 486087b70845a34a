use crate::runtime::{Executor, Rejected};

use core::fmt;
use std::sync::Arc;

use ahash::{HashSet, HashSetExt};
use parking_lot::Mutex;

/// What [`ReloadCoordinator::start_reload`] did with a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ReloadStart {
  /// The reload was handed to the executor.
  Started,
  /// A reload for the same key is already in flight; nothing was queued.
  AlreadyInFlight,
  /// The executor declined the task. The key is free to be retried.
  Rejected(Rejected),
}

/// Releases a key's in-flight mark when dropped, whether the reload finished,
/// failed, panicked or was never run at all.
struct InFlightGuard {
  in_flight: Arc<Mutex<HashSet<String>>>,
  key: String,
}

impl Drop for InFlightGuard {
  fn drop(&mut self) {
    self.in_flight.lock().remove(&self.key);
  }
}

/// Ensures at most one background reload per key is in flight.
///
/// Requests arriving while a key is reloading are dropped rather than queued;
/// their callers keep whatever the store already holds. Both caller-triggered
/// and scheduler-triggered reloads go through the same coordinator.
#[derive(Clone)]
pub(crate) struct ReloadCoordinator {
  in_flight: Arc<Mutex<HashSet<String>>>,
  executor: Arc<dyn Executor>,
}

impl fmt::Debug for ReloadCoordinator {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("ReloadCoordinator")
      .field("in_flight", &self.in_flight())
      .finish_non_exhaustive()
  }
}

impl ReloadCoordinator {
  pub(crate) fn new(executor: Arc<dyn Executor>) -> Self {
    Self {
      in_flight: Arc::new(Mutex::new(HashSet::new())),
      executor,
    }
  }

  /// Submits `reload` for `key` unless one is already running.
  ///
  /// The check and the mark happen under one lock acquisition.
  pub(crate) fn start_reload<F>(&self, key: &str, reload: F) -> ReloadStart
  where
    F: FnOnce() + Send + 'static,
  {
    {
      let mut in_flight = self.in_flight.lock();
      if !in_flight.insert(key.to_owned()) {
        tracing::debug!(key, "reload already in flight, dropping request");
        return ReloadStart::AlreadyInFlight;
      }
    }

    let guard = InFlightGuard {
      in_flight: self.in_flight.clone(),
      key: key.to_owned(),
    };

    // A rejected task is dropped by the executor, and the guard inside goes
    // with it, releasing the mark.
    let task = Box::new(move || {
      let _guard = guard;
      reload();
    });

    match self.executor.execute(task) {
      Ok(()) => ReloadStart::Started,
      Err(rejected) => {
        tracing::warn!(key, reason = %rejected, "background reload not started");
        ReloadStart::Rejected(rejected)
      }
    }
  }

  pub(crate) fn is_reloading(&self, key: &str) -> bool {
    self.in_flight.lock().contains(key)
  }

  pub(crate) fn in_flight(&self) -> usize {
    self.in_flight.lock().len()
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::runtime::{Task, WorkerPool};
  use std::sync::atomic::{AtomicUsize, Ordering};
  use std::sync::Barrier;
  use std::thread;
  use std::time::Duration;

  struct RejectingExecutor;

  impl Executor for RejectingExecutor {
    fn execute(&self, _task: Task) -> Result<(), Rejected> {
      Err(Rejected::Saturated)
    }
  }

  #[test]
  fn second_reload_for_same_key_is_dropped() {
    let pool = Arc::new(WorkerPool::new(2, 16).unwrap());
    let coordinator = ReloadCoordinator::new(pool.clone());
    let gate = Arc::new(Barrier::new(2));
    let runs = Arc::new(AtomicUsize::new(0));

    let (g, r) = (gate.clone(), runs.clone());
    assert_eq!(
      coordinator.start_reload("users", move || {
        g.wait();
        r.fetch_add(1, Ordering::SeqCst);
      }),
      ReloadStart::Started
    );
    assert!(coordinator.is_reloading("users"));

    let r = runs.clone();
    assert_eq!(
      coordinator.start_reload("users", move || {
        r.fetch_add(1, Ordering::SeqCst);
      }),
      ReloadStart::AlreadyInFlight
    );

    // A different key is independent.
    let r = runs.clone();
    assert_eq!(
      coordinator.start_reload("orders", move || {
        r.fetch_add(1, Ordering::SeqCst);
      }),
      ReloadStart::Started
    );

    gate.wait();
    pool.shutdown();
    assert_eq!(runs.load(Ordering::SeqCst), 2);
    assert_eq!(coordinator.in_flight(), 0);
  }

  #[test]
  fn mark_is_released_after_completion() {
    let pool = Arc::new(WorkerPool::new(1, 4).unwrap());
    let coordinator = ReloadCoordinator::new(pool.clone());

    assert_eq!(coordinator.start_reload("k", || {}), ReloadStart::Started);
    thread::sleep(Duration::from_millis(50));
    assert!(!coordinator.is_reloading("k"));
    assert_eq!(coordinator.start_reload("k", || {}), ReloadStart::Started);
    pool.shutdown();
  }

  #[test]
  fn mark_is_released_after_panic() {
    let pool = Arc::new(WorkerPool::new(1, 4).unwrap());
    let coordinator = ReloadCoordinator::new(pool.clone());

    coordinator.start_reload("k", || panic!("boom"));
    thread::sleep(Duration::from_millis(50));
    assert!(!coordinator.is_reloading("k"));
    pool.shutdown();
  }

  #[test]
  fn rejection_releases_the_mark() {
    let coordinator = ReloadCoordinator::new(Arc::new(RejectingExecutor));
    assert_eq!(
      coordinator.start_reload("k", || {}),
      ReloadStart::Rejected(Rejected::Saturated)
    );
    assert!(!coordinator.is_reloading("k"));
  }

  #[test]
  fn concurrent_triggers_start_one_reload() {
    let pool = Arc::new(WorkerPool::new(4, 64).unwrap());
    let coordinator = ReloadCoordinator::new(pool.clone());
    let started = Arc::new(AtomicUsize::new(0));
    let barrier = Arc::new(Barrier::new(16));

    let handles: Vec<_> = (0..16)
      .map(|_| {
        let coordinator = coordinator.clone();
        let started = started.clone();
        let barrier = barrier.clone();
        thread::spawn(move || {
          barrier.wait();
          let outcome = coordinator.start_reload("hot", || thread::sleep(Duration::from_millis(100)));
          if outcome == ReloadStart::Started {
            started.fetch_add(1, Ordering::SeqCst);
          }
        })
      })
      .collect();

    for handle in handles {
      handle.join().unwrap();
    }
    assert_eq!(started.load(Ordering::SeqCst), 1);
    pool.shutdown();
  }
}
