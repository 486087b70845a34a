use crate::error::ConfigError;

use core::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::thread::{self, JoinHandle};

use fibre::mpmc;
use fibre::TrySendError;
use parking_lot::Mutex;
use thiserror::Error;

/// A unit of background work: one reload.
pub type Task = Box<dyn FnOnce() + Send + 'static>;

/// Why an executor declined a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum Rejected {
  /// The executor is at capacity. The task may be retried later.
  #[error("executor is saturated")]
  Saturated,
  /// The executor has shut down.
  #[error("executor is shut down")]
  Shutdown,
}

/// A bounded pool that runs background reloads.
///
/// `execute` must not block: when the pool is full it returns
/// [`Rejected::Saturated`] and the task is dropped.
pub trait Executor: Send + Sync + 'static {
  fn execute(&self, task: Task) -> Result<(), Rejected>;
}

/// Default number of queued reloads a [`WorkerPool`] accepts.
pub const DEFAULT_QUEUE_CAPACITY: usize = 1024;

/// A fixed set of worker threads fed by a bounded MPMC queue.
///
/// Dropping the pool closes the queue. Workers finish the tasks already
/// queued and then exit.
pub struct WorkerPool {
  sender: mpmc::Sender<Task>,
  workers: Mutex<Vec<JoinHandle<()>>>,
  capacity: usize,
}

impl fmt::Debug for WorkerPool {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("WorkerPool")
      .field("workers", &self.workers.lock().len())
      .field("capacity", &self.capacity)
      .field("queued", &self.sender.len())
      .finish()
  }
}

impl WorkerPool {
  /// Spawns `workers` threads sharing a queue of `queue_capacity` tasks.
  pub fn new(workers: usize, queue_capacity: usize) -> Result<Self, ConfigError> {
    if workers == 0 {
      return Err(ConfigError::ZeroWorkers);
    }
    if queue_capacity == 0 {
      return Err(ConfigError::ZeroQueueCapacity);
    }

    let (sender, receiver) = mpmc::bounded::<Task>(queue_capacity);
    let mut handles = Vec::with_capacity(workers);
    for index in 0..workers {
      let receiver = receiver.clone();
      let spawned = thread::Builder::new()
        .name(format!("fibre-refresh-worker-{index}"))
        .spawn(move || {
          // Ends once every sender is gone and the queue is drained.
          while let Ok(task) = receiver.recv() {
            if panic::catch_unwind(AssertUnwindSafe(task)).is_err() {
              tracing::error!("background reload panicked");
            }
          }
        });

      match spawned {
        Ok(handle) => handles.push(handle),
        Err(err) => tracing::warn!(error = %err, index, "failed to spawn refresh worker"),
      }
    }

    if handles.is_empty() {
      return Err(ConfigError::ZeroWorkers);
    }

    Ok(Self {
      sender,
      workers: Mutex::new(handles),
      capacity: queue_capacity,
    })
  }

  /// Number of tasks waiting for a worker.
  pub fn queued(&self) -> usize {
    self.sender.len()
  }

  /// Closes the queue and waits for the workers to drain it.
  pub fn shutdown(&self) {
    let _ = self.sender.close();
    let handles: Vec<_> = self.workers.lock().drain(..).collect();
    let current = thread::current().id();
    for handle in handles {
      // A worker cannot join itself.
      if handle.thread().id() == current {
        continue;
      }
      if handle.join().is_err() {
        tracing::warn!("refresh worker exited with a panic");
      }
    }
  }
}

impl Executor for WorkerPool {
  fn execute(&self, task: Task) -> Result<(), Rejected> {
    match self.sender.try_send(task) {
      Ok(()) => Ok(()),
      Err(TrySendError::Full(_)) => Err(Rejected::Saturated),
      Err(_) => Err(Rejected::Shutdown),
    }
  }
}

impl Drop for WorkerPool {
  fn drop(&mut self) {
    // Closing the queue lets each worker exit after draining it.
    let _ = self.sender.close();
  }
}

/// Runs reloads on Tokio's blocking thread pool.
///
/// Tokio bounds that pool itself, so this executor never reports saturation.
#[cfg(feature = "tokio")]
#[derive(Debug, Clone)]
pub struct TokioExecutor(tokio::runtime::Handle);

#[cfg(feature = "tokio")]
impl TokioExecutor {
  /// Creates an executor that uses the current Tokio runtime context.
  /// Panics if called outside of a Tokio runtime.
  pub fn new() -> Self {
    Self(tokio::runtime::Handle::current())
  }

  pub fn from_handle(handle: tokio::runtime::Handle) -> Self {
    Self(handle)
  }
}

#[cfg(feature = "tokio")]
impl Executor for TokioExecutor {
  fn execute(&self, task: Task) -> Result<(), Rejected> {
    drop(self.0.spawn_blocking(task));
    Ok(())
  }
}
