use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use crossbeam_utils::CachePadded;

/// A thread-safe, internal metrics collector for the engine.
/// All fields are atomic to allow for lock-free updates.
#[derive(Debug)]
pub struct Metrics {
  // --- Lookups ---
  pub(crate) fresh_hits: CachePadded<AtomicU64>,
  pub(crate) stale_hits: CachePadded<AtomicU64>,
  pub(crate) misses: CachePadded<AtomicU64>,

  // --- Loads ---
  pub(crate) sync_loads: CachePadded<AtomicU64>,
  pub(crate) background_loads: CachePadded<AtomicU64>,
  pub(crate) load_failures: CachePadded<AtomicU64>,

  // --- Reload coordination ---
  pub(crate) reloads_started: CachePadded<AtomicU64>,
  pub(crate) reloads_deduplicated: CachePadded<AtomicU64>,
  pub(crate) reloads_rejected: CachePadded<AtomicU64>,

  // --- Store ---
  pub(crate) writes: CachePadded<AtomicU64>,
  pub(crate) writes_superseded: CachePadded<AtomicU64>,
  pub(crate) store_errors: CachePadded<AtomicU64>,

  // --- Scheduler ---
  pub(crate) scheduler_ticks: CachePadded<AtomicU64>,

  created_at: Instant,
}

impl Default for Metrics {
  fn default() -> Self {
    Self {
      fresh_hits: CachePadded::new(AtomicU64::new(0)),
      stale_hits: CachePadded::new(AtomicU64::new(0)),
      misses: CachePadded::new(AtomicU64::new(0)),
      sync_loads: CachePadded::new(AtomicU64::new(0)),
      background_loads: CachePadded::new(AtomicU64::new(0)),
      load_failures: CachePadded::new(AtomicU64::new(0)),
      reloads_started: CachePadded::new(AtomicU64::new(0)),
      reloads_deduplicated: CachePadded::new(AtomicU64::new(0)),
      reloads_rejected: CachePadded::new(AtomicU64::new(0)),
      writes: CachePadded::new(AtomicU64::new(0)),
      writes_superseded: CachePadded::new(AtomicU64::new(0)),
      store_errors: CachePadded::new(AtomicU64::new(0)),
      scheduler_ticks: CachePadded::new(AtomicU64::new(0)),
      created_at: Instant::now(),
    }
  }
}

impl Metrics {
  pub(crate) fn new() -> Self {
    Self::default()
  }

  #[inline]
  pub(crate) fn incr(counter: &AtomicU64) {
    counter.fetch_add(1, Ordering::Relaxed);
  }

  /// Creates a point-in-time snapshot of the current metrics.
  pub(crate) fn snapshot(&self) -> MetricsSnapshot {
    let fresh_hits = self.fresh_hits.load(Ordering::Relaxed);
    let stale_hits = self.stale_hits.load(Ordering::Relaxed);
    let misses = self.misses.load(Ordering::Relaxed);
    let total_lookups = fresh_hits + stale_hits + misses;

    MetricsSnapshot {
      fresh_hits,
      stale_hits,
      misses,
      hit_ratio: if total_lookups == 0 {
        0.0
      } else {
        (fresh_hits + stale_hits) as f64 / total_lookups as f64
      },
      sync_loads: self.sync_loads.load(Ordering::Relaxed),
      background_loads: self.background_loads.load(Ordering::Relaxed),
      load_failures: self.load_failures.load(Ordering::Relaxed),
      reloads_started: self.reloads_started.load(Ordering::Relaxed),
      reloads_deduplicated: self.reloads_deduplicated.load(Ordering::Relaxed),
      reloads_rejected: self.reloads_rejected.load(Ordering::Relaxed),
      writes: self.writes.load(Ordering::Relaxed),
      writes_superseded: self.writes_superseded.load(Ordering::Relaxed),
      store_errors: self.store_errors.load(Ordering::Relaxed),
      scheduler_ticks: self.scheduler_ticks.load(Ordering::Relaxed),
      uptime_secs: self.created_at.elapsed().as_secs(),
    }
  }
}

/// A point-in-time, public-facing snapshot of the engine's metrics.
#[derive(Clone)]
pub struct MetricsSnapshot {
  /// Lookups served from a value that was not soft-expired.
  pub fresh_hits: u64,
  /// Lookups that found a soft-expired (stale) value.
  pub stale_hits: u64,
  /// Lookups that found nothing usable.
  pub misses: u64,
  /// (fresh + stale) / all lookups.
  pub hit_ratio: f64,
  /// Loads run on a caller's thread.
  pub sync_loads: u64,
  /// Loads run on the worker pool.
  pub background_loads: u64,
  /// Loader invocations that returned an error.
  pub load_failures: u64,
  /// Background reloads handed to the executor.
  pub reloads_started: u64,
  /// Background reloads dropped because one was already in flight.
  pub reloads_deduplicated: u64,
  /// Background reloads the executor refused.
  pub reloads_rejected: u64,
  /// Entries written to the store.
  pub writes: u64,
  /// Writes skipped because the store already held a newer entry.
  pub writes_superseded: u64,
  /// Store operations that failed and were absorbed.
  pub store_errors: u64,
  /// Completed scheduler scans.
  pub scheduler_ticks: u64,
  /// The number of seconds the cache has been running.
  pub uptime_secs: u64,
}

impl fmt::Debug for MetricsSnapshot {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("MetricsSnapshot")
      .field("fresh_hits", &self.fresh_hits)
      .field("stale_hits", &self.stale_hits)
      .field("misses", &self.misses)
      .field("hit_ratio", &format!("{:.2}%", self.hit_ratio * 100.0))
      .field("sync_loads", &self.sync_loads)
      .field("background_loads", &self.background_loads)
      .field("load_failures", &self.load_failures)
      .field("reloads_started", &self.reloads_started)
      .field("reloads_deduplicated", &self.reloads_deduplicated)
      .field("reloads_rejected", &self.reloads_rejected)
      .field("writes", &self.writes)
      .field("writes_superseded", &self.writes_superseded)
      .field("store_errors", &self.store_errors)
      .field("scheduler_ticks", &self.scheduler_ticks)
      .field("uptime_secs", &self.uptime_secs)
      .finish()
  }
}
