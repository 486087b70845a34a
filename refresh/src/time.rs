use once_cell::sync::Lazy;
use std::time::{Duration, Instant};

// The single, static reference point for all timestamps in the engine.
// It is initialized lazily on its first use.
static REFRESH_EPOCH: Lazy<Instant> = Lazy::new(Instant::now);

/// Converts an `Instant` into a `Duration` since the engine's epoch.
#[inline]
pub(crate) fn instant_to_duration(instant: Instant) -> Duration {
  instant.saturating_duration_since(*REFRESH_EPOCH)
}

/// A helper to get the current time as a `Duration` since the epoch.
#[inline]
pub(crate) fn now_duration() -> Duration {
  instant_to_duration(Instant::now())
}

/// Nanoseconds since the epoch, for timestamps kept in atomics.
#[inline]
pub(crate) fn now_nanos() -> u64 {
  now_duration().as_nanos() as u64
}
