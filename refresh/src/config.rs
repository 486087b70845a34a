//! Deserializable settings for building a [`RefreshCache`](crate::RefreshCache)
//! from a configuration file.

use crate::runtime::DEFAULT_QUEUE_CAPACITY;
use crate::task::scheduler::MIN_POLL_INTERVAL;

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Sizing and timing knobs for a cache, loadable with any serde format.
///
/// Durations use human-readable strings such as `"1s"` or `"500ms"`.
/// Missing fields fall back to the same defaults as
/// [`RefreshCacheBuilder::new`](crate::RefreshCacheBuilder::new).
#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct RefreshConfig {
  /// How often the scheduler scans its registered requests.
  #[serde(with = "humantime_serde")]
  pub poll_interval: Duration,

  /// Threads in the built-in worker pool.
  pub workers: usize,

  /// Background reloads queued before new ones are rejected.
  pub queue_capacity: usize,
}

impl Default for RefreshConfig {
  fn default() -> Self {
    Self {
      poll_interval: MIN_POLL_INTERVAL,
      workers: num_cpus::get().max(1),
      queue_capacity: DEFAULT_QUEUE_CAPACITY,
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::{ConfigError, RefreshCacheBuilder};

  #[test]
  fn parses_humantime_durations() {
    let config: RefreshConfig =
      serde_json::from_str(r#"{"poll_interval": "5s", "workers": 3, "queue_capacity": 16}"#).unwrap();
    assert_eq!(config.poll_interval, Duration::from_secs(5));
    assert_eq!(config.workers, 3);
    assert_eq!(config.queue_capacity, 16);
  }

  #[test]
  fn missing_fields_use_defaults() {
    let config: RefreshConfig = serde_json::from_str(r#"{"workers": 2}"#).unwrap();
    assert_eq!(config.poll_interval, MIN_POLL_INTERVAL);
    assert_eq!(config.queue_capacity, DEFAULT_QUEUE_CAPACITY);
    assert_eq!(config.workers, 2);
  }

  #[test]
  fn builder_validates_loaded_config() {
    let config: RefreshConfig = serde_json::from_str(r#"{"poll_interval": "100ms", "workers": 1}"#).unwrap();
    let err = RefreshCacheBuilder::<u32>::from_config(&config).build().unwrap_err();
    assert_eq!(err, ConfigError::PollIntervalTooShort(Duration::from_millis(100)));
  }
}
