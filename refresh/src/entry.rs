use crate::error::ConfigError;
use crate::time;

use std::sync::Arc;
use std::time::Duration;

/// An immutable cached value together with its creation time and two TTLs.
///
/// An entry is *soft-expired* once `soft_ttl` has elapsed since it was
/// created: it may still be served, but should be refreshed. It is
/// *hard-expired* once `hard_ttl` has elapsed: it must not be served at all.
///
/// Entries are never mutated. A refresh produces a new `CacheEntry` which
/// replaces the old one in the [`Store`](crate::store::Store).
#[derive(Debug)]
pub struct CacheEntry<V> {
  value: Arc<V>,
  /// Creation time as a `Duration` since the engine epoch.
  since: Duration,
  hard_ttl: Duration,
  soft_ttl: Duration,
  /// Set when a failed load wrote the previous value back. Such an entry is
  /// newer than the load that produced it and must not hold off a successful
  /// load that started earlier.
  carried_over: bool,
}

impl<V> Clone for CacheEntry<V> {
  fn clone(&self) -> Self {
    Self {
      value: self.value.clone(),
      since: self.since,
      hard_ttl: self.hard_ttl,
      soft_ttl: self.soft_ttl,
      carried_over: self.carried_over,
    }
  }
}

/// Checks the TTL ordering contract shared by entries and requests.
pub(crate) fn validate_ttls(hard_ttl: Duration, soft_ttl: Duration) -> Result<(), ConfigError> {
  if hard_ttl < MIN_HARD_TTL {
    return Err(ConfigError::ZeroHardTtl);
  }
  if soft_ttl > hard_ttl {
    return Err(ConfigError::SoftTtlExceedsHardTtl {
      soft: soft_ttl,
      hard: hard_ttl,
    });
  }
  Ok(())
}

/// The smallest hard TTL an entry may carry.
pub const MIN_HARD_TTL: Duration = Duration::from_millis(1);

impl<V> CacheEntry<V> {
  /// Creates an entry stamped with the current time.
  ///
  /// Fails if `hard_ttl` is shorter than [`MIN_HARD_TTL`] or if
  /// `soft_ttl > hard_ttl`.
  pub fn new(value: V, hard_ttl: Duration, soft_ttl: Duration) -> Result<Self, ConfigError> {
    Self::from_arc(Arc::new(value), hard_ttl, soft_ttl)
  }

  /// Creates an entry around an already shared value.
  pub fn from_arc(value: Arc<V>, hard_ttl: Duration, soft_ttl: Duration) -> Result<Self, ConfigError> {
    validate_ttls(hard_ttl, soft_ttl)?;
    Ok(Self::stamped(value, hard_ttl, soft_ttl))
  }

  /// Stamps an entry with TTLs that were already validated (by a request).
  pub(crate) fn stamped(value: Arc<V>, hard_ttl: Duration, soft_ttl: Duration) -> Self {
    Self {
      value,
      since: time::now_duration(),
      hard_ttl,
      soft_ttl,
      carried_over: false,
    }
  }

  /// Returns a clone of the `Arc` containing the value.
  #[inline]
  pub fn value(&self) -> Arc<V> {
    self.value.clone()
  }

  /// Borrows the value without touching the reference count.
  #[inline]
  pub fn value_ref(&self) -> &V {
    &self.value
  }

  /// Creation time, measured from the engine's monotonic epoch.
  #[inline]
  pub fn since(&self) -> Duration {
    self.since
  }

  #[inline]
  pub fn hard_ttl(&self) -> Duration {
    self.hard_ttl
  }

  #[inline]
  pub fn soft_ttl(&self) -> Duration {
    self.soft_ttl
  }

  /// Time elapsed since the entry was created.
  #[inline]
  pub fn age(&self) -> Duration {
    time::now_duration().saturating_sub(self.since)
  }

  /// `true` once `now > since + soft_ttl`.
  #[inline]
  pub fn is_soft_expired(&self) -> bool {
    self.age() > self.soft_ttl
  }

  /// `true` once `now > since + hard_ttl`. Implies [`is_soft_expired`](Self::is_soft_expired).
  #[inline]
  pub fn is_hard_expired(&self) -> bool {
    self.age() > self.hard_ttl
  }

  /// Remaining time until hard expiry, or `None` if already past it.
  ///
  /// Stores may pass this to their backend as a native expiry hint.
  pub fn expires_in(&self) -> Option<Duration> {
    self.hard_ttl.checked_sub(self.age()).filter(|d| !d.is_zero())
  }

  /// `true` if the entry re-stores a previous value after a failed load.
  #[inline]
  pub(crate) fn is_carried_over(&self) -> bool {
    self.carried_over
  }

  /// Builds a replacement entry that serves the same value but is stale from
  /// the moment it is written.
  pub(crate) fn restamped_expired(&self, hard_ttl: Duration) -> Self {
    self.carry_over(hard_ttl, Duration::ZERO)
  }

  /// Builds a replacement entry that serves the same value as if it had just
  /// been loaded.
  pub(crate) fn restamped_fresh(&self, hard_ttl: Duration, soft_ttl: Duration) -> Self {
    self.carry_over(hard_ttl, soft_ttl)
  }

  fn carry_over(&self, hard_ttl: Duration, soft_ttl: Duration) -> Self {
    Self {
      carried_over: true,
      ..Self::stamped(self.value.clone(), hard_ttl, soft_ttl)
    }
  }
}
