//! Data-only description of what to do when a loader fails.
//!
//! A [`FailurePolicy`] holds one [`OnFailure`] per combination of
//! *missing* (no stale value) / *expired* (stale value available) and
//! *synchronous* (caller's thread) / *background* (worker pool) invocation.

use crate::error::ConfigError;

/// How a loader failure is logged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum LogAction {
  /// Stay silent.
  None,
  /// Log the top-level error message only.
  Message,
  /// Log the error along with its full `source()` chain.
  FullStack,
}

/// What the caller receives when the loader fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum Fallback {
  /// Wrap the failure and return it to the caller.
  ///
  /// Background loads have no caller, so there the failure is dropped after
  /// logging.
  Propagate,
  /// Return no value.
  ReturnNone,
  /// Return the stale value. Only valid for the expired case.
  ReturnStale,
}

/// Whether the stale value is written back to the store on failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum CacheOnError {
  DontCache,
  /// Re-store the stale value stamped as already soft-expired, extending its
  /// hard lifetime while keeping it eligible for refresh.
  CacheExpired,
  /// Re-store the stale value as if it were freshly loaded.
  CacheFresh,
}

/// The reaction to a single kind of failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub struct OnFailure {
  pub log: LogAction,
  pub fallback: Fallback,
  pub cache: CacheOnError,
}

impl OnFailure {
  pub const fn new(log: LogAction, fallback: Fallback, cache: CacheOnError) -> Self {
    Self {
      log,
      fallback,
      cache,
    }
  }
}

/// Whether a load runs on the caller's thread or on the worker pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Invocation {
  Sync,
  Background,
}

impl Invocation {
  #[inline]
  pub fn is_background(self) -> bool {
    matches!(self, Invocation::Background)
  }
}

/// The full failure matrix for one cache request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct FailurePolicy {
  pub sync_missing: OnFailure,
  pub sync_expired: OnFailure,
  pub background_missing: OnFailure,
  pub background_expired: OnFailure,
}

impl Default for FailurePolicy {
  fn default() -> Self {
    Self {
      sync_missing: OnFailure::new(LogAction::None, Fallback::Propagate, CacheOnError::DontCache),
      sync_expired: OnFailure::new(
        LogAction::Message,
        Fallback::ReturnStale,
        CacheOnError::DontCache,
      ),
      background_missing: OnFailure::new(
        LogAction::FullStack,
        Fallback::ReturnNone,
        CacheOnError::DontCache,
      ),
      background_expired: OnFailure::new(
        LogAction::FullStack,
        Fallback::ReturnStale,
        CacheOnError::DontCache,
      ),
    }
  }
}

impl FailurePolicy {
  /// Selects the entry of the matrix for this invocation.
  pub fn select(&self, invocation: Invocation, has_stale: bool) -> OnFailure {
    match (invocation, has_stale) {
      (Invocation::Sync, false) => self.sync_missing,
      (Invocation::Sync, true) => self.sync_expired,
      (Invocation::Background, false) => self.background_missing,
      (Invocation::Background, true) => self.background_expired,
    }
  }

  pub fn with_sync_missing(mut self, on_failure: OnFailure) -> Self {
    self.sync_missing = on_failure;
    self
  }

  pub fn with_sync_expired(mut self, on_failure: OnFailure) -> Self {
    self.sync_expired = on_failure;
    self
  }

  pub fn with_background_missing(mut self, on_failure: OnFailure) -> Self {
    self.background_missing = on_failure;
    self
  }

  pub fn with_background_expired(mut self, on_failure: OnFailure) -> Self {
    self.background_expired = on_failure;
    self
  }

  /// Rejects matrices that ask for a stale value where none can exist.
  pub fn validate(&self) -> Result<(), ConfigError> {
    for missing in [self.sync_missing, self.background_missing] {
      if missing.fallback == Fallback::ReturnStale {
        return Err(ConfigError::StaleFallbackWithoutStaleValue);
      }
    }
    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn default_matrix_matches_recommended_policy() {
    let policy = FailurePolicy::default();
    assert!(policy.validate().is_ok());

    let sync_missing = policy.select(Invocation::Sync, false);
    assert_eq!(sync_missing.fallback, Fallback::Propagate);
    assert_eq!(sync_missing.cache, CacheOnError::DontCache);

    let sync_expired = policy.select(Invocation::Sync, true);
    assert_eq!(sync_expired.log, LogAction::Message);
    assert_eq!(sync_expired.fallback, Fallback::ReturnStale);

    let bg_missing = policy.select(Invocation::Background, false);
    assert_eq!(bg_missing.log, LogAction::FullStack);
    assert_eq!(bg_missing.fallback, Fallback::ReturnNone);

    let bg_expired = policy.select(Invocation::Background, true);
    assert_eq!(bg_expired.log, LogAction::FullStack);
    assert_eq!(bg_expired.fallback, Fallback::ReturnStale);
  }

  #[test]
  fn stale_fallback_is_rejected_for_missing_case() {
    let policy = FailurePolicy::default().with_background_missing(OnFailure::new(
      LogAction::Message,
      Fallback::ReturnStale,
      CacheOnError::DontCache,
    ));
    assert_eq!(
      policy.validate(),
      Err(ConfigError::StaleFallbackWithoutStaleValue)
    );
  }
}
