use crate::entry::validate_ttls;
use crate::error::{ConfigError, LoadError};
use crate::loader::{LoadContext, LoadResult, Loader};
use crate::policy::FailurePolicy;
use crate::time;

use core::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// How a request is kept fresh, and who does the work.
///
/// | Mode        | Miss / hard-expired                  | Soft-expired hit                        |
/// |-------------|--------------------------------------|-----------------------------------------|
/// | `Block`     | load on the caller's thread          | load on the caller's thread             |
/// | `Return`    | load on the caller's thread          | return stale, reload in the background  |
/// | `Async`     | return nothing, reload in background | return stale, reload in the background  |
/// | `Scheduled` | return nothing, register with the scheduler | return stale, the scheduler refreshes it |
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum RefreshMode {
  Block,
  Return,
  Async,
  Scheduled,
}

impl fmt::Display for RefreshMode {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      RefreshMode::Block => write!(f, "block"),
      RefreshMode::Return => write!(f, "return"),
      RefreshMode::Async => write!(f, "async"),
      RefreshMode::Scheduled => write!(f, "scheduled"),
    }
  }
}

const DEFAULT_TTL: Duration = Duration::from_secs(60);

/// Describes one logical cached resource: its key, how to load it, how long
/// it stays fresh and usable, and how it is refreshed.
///
/// Clones share the same `last_refresh` timestamp, so a request handed to the
/// scheduler and the copy kept by the caller observe the same refresh state.
pub struct CacheRequest<V> {
  key: Arc<str>,
  loader: Arc<dyn Loader<V>>,
  hard_ttl: Duration,
  soft_ttl: Duration,
  mode: RefreshMode,
  policy: FailurePolicy,
  // Nanoseconds since the epoch of the last successful (or policy-permitted)
  // load. 0 means never.
  last_refresh: Arc<AtomicU64>,
}

impl<V> Clone for CacheRequest<V> {
  fn clone(&self) -> Self {
    Self {
      key: self.key.clone(),
      loader: self.loader.clone(),
      hard_ttl: self.hard_ttl,
      soft_ttl: self.soft_ttl,
      mode: self.mode,
      policy: self.policy,
      last_refresh: self.last_refresh.clone(),
    }
  }
}

impl<V> fmt::Debug for CacheRequest<V> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("CacheRequest")
      .field("key", &self.key)
      .field("hard_ttl", &self.hard_ttl)
      .field("soft_ttl", &self.soft_ttl)
      .field("mode", &self.mode)
      .field("last_refresh", &self.last_refresh())
      .finish_non_exhaustive()
  }
}

impl<V> CacheRequest<V> {
  /// Starts building a request for `key`, loaded by `loader`.
  ///
  /// Both TTLs default to one minute and the mode defaults to
  /// [`RefreshMode::Block`].
  pub fn builder<F>(key: impl Into<String>, loader: F) -> CacheRequestBuilder<V>
  where
    F: Fn(&LoadContext<'_, V>) -> Result<LoadResult<V>, LoadError> + Send + Sync + 'static,
  {
    Self::builder_with(key, Arc::new(loader))
  }

  /// Like [`builder`](Self::builder), for loaders implemented as a type.
  pub fn builder_with(key: impl Into<String>, loader: Arc<dyn Loader<V>>) -> CacheRequestBuilder<V> {
    CacheRequestBuilder {
      key: key.into(),
      loader,
      hard_ttl: DEFAULT_TTL,
      soft_ttl: DEFAULT_TTL,
      mode: RefreshMode::Block,
      policy: FailurePolicy::default(),
    }
  }

  #[inline]
  pub fn key(&self) -> &str {
    &self.key
  }

  #[inline]
  pub fn hard_ttl(&self) -> Duration {
    self.hard_ttl
  }

  #[inline]
  pub fn soft_ttl(&self) -> Duration {
    self.soft_ttl
  }

  #[inline]
  pub fn mode(&self) -> RefreshMode {
    self.mode
  }

  #[inline]
  pub fn policy(&self) -> &FailurePolicy {
    &self.policy
  }

  #[inline]
  pub(crate) fn loader(&self) -> &dyn Loader<V> {
    self.loader.as_ref()
  }

  /// Time of the last successful load, measured from the engine epoch.
  pub fn last_refresh(&self) -> Option<Duration> {
    match self.last_refresh.load(Ordering::Acquire) {
      0 => None,
      nanos => Some(Duration::from_nanos(nanos)),
    }
  }

  /// `true` if the request was never loaded or `now > last_refresh + soft_ttl`.
  pub fn is_refresh_due(&self) -> bool {
    match self.last_refresh() {
      None => true,
      Some(last) => time::now_duration().saturating_sub(last) > self.soft_ttl,
    }
  }

  pub(crate) fn mark_refreshed(&self) {
    // A zero reading would mean "never", so clamp to 1ns right after the epoch.
    self
      .last_refresh
      .store(time::now_nanos().max(1), Ordering::Release);
  }

  pub(crate) fn reset_last_refresh(&self) {
    self.last_refresh.store(0, Ordering::Release);
  }

  /// `true` if both values are clones of the same request.
  pub(crate) fn same_as(&self, other: &CacheRequest<V>) -> bool {
    Arc::ptr_eq(&self.last_refresh, &other.last_refresh)
  }
}

/// Builder for [`CacheRequest`]. All checks happen in [`build`](Self::build).
pub struct CacheRequestBuilder<V> {
  key: String,
  loader: Arc<dyn Loader<V>>,
  hard_ttl: Duration,
  soft_ttl: Duration,
  mode: RefreshMode,
  policy: FailurePolicy,
}

impl<V> fmt::Debug for CacheRequestBuilder<V> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("CacheRequestBuilder")
      .field("key", &self.key)
      .field("hard_ttl", &self.hard_ttl)
      .field("soft_ttl", &self.soft_ttl)
      .field("mode", &self.mode)
      .finish_non_exhaustive()
  }
}

impl<V> CacheRequestBuilder<V> {
  /// After this long an entry must not be served at all.
  pub fn hard_ttl(mut self, ttl: Duration) -> Self {
    self.hard_ttl = ttl;
    self
  }

  /// After this long an entry is stale and should be refreshed.
  pub fn soft_ttl(mut self, ttl: Duration) -> Self {
    self.soft_ttl = ttl;
    self
  }

  /// Sets both TTLs at once.
  pub fn ttl(self, hard: Duration, soft: Duration) -> Self {
    self.hard_ttl(hard).soft_ttl(soft)
  }

  pub fn mode(mut self, mode: RefreshMode) -> Self {
    self.mode = mode;
    self
  }

  pub fn failure_policy(mut self, policy: FailurePolicy) -> Self {
    self.policy = policy;
    self
  }

  pub fn build(self) -> Result<CacheRequest<V>, ConfigError> {
    if self.key.trim().is_empty() {
      return Err(ConfigError::BlankKey);
    }
    validate_ttls(self.hard_ttl, self.soft_ttl)?;
    self.policy.validate()?;

    Ok(CacheRequest {
      key: self.key.into(),
      loader: self.loader,
      hard_ttl: self.hard_ttl,
      soft_ttl: self.soft_ttl,
      mode: self.mode,
      policy: self.policy,
      last_refresh: Arc::new(AtomicU64::new(0)),
    })
  }
}
