use crate::entry::CacheEntry;
use crate::error::LoadError;
use crate::policy::Invocation;
use crate::request::CacheRequest;

/// Everything a loader is told about the load it is asked to perform.
pub struct LoadContext<'a, V> {
  /// The request being refreshed.
  pub request: &'a CacheRequest<V>,
  /// The entry currently in the store, if any. Present for refreshes of
  /// soft-expired values, absent for misses.
  pub stale: Option<&'a CacheEntry<V>>,
  /// Whether the load runs on the caller's thread or on the worker pool.
  pub invocation: Invocation,
}

impl<'a, V> LoadContext<'a, V> {
  #[inline]
  pub fn key(&self) -> &'a str {
    self.request.key()
  }

  #[inline]
  pub fn is_background(&self) -> bool {
    self.invocation.is_background()
  }
}

/// The outcome of a successful load.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadResult<V> {
  pub value: V,
  /// When `false` the value is returned to the caller but never written to
  /// the store (e.g. a degraded fallback the loader produced itself).
  pub cacheable: bool,
}

impl<V> LoadResult<V> {
  pub fn cacheable(value: V) -> Self {
    Self {
      value,
      cacheable: true,
    }
  }

  pub fn uncacheable(value: V) -> Self {
    Self {
      value,
      cacheable: false,
    }
  }
}

impl<V> From<V> for LoadResult<V> {
  fn from(value: V) -> Self {
    Self::cacheable(value)
  }
}

/// Produces fresh values for a cache request.
///
/// A loader is the only place the engine performs real work (typically a
/// network call). Timeouts, if wanted, are the loader's responsibility.
pub trait Loader<V>: Send + Sync {
  fn load(&self, ctx: &LoadContext<'_, V>) -> Result<LoadResult<V>, LoadError>;
}

impl<V, F> Loader<V> for F
where
  F: Fn(&LoadContext<'_, V>) -> Result<LoadResult<V>, LoadError> + Send + Sync,
{
  fn load(&self, ctx: &LoadContext<'_, V>) -> Result<LoadResult<V>, LoadError> {
    self(ctx)
  }
}
