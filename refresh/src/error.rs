use std::error::Error as StdError;
use std::fmt;
use std::time::Duration;

use thiserror::Error;

/// The error type a [`Loader`](crate::loader::Loader) may fail with.
pub type LoadError = Box<dyn StdError + Send + Sync + 'static>;

/// Invalid configuration, detected when an entry, request or cache is built.
///
/// These are never silently corrected.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
  /// A cache key was empty or only whitespace.
  #[error("cache key must not be blank")]
  BlankKey,
  /// The hard TTL was shorter than one millisecond.
  #[error("hard ttl must be at least 1ms")]
  ZeroHardTtl,
  /// The soft TTL was longer than the hard TTL.
  #[error("soft ttl ({soft:?}) must not exceed hard ttl ({hard:?})")]
  SoftTtlExceedsHardTtl { soft: Duration, hard: Duration },
  /// The scheduler poll interval was below one second.
  #[error("poll interval must be at least 1s, got {0:?}")]
  PollIntervalTooShort(Duration),
  /// The worker pool was configured with no threads.
  #[error("worker pool needs at least one worker")]
  ZeroWorkers,
  /// The worker pool queue was configured with no room.
  #[error("worker pool queue capacity cannot be zero")]
  ZeroQueueCapacity,
  /// A failure policy for the "missing" case asked to return a stale value,
  /// which by definition does not exist there.
  #[error("return-stale fallback is only valid for the expired case")]
  StaleFallbackWithoutStaleValue,
}

/// Errors surfaced to callers of [`RefreshCache`](crate::RefreshCache).
#[derive(Debug, Error)]
pub enum Error {
  #[error(transparent)]
  Config(#[from] ConfigError),
  /// A synchronous load failed and the request's failure policy says to
  /// propagate it.
  #[error("loading '{key}' failed")]
  Load {
    key: String,
    #[source]
    source: LoadError,
  },
  /// The cache has been closed and no longer accepts scheduler registrations.
  #[error("cache is closed")]
  Closed,
}

impl Error {
  /// The loader's own error, if this is a load failure.
  pub fn load_source(&self) -> Option<&(dyn StdError + Send + Sync + 'static)> {
    match self {
      Error::Load { source, .. } => Some(source.as_ref()),
      _ => None,
    }
  }
}

/// Formats an error followed by its whole `source()` chain.
pub(crate) struct ErrorChain<'a>(pub(crate) &'a (dyn StdError + 'static));

impl fmt::Display for ErrorChain<'_> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}", self.0)?;
    let mut source = self.0.source();
    while let Some(cause) = source {
      write!(f, "\n  caused by: {}", cause)?;
      source = cause.source();
    }
    Ok(())
  }
}
