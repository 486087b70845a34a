//! A refresh-ahead cache front that keeps loader-backed values fresh with
//! soft and hard TTLs.
//!
//! Every read goes through a [`CacheRequest`], which names the key, the
//! [`Loader`] that produces its value, the two TTLs, a [`RefreshMode`] and a
//! [`FailurePolicy`]. The cache decides per request whether to serve what the
//! [`Store`] holds, load on the caller's thread, or refresh in the background.
//!
//! # Features
//! - **Soft & Hard TTLs**: Stale values keep being served until they are too
//!   old to use, while a refresh brings them back to fresh.
//! - **Four Refresh Modes**: `Block`, `Return`, `Async` and `Scheduled`
//!   trade latency against staleness per request.
//! - **Deduplicated Reloads**: At most one background reload per key is in
//!   flight at any time.
//! - **Failure Policies**: Per-situation control over logging, fallback
//!   values and whether a failed load rewrites the cached entry.
//! - **Pluggable Storage & Execution**: Bring your own [`Store`] or
//!   [`Executor`]; a sharded in-memory store and a bounded worker pool are
//!   included.
//! - **Observability**: Exposes counters for lookups, loads and reloads.
//!
//! # Example
//!
//! ```
//! use fibre_refresh::{CacheRequest, LoadResult, RefreshCache, RefreshMode};
//! use std::time::Duration;
//!
//! let cache = RefreshCache::<String>::builder().workers(2).build().unwrap();
//! let request = CacheRequest::builder("greeting", |_ctx| Ok(LoadResult::from("hello".to_string())))
//!   .ttl(Duration::from_secs(60), Duration::from_secs(30))
//!   .mode(RefreshMode::Return)
//!   .build()
//!   .unwrap();
//!
//! let value = cache.get(&request).unwrap();
//! assert_eq!(value.as_deref().map(String::as_str), Some("hello"));
//! ```

// Public modules that form the API
pub mod builder;
pub mod entry;
pub mod error;
pub mod handle;
pub mod loader;
pub mod metrics;
pub mod policy;
pub mod request;
pub mod runtime;
pub mod store;

#[cfg(feature = "serde")]
pub mod config;

// Internal, crate-only modules
mod coordinator;
mod decision;
mod engine;
mod task;
mod time;

// Re-export the primary user-facing types for convenience
pub use builder::RefreshCacheBuilder;
pub use entry::{CacheEntry, MIN_HARD_TTL};
pub use error::{ConfigError, Error, LoadError};
pub use handle::RefreshCache;
pub use loader::{LoadContext, LoadResult, Loader};
pub use metrics::MetricsSnapshot;
pub use policy::{CacheOnError, FailurePolicy, Fallback, Invocation, LogAction, OnFailure};
pub use request::{CacheRequest, CacheRequestBuilder, RefreshMode};
pub use runtime::{Executor, Rejected, Task, WorkerPool};
pub use store::{MemoryStore, Store, StoreError};
pub use task::scheduler::{SchedulerState, MIN_POLL_INTERVAL};

#[cfg(feature = "tokio")]
pub use runtime::TokioExecutor;

#[cfg(feature = "serde")]
pub use config::RefreshConfig;
