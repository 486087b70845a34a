#![allow(dead_code)]

use fibre_refresh::{CacheRequest, LoadError, LoadResult, RefreshCache, RefreshMode};
use std::io;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

pub fn build_test_cache() -> RefreshCache<String> {
  RefreshCache::builder().workers(2).build().unwrap()
}

/// A request whose loader returns "v1", "v2", ... and counts its calls.
pub fn counting_request(
  key: &str,
  mode: RefreshMode,
  hard_ttl: Duration,
  soft_ttl: Duration,
  calls: Arc<AtomicUsize>,
) -> CacheRequest<String> {
  CacheRequest::builder(key, move |_ctx| {
    let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
    Ok(LoadResult::from(format!("v{n}")))
  })
  .ttl(hard_ttl, soft_ttl)
  .mode(mode)
  .build()
  .unwrap()
}

/// A request whose loader always fails, after an optional delay.
pub fn failing_request(
  key: &str,
  mode: RefreshMode,
  delay: Duration,
  calls: Arc<AtomicUsize>,
) -> CacheRequest<String> {
  CacheRequest::builder(key, move |_ctx| -> Result<LoadResult<String>, LoadError> {
    calls.fetch_add(1, Ordering::SeqCst);
    thread::sleep(delay);
    Err(Box::new(io::Error::new(io::ErrorKind::ConnectionRefused, "backend down")))
  })
  .ttl(Duration::from_secs(10), Duration::from_secs(1))
  .mode(mode)
  .build()
  .unwrap()
}

/// Polls `condition` until it holds or `timeout` elapses.
pub fn wait_until(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
  let deadline = Instant::now() + timeout;
  while Instant::now() < deadline {
    if condition() {
      return true;
    }
    thread::sleep(Duration::from_millis(10));
  }
  condition()
}

pub fn value_of(value: Option<Arc<String>>) -> Option<String> {
  value.map(|v| v.as_ref().clone())
}
