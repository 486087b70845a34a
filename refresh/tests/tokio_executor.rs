#![cfg(feature = "tokio")]

mod common;

use common::{counting_request, value_of};
use fibre_refresh::{RefreshCache, RefreshMode, TokioExecutor};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_background_reloads_run_on_tokio_blocking_pool() {
  let cache: RefreshCache<String> = RefreshCache::builder()
    .executor(Arc::new(TokioExecutor::new()))
    .build()
    .unwrap();
  let calls = Arc::new(AtomicUsize::new(0));
  let request = counting_request(
    "tokio",
    RefreshMode::Async,
    Duration::from_secs(10),
    Duration::from_secs(5),
    calls.clone(),
  );

  assert_eq!(cache.get(&request).unwrap(), None);

  let mut loaded = false;
  for _ in 0..100 {
    if cache.peek("tokio").is_some() {
      loaded = true;
      break;
    }
    tokio::time::sleep(Duration::from_millis(10)).await;
  }
  assert!(loaded, "background load never completed");

  assert_eq!(value_of(cache.get(&request).unwrap()), Some("v1".into()));
  assert_eq!(calls.load(Ordering::SeqCst), 1);
  assert_eq!(cache.metrics().background_loads, 1);
}
