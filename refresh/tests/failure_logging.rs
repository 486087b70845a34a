mod common;

use common::{failing_request, value_of, wait_until};
use fibre_refresh::{CacheEntry, RefreshCache, RefreshMode};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Barrier};
use std::thread;
use std::time::Duration;

use tracing::{Event, Level, Subscriber};
use tracing_subscriber::layer::{Context, Layer, SubscriberExt};

// Counts WARN events emitted by the crate, from any thread.
struct WarnCounter(Arc<AtomicUsize>);

impl<S: Subscriber> Layer<S> for WarnCounter {
  fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
    let metadata = event.metadata();
    if *metadata.level() == Level::WARN && metadata.target().starts_with("fibre_refresh") {
      self.0.fetch_add(1, Ordering::SeqCst);
    }
  }
}

// Worker threads only see a global subscriber, so this file holds a single
// test that installs one.
#[test]
fn test_async_failures_warn_once_per_attempt() {
  let warnings = Arc::new(AtomicUsize::new(0));
  let subscriber = tracing_subscriber::registry().with(WarnCounter(warnings.clone()));
  tracing::subscriber::set_global_default(subscriber).unwrap();

  let cache: RefreshCache<String> = RefreshCache::builder().workers(2).build().unwrap();
  let calls = Arc::new(AtomicUsize::new(0));
  let request = failing_request("broken", RefreshMode::Async, Duration::from_millis(300), calls.clone());

  // Many callers race on a miss; only one background load runs.
  let callers = 8;
  let barrier = Arc::new(Barrier::new(callers));
  let handles: Vec<_> = (0..callers)
    .map(|_| {
      let cache = cache.clone();
      let request = request.clone();
      let barrier = barrier.clone();
      thread::spawn(move || {
        barrier.wait();
        cache.get(&request)
      })
    })
    .collect();
  for handle in handles {
    let result = handle.join().unwrap();
    assert!(matches!(result, Ok(None)), "async get never raises");
  }

  assert!(wait_until(Duration::from_secs(3), || {
    calls.load(Ordering::SeqCst) >= 1 && !cache.is_reloading("broken")
  }));
  let attempts = calls.load(Ordering::SeqCst);
  assert!(attempts < callers, "{attempts} loads for {callers} callers");
  assert_eq!(warnings.load(Ordering::SeqCst), attempts);

  // With a stale value present, callers keep getting it while reloads fail.
  let stale = CacheEntry::new("old".to_string(), Duration::from_secs(30), Duration::ZERO).unwrap();
  cache.set_entry("broken", stale).unwrap();
  thread::sleep(Duration::from_millis(5));

  for _ in 0..5 {
    assert_eq!(value_of(cache.get(&request).unwrap()), Some("old".into()));
  }
  assert!(wait_until(Duration::from_secs(3), || !cache.is_reloading("broken")));

  let attempts = calls.load(Ordering::SeqCst);
  assert_eq!(warnings.load(Ordering::SeqCst), attempts);
  assert_eq!(cache.metrics().load_failures as usize, attempts);
  assert_eq!(cache.peek("broken").unwrap().value_ref(), "old");
}
