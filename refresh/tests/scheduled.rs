mod common;

use common::{counting_request, value_of, wait_until};
use fibre_refresh::{CacheRequest, Error, LoadResult, RefreshCache, RefreshMode, SchedulerState};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

fn scheduled_cache() -> RefreshCache<String> {
  RefreshCache::builder()
    .workers(2)
    .poll_interval(Duration::from_secs(1))
    .build()
    .unwrap()
}

#[test]
fn test_scheduled_get_never_invokes_the_loader() {
  let cache = scheduled_cache();
  let threads = Arc::new(Mutex::new(Vec::<String>::new()));
  let seen = threads.clone();
  let request = CacheRequest::builder("sched", move |_ctx| {
    let name = thread::current().name().unwrap_or_default().to_string();
    let mut seen = seen.lock().unwrap();
    seen.push(name);
    Ok(LoadResult::from(format!("v{}", seen.len())))
  })
  .ttl(Duration::from_secs(10), Duration::from_secs(1))
  .mode(RefreshMode::Scheduled)
  .build()
  .unwrap();

  assert_eq!(cache.scheduler_state(), SchedulerState::Stopped);
  assert_eq!(cache.get(&request).unwrap(), None);
  assert!(cache.is_scheduled("sched"));
  assert_eq!(cache.scheduler_state(), SchedulerState::Running);
  assert!(threads.lock().unwrap().is_empty());

  thread::sleep(Duration::from_millis(2300));
  assert!(cache.metrics().scheduler_ticks >= 2);

  let value = value_of(cache.get(&request).unwrap()).unwrap();
  assert!(value.starts_with('v'), "got {value}");

  let threads = threads.lock().unwrap();
  assert!(!threads.is_empty());
  assert!(
    threads.iter().all(|name| name.starts_with("fibre-refresh-worker")),
    "loads ran on {threads:?}"
  );
  assert_eq!(cache.metrics().sync_loads, 0);
}

#[test]
fn test_remove_makes_scheduled_request_due() {
  let cache = scheduled_cache();
  let calls = Arc::new(AtomicUsize::new(0));
  let request = counting_request(
    "reset",
    RefreshMode::Scheduled,
    Duration::from_secs(60),
    Duration::from_secs(30),
    calls.clone(),
  );

  assert_eq!(cache.get(&request).unwrap(), None);
  assert!(wait_until(Duration::from_secs(3), || {
    cache.peek("reset").is_some() && !cache.is_reloading("reset")
  }));
  assert_eq!(calls.load(Ordering::SeqCst), 1);

  // Fresh for 30s, so only the reset can make it due again.
  assert!(cache.remove("reset"));
  assert!(wait_until(Duration::from_secs(3), || cache.peek("reset").is_some()));
  assert_eq!(calls.load(Ordering::SeqCst), 2);
  assert_eq!(value_of(cache.get(&request).unwrap()), Some("v2".into()));
}

#[test]
fn test_explicit_schedule_and_unschedule() {
  let cache = scheduled_cache();
  let calls = Arc::new(AtomicUsize::new(0));
  let request = counting_request(
    "explicit",
    RefreshMode::Block,
    Duration::from_secs(60),
    Duration::from_secs(30),
    calls.clone(),
  );

  assert!(cache.schedule(&request).unwrap());
  assert!(!cache.schedule(&request).unwrap(), "same request twice is a no-op");
  assert_eq!(cache.scheduled_keys(), vec!["explicit".to_string()]);

  assert!(wait_until(Duration::from_secs(3), || cache.peek("explicit").is_some()));

  assert!(cache.unschedule("explicit"));
  assert!(!cache.unschedule("explicit"));
  assert!(cache.scheduled_keys().is_empty());
  assert!(cache.peek("explicit").is_some(), "unscheduling keeps the entry");
}

#[test]
fn test_close_stops_scheduler_and_declines_registrations() {
  let cache = scheduled_cache();
  let calls = Arc::new(AtomicUsize::new(0));
  let first = counting_request(
    "first",
    RefreshMode::Scheduled,
    Duration::from_secs(60),
    Duration::from_secs(30),
    calls.clone(),
  );
  let second = counting_request(
    "second",
    RefreshMode::Scheduled,
    Duration::from_secs(60),
    Duration::from_secs(30),
    calls.clone(),
  );

  cache.get(&first).unwrap();
  assert_eq!(cache.scheduler_state(), SchedulerState::Running);

  cache.close();
  cache.close();
  assert_eq!(cache.scheduler_state(), SchedulerState::Stopped);

  assert!(matches!(cache.schedule(&second), Err(Error::Closed)));
  // A scheduled get after close still answers, it just registers nothing.
  assert_eq!(cache.get(&second).unwrap(), None);
  assert!(!cache.is_scheduled("second"));

  // Other modes are unaffected.
  let block = counting_request(
    "block",
    RefreshMode::Block,
    Duration::from_secs(60),
    Duration::from_secs(30),
    calls.clone(),
  );
  assert!(cache.get(&block).unwrap().is_some());
}

#[test]
fn test_stale_scheduled_entry_is_refreshed_by_the_scheduler() {
  let cache = scheduled_cache();
  let calls = Arc::new(AtomicUsize::new(0));
  let counter = calls.clone();
  let request = CacheRequest::builder("ticking", move |_ctx| {
    thread::sleep(Duration::from_millis(300));
    let n = counter.fetch_add(1, Ordering::SeqCst) + 1;
    Ok(LoadResult::from(format!("v{n}")))
  })
  .ttl(Duration::from_secs(60), Duration::from_millis(500))
  .mode(RefreshMode::Scheduled)
  .build()
  .unwrap();

  assert_eq!(cache.get(&request).unwrap(), None);
  assert!(wait_until(Duration::from_secs(3), || {
    cache.peek("ticking").is_some() && !cache.is_reloading("ticking")
  }));
  let reloads_after_first_load = cache.metrics().reloads_started;

  // Soft-expired until the next tick picks it up.
  assert!(wait_until(Duration::from_secs(2), || {
    cache.peek("ticking").map_or(false, |entry| entry.is_soft_expired())
  }));
  for _ in 0..3 {
    assert_eq!(value_of(cache.get(&request).unwrap()), Some("v1".into()));
  }
  let metrics = cache.metrics();
  assert!(metrics.stale_hits >= 3);
  assert_eq!(metrics.sync_loads, 0);

  assert!(wait_until(Duration::from_secs(3), || {
    value_of(cache.get(&request).unwrap()) == Some("v2".into())
  }));
  let metrics = cache.metrics();
  assert!(metrics.reloads_started > reloads_after_first_load);
  assert_eq!(metrics.sync_loads, 0);
  assert_eq!(metrics.reloads_deduplicated, 0, "gets never trigger reloads themselves");
}
