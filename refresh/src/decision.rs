//! The refresh state machine as a pure function: given what the store holds
//! and the request's mode, decide what to return and who does the work.

use crate::entry::CacheEntry;
use crate::request::RefreshMode;

/// What a store lookup found, from the engine's point of view.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Freshness {
  /// Absent or hard-expired.
  Miss,
  /// Present and not soft-expired.
  Fresh,
  /// Soft-expired but still servable.
  Stale,
}

impl Freshness {
  pub(crate) fn of<V>(entry: Option<&CacheEntry<V>>) -> Self {
    match entry {
      None => Freshness::Miss,
      Some(entry) if entry.is_hard_expired() => Freshness::Miss,
      Some(entry) if entry.is_soft_expired() => Freshness::Stale,
      Some(_) => Freshness::Fresh,
    }
  }
}

/// The engine's next step for a single `get`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Action {
  /// Return the current entry (or nothing) with no side effects.
  Serve,
  /// Load on the caller's thread, falling back per the sync failure policy.
  LoadInline,
  /// Return the current entry (or nothing) and dispatch a background reload.
  ServeAndReload,
  /// Return the current entry (or nothing) and make sure the scheduler owns
  /// the request.
  ServeAndSchedule,
}

pub(crate) fn decide(mode: RefreshMode, freshness: Freshness) -> Action {
  match (mode, freshness) {
    (_, Freshness::Fresh) => Action::Serve,

    (RefreshMode::Block, Freshness::Miss | Freshness::Stale) => Action::LoadInline,

    (RefreshMode::Return, Freshness::Miss) => Action::LoadInline,
    (RefreshMode::Return, Freshness::Stale) => Action::ServeAndReload,

    (RefreshMode::Async, Freshness::Miss | Freshness::Stale) => Action::ServeAndReload,

    (RefreshMode::Scheduled, Freshness::Miss | Freshness::Stale) => Action::ServeAndSchedule,
  }
}
