//! Identifier types for the reactive graph.
//!
//! The dependency graph is bipartite: *sources* (signals and memos) are read,
//! *observers* (memos and effects) do the reading. Edges are keyed by
//! `(SourceId, ObserverId)` pairs in the runtime rather than stored as object
//! references, which makes it cheap to tear down and rebuild an observer's
//! edge set on every evaluation.

use std::sync::atomic::{AtomicU64, Ordering};

/// Unique identifier for an observer (memo or effect).
///
/// Used to track dependency edges and to deduplicate pending effects in the
/// batch queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ObserverId(u64);

impl ObserverId {
    /// Generate a new unique observer ID.
    pub fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }
}

impl Default for ObserverId {
    fn default() -> Self {
        Self::new()
    }
}

/// Unique identifier for an observable value (signal or memo).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SourceId(u64);

impl SourceId {
    /// Generate a new unique source ID.
    pub fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }
}

impl Default for SourceId {
    fn default() -> Self {
        Self::new()
    }
}

/// Handle for a plain callback subscription on a signal.
///
/// Returned by [`Signal::subscribe`](super::Signal::subscribe) and passed to
/// `unsubscribe` to remove the callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

impl SubscriptionId {
    pub(crate) fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }
}
