//! Reactive Runtime
//!
//! The runtime is the central coordinator that connects signals, memos, and
//! effects. It owns the dependency-edge arena and drives update propagation
//! when a source changes.
//!
//! # How It Works
//!
//! 1. When a memo or effect is created, it registers with the runtime and
//!    receives a handle that unregisters it on drop.
//!
//! 2. When a memo or effect reads a signal (or another memo) inside a
//!    tracking context, an edge `(source, observer)` is recorded.
//!
//! 3. When a source changes, the runtime:
//!    a. Walks the dirty closure: starting from the changed source, each
//!       observer is marked stale; a memo that just became stale is itself
//!       a source whose observers must be marked, so it joins the worklist
//!    b. Schedules each affected effect exactly once, after all marking is
//!       done; a scheduled effect runs immediately, or is queued if a
//!       batch is open
//!
//! Memos stay lazy: they recompute on their next read, not here.
//!
//! # Snapshot discipline
//!
//! Every notification path iterates over a copied collection, never over a
//! live one. Observer code runs arbitrary user closures which may add or
//! remove edges (or dispose effects) mid-notification.

use std::collections::VecDeque;
use std::sync::{Arc, OnceLock, Weak};

use dashmap::DashMap;
use indexmap::{IndexMap, IndexSet};

use super::observer::{ObserverId, SourceId};

/// A participant in update propagation: anything that watches sources.
pub trait Observer: Send + Sync {
    /// Get the observer ID used in the edge arena.
    fn observer_id(&self) -> ObserverId;

    /// Mark this observer as possibly stale because a source it read changed.
    ///
    /// Returns the observer's own source ID when the marking made it newly
    /// stale and it is itself observable (a memo transitioning from clean),
    /// so the runtime can continue the dirty walk through it. Observers
    /// that are not sources, or were already stale, return `None`.
    fn mark_dirty(&self) -> Option<SourceId>;

    /// Schedule this observer for execution (effects only).
    fn schedule(&self);

    /// Whether this observer is eager (effect) or lazy (memo).
    fn is_eager(&self) -> bool;
}

/// Handle to a registered observer.
///
/// Dropping this handle unregisters the observer and removes every edge
/// pointing at it.
pub struct ReactiveHandle {
    observer_id: ObserverId,
}

impl Drop for ReactiveHandle {
    fn drop(&mut self) {
        Runtime::unregister(self.observer_id);
    }
}

/// Handle to an observable source.
///
/// Dropping this handle removes the source's entry from the edge arena so
/// dead sources do not accumulate observer sets.
pub(crate) struct SourceHandle {
    source_id: SourceId,
}

impl SourceHandle {
    pub(crate) fn new(source_id: SourceId) -> Self {
        Self { source_id }
    }
}

impl Drop for SourceHandle {
    fn drop(&mut self) {
        edges().remove(&self.source_id);
    }
}

/// The global reactive runtime.
pub struct Runtime;

// Global registry of observers, mapping IDs to weak references so the
// registry never keeps a memo or effect alive.
static OBSERVERS: OnceLock<DashMap<ObserverId, Weak<dyn Observer>>> = OnceLock::new();

// Edge arena: for each source, the observers that read it, in the order
// they first subscribed.
static EDGES: OnceLock<DashMap<SourceId, IndexSet<ObserverId>>> = OnceLock::new();

fn observers() -> &'static DashMap<ObserverId, Weak<dyn Observer>> {
    OBSERVERS.get_or_init(DashMap::new)
}

fn edges() -> &'static DashMap<SourceId, IndexSet<ObserverId>> {
    EDGES.get_or_init(DashMap::new)
}

impl Runtime {
    /// Register an observer with the runtime.
    ///
    /// Returns a handle that unregisters the observer when dropped.
    pub fn register(observer: Arc<dyn Observer>) -> ReactiveHandle {
        let observer_id = observer.observer_id();
        observers().insert(observer_id, Arc::downgrade(&observer));
        ReactiveHandle { observer_id }
    }

    /// Unregister an observer and drop its incoming edges.
    fn unregister(observer_id: ObserverId) {
        observers().remove(&observer_id);
        Self::clear_observer(observer_id);
    }

    /// Look up a live observer by ID.
    pub(crate) fn lookup(observer_id: ObserverId) -> Option<Arc<dyn Observer>> {
        observers().get(&observer_id).and_then(|weak| weak.upgrade())
    }

    /// Record that `observer` depends on `source`.
    ///
    /// Called automatically when a source is read within a tracking context.
    /// Re-recording an existing edge is a no-op, so an observer never
    /// receives duplicate notifications for one source.
    pub fn add_edge(source_id: SourceId, observer_id: ObserverId) {
        edges().entry(source_id).or_default().insert(observer_id);
    }

    /// Remove every edge pointing at `observer`.
    ///
    /// Called before an observer re-evaluates, so conditional reads rebuild
    /// the dependency set from scratch and stale edges cannot leak. Scans
    /// the whole arena rather than trusting the observer's own bookkeeping,
    /// which keeps the arena consistent even after a panicking evaluation.
    pub fn clear_observer(observer_id: ObserverId) {
        for mut entry in edges().iter_mut() {
            entry.value_mut().shift_remove(&observer_id);
        }
    }

    /// Notify all observers that a source changed.
    ///
    /// This is the core update-propagation mechanism, split into two
    /// phases. First the whole dirty closure is marked: a worklist walks
    /// from the changed source through every memo that just became stale,
    /// without running any effect. Only then is each affected effect
    /// scheduled, exactly once. Scheduling only after marking completes
    /// means an effect reached through several paths (a diamond) runs a
    /// single time and every memo it reads is already stale, so it
    /// observes one consistent snapshot.
    pub fn notify(source_id: SourceId) {
        let mut worklist = VecDeque::new();
        worklist.push_back(source_id);

        // Dedup by observer ID: one schedule per effect per pass, however
        // many sources reached it.
        let mut eager: IndexMap<ObserverId, Arc<dyn Observer>> = IndexMap::new();

        while let Some(current) = worklist.pop_front() {
            let targets: Vec<ObserverId> = {
                match edges().get(&current) {
                    Some(set) => set.iter().copied().collect(),
                    None => continue,
                }
            };

            if targets.is_empty() {
                continue;
            }

            tracing::trace!(source = ?current, observers = targets.len(), "source changed");

            for observer_id in targets {
                if let Some(observer) = Self::lookup(observer_id) {
                    // A newly-stale memo is itself a changed source. An
                    // already-stale one returns None, which bounds the
                    // walk even over diamond-shaped graphs.
                    if let Some(stale_source) = observer.mark_dirty() {
                        worklist.push_back(stale_source);
                    }

                    if observer.is_eager() {
                        eager.entry(observer_id).or_insert(observer);
                    }
                }
            }
        }

        // Marking is complete; now run (or queue) the effects.
        for (_, observer) in eager {
            observer.schedule();
        }
    }

    /// Number of observers currently subscribed to a source.
    pub fn observer_count(source_id: SourceId) -> usize {
        edges().get(&source_id).map(|set| set.len()).unwrap_or(0)
    }
}

#[cfg(test)]
fn edge_snapshot() -> std::collections::HashMap<SourceId, Vec<ObserverId>> {
    edges()
        .iter()
        .map(|entry| (*entry.key(), entry.value().iter().copied().collect()))
        .collect()
}
