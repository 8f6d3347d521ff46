//! Memo Implementation
//!
//! A Memo is a cached derived value that re-evaluates only when one of
//! its dependencies changes, and only when it is actually read.
//!
//! # How Memos Work
//!
//! 1. On first access, the memo runs its derivation and caches the result.
//!
//! 2. While `Clean`, every access returns the cached value.
//!
//! 3. When a dependency changes, the memo is marked `MaybeDirty` and pushes
//!    a possibly-changed notification to its own observers, so effects that
//!    read it are scheduled. The recompute itself does not happen here.
//!
//! 4. The next read finds the memo stale and recomputes: old edges are torn
//!    down, the derivation runs in a fresh tracking context, and the new
//!    dependency set replaces the old one. Conditional reads therefore
//!    retrack correctly on every evaluation.
//!
//! A memo whose derivation reads no sources is never invalidated after its
//! first evaluation: there is nothing left to mark it stale.
//!
//! # Cycles
//!
//! A derivation that reads its own memo, directly or through other memos,
//! would recurse forever. Each memo carries a per-evaluation marker; a
//! re-entrant read fails with [`ReactiveError::CyclicDependency`].

use std::collections::HashSet;
use std::fmt::Debug;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;

use super::context::TrackingContext;
use super::error::ReactiveError;
use super::observer::{ObserverId, SourceId};
use super::runtime::{Observer, ReactiveHandle, Runtime, SourceHandle};

/// Staleness state for a memo's cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemoState {
    /// The cached value is up-to-date.
    Clean,

    /// A dependency changed since the last evaluation; recompute on read.
    MaybeDirty,

    /// Never evaluated (or explicitly invalidated); recompute on read.
    Dirty,
}

/// A lazily-cached derived reactive value.
///
/// `T` needs `PartialEq` so the cache can tell whether a recomputation
/// produced a genuinely different value.
///
/// Cloning a `Memo` produces another handle to the same cache.
pub struct Memo<T>
where
    T: Clone + PartialEq + Send + Sync + 'static,
{
    inner: Arc<MemoInner<T>>,

    /// Unregisters the memo's observer side when the last clone drops.
    _handle: Arc<ReactiveHandle>,
}

struct MemoInner<T>
where
    T: Clone + PartialEq + Send + Sync + 'static,
{
    /// Identity of this memo as an observable.
    id: SourceId,

    /// Identity of this memo as an observer of what it reads.
    observer_id: ObserverId,

    /// The derivation function.
    compute: Box<dyn Fn() -> T + Send + Sync>,

    /// The cached value (`None` before the first evaluation).
    value: RwLock<Option<T>>,

    /// Current staleness state.
    state: RwLock<MemoState>,

    /// Sources read during the last evaluation. Introspection only; the
    /// edge arena is the authoritative record.
    dependencies: RwLock<HashSet<SourceId>>,

    /// Re-entrancy marker for cycle detection.
    evaluating: AtomicBool,

    /// Removes this memo's edge-arena entry when dropped.
    _source: SourceHandle,
}

/// Clears the evaluation marker even when the derivation panics.
struct EvalGuard<'a> {
    flag: &'a AtomicBool,
}

impl Drop for EvalGuard<'_> {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::SeqCst);
    }
}

impl<T> Memo<T>
where
    T: Clone + PartialEq + Send + Sync + 'static,
{
    /// Create a new memo with the given derivation function.
    ///
    /// The derivation is not run here; it runs on first access.
    pub fn new<F>(compute: F) -> Self
    where
        F: Fn() -> T + Send + Sync + 'static,
    {
        let id = SourceId::new();
        let inner = Arc::new(MemoInner {
            id,
            observer_id: ObserverId::new(),
            compute: Box::new(compute),
            value: RwLock::new(None),
            state: RwLock::new(MemoState::Dirty),
            dependencies: RwLock::new(HashSet::new()),
            evaluating: AtomicBool::new(false),
            _source: SourceHandle::new(id),
        });

        let handle = Runtime::register(inner.clone());

        Self {
            inner,
            _handle: Arc::new(handle),
        }
    }

    /// Get the memo's identity as an observable.
    pub fn id(&self) -> SourceId {
        self.inner.id
    }

    /// Get the memo's identity as an observer.
    pub fn observer_id(&self) -> ObserverId {
        self.inner.observer_id
    }

    /// Get the current value, recomputing if stale.
    ///
    /// If called within a tracking context, also registers the current
    /// observer as a dependent of this memo.
    ///
    /// # Panics
    ///
    /// Panics on a cyclic evaluation. Use [`try_get`](Self::try_get) to
    /// handle the cycle as an error instead.
    pub fn get(&self) -> T {
        match self.try_get() {
            Ok(value) => value,
            Err(err) => panic!("{err}"),
        }
    }

    /// Get the current value, recomputing if stale.
    ///
    /// Returns [`ReactiveError::CyclicDependency`] if the derivation reads
    /// this memo during its own evaluation.
    pub fn try_get(&self) -> Result<T, ReactiveError> {
        self.inner.read(true)
    }

    /// Get the current value without registering a dependency.
    ///
    /// Still recomputes if the cache is stale; only the tracking edge is
    /// skipped.
    ///
    /// # Panics
    ///
    /// Panics on a cyclic evaluation, like [`get`](Self::get).
    pub fn peek(&self) -> T {
        match self.inner.read(false) {
            Ok(value) => value,
            Err(err) => panic!("{err}"),
        }
    }

    /// Get the current staleness state.
    pub fn state(&self) -> MemoState {
        *self.inner.state.read()
    }

    /// Check if the memo has ever been evaluated.
    pub fn has_value(&self) -> bool {
        self.inner.value.read().is_some()
    }

    /// Number of sources read during the last evaluation.
    pub fn dependency_count(&self) -> usize {
        self.inner.dependencies.read().len()
    }
}

impl<T> MemoInner<T>
where
    T: Clone + PartialEq + Send + Sync + 'static,
{
    fn read(&self, track: bool) -> Result<T, ReactiveError> {
        if track {
            if let Some(observer_id) = TrackingContext::current_observer() {
                TrackingContext::track_source(self.id);
                Runtime::add_edge(self.id, observer_id);
            }
        }

        let state = *self.state.read();
        match state {
            MemoState::Clean => {
                if let Some(value) = self.value.read().clone() {
                    return Ok(value);
                }
                // Clean without a value cannot normally happen; recompute.
                self.recompute()
            }
            MemoState::MaybeDirty | MemoState::Dirty => self.recompute(),
        }
    }

    /// Re-evaluate the derivation inside a fresh tracking context.
    fn recompute(&self) -> Result<T, ReactiveError> {
        if self.evaluating.swap(true, Ordering::SeqCst) {
            return Err(ReactiveError::CyclicDependency(self.id));
        }
        let _eval = EvalGuard {
            flag: &self.evaluating,
        };

        // Tear down last evaluation's edges before retracking, so sources
        // no longer read stop notifying this memo.
        Runtime::clear_observer(self.observer_id);
        self.dependencies.write().clear();

        let new_value = {
            let _ctx = TrackingContext::enter(self.observer_id);
            let value = (self.compute)();
            *self.dependencies.write() =
                TrackingContext::collected_sources().into_iter().collect();
            value
        };

        tracing::trace!(source = ?self.id, "memo recomputed");

        *self.value.write() = Some(new_value.clone());
        *self.state.write() = MemoState::Clean;

        Ok(new_value)
    }
}

impl<T> Observer for MemoInner<T>
where
    T: Clone + PartialEq + Send + Sync + 'static,
{
    fn observer_id(&self) -> ObserverId {
        self.observer_id
    }

    fn mark_dirty(&self) -> Option<SourceId> {
        let newly_stale = {
            let mut state = self.state.write();
            if *state == MemoState::Clean {
                *state = MemoState::MaybeDirty;
                true
            } else {
                false
            }
        };

        // Report "possibly changed" to the runtime exactly once per stale
        // period so its dirty walk continues through this memo's own
        // observers. Already-stale memos stay silent, which also bounds
        // the walk over diamond-shaped graphs.
        if newly_stale {
            tracing::trace!(source = ?self.id, "memo invalidated");
            Some(self.id)
        } else {
            None
        }
    }

    fn schedule(&self) {
        // Memos are pull-based; nothing to do until the next read.
    }

    fn is_eager(&self) -> bool {
        false
    }
}

impl<T> Clone for Memo<T>
where
    T: Clone + PartialEq + Send + Sync + 'static,
{
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
            _handle: Arc::clone(&self._handle),
        }
    }
}

impl<T> Debug for Memo<T>
where
    T: Clone + PartialEq + Send + Sync + Debug + 'static,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Memo")
            .field("id", &self.inner.id)
            .field("state", &self.state())
            .field("has_value", &self.has_value())
            .field("dependency_count", &self.dependency_count())
            .finish()
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
