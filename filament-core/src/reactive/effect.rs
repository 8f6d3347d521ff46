//! Effect Implementation
//!
//! An Effect is a side-effecting computation that re-runs whenever a
//! source it read changes.
//!
//! # How Effects Work
//!
//! 1. When created, the effect runs its function immediately to establish
//!    initial dependencies.
//!
//! 2. When any dependency changes, the effect is scheduled: it runs
//!    synchronously, or is queued for a single run if a batch is open.
//!
//! 3. Before each re-run, the previous run's cleanup is invoked and the
//!    old dependency edges are torn down, then new ones are tracked during
//!    execution. No duplicate subscriptions, no leaked resources.
//!
//! # Cleanup
//!
//! Effects built with [`Effect::with_cleanup`] return a closure from each
//! run; it is invoked exactly once before the next run and once on
//! disposal. Effects built with [`Effect::new`] have no cleanup.
//!
//! # Lifecycle
//!
//! `created → running → idle → running → ... → disposed`. Disposal is
//! terminal and idempotent: a disposed effect never runs again, even if
//! disposal lands in the middle of a notification pass. Dropping the last
//! clone of an `Effect` disposes it.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};

use super::batch::Batch;
use super::context::TrackingContext;
use super::observer::{ObserverId, SourceId};
use super::runtime::{Observer, ReactiveHandle, Runtime};

type Cleanup = Box<dyn FnOnce() + Send>;

/// A side-effecting subscriber re-run on dependency change.
///
/// # Example
///
/// ```rust,ignore
/// let count = Signal::new(0);
///
/// let count_clone = count.clone();
/// let effect = Effect::new(move || {
///     println!("count is {}", count_clone.get());
/// });
///
/// count.set(5); // prints "count is 5"
/// ```
pub struct Effect {
    inner: Arc<EffectInner>,

    /// Disposes the effect and unregisters it when the last clone drops.
    _guard: Arc<EffectGuard>,
}

struct EffectInner {
    /// Identity in the edge arena.
    observer_id: ObserverId,

    /// The effect body. Returns the cleanup for this run, if any.
    run: Box<dyn Fn() -> Option<Cleanup> + Send + Sync>,

    /// Cleanup left by the previous run, consumed before the next one.
    cleanup: Mutex<Option<Cleanup>>,

    /// Sources read during the last run. Introspection only; the edge
    /// arena is the authoritative record.
    dependencies: RwLock<HashSet<SourceId>>,

    /// Terminal flag, checked before every execution.
    disposed: AtomicBool,

    /// Number of completed runs.
    run_count: AtomicUsize,
}

struct EffectGuard {
    inner: Arc<EffectInner>,
    _handle: ReactiveHandle,
}

impl Drop for EffectGuard {
    fn drop(&mut self) {
        // Dispose before the handle unregisters, so the pending cleanup
        // runs even when the effect is simply dropped.
        self.inner.dispose();
    }
}

impl Effect {
    /// Create a new effect with the given function.
    ///
    /// The function runs immediately to establish initial dependencies.
    pub fn new<F>(run: F) -> Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        Self::build(Box::new(move || {
            run();
            None
        }))
    }

    /// Create a new effect whose function returns a cleanup closure.
    ///
    /// The cleanup runs once before each re-run and once on disposal:
    /// the place to drop timers, listeners, and other per-run resources.
    pub fn with_cleanup<F, C>(run: F) -> Self
    where
        F: Fn() -> C + Send + Sync + 'static,
        C: FnOnce() + Send + 'static,
    {
        Self::build(Box::new(move || Some(Box::new(run()) as Cleanup)))
    }

    fn build(run: Box<dyn Fn() -> Option<Cleanup> + Send + Sync>) -> Self {
        let inner = Arc::new(EffectInner {
            observer_id: ObserverId::new(),
            run,
            cleanup: Mutex::new(None),
            dependencies: RwLock::new(HashSet::new()),
            disposed: AtomicBool::new(false),
            run_count: AtomicUsize::new(0),
        });

        let handle = Runtime::register(inner.clone());

        let effect = Self {
            inner: inner.clone(),
            _guard: Arc::new(EffectGuard {
                inner,
                _handle: handle,
            }),
        };

        // Eager first run
        effect.inner.execute();

        effect
    }

    /// Get the effect's identity.
    pub fn observer_id(&self) -> ObserverId {
        self.inner.observer_id
    }

    /// Dispose of the effect.
    ///
    /// Runs the pending cleanup, removes all subscriptions, and marks the
    /// effect inert. Idempotent; re-scheduling afterwards is a no-op.
    pub fn dispose(&self) {
        self.inner.dispose();
    }

    /// Check if the effect has been disposed.
    pub fn is_disposed(&self) -> bool {
        self.inner.disposed.load(Ordering::SeqCst)
    }

    /// Get the number of completed runs.
    pub fn run_count(&self) -> usize {
        self.inner.run_count.load(Ordering::SeqCst)
    }

    /// Number of sources read during the last run.
    pub fn dependency_count(&self) -> usize {
        self.inner.dependencies.read().len()
    }
}

impl EffectInner {
    /// Run the effect body inside a tracking context.
    fn execute(&self) {
        if self.disposed.load(Ordering::SeqCst) {
            return;
        }

        // Previous run's cleanup goes first, then its edges. The guard
        // must drop before the cleanup is invoked: a cleanup may write a
        // signal this effect tracks, which re-enters `execute` and would
        // deadlock on the non-reentrant mutex.
        let previous_cleanup = self.cleanup.lock().take();
        if let Some(cleanup) = previous_cleanup {
            cleanup();
        }
        Runtime::clear_observer(self.observer_id);
        self.dependencies.write().clear();

        let new_cleanup = {
            let _ctx = TrackingContext::enter(self.observer_id);
            let cleanup = (self.run)();
            *self.dependencies.write() =
                TrackingContext::collected_sources().into_iter().collect();
            cleanup
        };

        if self.disposed.load(Ordering::SeqCst) {
            // The run body disposed this effect. Disposal already consumed
            // the stored state, so this run's cleanup fires now instead of
            // being stored on an inert effect and leaking.
            if let Some(cleanup) = new_cleanup {
                cleanup();
            }
        } else {
            *self.cleanup.lock() = new_cleanup;
        }
        self.run_count.fetch_add(1, Ordering::SeqCst);

        tracing::trace!(observer = ?self.observer_id, "effect ran");
    }

    fn dispose(&self) {
        if self.disposed.swap(true, Ordering::SeqCst) {
            return;
        }

        // Same guard hygiene as `execute`: drop the lock before running
        // user code.
        let pending_cleanup = self.cleanup.lock().take();
        if let Some(cleanup) = pending_cleanup {
            cleanup();
        }
        Runtime::clear_observer(self.observer_id);
        self.dependencies.write().clear();

        tracing::debug!(observer = ?self.observer_id, "effect disposed");
    }
}

impl Observer for EffectInner {
    fn observer_id(&self) -> ObserverId {
        self.observer_id
    }

    fn mark_dirty(&self) -> Option<SourceId> {
        // Effects carry no cache and are not sources; scheduling is the
        // whole reaction.
        None
    }

    fn schedule(&self) {
        if self.disposed.load(Ordering::SeqCst) {
            return;
        }

        if Batch::is_active() {
            Batch::enqueue(self.observer_id);
        } else {
            self.execute();
        }
    }

    fn is_eager(&self) -> bool {
        true
    }
}

impl Clone for Effect {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
            _guard: Arc::clone(&self._guard),
        }
    }
}

impl std::fmt::Debug for Effect {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Effect")
            .field("observer_id", &self.inner.observer_id)
            .field("run_count", &self.run_count())
            .field("dependency_count", &self.dependency_count())
            .field("disposed", &self.is_disposed())
            .finish()
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reactive::Signal;
    use std::sync::atomic::AtomicI32;

    #[test]
    fn effect_runs_on_creation() {
        let run_count = Arc::new(AtomicI32::new(0));
        let run_count_clone = run_count.clone();

        let _effect = Effect::new(move || {
            run_count_clone.fetch_add(1, Ordering::SeqCst);
        });

        // Effect should have run once on creation
        assert_eq!(run_count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn effect_reruns_on_signal_change() {
        let signal = Signal::new(0);
        let signal_clone = signal.clone();

        let observed = Arc::new(AtomicI32::new(-1));
        let observed_clone = observed.clone();

        let effect = Effect::new(move || {
            observed_clone.store(signal_clone.get(), Ordering::SeqCst);
        });

        assert_eq!(observed.load(Ordering::SeqCst), 0);
        assert_eq!(effect.run_count(), 1);

        signal.set(42);
        assert_eq!(observed.load(Ordering::SeqCst), 42);
        assert_eq!(effect.run_count(), 2);
    }

    #[test]
    fn effect_does_not_run_after_disposal() {
        let signal = Signal::new(0);
        let signal_clone = signal.clone();

        let run_count = Arc::new(AtomicI32::new(0));
        let run_count_clone = run_count.clone();

        let effect = Effect::new(move || {
            signal_clone.get();
            run_count_clone.fetch_add(1, Ordering::SeqCst);
        });

        assert_eq!(run_count.load(Ordering::SeqCst), 1);

        effect.dispose();
        assert!(effect.is_disposed());

        signal.set(1);
        assert_eq!(run_count.load(Ordering::SeqCst), 1);

        // Disposal is idempotent
        effect.dispose();
        assert!(effect.is_disposed());
    }

    #[test]
    fn effect_cleanup_runs_before_each_rerun_and_on_dispose() {
        let signal = Signal::new(0);
        let signal_clone = signal.clone();

        let cleanup_count = Arc::new(AtomicI32::new(0));
        let cleanup_count_clone = cleanup_count.clone();

        let effect = Effect::with_cleanup(move || {
            signal_clone.get();
            let counter = cleanup_count_clone.clone();
            move || {
                counter.fetch_add(1, Ordering::SeqCst);
            }
        });

        // First run leaves a pending cleanup, nothing invoked yet
        assert_eq!(cleanup_count.load(Ordering::SeqCst), 0);

        signal.set(1);
        assert_eq!(cleanup_count.load(Ordering::SeqCst), 1);

        signal.set(2);
        assert_eq!(cleanup_count.load(Ordering::SeqCst), 2);

        effect.dispose();
        assert_eq!(cleanup_count.load(Ordering::SeqCst), 3);

        // Dispose again: cleanup must not run twice for the same run
        effect.dispose();
        assert_eq!(cleanup_count.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn effect_dropping_last_clone_disposes() {
        let signal = Signal::new(0);
        let run_count = Arc::new(AtomicI32::new(0));
        let cleanup_count = Arc::new(AtomicI32::new(0));

        {
            let signal_clone = signal.clone();
            let run_count_clone = run_count.clone();
            let cleanup_count_clone = cleanup_count.clone();

            let _effect = Effect::with_cleanup(move || {
                signal_clone.get();
                run_count_clone.fetch_add(1, Ordering::SeqCst);
                let counter = cleanup_count_clone.clone();
                move || {
                    counter.fetch_add(1, Ordering::SeqCst);
                }
            });

            assert_eq!(run_count.load(Ordering::SeqCst), 1);
        }

        // Dropped: cleanup ran, and writes no longer reach it
        assert_eq!(cleanup_count.load(Ordering::SeqCst), 1);
        signal.set(5);
        assert_eq!(run_count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn effect_peek_does_not_subscribe() {
        let signal = Signal::new(0);
        let signal_clone = signal.clone();

        let run_count = Arc::new(AtomicI32::new(0));
        let run_count_clone = run_count.clone();

        let effect = Effect::new(move || {
            signal_clone.peek();
            run_count_clone.fetch_add(1, Ordering::SeqCst);
        });

        assert_eq!(effect.dependency_count(), 0);

        signal.set(9);
        assert_eq!(run_count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn effect_retracks_on_each_run() {
        let flag = Signal::new(true);
        let a = Signal::new(0);
        let b = Signal::new(0);

        let flag_clone = flag.clone();
        let a_clone = a.clone();
        let b_clone = b.clone();

        let run_count = Arc::new(AtomicI32::new(0));
        let run_count_clone = run_count.clone();

        let _effect = Effect::new(move || {
            if flag_clone.get() {
                a_clone.get();
            } else {
                b_clone.get();
            }
            run_count_clone.fetch_add(1, Ordering::SeqCst);
        });

        assert_eq!(run_count.load(Ordering::SeqCst), 1);

        // `b` is not tracked while the flag is true
        b.set(1);
        assert_eq!(run_count.load(Ordering::SeqCst), 1);

        flag.set(false);
        assert_eq!(run_count.load(Ordering::SeqCst), 2);

        // Now `a` must be untracked
        a.set(1);
        assert_eq!(run_count.load(Ordering::SeqCst), 2);

        b.set(2);
        assert_eq!(run_count.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn cleanup_may_write_a_tracked_signal() {
        let value = Signal::new(0);
        let value_clone = value.clone();

        let cleanup_count = Arc::new(AtomicI32::new(0));
        let cleanup_count_clone = cleanup_count.clone();

        let effect = Effect::with_cleanup(move || {
            value_clone.get();
            let value_inner = value_clone.clone();
            let counter = cleanup_count_clone.clone();
            move || {
                counter.fetch_add(1, Ordering::SeqCst);
                // Writing back to the dependency re-enters the effect;
                // this must not hold any lock the re-entry needs.
                value_inner.set(99);
            }
        });

        // Must complete rather than deadlock on the cleanup slot
        value.set(1);

        assert_eq!(value.peek(), 99);
        assert_eq!(cleanup_count.load(Ordering::SeqCst), 1);

        effect.dispose();
        assert_eq!(cleanup_count.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn self_disposing_run_still_gets_its_cleanup() {
        let value = Signal::new(0);
        let value_clone = value.clone();

        let slot: Arc<Mutex<Option<Effect>>> = Arc::new(Mutex::new(None));
        let slot_clone = slot.clone();
        let armed = Arc::new(AtomicBool::new(false));
        let armed_clone = armed.clone();

        let cleanup_count = Arc::new(AtomicI32::new(0));
        let cleanup_count_clone = cleanup_count.clone();

        let effect = Effect::with_cleanup(move || {
            value_clone.get();
            if armed_clone.load(Ordering::SeqCst) {
                if let Some(this) = slot_clone.lock().as_ref() {
                    this.dispose();
                }
            }
            let counter = cleanup_count_clone.clone();
            move || {
                counter.fetch_add(1, Ordering::SeqCst);
            }
        });
        *slot.lock() = Some(effect.clone());
        armed.store(true, Ordering::SeqCst);

        assert_eq!(cleanup_count.load(Ordering::SeqCst), 0);

        // The run disposes the effect mid-body: the previous cleanup runs
        // before the body, and the cleanup returned by this final run must
        // fire too instead of being stranded on the disposed effect
        value.set(1);

        assert!(effect.is_disposed());
        assert_eq!(cleanup_count.load(Ordering::SeqCst), 2);

        value.set(2);
        assert_eq!(cleanup_count.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn effect_clone_shares_state() {
        let effect1 = Effect::new(|| {});
        let effect2 = effect1.clone();

        assert_eq!(effect1.observer_id(), effect2.observer_id());
        assert_eq!(effect1.run_count(), 1);
        assert_eq!(effect2.run_count(), 1);

        effect1.dispose();
        assert!(effect2.is_disposed());
    }
}
