//! Write Batching
//!
//! `batch` coalesces multiple signal writes into a single notification
//! pass. While a batch is open, effects scheduled by writes are queued
//! instead of run; when the outermost batch closes, each queued effect
//! runs exactly once, in the order it was first queued, no matter how
//! many of its dependencies changed.
//!
//! Memos are unaffected by batching: they are marked stale immediately
//! and recompute lazily on their next read either way.
//!
//! # Nesting
//!
//! Batches compose through a reentrancy depth counter. Only the flush of
//! the outermost `batch` call executes queued effects; inner batches just
//! keep accumulating.

use std::cell::RefCell;

use indexmap::IndexSet;

use super::observer::ObserverId;
use super::runtime::Runtime;

thread_local! {
    static BATCH: RefCell<BatchState> = RefCell::new(BatchState {
        depth: 0,
        queue: IndexSet::new(),
    });
}

struct BatchState {
    /// Reentrancy depth. Flushing happens only when this returns to zero.
    depth: usize,
    /// Effects pending execution, deduplicated, in first-queued order.
    queue: IndexSet<ObserverId>,
}

/// Internal entry points used by effect scheduling.
pub(crate) struct Batch;

impl Batch {
    /// Whether a batch is currently open on this thread.
    pub(crate) fn is_active() -> bool {
        BATCH.with(|batch| batch.borrow().depth > 0)
    }

    /// Queue an effect for execution at flush time.
    ///
    /// Queuing the same effect twice is a no-op; it runs once per flush.
    pub(crate) fn enqueue(observer_id: ObserverId) {
        BATCH.with(|batch| {
            batch.borrow_mut().queue.insert(observer_id);
        });
    }
}

/// Guard that closes the batch scope and flushes at depth zero.
struct BatchGuard;

impl BatchGuard {
    fn enter() -> Self {
        BATCH.with(|batch| batch.borrow_mut().depth += 1);
        Self
    }
}

impl Drop for BatchGuard {
    fn drop(&mut self) {
        let pending = BATCH.with(|batch| {
            let mut state = batch.borrow_mut();
            assert!(state.depth > 0, "batch depth underflow");
            state.depth -= 1;

            if state.depth == 0 {
                std::mem::take(&mut state.queue)
            } else {
                IndexSet::new()
            }
        });

        if pending.is_empty() {
            return;
        }

        if std::thread::panicking() {
            // Running user effects while unwinding risks a double panic.
            // The depth counter is already consistent; drop the queue.
            tracing::debug!(pending = pending.len(), "discarding batch queue during unwind");
            return;
        }

        tracing::trace!(pending = pending.len(), "flushing batch");

        // Effects disposed or dropped while queued are skipped here: the
        // lookup fails for dropped effects, and `schedule` checks the
        // disposed flag.
        for observer_id in pending {
            if let Some(observer) = Runtime::lookup(observer_id) {
                observer.schedule();
            }
        }
    }
}

/// Run `f` with writes batched.
///
/// Signal writes inside `f` still update values and invalidate memos
/// immediately, but dependent effects run only after `f` returns, each
/// exactly once. Returns whatever `f` returns.
pub fn batch<R>(f: impl FnOnce() -> R) -> R {
    let _guard = BatchGuard::enter();
    f()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn batch_returns_closure_result() {
        assert_eq!(batch(|| 7), 7);
    }

    #[test]
    fn batch_depth_nests() {
        assert!(!Batch::is_active());

        batch(|| {
            assert!(Batch::is_active());
            batch(|| {
                assert!(Batch::is_active());
            });
            // Inner batch closing must not end the outer scope
            assert!(Batch::is_active());
        });

        assert!(!Batch::is_active());
    }

    #[test]
    fn batch_depth_recovers_from_panic() {
        let result = std::panic::catch_unwind(|| {
            batch(|| panic!("boom"));
        });

        assert!(result.is_err());
        assert!(!Batch::is_active());

        // A fresh batch on the same thread must work normally.
        assert_eq!(batch(|| 1), 1);
    }
}
