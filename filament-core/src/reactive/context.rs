//! Tracking Context
//!
//! The tracking context records which observer is currently evaluating.
//! This enables automatic dependency tracking: when a signal or memo is
//! read, the read registers the current observer as a dependent.
//!
//! # Implementation
//!
//! A thread-local stack holds one entry per nested tracked evaluation.
//! Entering a context pushes an entry; a drop guard pops it when the
//! evaluation finishes, which restores (not clears) the previous entry.
//! The guard runs on unwind too, so a panicking user closure cannot leave
//! a stale entry on the stack.
//!
//! Nesting is common: an effect that reads a memo triggers the memo's own
//! tracked evaluation before the effect's entry is restored.

use std::cell::RefCell;

use smallvec::SmallVec;

use super::observer::{ObserverId, SourceId};

thread_local! {
    static CONTEXT_STACK: RefCell<Vec<ContextEntry>> = const { RefCell::new(Vec::new()) };
}

/// An entry in the tracking-context stack.
#[derive(Debug)]
struct ContextEntry {
    /// The observer currently evaluating.
    observer_id: ObserverId,
    /// Sources read so far during this evaluation. May contain duplicates;
    /// callers deduplicate when they collect.
    sources: SmallVec<[SourceId; 8]>,
}

/// Guard that pops the context entry when dropped.
pub struct TrackingContext {
    observer_id: ObserverId,
}

impl TrackingContext {
    /// Enter a new tracking context for the given observer.
    ///
    /// While the returned guard is live, every tracked read registers the
    /// observer as a dependent of the source being read.
    pub fn enter(observer_id: ObserverId) -> Self {
        CONTEXT_STACK.with(|stack| {
            stack.borrow_mut().push(ContextEntry {
                observer_id,
                sources: SmallVec::new(),
            });
        });

        Self { observer_id }
    }

    /// Check if there is an active tracking context.
    pub fn is_active() -> bool {
        CONTEXT_STACK.with(|stack| !stack.borrow().is_empty())
    }

    /// Get the observer currently evaluating, if any.
    pub fn current_observer() -> Option<ObserverId> {
        CONTEXT_STACK.with(|stack| stack.borrow().last().map(|entry| entry.observer_id))
    }

    /// Record a read of the given source in the current context.
    ///
    /// Called by signals and memos from their tracked getters.
    pub fn track_source(source_id: SourceId) {
        CONTEXT_STACK.with(|stack| {
            if let Some(entry) = stack.borrow_mut().last_mut() {
                entry.sources.push(source_id);
            }
        });
    }

    /// Get the sources read so far in the current context.
    pub fn collected_sources() -> SmallVec<[SourceId; 8]> {
        CONTEXT_STACK.with(|stack| {
            stack
                .borrow()
                .last()
                .map(|entry| entry.sources.clone())
                .unwrap_or_default()
        })
    }
}

impl Drop for TrackingContext {
    fn drop(&mut self) {
        CONTEXT_STACK.with(|stack| {
            let popped = stack.borrow_mut().pop();

            // Catch mismatched enter/exit pairs early in debug builds.
            if let Some(entry) = popped {
                debug_assert_eq!(
                    entry.observer_id, self.observer_id,
                    "TrackingContext mismatch: expected {:?}, got {:?}",
                    self.observer_id, entry.observer_id
                );
            }
        });
    }
}
