//! Reactive Primitives
//!
//! This module implements the core reactive system: signals, memos,
//! effects, and write batching. These primitives form a fine-grained
//! reactive dependency graph.
//!
//! # Concepts
//!
//! ## Signals
//!
//! A [`Signal`] is a container for mutable state. When a signal's value is
//! read within a tracking context (such as a memo or effect), the signal
//! automatically registers that context as a dependent. When the signal's
//! value changes, all dependents are notified. Writing an equal value is
//! a no-op.
//!
//! ## Memos
//!
//! A [`Memo`] is a derived value that caches its result. It re-evaluates
//! only when one of its dependencies changes, and only when it is read
//! (pull-based laziness).
//!
//! ## Effects
//!
//! An [`Effect`] is a side-effecting computation that re-runs whenever its
//! dependencies change, with optional per-run cleanup. Effects synchronize
//! reactive state with external systems.
//!
//! ## Batching
//!
//! [`batch`] coalesces multiple writes into one notification pass: each
//! affected effect runs exactly once when the outermost batch closes.
//!
//! # Implementation Notes
//!
//! The reactive system uses a thread-local tracking context to detect
//! dependencies. When a source is read, the current observer (if any) is
//! registered as a dependent. Dependency sets are cleared and rebuilt on
//! every evaluation, so conditional reads retrack correctly.
//!
//! This approach (sometimes called "automatic dependency tracking" or
//! "transparent reactivity") is used by SolidJS, Vue 3, and Leptos.
//!
//! # Scheduling
//!
//! Each notification pass marks the entire dirty closure before any
//! effect runs, and schedules each affected effect at most once. A write
//! that fans out to one effect through several memo paths (a diamond)
//! therefore produces a single, consistent effect run, batched or not.
//!
//! Within one pass or batch flush, effects run in the order they were
//! first queued, not in dependency-topological order. An effect ordered
//! between two separate writes can still observe the intermediate state.
//! This is an accepted limitation of insertion-order scheduling.

mod batch;
mod context;
mod effect;
mod error;
mod memo;
mod observer;
mod runtime;
mod signal;

pub use batch::batch;
pub use context::TrackingContext;
pub use effect::Effect;
pub use error::ReactiveError;
pub use memo::{Memo, MemoState};
pub use observer::{ObserverId, SourceId, SubscriptionId};
pub use runtime::{Observer, ReactiveHandle, Runtime};
pub use signal::Signal;

/// Create a new signal with the given initial value.
pub fn signal<T>(value: T) -> Signal<T>
where
    T: Clone + PartialEq + Send + Sync + 'static,
{
    Signal::new(value)
}

/// Create a new memo with the given derivation function.
pub fn memo<T, F>(compute: F) -> Memo<T>
where
    T: Clone + PartialEq + Send + Sync + 'static,
    F: Fn() -> T + Send + Sync + 'static,
{
    Memo::new(compute)
}

/// Create a new effect. Runs immediately; re-runs on dependency change.
///
/// The returned handle must be kept alive: dropping the last clone
/// disposes the effect.
#[must_use = "dropping the Effect disposes it"]
pub fn effect<F>(run: F) -> Effect
where
    F: Fn() + Send + Sync + 'static,
{
    Effect::new(run)
}

/// Create a new effect whose function returns a per-run cleanup closure.
#[must_use = "dropping the Effect disposes it"]
pub fn effect_with_cleanup<F, C>(run: F) -> Effect
where
    F: Fn() -> C + Send + Sync + 'static,
    C: FnOnce() + Send + 'static,
{
    Effect::with_cleanup(run)
}
