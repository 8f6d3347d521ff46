//! Signal Implementation
//!
//! A Signal is the fundamental reactive primitive. It holds a value and
//! notifies the observers that read it when the value changes.
//!
//! # How Signals Work
//!
//! 1. When a signal is read within a tracking context (memo/effect), an
//!    edge from the signal to that observer is recorded in the runtime.
//!
//! 2. When a signal's value changes, all observers are notified: memos are
//!    invalidated, effects re-run (immediately, or once per batch).
//!
//! 3. Writing a value equal to the current one is a no-op: no callbacks,
//!    no notification.
//!
//! # Reentrancy
//!
//! Notification runs arbitrary user code synchronously. An effect may
//! write back to the signal that triggered it; the equality no-op is what
//! terminates such feedback loops once the value stabilizes. Observer
//! sets are always iterated as snapshots, so subscribing or disposing
//! mid-notification cannot corrupt the iteration.

use std::fmt::Debug;
use std::sync::Arc;

use parking_lot::RwLock;

use super::context::TrackingContext;
use super::observer::{SourceId, SubscriptionId};
use super::runtime::{Runtime, SourceHandle};

type Callback<T> = Arc<dyn Fn(&T) + Send + Sync>;

/// A reactive value cell.
///
/// Cloning a `Signal` produces another handle to the same cell; clones
/// share the value, the subscription list, and the identity used for
/// dependency tracking.
///
/// # Example
///
/// ```rust,ignore
/// let count = Signal::new(0);
///
/// // Tracked read (registers a dependency inside a memo/effect)
/// let value = count.get();
///
/// // Untracked read
/// let value = count.peek();
///
/// // Write (notifies observers unless the value is unchanged)
/// count.set(5);
/// ```
pub struct Signal<T>
where
    T: Clone + PartialEq + Send + Sync + 'static,
{
    /// Unique identity of this cell in the edge arena.
    id: SourceId,

    /// The current value.
    value: Arc<RwLock<T>>,

    /// Plain callback subscriptions, invoked on every committed write.
    callbacks: Arc<RwLock<Vec<(SubscriptionId, Callback<T>)>>>,

    /// Removes this signal's edge-arena entry when the last clone drops.
    _source: Arc<SourceHandle>,
}

impl<T> Signal<T>
where
    T: Clone + PartialEq + Send + Sync + 'static,
{
    /// Create a new signal with the given initial value.
    pub fn new(value: T) -> Self {
        let id = SourceId::new();
        Self {
            id,
            value: Arc::new(RwLock::new(value)),
            callbacks: Arc::new(RwLock::new(Vec::new())),
            _source: Arc::new(SourceHandle::new(id)),
        }
    }

    /// Get the signal's identity.
    pub fn id(&self) -> SourceId {
        self.id
    }

    /// Get the current value.
    ///
    /// If called within a tracking context, also registers the current
    /// observer as a dependent of this signal.
    pub fn get(&self) -> T {
        if let Some(observer_id) = TrackingContext::current_observer() {
            TrackingContext::track_source(self.id);
            Runtime::add_edge(self.id, observer_id);
        }

        self.value.read().clone()
    }

    /// Get the current value without registering a dependency.
    ///
    /// Use this to read a signal from inside an effect or memo without
    /// re-running on its changes, e.g. to break a would-be feedback loop.
    pub fn peek(&self) -> T {
        self.value.read().clone()
    }

    /// Set a new value and notify observers.
    ///
    /// A write of a value equal to the current one (by `PartialEq`) is a
    /// no-op: the value is untouched and nobody is notified.
    pub fn set(&self, value: T) {
        {
            let mut guard = self.value.write();
            if *guard == value {
                return;
            }
            *guard = value;
        }

        tracing::trace!(source = ?self.id, "signal changed");

        self.run_callbacks();
        Runtime::notify(self.id);
    }

    /// Update the value using a function of the current value.
    ///
    /// Equality short-circuiting applies as in [`set`](Self::set).
    pub fn update<F>(&self, f: F)
    where
        F: FnOnce(&T) -> T,
    {
        let new_value = {
            let guard = self.value.read();
            f(&guard)
        };
        self.set(new_value);
    }

    /// Register a callback invoked with the new value on every committed
    /// write.
    ///
    /// This is a plain subscription outside the tracking machinery: it
    /// never establishes a dependency edge and is not affected by
    /// batching.
    pub fn subscribe<F>(&self, callback: F) -> SubscriptionId
    where
        F: Fn(&T) + Send + Sync + 'static,
    {
        let id = SubscriptionId::new();
        self.callbacks.write().push((id, Arc::new(callback)));
        id
    }

    /// Remove a callback subscription. Unknown IDs are ignored.
    pub fn unsubscribe(&self, subscription_id: SubscriptionId) {
        self.callbacks.write().retain(|(id, _)| *id != subscription_id);
    }

    /// Number of callback subscriptions.
    pub fn subscription_count(&self) -> usize {
        self.callbacks.read().len()
    }

    fn run_callbacks(&self) {
        // Snapshot so a callback may subscribe/unsubscribe reentrantly.
        let snapshot: Vec<Callback<T>> = self
            .callbacks
            .read()
            .iter()
            .map(|(_, callback)| Arc::clone(callback))
            .collect();

        if snapshot.is_empty() {
            return;
        }

        let value = self.value.read().clone();
        for callback in snapshot {
            callback(&value);
        }
    }
}

impl<T> Clone for Signal<T>
where
    T: Clone + PartialEq + Send + Sync + 'static,
{
    fn clone(&self) -> Self {
        Self {
            id: self.id,
            value: Arc::clone(&self.value),
            callbacks: Arc::clone(&self.callbacks),
            _source: Arc::clone(&self._source),
        }
    }
}

impl<T> Debug for Signal<T>
where
    T: Clone + PartialEq + Send + Sync + Debug + 'static,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Signal")
            .field("id", &self.id)
            .field("value", &self.peek())
            .field("subscriptions", &self.subscription_count())
            .finish()
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicI32, Ordering};

    #[test]
    fn signal_get_and_set() {
        let signal = Signal::new(0);
        assert_eq!(signal.get(), 0);

        signal.set(42);
        assert_eq!(signal.get(), 42);
    }

    #[test]
    fn signal_update() {
        let signal = Signal::new(10);
        signal.update(|v| v + 5);
        assert_eq!(signal.get(), 15);
    }

    #[test]
    fn signal_notifies_subscriptions() {
        let signal = Signal::new(0);
        let call_count = Arc::new(AtomicI32::new(0));
        let call_count_clone = call_count.clone();

        signal.subscribe(move |_| {
            call_count_clone.fetch_add(1, Ordering::SeqCst);
        });

        assert_eq!(call_count.load(Ordering::SeqCst), 0);

        signal.set(1);
        assert_eq!(call_count.load(Ordering::SeqCst), 1);

        signal.set(2);
        assert_eq!(call_count.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn signal_equal_write_is_noop() {
        let signal = Signal::new(5);
        let call_count = Arc::new(AtomicI32::new(0));
        let call_count_clone = call_count.clone();

        signal.subscribe(move |_| {
            call_count_clone.fetch_add(1, Ordering::SeqCst);
        });

        signal.set(5);
        assert_eq!(call_count.load(Ordering::SeqCst), 0);

        signal.set(6);
        assert_eq!(call_count.load(Ordering::SeqCst), 1);

        signal.set(6);
        assert_eq!(call_count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn signal_subscription_receives_new_value() {
        let signal = Signal::new(String::from("a"));
        let seen = Arc::new(RwLock::new(Vec::new()));
        let seen_clone = seen.clone();

        signal.subscribe(move |value: &String| {
            seen_clone.write().push(value.clone());
        });

        signal.set(String::from("b"));
        signal.set(String::from("c"));

        assert_eq!(seen.read().as_slice(), &["b".to_string(), "c".to_string()]);
    }

    #[test]
    fn signal_unsubscribe() {
        let signal = Signal::new(0);
        let call_count = Arc::new(AtomicI32::new(0));
        let call_count_clone = call_count.clone();

        let subscription = signal.subscribe(move |_| {
            call_count_clone.fetch_add(1, Ordering::SeqCst);
        });

        signal.set(1);
        assert_eq!(call_count.load(Ordering::SeqCst), 1);

        signal.unsubscribe(subscription);
        signal.set(2);
        // Should not have been called again
        assert_eq!(call_count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn signal_clone_shares_state() {
        let signal1 = Signal::new(0);
        let signal2 = signal1.clone();

        signal1.set(42);
        assert_eq!(signal2.get(), 42);

        signal2.set(100);
        assert_eq!(signal1.get(), 100);
    }

    #[test]
    fn signal_ids_are_unique() {
        let s1 = Signal::new(0);
        let s2 = Signal::new(0);
        let s3 = Signal::new(0);

        assert_ne!(s1.id(), s2.id());
        assert_ne!(s2.id(), s3.id());
        assert_ne!(s1.id(), s3.id());
    }

    #[test]
    fn signal_peek_outside_context_reads_value() {
        let signal = Signal::new(9);
        assert_eq!(signal.peek(), 9);
    }
}
