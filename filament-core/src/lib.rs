//! Filament Core
//!
//! This crate implements a fine-grained reactive signal engine:
//!
//! - Signals: mutable value cells with trackable reads and notifying writes
//! - Memos: lazily-cached derived values
//! - Effects: side-effecting subscribers with per-run cleanup
//! - Batching: coalescing multiple writes into one notification pass
//!
//! Reads inside a tracked evaluation register dependency edges
//! automatically; writes invalidate dependents and re-run effects, either
//! synchronously or once per batch.
//!
//! # Example
//!
//! ```rust,ignore
//! use filament_core::reactive::{batch, effect, memo, signal};
//!
//! let count = signal(0);
//!
//! let count_clone = count.clone();
//! let doubled = memo(move || count_clone.get() * 2);
//!
//! let doubled_clone = doubled.clone();
//! let printer = effect(move || {
//!     println!("doubled = {}", doubled_clone.get());
//! });
//!
//! count.set(5); // prints "doubled = 10"
//!
//! batch(|| {
//!     count.set(6);
//!     count.set(7);
//! }); // printer runs once, prints "doubled = 14"
//! # drop(printer);
//! ```

pub mod reactive;
