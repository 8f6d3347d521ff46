//! Error types for the reactive system.

use thiserror::Error;

use super::observer::SourceId;

/// Errors surfaced by reactive evaluation.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ReactiveError {
    /// A memo read itself, directly or through other memos, during its own
    /// evaluation. Detected via a per-evaluation re-entrancy marker so the
    /// cycle fails fast instead of recursing until stack overflow.
    #[error("cyclic dependency: memo {0:?} was read during its own evaluation")]
    CyclicDependency(SourceId),
}
