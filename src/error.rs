use thiserror::Error;

/// A failure of the memoizer's own machinery.
///
/// Failures of the memoized function are never reported through this type.
/// See [`Memo::call`](crate::Memo::call) for how those surface.
#[derive(Debug, Error)]
pub enum Error {
    /// An OS thread for the dispatcher or a worker could not be spawned.
    #[error("failed to spawn thread: {0}")]
    Spawn(#[from] std::io::Error),
    /// The work queue has been closed and accepts no more submissions.
    #[error("memoizer is closed")]
    Closed,
    /// A background thread panicked outside of the guarded computation.
    #[error("{0} thread panicked")]
    Panicked(&'static str),
}
