use std::cell::Cell;

/// How the last `call` on a thread obtained its value.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// The key was already ready.
    Hit,
    /// The key was new and the function ran inline on this thread.
    Computed,
    /// Another thread owned the key and this one blocked until it was done.
    Waited,
}

thread_local! {
    /// The outcome of the last call on this thread.
    static LAST: Cell<Option<Outcome>> = const { Cell::new(None) };
}

/// The outcome of the last `call` on this thread, if any.
///
/// Nested calls made by the memoized function overwrite it, but the outer
/// call records its own outcome last.
pub fn last_outcome() -> Option<Outcome> {
    LAST.with(|cell| cell.get())
}

/// Whether the last `call` on this thread was served from a ready entry.
pub fn last_was_hit() -> bool {
    last_outcome() == Some(Outcome::Hit)
}

/// Records the outcome of a call.
pub(crate) fn register(outcome: Outcome) {
    LAST.with(|cell| cell.set(Some(outcome)))
}
