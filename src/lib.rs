//! Recursive memoization with concurrent fan-out.
//!
//! A [`Memo`] wraps a pure function and caches its results by argument. At
//! most one computation runs per distinct argument at any time. The wrapped
//! function receives a [`Handle`] through which it recurses:
//!
//! - [`Handle::call`] returns a cached value, waits for a computation already
//!   running elsewhere, or computes the value inline on the calling thread.
//! - [`Handle::submit_async`] queues a new argument for a background worker
//!   thread and returns immediately.
//!
//! Recursive sub-problems submitted asynchronously are computed concurrently
//! and populate the shared cache ahead of the inline recursion that needs
//! them.
//!
//! ```
//! use memofan::{Handle, Memo};
//!
//! let fib = Memo::new(|memo: &Handle<u64, u64>, &n: &u64| {
//!     if n < 2 {
//!         return 1;
//!     }
//!     let _ = memo.submit_async(n - 2);
//!     memo.call(n - 1).unwrap_or_default() + memo.call(n - 2).unwrap_or_default()
//! })?;
//!
//! assert_eq!(fib.call(5), Some(8));
//! assert_eq!(fib.stats().computations(), 6);
//! fib.close()?;
//! # Ok::<(), memofan::Error>(())
//! ```
//!
//! # Failures
//! A panic inside a background computation is logged and cached as `None`,
//! which callers cannot tell apart from a legitimate `None`. A panic during an
//! inline computation unwinds into the caller and leaves the argument pending
//! forever. There is no cancellation and no timeout.

mod builder;
mod dispatch;
mod error;
mod hash;
mod memo;
mod signal;
mod store;
mod worker;

#[cfg(feature = "testing")]
pub mod testing;

pub use crate::builder::MemoBuilder;
pub use crate::error::Error;
pub use crate::memo::{Handle, Memo, Stats, Submission};
pub use crate::store::State;
