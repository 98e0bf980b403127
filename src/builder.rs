use std::hash::Hash;
use std::time::Duration;

use crate::error::Error;
use crate::memo::{Handle, Memo};

/// Builder for configuring a [`Memo`].
///
/// # Example
///
/// ```
/// use std::time::Duration;
///
/// use memofan::{Handle, MemoBuilder};
///
/// let square = MemoBuilder::new()
///     .poll_interval(Duration::from_millis(10))
///     .thread_name("square")
///     .build(|_: &Handle<u32, u32>, x: &u32| x * x)?;
///
/// assert_eq!(square.call(7), Some(49));
/// square.close()?;
/// # Ok::<(), memofan::Error>(())
/// ```
///
/// There is deliberately no limit on the number of concurrent workers: every
/// asynchronous submission of a new key gets its own thread.
#[derive(Debug, Clone)]
pub struct MemoBuilder {
    config: Config,
}

/// Settings shared by the facade, the dispatcher and the workers.
#[derive(Debug, Clone)]
pub(crate) struct Config {
    /// Upper bound for a single wait of a blocked `call`.
    pub poll_interval: Duration,
    /// Prefix of all thread names.
    pub thread_name: String,
    /// Stack size of worker threads. `None` uses the platform default.
    pub stack_size: Option<usize>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(100),
            thread_name: "memofan".into(),
            stack_size: None,
        }
    }
}

impl MemoBuilder {
    /// Create a builder with default settings.
    pub fn new() -> Self {
        Self { config: Config::default() }
    }

    /// Set how long a blocked `call` sleeps on the wake signal before it
    /// re-checks the cache on its own.
    ///
    /// Default: 100ms
    pub fn poll_interval(mut self, interval: Duration) -> Self {
        self.config.poll_interval = interval;
        self
    }

    /// Set the prefix for the names of the dispatcher and worker threads.
    ///
    /// Default: `"memofan"`
    pub fn thread_name(mut self, name: impl Into<String>) -> Self {
        self.config.thread_name = name.into();
        self
    }

    /// Set the stack size of worker threads in bytes.
    ///
    /// Deeply recursive functions may need more than the platform default,
    /// since every inline `call` recurses on the current stack.
    pub fn stack_size(mut self, size: usize) -> Self {
        self.config.stack_size = Some(size);
        self
    }

    /// Wrap `func` and start the dispatcher.
    pub fn build<K, V, F>(self, func: F) -> Result<Memo<K, V>, Error>
    where
        K: Hash + Eq + Clone + Send + Sync + 'static,
        V: Clone + Send + Sync + 'static,
        F: Fn(&Handle<K, V>, &K) -> V + Send + Sync + 'static,
    {
        Memo::with_config(self.config, Box::new(func))
    }
}

impl Default for MemoBuilder {
    fn default() -> Self {
        Self::new()
    }
}
