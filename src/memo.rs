use std::fmt::{self, Debug, Formatter};
use std::hash::Hash;
use std::ops::Deref;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread::JoinHandle;

use crossbeam_channel::{SendError, Sender};
use parking_lot::Mutex;
use slab::Slab;

use crate::builder::{Config, MemoBuilder};
use crate::dispatch::{self, Job};
use crate::error::Error;
use crate::hash::fingerprint;
use crate::signal::WakeSignal;
use crate::store::{Lookup, State, Store};
use crate::worker;

/// The memoized function. It receives a handle to route recursive calls back
/// through the cache.
pub(crate) type Func<K, V> = dyn Fn(&Handle<K, V>, &K) -> V + Send + Sync;

/// Everything shared between the facade, the dispatcher and the workers.
pub(crate) struct Shared<K, V> {
    pub func: Box<Func<K, V>>,
    pub store: Store<K, V>,
    pub signal: WakeSignal,
    /// Sending half of the work queue. `None` once closed.
    pub queue: Mutex<Option<Sender<Job<K>>>>,
    /// Workers that have not finished yet.
    pub workers: Mutex<Slab<JoinHandle<()>>>,
    pub config: Config,
    pub stats: Counters,
}

/// Live counters behind [`Stats`].
#[derive(Default)]
pub(crate) struct Counters {
    pub hits: AtomicUsize,
    pub inline_computations: AtomicUsize,
    pub workers_spawned: AtomicUsize,
    pub masked_failures: AtomicUsize,
}

/// A snapshot of a memoizer's activity.
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq)]
pub struct Stats {
    /// Calls answered from a ready entry without waiting.
    pub hits: usize,
    /// Computations executed inline by a synchronous `call`.
    pub inline_computations: usize,
    /// Worker threads spawned for asynchronous submissions.
    pub workers_spawned: usize,
    /// Background keys cached as `None`, because the function panicked or no
    /// worker could be spawned for them.
    pub masked_failures: usize,
}

impl Stats {
    /// The number of times the memoized function was started.
    pub fn computations(&self) -> usize {
        self.inline_computations + self.workers_spawned
    }
}

/// The outcome of [`Handle::submit_async`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Submission<V> {
    /// The key was new and has been queued for a background worker.
    Enqueued,
    /// Another thread already claimed the key.
    Pending,
    /// The key is already computed.
    Ready(Option<V>),
}

/// A cloneable reference to a memoizer.
///
/// The memoized function receives one of these. All recursion must go through
/// it so that sub-calls hit the shared cache.
pub struct Handle<K, V>(Arc<Shared<K, V>>);

impl<K, V> Handle<K, V>
where
    K: Hash + Eq + Clone + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    pub(crate) fn new(shared: Arc<Shared<K, V>>) -> Self {
        Self(shared)
    }

    pub(crate) fn shared(&self) -> &Shared<K, V> {
        &self.0
    }

    /// Return the memoized result for `key`, computing it if necessary.
    ///
    /// - If the key is ready, its value is returned immediately.
    /// - If the key is new, the function runs inline on the calling thread.
    /// - If another thread is computing the key, this blocks until it is done.
    ///   There is no timeout: if that computation never finishes, neither
    ///   does this call.
    ///
    /// `None` is returned only for keys computed by a background worker whose
    /// function call panicked. Such failures are logged and cached as `None`
    /// for good.
    ///
    /// A panic of the function during an inline computation is not caught. It
    /// unwinds into the caller and leaves the key pending forever, so every
    /// later call for this key blocks.
    pub fn call(&self, key: K) -> Option<V> {
        let shared = &*self.0;
        match shared.store.lookup_or_claim(&key) {
            Lookup::Found(State::Ready(value)) => {
                shared.stats.hits.fetch_add(1, Ordering::Relaxed);
                tracing::trace!(key = %fingerprint(&key), "cache hit");

                #[cfg(feature = "testing")]
                crate::testing::register(crate::testing::Outcome::Hit);

                value
            }
            Lookup::Found(State::Pending) => {
                let value = self.wait(&key);

                #[cfg(feature = "testing")]
                crate::testing::register(crate::testing::Outcome::Waited);

                value
            }
            Lookup::Claimed => {
                let id = fingerprint(&key);
                shared.stats.inline_computations.fetch_add(1, Ordering::Relaxed);
                tracing::debug!(key = %id, "computing inline");

                let value = (shared.func)(self, &key);
                shared.store.set(&key, Some(value.clone()));
                shared.signal.notify_all();
                tracing::debug!(key = %id, "inline computation finished");

                #[cfg(feature = "testing")]
                crate::testing::register(crate::testing::Outcome::Computed);

                Some(value)
            }
        }
    }

    /// Block until another thread publishes the result for `key`.
    fn wait(&self, key: &K) -> Option<V> {
        let shared = &*self.0;
        tracing::trace!(key = %fingerprint(key), "waiting for pending entry");

        let mut generation = shared.signal.generation();
        loop {
            if let Some(State::Ready(value)) = shared.store.get(key) {
                return value;
            }
            generation = shared.signal.wait(generation, shared.config.poll_interval);
        }
    }

    /// Queue `key` for computation on a background worker without waiting.
    ///
    /// Keys that are already pending or ready are not queued again; their
    /// current state is returned instead. Returns [`Error::Closed`] after the
    /// memoizer has been closed, in which case the cache is left untouched.
    pub fn submit_async(&self, key: K) -> Result<Submission<V>, Error> {
        let shared = &*self.0;

        // Holding the sender across claim and send means that every key
        // claimed here is queued before a concurrent close pushes its stop
        // sentinel.
        let queue = shared.queue.lock();
        let sender = queue.as_ref().ok_or(Error::Closed)?;

        match shared.store.lookup_or_claim(&key) {
            Lookup::Found(State::Pending) => Ok(Submission::Pending),
            Lookup::Found(State::Ready(value)) => Ok(Submission::Ready(value)),
            Lookup::Claimed => {
                let id = fingerprint(&key);
                if let Err(SendError(job)) = sender.send(Job::Compute(key)) {
                    // The dispatcher died. Release the claim like a failed
                    // worker would.
                    if let Job::Compute(key) = job {
                        worker::abandon(shared, &key);
                    }
                    return Err(Error::Closed);
                }
                tracing::trace!(key = %id, "enqueued");
                Ok(Submission::Enqueued)
            }
        }
    }

    /// The current state of `key`, or `None` if it was never seen.
    pub fn state(&self, key: &K) -> Option<State<V>> {
        self.0.store.get(key)
    }

    /// The number of pending and ready keys.
    pub fn len(&self) -> usize {
        self.0.store.len()
    }

    /// Whether no key has been seen yet.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// A snapshot of the activity counters.
    pub fn stats(&self) -> Stats {
        let stats = &self.0.stats;
        Stats {
            hits: stats.hits.load(Ordering::Relaxed),
            inline_computations: stats.inline_computations.load(Ordering::Relaxed),
            workers_spawned: stats.workers_spawned.load(Ordering::Relaxed),
            masked_failures: stats.masked_failures.load(Ordering::Relaxed),
        }
    }
}

impl<K, V> Clone for Handle<K, V> {
    fn clone(&self) -> Self {
        Self(self.0.clone())
    }
}

impl<K, V> Debug for Handle<K, V> {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        f.pad("Handle(..)")
    }
}

/// A memoized function whose recursive sub-calls can fan out to background
/// threads.
///
/// Dereferences to its [`Handle`], which provides [`call`](Handle::call) and
/// [`submit_async`](Handle::submit_async). Dropping the memoizer closes it.
// The bounds are only here because the `Drop` impl needs them.
pub struct Memo<K, V>
where
    K: Hash + Eq + Clone + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    handle: Handle<K, V>,
    dispatcher: Option<JoinHandle<Result<(), Error>>>,
}

impl<K, V> Memo<K, V>
where
    K: Hash + Eq + Clone + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    /// Wrap `func` with default settings and start the dispatcher.
    ///
    /// The function must route its recursion through the handle it receives.
    /// Use [`MemoBuilder`] for other settings.
    pub fn new<F>(func: F) -> Result<Self, Error>
    where
        F: Fn(&Handle<K, V>, &K) -> V + Send + Sync + 'static,
    {
        MemoBuilder::new().build(func)
    }

    pub(crate) fn with_config(config: Config, func: Box<Func<K, V>>) -> Result<Self, Error> {
        let (sender, receiver) = crossbeam_channel::unbounded();
        let shared = Arc::new(Shared {
            func,
            store: Store::new(),
            signal: WakeSignal::new(),
            queue: Mutex::new(Some(sender)),
            workers: Mutex::new(Slab::new()),
            config,
            stats: Counters::default(),
        });

        let dispatcher = dispatch::spawn(shared.clone(), receiver)?;
        Ok(Self { handle: Handle(shared), dispatcher: Some(dispatcher) })
    }

    /// A handle that can be moved to other threads.
    ///
    /// Handles stay usable after the memoizer is closed, but
    /// [`submit_async`](Handle::submit_async) then fails.
    pub fn handle(&self) -> Handle<K, V> {
        self.handle.clone()
    }

    /// Stop the dispatcher and join all workers that are still running.
    ///
    /// Keys that were queued before closing are still computed. Reports the
    /// first failure of the background machinery, if any.
    pub fn close(mut self) -> Result<(), Error> {
        self.shutdown()
    }

    fn shutdown(&mut self) -> Result<(), Error> {
        let Some(dispatcher) = self.dispatcher.take() else {
            return Ok(());
        };

        let shared = self.handle.shared();
        tracing::debug!("closing memoizer");

        if let Some(sender) = shared.queue.lock().take() {
            // The dispatcher is gone already if it failed to spawn a worker.
            // Its error surfaces when joining.
            let _ = sender.send(Job::Stop);
        }

        let mut result = dispatcher.join().unwrap_or(Err(Error::Panicked("dispatcher")));

        // The dispatcher is joined, so no worker can be added anymore.
        let workers: Vec<_> = shared.workers.lock().drain().collect();
        tracing::debug!(running = workers.len(), "joining workers");
        for worker in workers {
            if worker.join().is_err() {
                tracing::error!("worker thread panicked");
                result = result.and(Err(Error::Panicked("worker")));
            }
        }

        tracing::debug!("memoizer closed");
        result
    }
}

impl<K, V> Deref for Memo<K, V>
where
    K: Hash + Eq + Clone + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    type Target = Handle<K, V>;

    fn deref(&self) -> &Self::Target {
        &self.handle
    }
}

impl<K, V> Drop for Memo<K, V>
where
    K: Hash + Eq + Clone + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    fn drop(&mut self) {
        if let Err(err) = self.shutdown() {
            tracing::error!(error = %err, "failed to close memoizer");
        }
    }
}

impl<K, V> Debug for Memo<K, V>
where
    K: Hash + Eq + Clone + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        f.debug_struct("Memo")
            .field("len", &self.len())
            .field("closed", &self.dispatcher.is_none())
            .finish()
    }
}
