use std::any::Any;
use std::hash::Hash;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::thread::{self, JoinHandle};

use slab::Slab;

use crate::error::Error;
use crate::hash::fingerprint;
use crate::memo::{Handle, Shared};

/// Spawn a one-shot worker thread computing `key`.
///
/// The thread is registered with the facade so that closing it can join every
/// worker ever spawned. Workers that already finished are joined here first,
/// which keeps the registry bounded by the number of running workers.
pub(crate) fn spawn<K, V>(shared: &Arc<Shared<K, V>>, key: K) -> Result<(), Error>
where
    K: Hash + Eq + Clone + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    let mut workers = shared.workers.lock();
    reap(&mut workers);

    let number = shared.stats.workers_spawned.fetch_add(1, Ordering::Relaxed);
    let mut builder =
        thread::Builder::new().name(format!("{}-worker-{number}", shared.config.thread_name));
    if let Some(size) = shared.config.stack_size {
        builder = builder.stack_size(size);
    }

    let handle = Handle::new(shared.clone());
    match builder.spawn(move || run(&handle, key)) {
        Ok(thread) => {
            workers.insert(thread);
            Ok(())
        }
        Err(err) => {
            shared.stats.workers_spawned.fetch_sub(1, Ordering::Relaxed);
            Err(err.into())
        }
    }
}

/// Join the workers that have returned from their computation.
fn reap(workers: &mut Slab<JoinHandle<()>>) {
    let finished: Vec<_> = workers
        .iter()
        .filter(|(_, worker)| worker.is_finished())
        .map(|(slot, _)| slot)
        .collect();

    for slot in finished {
        if workers.remove(slot).join().is_err() {
            tracing::error!("worker thread panicked");
        }
    }
}

/// Compute one key and publish the result.
///
/// A panic of the memoized function is logged and published as `None`. The
/// wake signal fires in either case.
fn run<K, V>(handle: &Handle<K, V>, key: K)
where
    K: Hash + Eq + Clone + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    let shared = handle.shared();
    let id = fingerprint(&key);
    tracing::debug!(key = %id, "worker started");

    let result = panic::catch_unwind(AssertUnwindSafe(|| (shared.func)(handle, &key)));
    let value = match result {
        Ok(value) => Some(value),
        Err(payload) => {
            shared.stats.masked_failures.fetch_add(1, Ordering::Relaxed);
            tracing::error!(
                key = %id,
                error = panic_message(payload.as_ref()),
                "memoized function panicked, caching no value"
            );
            None
        }
    };

    shared.store.set(&key, value);
    shared.signal.notify_all();
    tracing::debug!(key = %id, "worker finished");
}

/// Publish `None` for a claimed key whose worker never ran.
///
/// This is the same masking a panicking worker gets, so waiters for the key
/// wake up instead of blocking forever.
pub(crate) fn abandon<K, V>(shared: &Shared<K, V>, key: &K)
where
    K: Hash + Eq + Clone + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    shared.stats.masked_failures.fetch_add(1, Ordering::Relaxed);
    tracing::error!(key = %fingerprint(key), "no worker for key, caching no value");
    shared.store.set(key, None);
    shared.signal.notify_all();
}

/// Extract the message of a panic payload.
fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(message) = payload.downcast_ref::<&'static str>() {
        message
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message
    } else {
        "unknown panic payload"
    }
}
