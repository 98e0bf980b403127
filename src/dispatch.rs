use std::hash::Hash;
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crossbeam_channel::Receiver;

use crate::error::Error;
use crate::memo::Shared;
use crate::worker;

/// An item of the work queue.
pub(crate) enum Job<K> {
    /// Compute a key that the submitter already marked pending.
    Compute(K),
    /// Stop draining the queue.
    Stop,
}

/// Start the dispatcher thread.
///
/// The thread returns an error if a worker could not be spawned. In that case
/// the queue is closed and every key still queued is published as `None`.
pub(crate) fn spawn<K, V>(
    shared: Arc<Shared<K, V>>,
    queue: Receiver<Job<K>>,
) -> Result<JoinHandle<Result<(), Error>>, Error>
where
    K: Hash + Eq + Clone + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    let name = format!("{}-dispatcher", shared.config.thread_name);
    let thread = thread::Builder::new().name(name).spawn(move || run(&shared, queue))?;
    Ok(thread)
}

fn run<K, V>(shared: &Arc<Shared<K, V>>, queue: Receiver<Job<K>>) -> Result<(), Error>
where
    K: Hash + Eq + Clone + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    tracing::debug!("dispatcher started");

    // A disconnected queue ends the loop as well as the stop sentinel does.
    while let Ok(job) = queue.recv() {
        let key = match job {
            Job::Compute(key) => key,
            Job::Stop => {
                tracing::debug!(stale = queue.len(), "dispatcher received stop");
                break;
            }
        };

        if let Err(err) = worker::spawn(shared, key.clone()) {
            tracing::error!(error = %err, "failed to spawn worker, stopping dispatcher");

            // Close the queue first: once the sender is gone, no submission
            // can claim a key, so draining here releases every claimed one.
            drop(shared.queue.lock().take());
            worker::abandon(shared, &key);
            for job in queue.try_iter() {
                if let Job::Compute(key) = job {
                    worker::abandon(shared, &key);
                }
            }
            return Err(err);
        }
    }

    tracing::debug!("dispatcher stopped");
    Ok(())
}
