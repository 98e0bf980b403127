use std::time::Duration;

use parking_lot::{Condvar, Mutex};

/// A single broadcast condition shared by all keys.
///
/// Every store mutation that completes a computation bumps the generation and
/// wakes all waiters, whichever key they wait for. The signal carries no
/// payload: waiters re-read the store themselves.
pub(crate) struct WakeSignal {
    generation: Mutex<u64>,
    condvar: Condvar,
}

impl WakeSignal {
    /// Create a signal at generation zero.
    pub fn new() -> Self {
        Self { generation: Mutex::new(0), condvar: Condvar::new() }
    }

    /// The number of notifications so far.
    ///
    /// Read this before checking the store so that a notification arriving
    /// between the check and [`wait`](Self::wait) is not lost.
    pub fn generation(&self) -> u64 {
        *self.generation.lock()
    }

    /// Wake every blocked waiter.
    pub fn notify_all(&self) {
        let mut generation = self.generation.lock();
        *generation = generation.wrapping_add(1);
        self.condvar.notify_all();
    }

    /// Block until the generation moves past `seen` or `timeout` elapses,
    /// returning the generation observed on wake-up.
    pub fn wait(&self, seen: u64, timeout: Duration) -> u64 {
        let mut generation = self.generation.lock();
        if *generation == seen {
            self.condvar.wait_for(&mut generation, timeout);
        }
        *generation
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Instant;

    use super::*;

    #[test]
    fn test_wait_times_out() {
        let signal = WakeSignal::new();
        let start = Instant::now();
        assert_eq!(signal.wait(0, Duration::from_millis(20)), 0);
        assert!(start.elapsed() >= Duration::from_millis(15));
    }

    #[test]
    fn test_stale_generation_returns_immediately() {
        let signal = WakeSignal::new();
        signal.notify_all();
        let start = Instant::now();
        assert_eq!(signal.wait(0, Duration::from_secs(10)), 1);
        assert!(start.elapsed() < Duration::from_secs(5));
    }

    #[test]
    fn test_notify_wakes_all_waiters() {
        let signal = Arc::new(WakeSignal::new());
        let seen = signal.generation();
        let waiters: Vec<_> = (0..4)
            .map(|_| {
                let signal = signal.clone();
                std::thread::spawn(move || {
                    let mut generation = seen;
                    while generation == seen {
                        generation = signal.wait(seen, Duration::from_secs(10));
                    }
                    generation
                })
            })
            .collect();

        std::thread::sleep(Duration::from_millis(20));
        signal.notify_all();

        for waiter in waiters {
            assert_eq!(waiter.join().unwrap(), seen + 1);
        }
    }
}
