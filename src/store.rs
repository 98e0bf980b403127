use std::hash::Hash;

use parking_lot::RwLock;
use rustc_hash::FxHashMap;

/// The state of a call key that has been seen by the memoizer.
///
/// A key that was never seen has no state at all.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum State<V> {
    /// Some thread claimed the computation and has not finished it yet.
    Pending,
    /// The computation finished. `None` means a background computation
    /// panicked and its failure was masked.
    Ready(Option<V>),
}

/// Result of [`Store::lookup_or_claim`].
#[derive(Debug)]
pub(crate) enum Lookup<V> {
    /// The key was absent and is now pending. The caller owns its computation.
    Claimed,
    /// The key already had a state.
    Found(State<V>),
}

/// The map from call keys to their states, shared by all threads.
pub(crate) struct Store<K, V> {
    map: RwLock<FxHashMap<K, State<V>>>,
}

impl<K, V> Store<K, V>
where
    K: Hash + Eq + Clone,
    V: Clone,
{
    /// Create an empty store.
    pub fn new() -> Self {
        Self { map: RwLock::new(FxHashMap::default()) }
    }

    /// The current state of a key.
    pub fn get(&self, key: &K) -> Option<State<V>> {
        self.map.read().get(key).cloned()
    }

    /// Return the key's state or atomically mark it pending if it is absent.
    ///
    /// Among any number of racing callers for the same absent key, exactly one
    /// receives [`Lookup::Claimed`].
    pub fn lookup_or_claim(&self, key: &K) -> Lookup<V> {
        if let Some(state) = self.map.read().get(key) {
            return Lookup::Found(state.clone());
        }

        // Re-check under the write lock, another thread may have claimed the
        // key between the two locks.
        let mut map = self.map.write();
        if let Some(state) = map.get(key) {
            return Lookup::Found(state.clone());
        }
        map.insert(key.clone(), State::Pending);
        Lookup::Claimed
    }

    /// Like [`lookup_or_claim`](Self::lookup_or_claim), but only reports
    /// whether this call won the race.
    #[cfg(test)]
    pub fn insert_if_absent(&self, key: &K) -> bool {
        matches!(self.lookup_or_claim(key), Lookup::Claimed)
    }

    /// Publish the result for a pending key.
    ///
    /// Ready entries are immutable, so publishing for a key that is already
    /// ready (or was never claimed) leaves the store untouched and returns
    /// `false`.
    pub fn set(&self, key: &K, value: Option<V>) -> bool {
        let mut map = self.map.write();
        match map.get_mut(key) {
            Some(slot) if matches!(slot, State::Pending) => {
                *slot = State::Ready(value);
                true
            }
            _ => false,
        }
    }

    /// The number of keys with a state.
    pub fn len(&self) -> usize {
        self.map.read().len()
    }
}
