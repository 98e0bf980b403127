use std::hash::Hash;

use siphasher::sip128::{Hasher128, SipHasher13};

/// Produce a 128-bit fingerprint of a call key.
///
/// Keys are not required to implement `Debug`, so log events identify them by
/// this value instead.
#[inline]
pub fn fingerprint<T: Hash + ?Sized>(value: &T) -> u128 {
    let mut state = SipHasher13::new();
    value.hash(&mut state);
    state.finish128().as_u128()
}
