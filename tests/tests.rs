//! Run with `cargo test --all-features`.

use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use memofan::testing::{Outcome, last_outcome};
use memofan::{Handle, Memo, State, Submission};
use serial_test::serial;
use tracing_subscriber::filter::EnvFilter;

macro_rules! test {
    (miss: $call:expr, $result:expr) => {{
        assert_eq!($call, $result);
        assert!(!memofan::testing::last_was_hit());
    }};
    (hit: $call:expr, $result:expr) => {{
        assert_eq!($call, $result);
        assert!(memofan::testing::last_was_hit());
    }};
}

fn setup() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new("memofan=trace"))
        .with_target(false)
        .with_test_writer()
        .try_init()
        .ok();
}

/// Test basic memoization.
#[test]
#[serial]
fn test_basic() {
    setup();

    let double = Memo::new(|_: &Handle<u32, u32>, x: &u32| 2 * x).unwrap();
    test!(miss: double.call(2), Some(4));
    test!(miss: double.call(4), Some(8));
    test!(hit: double.call(2), Some(4));

    let sum = Memo::new(|_: &Handle<(u32, u32), u32>, &(a, b): &(u32, u32)| a + b).unwrap();
    test!(miss: sum.call((2, 4)), Some(6));
    test!(miss: sum.call((2, 3)), Some(5));
    test!(hit: sum.call((2, 3)), Some(5));
    test!(miss: sum.call((4, 2)), Some(6));

    let empty = Memo::new(|_: &Handle<(), String>, _: &()| format!("The world is {}", "big"))
        .unwrap();
    test!(miss: empty.call(()), Some("The world is big".to_string()));
    test!(hit: empty.call(()), Some("The world is big".to_string()));
    test!(hit: empty.call(()), Some("The world is big".to_string()));

    double.close().unwrap();
    sum.close().unwrap();
    empty.close().unwrap();
}

/// Test that a repeated call does not run the function again.
#[test]
#[serial]
fn test_memoization_counts() {
    setup();

    let runs = Arc::new(AtomicUsize::new(0));
    let counter = runs.clone();
    let len = Memo::new(move |_: &Handle<String, usize>, s: &String| {
        counter.fetch_add(1, Ordering::SeqCst);
        s.len()
    })
    .unwrap();

    test!(miss: len.call("hello".into()), Some(5));
    test!(hit: len.call("hello".into()), Some(5));
    assert_eq!(runs.load(Ordering::SeqCst), 1);

    let stats = len.stats();
    assert_eq!(stats.hits, 1);
    assert_eq!(stats.inline_computations, 1);
    assert_eq!(stats.workers_spawned, 0);
    assert_eq!(len.len(), 1);
    len.close().unwrap();
}

/// Test recursive fan-out on the Fibonacci numbers.
#[test]
#[serial]
fn test_fib() {
    setup();

    let runs = Arc::new(AtomicUsize::new(0));
    let counter = runs.clone();
    let fib = Memo::new(move |memo: &Handle<u64, u64>, &n: &u64| {
        counter.fetch_add(1, Ordering::SeqCst);
        if n < 2 {
            return 1;
        }
        let _ = memo.submit_async(n - 2);
        memo.call(n - 1).unwrap() + memo.call(n - 2).unwrap()
    })
    .unwrap();

    test!(miss: fib.call(5), Some(8));
    assert_eq!(last_outcome(), Some(Outcome::Computed));
    assert_eq!(runs.load(Ordering::SeqCst), 6);
    assert_eq!(fib.stats().computations(), 6);
    test!(hit: fib.call(3), Some(3));
    test!(miss: fib.call(8), Some(34));
    test!(hit: fib.call(7), Some(21));
    assert_eq!(runs.load(Ordering::SeqCst), 9);
    assert_eq!(fib.len(), 9);

    fib.close().unwrap();
}

/// Test that a panic in a background computation is cached as `None`.
#[test]
#[serial]
fn test_failure_masking() {
    setup();

    let checked = Memo::new(|_: &Handle<u32, u32>, &x: &u32| {
        if x == 3 {
            panic!("three is not allowed");
        }
        x + 1
    })
    .unwrap();

    assert_eq!(checked.submit_async(3).unwrap(), Submission::Enqueued);
    assert_eq!(checked.call(3), None);
    test!(hit: checked.call(3), None);
    assert_eq!(checked.state(&3), Some(State::Ready(None)));
    assert_eq!(checked.stats().masked_failures, 1);

    // Other keys are unaffected.
    test!(miss: checked.call(4), Some(5));
    checked.close().unwrap();
}

/// Test that a panic during an inline computation reaches the caller.
#[test]
#[serial]
fn test_inline_panic_propagates() {
    setup();

    let checked = Memo::new(|_: &Handle<u32, u32>, &x: &u32| {
        if x == 7 {
            panic!("seven is not allowed");
        }
        x
    })
    .unwrap();

    let result = panic::catch_unwind(AssertUnwindSafe(|| checked.call(7)));
    assert!(result.is_err());

    // The key stays claimed for good.
    assert_eq!(checked.state(&7), Some(State::Pending));
    assert_eq!(checked.submit_async(7).unwrap(), Submission::Pending);
    assert_eq!(checked.stats().masked_failures, 0);
    checked.close().unwrap();
}

/// Test that recursion through a worker routes back through the cache.
#[test]
#[serial]
fn test_worker_recursion() {
    setup();

    let runs = Arc::new(AtomicUsize::new(0));
    let counter = runs.clone();
    let tri = Memo::new(move |memo: &Handle<u32, u64>, &n: &u32| {
        counter.fetch_add(1, Ordering::SeqCst);
        match n {
            0 => 0,
            _ => n as u64 + memo.call(n - 1).unwrap(),
        }
    })
    .unwrap();

    assert_eq!(tri.submit_async(20).unwrap(), Submission::Enqueued);
    assert_eq!(tri.call(20), Some(210));
    assert!(matches!(last_outcome(), Some(Outcome::Hit | Outcome::Waited)));
    test!(hit: tri.call(10), Some(55));
    assert_eq!(runs.load(Ordering::SeqCst), 21);

    let stats = tri.stats();
    assert_eq!(stats.workers_spawned, 1);
    assert_eq!(stats.inline_computations, 20);
    tri.close().unwrap();
}
