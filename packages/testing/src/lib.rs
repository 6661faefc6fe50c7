#![cfg_attr(coverage_nightly, feature(coverage_attribute))]
#![cfg_attr(coverage_nightly, coverage(off))] // This is all test code, no need to test it.

//! Private helpers for testing the `scalar_gate` packages.

use std::sync::{Arc, Barrier, mpsc};
use std::thread;
use std::time::Duration;

/// How long a test wrapped in [`with_watchdog`] may run before we declare it hung.
fn watchdog_timeout() -> Duration {
    // Miri is dramatically slower for thread synchronization.
    if cfg!(miri) {
        Duration::from_secs(60)
    } else {
        Duration::from_secs(10)
    }
}

/// Runs a test on a separate thread and panics if it does not finish in time.
///
/// A lost wakeup or a compare-and-swap loop that never converges would otherwise hang the
/// test binary forever. When the `MUTATION_TESTING` environment variable is "1", the test
/// runs directly so that cargo-mutants can detect hanging mutations with its own timeout.
///
/// # Panics
///
/// Panics if the test exceeds the timeout, or resumes the panic of the test itself.
///
/// # Example
///
/// ```rust
/// use testing::with_watchdog;
///
/// let answer = with_watchdog(|| 6 * 7);
/// assert_eq!(answer, 42);
/// ```
pub fn with_watchdog<F, R>(test_fn: F) -> R
where
    F: FnOnce() -> R + Send + 'static,
    R: Send + 'static,
{
    if std::env::var("MUTATION_TESTING").as_deref() == Ok("1") {
        return test_fn();
    }

    let (tx, rx) = mpsc::channel();

    let test_thread = thread::spawn(move || {
        // If this fails, the watchdog already gave up on us.
        drop(tx.send(test_fn()));
    });

    match rx.recv_timeout(watchdog_timeout()) {
        Ok(result) => {
            test_thread.join().expect("test thread finished, so cannot have panicked");
            result
        }
        Err(mpsc::RecvTimeoutError::Timeout) => {
            panic!("test exceeded {:?} timeout", watchdog_timeout());
        }
        Err(mpsc::RecvTimeoutError::Disconnected) => match test_thread.join() {
            Ok(()) => panic!("test thread exited without reporting a result"),
            Err(payload) => std::panic::resume_unwind(payload),
        },
    }
}

/// Runs two closures on two new threads, releasing both at the same instant so that their
/// first actions race each other as closely as the platform allows.
///
/// Returns the results of both closures once both threads have finished.
///
/// # Panics
///
/// Resumes the panic of either closure.
///
/// # Example
///
/// ```rust
/// use std::sync::atomic::{AtomicUsize, Ordering};
/// use std::sync::Arc;
///
/// use testing::run_concurrently;
///
/// let counter = Arc::new(AtomicUsize::new(0));
///
/// let (a, b) = run_concurrently(
///     {
///         let counter = Arc::clone(&counter);
///         move || counter.fetch_add(1, Ordering::Relaxed)
///     },
///     {
///         let counter = Arc::clone(&counter);
///         move || counter.fetch_add(1, Ordering::Relaxed)
///     },
/// );
///
/// assert_eq!(a + b, 1);
/// assert_eq!(counter.load(Ordering::Relaxed), 2);
/// ```
pub fn run_concurrently<A, B, RA, RB>(a: A, b: B) -> (RA, RB)
where
    A: FnOnce() -> RA + Send + 'static,
    B: FnOnce() -> RB + Send + 'static,
    RA: Send + 'static,
    RB: Send + 'static,
{
    let start = Arc::new(Barrier::new(2));

    let thread_a = thread::spawn({
        let start = Arc::clone(&start);
        move || {
            start.wait();
            a()
        }
    });

    let thread_b = thread::spawn(move || {
        start.wait();
        b()
    });

    let result_a = thread_a
        .join()
        .unwrap_or_else(|payload| std::panic::resume_unwind(payload));
    let result_b = thread_b
        .join()
        .unwrap_or_else(|payload| std::panic::resume_unwind(payload));

    (result_a, result_b)
}
