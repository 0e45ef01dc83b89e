// Integration test utilities
//
// Workloads that contend for an ExecutionLock the way interpreter threads
// contend for a global execution lock, plus helpers for noisy timing checks.

#![allow(dead_code)]

use lockknock::{ContentionMonitor, ExecutionLock};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing_subscriber::EnvFilter;

/// How long a saturating thread runs before yielding the lock
pub const SWITCH_INTERVAL: Duration = Duration::from_millis(5);

/// Install a test-writer subscriber; `RUST_LOG` controls verbosity
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Busy-wait without sleeping
pub fn spin_for(duration: Duration) {
    let start = Instant::now();
    while start.elapsed() < duration {
        std::hint::spin_loop();
    }
}

/// Threads that keep the lock continuously requested
///
/// Each thread holds the lock for a switch interval of pure computation, then
/// immediately queues for it again.
pub fn spawn_saturating(
    lock: &Arc<ExecutionLock>,
    threads: usize,
    duration: Duration,
) -> Vec<JoinHandle<()>> {
    spawn_workers(lock, threads, duration, |lock| {
        let _guard = lock.hold();
        spin_for(SWITCH_INTERVAL);
    })
}

/// Threads that mostly run outside the lock
///
/// Each thread does a sliver of interpreted work under the lock, then releases
/// it for a few milliseconds of native work.
pub fn spawn_releasing(
    lock: &Arc<ExecutionLock>,
    threads: usize,
    duration: Duration,
) -> Vec<JoinHandle<()>> {
    spawn_workers(lock, threads, duration, |lock| {
        {
            let _guard = lock.hold();
            spin_for(Duration::from_micros(20));
        }
        thread::sleep(Duration::from_millis(3));
    })
}

fn spawn_workers(
    lock: &Arc<ExecutionLock>,
    threads: usize,
    duration: Duration,
    step: fn(&ExecutionLock),
) -> Vec<JoinHandle<()>> {
    let deadline = Instant::now() + duration;
    (0..threads)
        .map(|_| {
            let lock = lock.clone();
            thread::spawn(move || {
                while Instant::now() < deadline {
                    step(&lock);
                }
            })
        })
        .collect()
}

pub fn join_all(handles: Vec<JoinHandle<()>>) {
    for handle in handles {
        handle.join().unwrap();
    }
}

/// Hold the lock for `hold`, release it, repeat until `total` has elapsed
pub fn lock_and_release(lock: &ExecutionLock, hold: Duration, total: Duration) {
    let deadline = Instant::now() + total;
    while Instant::now() < deadline {
        let _guard = lock.hold();
        thread::sleep(hold);
    }
}

/// Block until the monitor has recorded at least `n` probe cycles
pub fn wait_for_samples(monitor: &ContentionMonitor, n: u64) {
    let deadline = Instant::now() + Duration::from_secs(10);
    while monitor.samples() < n {
        assert!(
            Instant::now() < deadline,
            "monitor recorded only {} of {} probe cycles",
            monitor.samples(),
            n
        );
        thread::sleep(Duration::from_millis(1));
    }
}

/// Run a timing-sensitive check up to `attempts` times
///
/// Panics with the last failure if no attempt passes.
pub fn retry<F>(attempts: usize, mut check: F)
where
    F: FnMut() -> Result<(), String>,
{
    let mut last = String::new();
    for attempt in 1..=attempts {
        match check() {
            Ok(()) => return,
            Err(e) => {
                eprintln!("[test-utils] attempt {}/{} failed: {}", attempt, attempts, e);
                last = e;
            }
        }
    }
    panic!("timing check failed after {} attempts: {}", attempts, last);
}
