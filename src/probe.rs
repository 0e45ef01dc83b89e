//! Timed lock probe
//!
//! One probe cycle knocks on the monitored lock: acquire, time it, release.
//!
//! ```text
//!   previous release          T0 (knock)            T1 (acquired)
//!        │─── hold_released_for ──│── acquire_latency ──│ release
//! ```
//!
//! Acquire latency is a low-noise proxy for contention: on an idle lock it is
//! close to the scheduler's wake latency; on a saturated lock it approaches
//! the full polling interval.

use crate::error::{MonitorError, Result};
use crate::host::HostLock;
use std::time::{Duration, Instant};

/// Timing of one acquire/release cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProbeResult {
    /// Time spent waiting to acquire the lock
    pub acquire_latency: Duration,
    /// Time between the previous release and this knock
    pub hold_released_for: Duration,
}

/// Drives acquire/release cycles against a host lock
pub struct TimedLockProbe<L> {
    lock: L,
    last_release: Instant,
}

impl<L: HostLock> TimedLockProbe<L> {
    pub fn new(lock: L) -> Self {
        Self {
            lock,
            last_release: Instant::now(),
        }
    }

    /// Restart the released-for clock from now
    pub fn rebase(&mut self) {
        self.last_release = Instant::now();
    }

    /// Run one cycle
    ///
    /// With a `timeout`, the acquire is bounded when the host supports it;
    /// otherwise an acquire that returns only after `timeout` has elapsed is
    /// still reported as [`MonitorError::ProbeTimeout`]. The lock is never held
    /// past the end of the cycle.
    pub fn probe(&mut self, timeout: Option<Duration>) -> Result<ProbeResult> {
        let t0 = Instant::now();
        let hold_released_for = t0.saturating_duration_since(self.last_release);

        let acquired = match timeout {
            Some(timeout) => self.lock.try_acquire_for(timeout),
            None => {
                self.lock.acquire();
                true
            }
        };
        let acquire_latency = t0.elapsed();

        if !acquired {
            self.last_release = Instant::now();
            return Err(MonitorError::ProbeTimeout {
                waited: acquire_latency,
                timeout: timeout.unwrap_or(acquire_latency),
            });
        }

        self.lock.release();
        self.last_release = Instant::now();

        if let Some(timeout) = timeout {
            if acquire_latency > timeout {
                return Err(MonitorError::ProbeTimeout {
                    waited: acquire_latency,
                    timeout,
                });
            }
        }

        Ok(ProbeResult {
            acquire_latency,
            hold_released_for,
        })
    }
}
