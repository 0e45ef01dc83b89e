//! Hang detection for in-flight probes
//!
//! The worker arms the watchdog just before knocking on the lock and disarms
//! it once the host's acquire returns. If a probe stays armed past the probe
//! timeout, the host lock is being held indefinitely and the worker is stuck
//! inside the host call, where it cannot observe a stop request. The
//! controller consults [`Watchdog::expired`] so it can report the hang instead
//! of joining a thread that may never return.

use parking_lot::Mutex;
use std::time::{Duration, Instant};

#[derive(Debug)]
pub struct Watchdog {
    in_flight_since: Mutex<Option<Instant>>,
    timeout: Option<Duration>,
}

impl Watchdog {
    /// A watchdog with no timeout never expires
    pub fn new(timeout: Option<Duration>) -> Self {
        Self {
            in_flight_since: Mutex::new(None),
            timeout,
        }
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    /// Mark the start of an acquire attempt
    pub fn arm(&self) {
        *self.in_flight_since.lock() = Some(Instant::now());
    }

    /// Mark that the acquire attempt has returned
    pub fn disarm(&self) {
        *self.in_flight_since.lock() = None;
    }

    pub fn is_armed(&self) -> bool {
        self.in_flight_since.lock().is_some()
    }

    /// How long the in-flight probe has waited, if that exceeds the timeout
    pub fn expired(&self) -> Option<Duration> {
        let timeout = self.timeout?;
        let since = (*self.in_flight_since.lock())?;
        let waited = since.elapsed();
        (waited > timeout).then_some(waited)
    }
}
