//! Public lifecycle controller
//!
//! [`ContentionMonitor`] composes the aggregator and the polling worker behind
//! a thread-safe `start()` / `stop()` API. Every method takes `&self`, so a
//! monitor can be shared through an `Arc` and stopped from any thread.
//!
//! # Example
//!
//! ```
//! use lockknock::{ContentionMonitor, ExecutionLock, MonitorConfig};
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! # fn main() -> lockknock::Result<()> {
//! let gil = Arc::new(ExecutionLock::new());
//! let config = MonitorConfig::from_ticks(100).with_probe_timeout(Duration::from_secs(1));
//! let monitor = ContentionMonitor::new(gil.clone(), config);
//!
//! assert_eq!(monitor.contention_metric(), None);
//! monitor.start()?;
//! // ... workload contending for `gil` ...
//! std::thread::sleep(Duration::from_millis(20));
//! monitor.stop()?;
//!
//! if let Some(metric) = monitor.contention_metric() {
//!     assert!((0.0..=1.0).contains(&metric));
//! }
//! # Ok(())
//! # }
//! ```

use crate::aggregator::{ContentionSnapshot, SampleAggregator};
use crate::config::MonitorConfig;
use crate::error::{MonitorError, Result};
use crate::host::HostLock;
use crate::monitor::{MonitorState, Worker};
use parking_lot::Mutex;
use std::sync::Arc;

/// Contention monitor for one host lock
///
/// Each instance owns its aggregate; independent monitors can coexist.
pub struct ContentionMonitor {
    lock: Arc<dyn HostLock>,
    config: MonitorConfig,
    aggregator: Arc<SampleAggregator>,
    /// Serializes `start()` and `stop()`
    transition: Mutex<()>,
    worker: Mutex<Option<Worker>>,
    phase: Mutex<MonitorState>,
    /// Fatal worker error not yet reported to the caller
    pending: Mutex<Option<MonitorError>>,
    /// Hung worker given up on, until it leaves the host's acquire
    detached: Mutex<Option<Worker>>,
}

impl ContentionMonitor {
    /// Create an idle monitor for `lock`
    pub fn new<L: HostLock + 'static>(lock: Arc<L>, config: MonitorConfig) -> Self {
        Self {
            lock,
            config,
            aggregator: Arc::new(SampleAggregator::new()),
            transition: Mutex::new(()),
            worker: Mutex::new(None),
            phase: Mutex::new(MonitorState::Idle),
            pending: Mutex::new(None),
            detached: Mutex::new(None),
        }
    }

    /// Create an idle monitor, rejecting an invalid configuration up front
    pub fn try_new<L: HostLock + 'static>(lock: Arc<L>, config: MonitorConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self::new(lock, config))
    }

    pub fn config(&self) -> &MonitorConfig {
        &self.config
    }

    /// Start polling
    ///
    /// Clears metrics from any previous run. Fails with
    /// [`MonitorError::AlreadyRunning`] if a worker is active, and reports a
    /// probe timeout from a previous run that was never collected by `stop()`.
    /// Fails with [`MonitorError::WorkerDetached`] while a worker detached
    /// from a hung probe is still inside the host's acquire.
    pub fn start(&self) -> Result<()> {
        let _transition = self.transition.lock();
        let mut slot = self.worker.lock();
        self.refresh(&mut slot);

        if slot.is_some() {
            return Err(MonitorError::AlreadyRunning);
        }
        if let Some(err) = self.pending.lock().take() {
            return Err(err);
        }
        self.check_detached()?;
        self.config.validate()?;

        self.aggregator.reset();
        let worker = Worker::spawn(self.lock.clone(), self.config, self.aggregator.clone())?;

        *slot = Some(worker);
        *self.phase.lock() = MonitorState::Running;
        tracing::info!(
            "contention monitor started (interval {:?}, probe timeout {:?})",
            self.config.polling_interval(),
            self.config.probe_timeout()
        );
        Ok(())
    }

    /// Stop polling and wait for the worker to exit
    ///
    /// A no-op when idle. Returns [`MonitorError::ProbeTimeout`] (once) if the
    /// run ended because the lock could not be acquired in time; a worker stuck
    /// in such a probe is detached instead of joined. Without a probe timeout
    /// this waits for the in-flight probe however long the host lock takes.
    pub fn stop(&self) -> Result<()> {
        let _transition = self.transition.lock();
        let worker = self.worker.lock().take();
        let pending = self.pending.lock().take();

        let Some(mut worker) = worker else {
            return pending.map_or(Ok(()), Err);
        };

        *self.phase.lock() = MonitorState::Stopping;
        let outcome = worker.stop();
        *self.phase.lock() = MonitorState::Idle;
        if !worker.is_finished() {
            *self.detached.lock() = Some(worker);
        }

        match pending.map_or(outcome, Err) {
            Ok(()) => {
                tracing::info!(
                    "contention monitor stopped after {} probe cycles",
                    self.aggregator.samples()
                );
                Ok(())
            }
            Err(e) => {
                tracing::warn!("contention monitor stopped with error: {}", e);
                Err(e)
            }
        }
    }

    /// Report a fatal worker error without stopping the monitor
    ///
    /// Collects a timed-out or hung probe so it surfaces while the caller is
    /// still sampling metrics. The error is reported once.
    pub fn check(&self) -> Result<()> {
        let mut slot = self.worker.lock();
        self.refresh(&mut slot);
        drop(slot);
        self.pending.lock().take().map_or(Ok(()), Err)
    }

    pub fn state(&self) -> MonitorState {
        let mut slot = self.worker.lock();
        self.refresh(&mut slot);
        *self.phase.lock()
    }

    pub fn is_running(&self) -> bool {
        self.state() == MonitorState::Running
    }

    /// Fraction of observed time spent waiting for the lock, in `[0, 1]`
    ///
    /// `None` until a probe cycle completes (and again after a reset).
    pub fn contention_metric(&self) -> Option<f64> {
        self.aggregator.contention_metric()
    }

    /// Milliseconds the probe spent waiting to acquire the lock
    pub fn time_locked_ms(&self) -> Option<u64> {
        self.aggregator.locked_ms()
    }

    /// Milliseconds the lock was released between probes
    pub fn time_unlocked_ms(&self) -> Option<u64> {
        self.aggregator.unlocked_ms()
    }

    /// Probe cycles recorded since start or reset
    pub fn samples(&self) -> u64 {
        self.aggregator.samples()
    }

    pub fn snapshot(&self) -> ContentionSnapshot {
        self.aggregator.snapshot()
    }

    /// Zero the accumulators without stopping the monitor
    pub fn reset_contention_metric(&self) {
        self.aggregator.reset();
        tracing::debug!("contention metric reset");
    }

    /// Forget a detached worker once it has exited
    fn check_detached(&self) -> Result<()> {
        let mut detached = self.detached.lock();
        match detached.as_ref() {
            Some(worker) if !worker.is_finished() => Err(MonitorError::WorkerDetached),
            _ => {
                *detached = None;
                Ok(())
            }
        }
    }

    /// Collect a worker that has exited on its own or is stuck past its timeout
    fn refresh(&self, slot: &mut Option<Worker>) {
        let Some(worker) = slot.as_mut() else {
            return;
        };

        let (outcome, hung) = match worker.poll() {
            Some(outcome) => (outcome, false),
            None => match worker.hung() {
                Some(err) => (Err(err), true),
                None => return,
            },
        };

        if let Some(worker) = slot.take() {
            if hung {
                worker.detach();
                *self.detached.lock() = Some(worker);
            }
        }
        *self.phase.lock() = MonitorState::Idle;

        if let Err(e) = outcome {
            *self.pending.lock() = Some(e);
        }
    }
}

impl Drop for ContentionMonitor {
    /// Stops a running monitor; blocks while a probe is in flight
    fn drop(&mut self) {
        if let Err(e) = self.stop() {
            tracing::warn!("contention monitor dropped with error: {}", e);
        }
    }
}
