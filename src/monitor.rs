//! Polling monitor: the single background probe worker
//!
//! # Design
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │ APPLICATION THREADS                                          │
//! │   run under the host lock, release it for native work        │
//! └──────────────────────────────────────────────────────────────┘
//!                          │ monitored lock
//!                          ▼
//! ┌──────────────────────────────────────────────────────────────┐
//! │ PROBE WORKER (one per monitor)                               │
//! │   loop {                                                     │
//! │     wait(polling_interval) or stop signal                    │
//! │     watchdog.arm(); probe(); watchdog.disarm();              │
//! │     aggregator.record_at(latency, released_for, now)         │
//! │   }                                                          │
//! └──────────────────────────────────────────────────────────────┘
//!                          │ outcome channel (written once)
//!                          ▼
//!                 controller stop() / check()
//! ```
//!
//! The stop flag and stop signal are checked only between cycles, never
//! while the worker is inside the host's acquire. A probe timeout ends the
//! loop; the error crosses back to the controller through the outcome
//! channel.

use crate::aggregator::SampleAggregator;
use crate::config::MonitorConfig;
use crate::error::{MonitorError, Result};
use crate::host::HostLock;
use crate::probe::TimedLockProbe;
use crate::watchdog::Watchdog;
use crossbeam::channel::{self, Receiver, RecvTimeoutError, Sender, TryRecvError};
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

/// How often `stop()` re-checks the watchdog while waiting for the worker
const STOP_POLL_INTERVAL: Duration = Duration::from_millis(10);

const WORKER_THREAD_NAME: &str = "lockknock-probe";

/// Lifecycle of a monitor: `Idle -> Running -> Stopping -> Idle`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum MonitorState {
    /// No worker exists
    Idle,
    /// Worker is polling
    Running,
    /// Stop requested; waiting for the worker to exit
    Stopping,
}

/// Everything the worker thread owns
struct WorkerContext {
    probe: TimedLockProbe<Arc<dyn HostLock>>,
    config: MonitorConfig,
    aggregator: Arc<SampleAggregator>,
    running: Arc<AtomicBool>,
    watchdog: Arc<Watchdog>,
    stop_rx: Receiver<()>,
}

impl WorkerContext {
    fn run(mut self) -> Result<()> {
        let interval = self.config.polling_interval();
        let timeout = self.config.probe_timeout();
        self.probe.rebase();

        loop {
            match self.stop_rx.recv_timeout(interval) {
                Err(RecvTimeoutError::Timeout) => {}
                Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
            }
            if !self.running.load(Ordering::SeqCst) {
                break;
            }

            self.watchdog.arm();
            let cycle = self.probe.probe(timeout);
            self.watchdog.disarm();

            match cycle {
                Ok(result) => {
                    if !self.running.load(Ordering::SeqCst) {
                        break;
                    }
                    self.aggregator.record_at(
                        result.acquire_latency,
                        result.hold_released_for,
                        Instant::now(),
                    );
                    tracing::trace!(
                        "probe cycle: acquire {:?}, released {:?}",
                        result.acquire_latency,
                        result.hold_released_for
                    );
                }
                Err(e) => {
                    self.running.store(false, Ordering::SeqCst);
                    tracing::error!("contention monitor stopped: {}", e);
                    return Err(e);
                }
            }
        }

        Ok(())
    }
}

/// Handle to a running probe worker
///
/// Each worker has its own stop flag, so a detached worker that finally
/// returns from the host cannot stop a worker spawned after it.
pub struct Worker {
    handle: Option<JoinHandle<()>>,
    running: Arc<AtomicBool>,
    stop_tx: Sender<()>,
    outcome_rx: Receiver<Result<()>>,
    watchdog: Arc<Watchdog>,
}

impl Worker {
    /// Spawn the worker thread
    pub fn spawn(
        lock: Arc<dyn HostLock>,
        config: MonitorConfig,
        aggregator: Arc<SampleAggregator>,
    ) -> Result<Self> {
        let (stop_tx, stop_rx) = channel::bounded(1);
        let (outcome_tx, outcome_rx) = channel::bounded(1);
        let running = Arc::new(AtomicBool::new(true));
        let watchdog = Arc::new(Watchdog::new(config.probe_timeout()));

        let context = WorkerContext {
            probe: TimedLockProbe::new(lock),
            config,
            aggregator,
            running: running.clone(),
            watchdog: watchdog.clone(),
            stop_rx,
        };

        let handle = thread::Builder::new()
            .name(WORKER_THREAD_NAME.to_string())
            .spawn(move || {
                let outcome = context.run();
                // Receiver is gone if the controller dropped a detached worker
                let _ = outcome_tx.send(outcome);
            })?;

        Ok(Self {
            handle: Some(handle),
            running,
            stop_tx,
            outcome_rx,
            watchdog,
        })
    }

    /// Whether the worker is still polling
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Whether the worker thread has exited
    pub fn is_finished(&self) -> bool {
        self.handle.as_ref().map_or(true, JoinHandle::is_finished)
    }

    /// Outcome of the worker if it has already exited
    pub fn poll(&mut self) -> Option<Result<()>> {
        match self.outcome_rx.try_recv() {
            Ok(outcome) => Some(self.join().and(outcome)),
            Err(TryRecvError::Empty) => None,
            Err(TryRecvError::Disconnected) => Some(self.join()),
        }
    }

    /// A `ProbeTimeout` if the worker is stuck inside the host's acquire
    pub fn hung(&self) -> Option<MonitorError> {
        let waited = self.watchdog.expired()?;
        Some(MonitorError::ProbeTimeout {
            waited,
            timeout: self.watchdog.timeout().unwrap_or(waited),
        })
    }

    /// Ask the worker to exit at its next check, without waiting
    pub fn request_stop(&self) {
        self.running.store(false, Ordering::SeqCst);
        let _ = self.stop_tx.try_send(());
    }

    /// Ask the worker to exit and wait until it has
    ///
    /// Returns the worker's outcome. A worker stuck in a probe past its
    /// timeout is detached rather than joined, and its timeout is returned;
    /// [`is_finished`](Worker::is_finished) tells when it has finally left the
    /// host. With no probe timeout this blocks for as long as the host's
    /// acquire.
    pub fn stop(&mut self) -> Result<()> {
        self.request_stop();

        loop {
            match self.outcome_rx.recv_timeout(STOP_POLL_INTERVAL) {
                Ok(outcome) => return self.join().and(outcome),
                Err(RecvTimeoutError::Disconnected) => return self.join(),
                Err(RecvTimeoutError::Timeout) => {
                    if let Some(err) = self.hung() {
                        self.detach();
                        return Err(err);
                    }
                }
            }
        }
    }

    /// Give up on a hung worker without joining it
    ///
    /// The worker exits without recording once the host lets it go.
    pub fn detach(&self) {
        self.request_stop();
        if let Some(handle) = &self.handle {
            tracing::warn!(
                "detaching probe worker {:?} stuck inside the host lock",
                handle.thread().id()
            );
        }
    }

    fn join(&mut self) -> Result<()> {
        match self.handle.take() {
            Some(handle) => handle.join().map_err(|_| MonitorError::WorkerPanicked),
            None => Ok(()),
        }
    }
}
