//! Error types for the contention monitor
//!
//! Lifecycle errors are synchronous and loud. Metric getters never fail; they
//! return `None` when there is no data.

use std::time::Duration;
use thiserror::Error;

/// Errors raised by the monitor lifecycle
#[derive(Error, Debug)]
pub enum MonitorError {
    /// Invalid polling interval or probe timeout
    #[error("Invalid monitor configuration: {0}")]
    Config(String),

    /// `start()` was called on a monitor that is already polling
    #[error("Monitor is already running; call stop() before start()")]
    AlreadyRunning,

    /// A single probe could not acquire the lock within the configured timeout
    #[error("Probe waited {waited:?} for the monitored lock (timeout {timeout:?}); lock appears to be held indefinitely")]
    ProbeTimeout { waited: Duration, timeout: Duration },

    /// A worker detached from a hung probe is still inside the host's acquire
    #[error("A probe worker from a previous run is still stuck inside the monitored lock")]
    WorkerDetached,

    /// The probe worker thread panicked
    #[error("Probe worker thread panicked")]
    WorkerPanicked,

    /// The OS refused to spawn the probe worker
    #[error("Failed to spawn probe worker: {0}")]
    Spawn(#[from] std::io::Error),
}

impl MonitorError {
    /// Whether this error reports a hung lock
    pub fn is_timeout(&self) -> bool {
        matches!(self, MonitorError::ProbeTimeout { .. })
    }
}

pub type Result<T> = std::result::Result<T, MonitorError>;
