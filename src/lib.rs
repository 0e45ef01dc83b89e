//! lockknock - contention monitor for a runtime's global execution lock
//!
//! A background probe repeatedly knocks on the monitored lock (acquire, then
//! immediately release), timing each attempt. The timings are aggregated into
//! a contention metric in `[0, 1]`: the fraction of observed time the probe
//! spent waiting for the lock. A value near 1 means the workload is lock-bound;
//! near 0 means threads are mostly running outside the lock.
//!
//! The host supplies the lock through [`HostLock`]; [`ExecutionLock`] is a
//! reference implementation.

pub mod aggregator;
pub mod config;
pub mod controller;
pub mod error;
pub mod host;
pub mod monitor;
pub mod probe;
pub mod watchdog;

pub use aggregator::{ContentionSnapshot, SampleAggregator};
pub use config::MonitorConfig;
pub use controller::ContentionMonitor;
pub use error::{MonitorError, Result};
pub use host::{ExecutionLock, FnLock, HostLock};
pub use monitor::MonitorState;
pub use probe::{ProbeResult, TimedLockProbe};
