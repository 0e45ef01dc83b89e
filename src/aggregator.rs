//! Sample aggregation
//!
//! Converts the stream of probe cycles into cumulative "time locked" (spent
//! acquiring) and "time unlocked" (released between knocks) counters, plus the
//! derived contention ratio:
//!
//! ```text
//! contention_metric = locked / (locked + unlocked)      in [0, 1]
//! ```
//!
//! The ratio is a statistical estimator; its variance is high over short
//! observation windows and shrinks as cycles accumulate.
//!
//! There is exactly one writer (the probe worker). Readers on any thread take
//! a consistent snapshot through a read lock, so a `record` that has returned
//! is visible to every later read.

use parking_lot::RwLock;
use serde::Serialize;
use std::time::{Duration, Instant};

/// Cumulative probe timings since construction or the last reset
#[derive(Debug, Clone, Copy)]
pub struct AggregateState {
    pub locked_duration: Duration,
    pub unlocked_duration: Duration,
    /// Probe cycles recorded
    pub samples: u64,
    pub started_at: Instant,
}

impl AggregateState {
    fn empty() -> Self {
        Self {
            locked_duration: Duration::ZERO,
            unlocked_duration: Duration::ZERO,
            samples: 0,
            started_at: Instant::now(),
        }
    }

    fn has_data(&self) -> bool {
        self.samples > 0
    }

    pub fn contention_metric(&self) -> Option<f64> {
        let total = self.locked_duration + self.unlocked_duration;
        if !self.has_data() || total.is_zero() {
            return None;
        }
        let ratio = self.locked_duration.as_secs_f64() / total.as_secs_f64();
        Some(ratio.clamp(0.0, 1.0))
    }
}

/// Point-in-time view of the aggregate, suitable for reporting
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ContentionSnapshot {
    pub contention_metric: Option<f64>,
    pub time_locked_ms: Option<u64>,
    pub time_unlocked_ms: Option<u64>,
    pub samples: u64,
    /// Wall time since construction or the last reset
    pub observed_ms: u64,
}

impl ContentionSnapshot {
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

impl From<&AggregateState> for ContentionSnapshot {
    fn from(state: &AggregateState) -> Self {
        let has_data = state.has_data();
        ContentionSnapshot {
            contention_metric: state.contention_metric(),
            time_locked_ms: has_data.then(|| state.locked_duration.as_millis() as u64),
            time_unlocked_ms: has_data.then(|| state.unlocked_duration.as_millis() as u64),
            samples: state.samples,
            observed_ms: state.started_at.elapsed().as_millis() as u64,
        }
    }
}

/// Accumulates probe timings into a contention metric
#[derive(Debug)]
pub struct SampleAggregator {
    state: RwLock<AggregateState>,
}

impl Default for SampleAggregator {
    fn default() -> Self {
        Self::new()
    }
}

impl SampleAggregator {
    pub fn new() -> Self {
        Self {
            state: RwLock::new(AggregateState::empty()),
        }
    }

    /// Add one probe cycle
    pub fn record(&self, locked: Duration, unlocked: Duration) {
        let mut state = self.state.write();
        state.locked_duration += locked;
        state.unlocked_duration += unlocked;
        state.samples += 1;
    }

    /// Add one probe cycle that finished at `ended_at`
    ///
    /// A cycle is laid out as `[unlocked][locked]` ending at `ended_at`. Any
    /// part of it that falls before the last reset is dropped, unlocked time
    /// first.
    pub fn record_at(&self, locked: Duration, unlocked: Duration, ended_at: Instant) {
        let mut state = self.state.write();

        let window = ended_at.saturating_duration_since(state.started_at);
        let locked = locked.min(window);
        let unlocked = unlocked.min(window - locked);

        state.locked_duration += locked;
        state.unlocked_duration += unlocked;
        state.samples += 1;
    }

    pub fn contention_metric(&self) -> Option<f64> {
        self.state.read().contention_metric()
    }

    pub fn locked_ms(&self) -> Option<u64> {
        let state = self.state.read();
        state
            .has_data()
            .then(|| state.locked_duration.as_millis() as u64)
    }

    pub fn unlocked_ms(&self) -> Option<u64> {
        let state = self.state.read();
        state
            .has_data()
            .then(|| state.unlocked_duration.as_millis() as u64)
    }

    pub fn samples(&self) -> u64 {
        self.state.read().samples
    }

    pub fn state(&self) -> AggregateState {
        *self.state.read()
    }

    pub fn snapshot(&self) -> ContentionSnapshot {
        ContentionSnapshot::from(&*self.state.read())
    }

    /// Zero the accumulators; later cycles accumulate from now
    pub fn reset(&self) {
        *self.state.write() = AggregateState::empty();
    }
}
