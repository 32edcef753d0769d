use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::{RecordStatus, ResponseRecord};

/// Bounded attempts with a uniformly jittered pause between them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub backoff_min: Duration,
    pub backoff_max: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff_min: Duration::from_millis(500),
            backoff_max: Duration::from_millis(1200),
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, backoff_min: Duration, backoff_max: Duration) -> Self {
        Self {
            max_attempts,
            backoff_min,
            backoff_max,
        }
    }

    /// At least one attempt is always made.
    pub fn attempts(&self) -> u32 {
        self.max_attempts.max(1)
    }

    pub fn has_attempt_after(&self, attempt: u32) -> bool {
        attempt < self.attempts()
    }

    /// Backoff for a jitter sample in `[0, 1]`.
    pub fn backoff(&self, jitter: f64) -> Duration {
        let (low, high) = if self.backoff_min <= self.backoff_max {
            (self.backoff_min, self.backoff_max)
        } else {
            (self.backoff_max, self.backoff_min)
        };
        low + (high - low).mul_f64(jitter.clamp(0.0, 1.0))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BreakerState {
    Closed,
    /// Too many consecutive failures; the caller should pause before continuing.
    Tripped,
}

/// Counts consecutive failed prompts within one worker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CircuitBreaker {
    threshold: u32,
    consecutive_failures: u32,
}

impl CircuitBreaker {
    pub fn new(threshold: u32) -> Self {
        Self {
            threshold: threshold.max(1),
            consecutive_failures: 0,
        }
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures
    }

    pub fn record_success(&mut self) {
        self.consecutive_failures = 0;
    }

    /// Returns `Tripped` once the threshold is reached and re-arms the counter.
    pub fn record_failure(&mut self) -> BreakerState {
        self.consecutive_failures += 1;
        if self.consecutive_failures >= self.threshold {
            self.consecutive_failures = 0;
            BreakerState::Tripped
        } else {
            BreakerState::Closed
        }
    }
}

impl Default for CircuitBreaker {
    fn default() -> Self {
        Self::new(5)
    }
}

/// Which record statuses count as "already done" for resume purposes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum DonePolicy {
    #[default]
    OkOnly,
    /// Blank answers are accepted as final and never retried on later runs.
    OkOrEmpty,
}

impl DonePolicy {
    pub fn is_done(&self, status: RecordStatus) -> bool {
        match self {
            DonePolicy::OkOnly => status == RecordStatus::Ok,
            DonePolicy::OkOrEmpty => matches!(status, RecordStatus::Ok | RecordStatus::Empty),
        }
    }

    pub fn is_done_record(&self, record: &ResponseRecord) -> bool {
        self.is_done(record.status)
    }
}
