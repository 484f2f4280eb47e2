//! Capture outcome statistics.
//!
//! Counts every capture attempt. `successful + failed == total` holds after
//! every update; only [`CaptureStatistics::reset`] moves counts backwards.

use crate::error::CaptureError;
use chrono::{DateTime, Local};
use serde::Serialize;
use std::collections::VecDeque;
use std::time::Duration;

/// One failed attempt.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FailureRecord {
    pub timestamp: DateTime<Local>,
    /// Failure kind, e.g. `debounce_active`.
    pub kind: &'static str,
    pub reason: String,
    /// Position of the attempt in the running total.
    pub attempt: u64,
}

/// Aggregate capture outcomes.
#[derive(Debug, Clone)]
pub struct CaptureStatistics {
    total: u64,
    successful: u64,
    failed: u64,
    /// Latency summed over successful captures.
    cumulative: Duration,
    last_success: Option<DateTime<Local>>,
    errors: VecDeque<FailureRecord>,
    capacity: usize,
    /// Number of resets so far.
    epoch: u64,
}

impl CaptureStatistics {
    /// Keeps at most `capacity` failure records.
    pub fn new(capacity: usize) -> Self {
        Self {
            total: 0,
            successful: 0,
            failed: 0,
            cumulative: Duration::ZERO,
            last_success: None,
            errors: VecDeque::with_capacity(capacity),
            capacity,
            epoch: 0,
        }
    }

    pub fn record_success(&mut self, latency: Duration, at: DateTime<Local>) {
        self.total += 1;
        self.successful += 1;
        self.cumulative += latency;
        self.last_success = Some(at);
    }

    /// Records a failure and returns its attempt index.
    pub fn record_failure(&mut self, error: &CaptureError, at: DateTime<Local>) -> u64 {
        self.total += 1;
        self.failed += 1;

        if self.capacity > 0 {
            if self.errors.len() == self.capacity {
                self.errors.pop_front();
            }
            self.errors.push_back(FailureRecord {
                timestamp: at,
                kind: error.kind(),
                reason: error.to_string(),
                attempt: self.total,
            });
        }
        self.total
    }

    pub fn total(&self) -> u64 {
        self.total
    }

    pub fn successful(&self) -> u64 {
        self.successful
    }

    pub fn failed(&self) -> u64 {
        self.failed
    }

    pub fn cumulative_time(&self) -> Duration {
        self.cumulative
    }

    /// Mean latency of successful captures.
    pub fn average_time(&self) -> Duration {
        if self.successful == 0 {
            Duration::ZERO
        } else {
            self.cumulative.div_f64(self.successful as f64)
        }
    }

    /// Percentage of attempts that succeeded (0 with no attempts).
    pub fn success_rate(&self) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            self.successful as f64 / self.total as f64 * 100.0
        }
    }

    pub fn last_success(&self) -> Option<DateTime<Local>> {
        self.last_success
    }

    /// Failure records, oldest first.
    pub fn recent_errors(&self) -> impl Iterator<Item = &FailureRecord> {
        self.errors.iter()
    }

    /// Clears every count and starts a new epoch.
    pub fn reset(&mut self) {
        *self = Self {
            epoch: self.epoch + 1,
            ..Self::new(self.capacity)
        };
    }

    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    /// Rounded, serialisable view.
    pub fn snapshot(&self) -> StatisticsSnapshot {
        StatisticsSnapshot {
            total_captures: self.total,
            successful_captures: self.successful,
            failed_captures: self.failed,
            success_rate_percent: round_to(self.success_rate(), 2),
            total_capture_time: round_to(self.cumulative.as_secs_f64(), 3),
            average_capture_time: round_to(self.average_time().as_secs_f64(), 3),
            last_capture_timestamp: self.last_success,
            recent_errors: self.errors.iter().cloned().collect(),
            epoch: self.epoch,
        }
    }
}

impl Default for CaptureStatistics {
    fn default() -> Self {
        Self::new(10)
    }
}

/// Statistics as reported to clients. Times are in seconds.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatisticsSnapshot {
    pub total_captures: u64,
    pub successful_captures: u64,
    pub failed_captures: u64,
    pub success_rate_percent: f64,
    pub total_capture_time: f64,
    pub average_capture_time: f64,
    pub last_capture_timestamp: Option<DateTime<Local>>,
    pub recent_errors: Vec<FailureRecord>,
    /// Resets before these counts began.
    #[serde(skip)]
    pub epoch: u64,
}

pub(crate) fn round_to(value: f64, places: i32) -> f64 {
    let factor = 10f64.powi(places);
    (value * factor).round() / factor
}
