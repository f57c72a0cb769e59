//! Inter-alert cadence estimator
//!
//! The ingestion thread owns the `Estimator` and is its only writer. The
//! current estimate is published into a lock-free cell that any number of
//! `EstimateReader`s (the scheduler) can read without ever blocking the
//! writer.

use chrono::{DateTime, Utc};
use crossbeam::atomic::AtomicCell;
use std::sync::Arc;

/// Number of samples averaged from the first timestamp before switching to
/// the exponential moving average.
const AVERAGE_SAMPLES: u64 = 10;

/// Weight of the previous estimate in the moving average.
const ALPHA: f64 = 0.9;

/// Read side of an `Estimator`.
#[derive(Clone)]
pub struct EstimateReader {
    // NaN while no estimate exists yet.
    cell: Arc<AtomicCell<f64>>,
}

impl EstimateReader {
    /// Current estimate of the time between alerts, in seconds.
    pub fn get(&self) -> Option<f64> {
        let v = self.cell.load();
        if v.is_nan() {
            None
        } else {
            Some(v)
        }
    }
}

pub struct Estimator {
    first_timestamp: Option<DateTime<Utc>>,
    last_timestamp: Option<DateTime<Utc>>,
    sample_count: u64,
    estimate: Option<f64>,
    published: Arc<AtomicCell<f64>>,
}

impl Default for Estimator {
    fn default() -> Self {
        Estimator::new()
    }
}

fn seconds_between(later: DateTime<Utc>, earlier: DateTime<Utc>) -> f64 {
    (later - earlier).num_milliseconds() as f64 / 1000.0
}

impl Estimator {
    pub fn new() -> Estimator {
        Estimator {
            first_timestamp: None,
            last_timestamp: None,
            sample_count: 0,
            estimate: None,
            published: Arc::new(AtomicCell::new(f64::NAN)),
        }
    }

    pub fn reader(&self) -> EstimateReader {
        EstimateReader {
            cell: self.published.clone(),
        }
    }

    /// Feeds the timestamp of the next accepted alert, in arrival order.
    /// Out of order timestamps are not special-cased: deltas are signed.
    pub fn update(&mut self, timestamp: DateTime<Utc>) -> Option<f64> {
        match (self.first_timestamp, self.last_timestamp) {
            (Some(first), Some(last)) => {
                if self.sample_count < AVERAGE_SAMPLES {
                    self.estimate =
                        Some(seconds_between(timestamp, first) / self.sample_count as f64);
                } else {
                    let delta = seconds_between(timestamp, last);
                    let prev = self.estimate.unwrap_or(delta);
                    self.estimate = Some(prev * ALPHA + delta * (1.0 - ALPHA));
                }
            }
            _ => {
                self.first_timestamp = Some(timestamp);
            }
        }
        self.last_timestamp = Some(timestamp);
        self.sample_count += 1;
        if let Some(est) = self.estimate {
            self.published.store(est);
        }
        self.estimate
    }

    pub fn estimate(&self) -> Option<f64> {
        self.estimate
    }

    pub fn sample_count(&self) -> u64 {
        self.sample_count
    }
}
