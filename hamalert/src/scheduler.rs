//! Auto-advance scheduler
//!
//! Periodically asks the presentation thread to move to the next spot,
//! a little faster than spots have been arriving so the selection keeps up
//! with the stream. The interval is recomputed every iteration from the
//! latest cadence estimate.

use crate::dispatch::{Action, Dispatcher};
use crate::estimator::EstimateReader;
use crate::shutdown::ShutdownSignal;

use crossbeam::atomic::AtomicCell;
use log::debug;
use std::io;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

/// Shortest pause between two advances unless configured otherwise.
pub const DEFAULT_MIN_INTERVAL: Duration = Duration::from_secs(1);

/// Fraction of the estimated alert interval to wait between advances.
const PACING_FACTOR: f64 = 0.9;

/// Interval derived from the cadence estimate alone, before the floor.
pub fn pacing_interval(estimate: Option<f64>) -> Option<Duration> {
    match estimate {
        Some(est) if est.is_finite() && est > 0.0 => {
            Some(Duration::from_secs_f64(est * PACING_FACTOR))
        }
        _ => None,
    }
}

/// Shared on/off switch for auto-advance, toggled by the UI.
#[derive(Clone, Default)]
pub struct AutoAdvance(Arc<AtomicCell<bool>>);

impl AutoAdvance {
    pub fn new(enabled: bool) -> AutoAdvance {
        AutoAdvance(Arc::new(AtomicCell::new(enabled)))
    }

    pub fn set(&self, enabled: bool) {
        self.0.store(enabled);
    }

    pub fn toggle(&self) -> bool {
        !self.0.fetch_xor(true)
    }

    pub fn is_enabled(&self) -> bool {
        self.0.load()
    }
}

pub struct Scheduler {
    estimate: EstimateReader,
    auto_advance: AutoAdvance,
    min_interval: Duration,
}

impl Scheduler {
    pub fn new(
        estimate: EstimateReader,
        auto_advance: AutoAdvance,
        min_interval: Duration,
    ) -> Scheduler {
        Scheduler {
            estimate,
            auto_advance,
            min_interval,
        }
    }

    /// How long the next iteration sleeps.
    pub fn next_interval(&self) -> Duration {
        match pacing_interval(self.estimate.get()) {
            Some(interval) => interval.max(self.min_interval),
            None => self.min_interval,
        }
    }

    /// Runs the scheduler on its own thread until shutdown, or until the
    /// presentation side goes away.
    pub fn spawn(
        self,
        dispatcher: Dispatcher,
        shutdown: ShutdownSignal,
    ) -> io::Result<thread::JoinHandle<()>> {
        thread::Builder::new()
            .name("scheduler".to_string())
            .spawn(move || loop {
                let interval = self.next_interval();
                if shutdown.wait_timeout(interval) {
                    break;
                }
                if self.auto_advance.is_enabled() {
                    debug!("auto-advance after {:?}", interval);
                    if dispatcher.enqueue(Action::Advance).is_err() {
                        break;
                    }
                }
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatch;
    use crate::estimator::Estimator;
    use crate::shutdown::Shutdown;
    use chrono::{TimeZone, Utc};

    fn at(secs: i64) -> chrono::DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
    }

    #[test]
    fn paces_at_ninety_percent_of_estimate() {
        assert_eq!(pacing_interval(None), None);
        assert_eq!(pacing_interval(Some(-3.0)), None);
        assert_eq!(pacing_interval(Some(10.0)), Some(Duration::from_secs(9)));
    }

    #[test]
    fn interval_never_drops_below_floor() {
        let mut est = Estimator::new();
        let sched = Scheduler::new(est.reader(), AutoAdvance::new(true), DEFAULT_MIN_INTERVAL);
        assert_eq!(sched.next_interval(), DEFAULT_MIN_INTERVAL);
        est.update(at(0));
        est.update(at(20));
        assert_eq!(sched.next_interval(), Duration::from_secs(18));
        est.update(at(21));
        // (21 - 0) / 2 * 0.9 = 9.45 s
        assert!((sched.next_interval().as_secs_f64() - 9.45).abs() < 1e-6);

        let mut fast = Estimator::new();
        fast.update(at(0));
        fast.update(at(0));
        let sched = Scheduler::new(fast.reader(), AutoAdvance::new(true), DEFAULT_MIN_INTERVAL);
        assert_eq!(sched.next_interval(), DEFAULT_MIN_INTERVAL);
    }

    #[test]
    fn toggle_flips_state() {
        let auto = AutoAdvance::new(false);
        assert!(auto.toggle());
        assert!(auto.is_enabled());
        assert!(!auto.toggle());
    }

    #[test]
    fn enqueues_advances_only_while_enabled() {
        let est = Estimator::new();
        let auto = AutoAdvance::new(false);
        let (dispatcher, queue) = dispatch::queue();
        let shutdown = Shutdown::new();
        let sched = Scheduler::new(est.reader(), auto.clone(), Duration::from_millis(10));
        let handle = sched.spawn(dispatcher, shutdown.signal()).unwrap();

        std::thread::sleep(Duration::from_millis(60));
        assert!(queue.is_empty());
        auto.set(true);
        let action = queue
            .receiver()
            .recv_timeout(Duration::from_secs(2))
            .unwrap();
        assert!(matches!(action, Action::Advance));

        shutdown.trigger();
        handle.join().unwrap();
    }
}
