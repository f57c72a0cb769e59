//! Dispatch queue
//!
//! Background threads never touch presentation state. They send `Action`s
//! through a `Dispatcher`; the presentation thread owns the matching
//! `ActionQueue` and applies them, in order, to its `Presenter`.
//!
//! Waking the presentation thread: a thread blocked on the queue (see
//! `run_once`, or `receiver` with `crossbeam::select!`) is woken by the
//! channel itself. Event loops that cannot block on a crossbeam channel can
//! register a waker hook, which is called after every enqueue.

use crate::alert::Spot;
use crate::client::Event;
use crossbeam::channel;
use log::{error, warn};
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Duration;

/// A deferred operation on the presentation state.
#[derive(Debug, Clone)]
pub enum Action {
    /// Show a newly accepted spot.
    AddSpot(Box<Spot>),
    /// Move the selection to the next spot.
    Advance,
    /// Connection status changed.
    Status(Event),
}

impl Action {
    pub fn name(&self) -> &'static str {
        match self {
            Action::AddSpot(_) => "add_spot",
            Action::Advance => "advance",
            Action::Status(_) => "status",
        }
    }

    pub fn apply<P: Presenter>(self, presenter: &mut P) -> Result<(), P::Error> {
        match self {
            Action::AddSpot(spot) => presenter.add_spot(*spot),
            Action::Advance => presenter.advance(),
            Action::Status(event) => presenter.status(event),
        }
    }
}

/// Presentation state, owned by a single thread.
pub trait Presenter {
    type Error: std::fmt::Display;

    fn add_spot(&mut self, spot: Spot) -> Result<(), Self::Error>;
    fn advance(&mut self) -> Result<(), Self::Error>;
    fn status(&mut self, event: Event) -> Result<(), Self::Error>;
}

/// The presentation side of the queue is gone.
#[derive(Debug, Clone, thiserror::Error)]
#[error("dispatch queue closed")]
pub struct Closed;

type Waker = Arc<dyn Fn() + Send + Sync>;

/// Producer handle, cloneable and usable from any thread.
#[derive(Clone)]
pub struct Dispatcher {
    tx: channel::Sender<Action>,
    waker: Option<Waker>,
}

impl Dispatcher {
    /// Queues `action` without blocking, then wakes the presentation thread.
    pub fn enqueue(&self, action: Action) -> Result<(), Closed> {
        self.tx.send(action).map_err(|_| Closed)?;
        if let Some(waker) = &self.waker {
            waker();
        }
        Ok(())
    }
}

/// Outcome of a drain.
#[derive(Debug, Default, Clone, Copy, PartialEq)]
pub struct Drained {
    pub executed: usize,
    pub failed: usize,
}

/// Consumer side, owned by the presentation thread.
pub struct ActionQueue {
    rx: channel::Receiver<Action>,
}

#[derive(Debug, Clone, Copy, PartialEq, thiserror::Error)]
pub enum WaitError {
    #[error("no action within the timeout")]
    Timeout,
    /// Every `Dispatcher` was dropped and the queue is empty.
    #[error("all dispatchers disconnected")]
    Disconnected,
}

/// Creates a connected `Dispatcher`/`ActionQueue` pair.
pub fn queue() -> (Dispatcher, ActionQueue) {
    let (tx, rx) = channel::unbounded();
    (Dispatcher { tx, waker: None }, ActionQueue { rx })
}

/// Like `queue`, calling `waker` after every enqueue.
pub fn queue_with_waker<W: Fn() + Send + Sync + 'static>(waker: W) -> (Dispatcher, ActionQueue) {
    let (tx, rx) = channel::unbounded();
    (
        Dispatcher {
            tx,
            waker: Some(Arc::new(waker)),
        },
        ActionQueue { rx },
    )
}

impl ActionQueue {
    /// Applies one action, containing any failure (error or panic) to it.
    /// Returns whether it succeeded.
    pub fn execute<P: Presenter>(&self, action: Action, presenter: &mut P) -> bool {
        let name = action.name();
        match panic::catch_unwind(AssertUnwindSafe(|| action.apply(presenter))) {
            Ok(Ok(())) => true,
            Ok(Err(e)) => {
                warn!("action {} failed: {}", name, e);
                false
            }
            Err(_) => {
                error!("action {} panicked", name);
                false
            }
        }
    }

    /// Executes every action queued at the time of the call, in FIFO order.
    pub fn drain_and_execute<P: Presenter>(&self, presenter: &mut P) -> Drained {
        let mut drained = Drained::default();
        let pending = self.rx.len();
        for action in self.rx.try_iter().take(pending) {
            drained.executed += 1;
            if !self.execute(action, presenter) {
                drained.failed += 1;
            }
        }
        drained
    }

    /// Blocks until an action arrives (or `timeout` expires), executes it,
    /// and then drains whatever else is queued.
    pub fn run_once<P: Presenter>(
        &self,
        presenter: &mut P,
        timeout: Option<Duration>,
    ) -> Result<Drained, WaitError> {
        let first = match timeout {
            Some(t) => self.rx.recv_timeout(t).map_err(|e| match e {
                channel::RecvTimeoutError::Timeout => WaitError::Timeout,
                channel::RecvTimeoutError::Disconnected => WaitError::Disconnected,
            })?,
            None => self.rx.recv().map_err(|_| WaitError::Disconnected)?,
        };
        let mut drained = Drained {
            executed: 1,
            failed: if self.execute(first, presenter) { 0 } else { 1 },
        };
        let rest = self.drain_and_execute(presenter);
        drained.executed += rest.executed;
        drained.failed += rest.failed;
        Ok(drained)
    }

    /// To use with `crossbeam::channel::select!`.
    pub fn receiver(&self) -> &channel::Receiver<Action> {
        &self.rx
    }

    pub fn len(&self) -> usize {
        self.rx.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alert::Alert;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn spot(tag: String) -> Action {
        Action::AddSpot(Box::new(Spot::new(
            Alert {
                full_callsign: Some(tag),
                ..Default::default()
            },
            None,
        )))
    }

    /// Records every applied spot; fails (or panics) on the configured call.
    #[derive(Default)]
    struct Recorder {
        calls: usize,
        fail_on: Option<usize>,
        panic_on: Option<usize>,
        seen: Vec<String>,
        advances: usize,
        events: Vec<Event>,
    }

    impl Presenter for Recorder {
        type Error = String;

        fn add_spot(&mut self, spot: Spot) -> Result<(), String> {
            self.calls += 1;
            if Some(self.calls) == self.fail_on {
                return Err(format!("rejecting call {}", self.calls));
            }
            if Some(self.calls) == self.panic_on {
                panic!("handler blew up");
            }
            self.seen.push(spot.alert.display_callsign().to_string());
            Ok(())
        }

        fn advance(&mut self) -> Result<(), String> {
            self.advances += 1;
            Ok(())
        }

        fn status(&mut self, event: Event) -> Result<(), String> {
            self.events.push(event);
            Ok(())
        }
    }

    #[test]
    fn two_producers_keep_their_own_order() {
        let (dispatcher, queue) = queue();
        let producers: Vec<_> = ["a", "b"]
            .into_iter()
            .map(|name| {
                let dispatcher = dispatcher.clone();
                std::thread::spawn(move || {
                    for i in 0..500 {
                        dispatcher.enqueue(spot(format!("{}-{}", name, i))).unwrap();
                    }
                })
            })
            .collect();
        for p in producers {
            p.join().unwrap();
        }

        let mut recorder = Recorder {
            fail_on: Some(500),
            ..Default::default()
        };
        let drained = queue.drain_and_execute(&mut recorder);
        assert_eq!(drained, Drained { executed: 1000, failed: 1 });
        assert_eq!(recorder.seen.len(), 999);

        for name in ["a", "b"] {
            let seq: Vec<usize> = recorder
                .seen
                .iter()
                .filter_map(|tag| tag.strip_prefix(&format!("{}-", name)))
                .map(|n| n.parse().unwrap())
                .collect();
            assert!(seq.windows(2).all(|w| w[0] < w[1]), "{} reordered", name);
            assert!(seq.len() >= 499);
        }
    }

    #[test]
    fn panicking_action_does_not_stop_the_rest() {
        let (dispatcher, queue) = queue();
        for i in 1..=1000 {
            dispatcher.enqueue(spot(i.to_string())).unwrap();
        }
        let mut recorder = Recorder {
            panic_on: Some(500),
            ..Default::default()
        };
        let drained = queue.drain_and_execute(&mut recorder);
        assert_eq!(drained.failed, 1);
        let expected: Vec<String> = (1..=1000)
            .filter(|i| *i != 500)
            .map(|i| i.to_string())
            .collect();
        assert_eq!(recorder.seen, expected);
    }

    #[test]
    fn mixed_actions_apply_in_order() {
        let (dispatcher, queue) = queue();
        dispatcher.enqueue(Action::Status(Event::Ready)).unwrap();
        dispatcher.enqueue(spot("W1AW".to_string())).unwrap();
        dispatcher.enqueue(Action::Advance).unwrap();
        let mut recorder = Recorder::default();
        let drained = queue
            .run_once(&mut recorder, Some(Duration::from_secs(1)))
            .unwrap();
        assert_eq!(drained.executed, 3);
        assert_eq!(recorder.events, vec![Event::Ready]);
        assert_eq!(recorder.seen, vec!["W1AW".to_string()]);
        assert_eq!(recorder.advances, 1);
        assert!(queue.is_empty());
    }

    #[test]
    fn waker_fires_per_enqueue() {
        let wakes = Arc::new(AtomicUsize::new(0));
        let (dispatcher, queue) = {
            let wakes = wakes.clone();
            queue_with_waker(move || {
                wakes.fetch_add(1, Ordering::SeqCst);
            })
        };
        dispatcher.enqueue(Action::Advance).unwrap();
        dispatcher.enqueue(Action::Advance).unwrap();
        assert_eq!(wakes.load(Ordering::SeqCst), 2);
        assert_eq!(queue.len(), 2);
    }

    #[test]
    fn blocked_consumer_wakes_on_enqueue() {
        let (dispatcher, queue) = queue();
        let producer = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(50));
            dispatcher.enqueue(Action::Advance).unwrap();
        });
        let mut recorder = Recorder::default();
        queue
            .run_once(&mut recorder, Some(Duration::from_secs(5)))
            .unwrap();
        assert_eq!(recorder.advances, 1);
        producer.join().unwrap();
        assert_eq!(
            queue.run_once(&mut recorder, Some(Duration::from_millis(10))),
            Err(WaitError::Disconnected)
        );
    }

    #[test]
    fn enqueue_fails_once_consumer_is_gone() {
        let (dispatcher, queue) = queue();
        drop(queue);
        assert!(dispatcher.enqueue(Action::Advance).is_err());
    }
}
