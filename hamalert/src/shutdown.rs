//! Process-wide shutdown.
//!
//! No message is ever sent on the channel: triggering the `Shutdown` drops
//! the sender, which every `ShutdownSignal` observes as a disconnect. This
//! also interrupts loops sleeping on `wait_timeout`.

use crossbeam::channel;
use std::sync::Mutex;
use std::time::Duration;

pub struct Shutdown {
    tx: Mutex<Option<channel::Sender<()>>>,
    rx: channel::Receiver<()>,
}

#[derive(Clone)]
pub struct ShutdownSignal {
    rx: channel::Receiver<()>,
}

impl Default for Shutdown {
    fn default() -> Self {
        Shutdown::new()
    }
}

impl Shutdown {
    pub fn new() -> Shutdown {
        let (tx, rx) = channel::bounded(0);
        Shutdown {
            tx: Mutex::new(Some(tx)),
            rx,
        }
    }

    pub fn signal(&self) -> ShutdownSignal {
        ShutdownSignal {
            rx: self.rx.clone(),
        }
    }

    /// Stops every loop holding a signal from this `Shutdown`. Idempotent.
    pub fn trigger(&self) {
        let mut tx = match self.tx.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        tx.take();
    }
}

impl ShutdownSignal {
    pub fn is_triggered(&self) -> bool {
        matches!(
            self.rx.try_recv(),
            Err(channel::TryRecvError::Disconnected)
        )
    }

    /// Sleeps for `timeout` unless shutdown is triggered first.
    /// Returns whether shutdown was triggered.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        matches!(
            self.rx.recv_timeout(timeout),
            Err(channel::RecvTimeoutError::Disconnected)
        )
    }

    /// To use with `crossbeam::channel::select!`: becomes ready (with an
    /// error) once shutdown is triggered.
    pub fn receiver(&self) -> &channel::Receiver<()> {
        &self.rx
    }
}
