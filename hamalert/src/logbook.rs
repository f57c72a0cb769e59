//! Logbook radio-state updates
//!
//! Tells a Wavelog instance what the radio is tuned to, so a QSO logged
//! there picks up frequency and mode. Posting happens on a dedicated worker
//! thread: the presentation thread only queues the update and never waits
//! on HTTP.

use crossbeam::channel;
use log::{debug, warn};
use serde::Serialize;
use std::io;
use std::thread;
use std::time::Duration;

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Pending updates beyond this are dropped; only the latest state matters.
const WORKER_QUEUE_SIZE: usize = 8;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("logbook request failed: {0}")]
    Http(#[from] ureq::Error),
    #[error("logbook worker stopped")]
    WorkerGone,
}

pub trait Logbook {
    fn post_radio_state(&self, frequency_hz: u64, mode: &str) -> Result<(), Error>;
}

#[derive(Serialize)]
struct RadioRequest<'a> {
    radio: &'a str,
    key: &'a str,
    mode: &'a str,
    frequency: u64,
}

/// Wavelog `/api/radio` client.
pub struct Wavelog {
    url: String,
    api_key: String,
    radio_name: String,
    agent: ureq::Agent,
}

impl Wavelog {
    pub fn new(url: &str, api_key: &str, radio_name: &str) -> Wavelog {
        let config = ureq::Agent::config_builder()
            .timeout_global(Some(DEFAULT_TIMEOUT))
            .build();
        Wavelog {
            url: url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            radio_name: radio_name.to_string(),
            agent: config.into(),
        }
    }

    fn endpoint(&self) -> String {
        format!("{}/api/radio", self.url)
    }
}

impl Logbook for Wavelog {
    fn post_radio_state(&self, frequency_hz: u64, mode: &str) -> Result<(), Error> {
        let request = RadioRequest {
            radio: &self.radio_name,
            key: &self.api_key,
            mode,
            frequency: frequency_hz,
        };
        self.agent.post(self.endpoint().as_str()).send_json(&request)?;
        Ok(())
    }
}

/// Runs a `Logbook` on its own thread, fire-and-forget.
pub struct LogbookWorker {
    tx: channel::Sender<(u64, String)>,
}

impl LogbookWorker {
    pub fn spawn<L: Logbook + Send + 'static>(logbook: L) -> io::Result<LogbookWorker> {
        let (tx, rx) = channel::bounded::<(u64, String)>(WORKER_QUEUE_SIZE);
        thread::Builder::new()
            .name("logbook".to_string())
            .spawn(move || {
                for (frequency, mode) in rx.iter() {
                    match logbook.post_radio_state(frequency, &mode) {
                        Ok(()) => debug!("logbook radio state: {} Hz {}", frequency, mode),
                        Err(e) => warn!("{}", e),
                    }
                }
            })?;
        Ok(LogbookWorker { tx })
    }

    /// Queues an update without waiting for it. A full queue drops it.
    pub fn post(&self, frequency_hz: u64, mode: &str) -> Result<(), Error> {
        match self.tx.try_send((frequency_hz, mode.to_string())) {
            Ok(()) => Ok(()),
            Err(channel::TrySendError::Full(_)) => {
                warn!("logbook busy, dropping radio state update");
                Ok(())
            }
            Err(channel::TrySendError::Disconnected(_)) => Err(Error::WorkerGone),
        }
    }
}
