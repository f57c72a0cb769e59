//! Ingestion client
//!
//! `Client::spawn` starts the ingestion thread: it connects, runs the
//! handshake once, and then turns every line of the alert stream into an
//! `Action::AddSpot` for the presentation thread. Per-record problems
//! (undecodable lines, unparsable times) are logged and skipped; a broken
//! stream ends the thread and is reported both through `Client::state()`
//! and as an `Event::Disconnected` on the dispatch queue. There is no
//! automatic reconnection.

use crate::alert::{Alert, Spot};
use crate::dispatch::{Action, Closed, Dispatcher};
use crate::estimator::{EstimateReader, Estimator};
use crate::filter::FilterSet;
use crate::session::{self, Credentials, Session};
use crate::shutdown::ShutdownSignal;
use crate::timestamp;
use crate::transport::{tcp, RecvError, Stream};

use chrono::{DateTime, Utc};
use crossbeam::atomic::AtomicCell;
use log::{debug, error, info, warn};
use std::io;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

/// Read timeout once the stream is up; bounds how long shutdown can go unnoticed.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(500);

/// Status events, delivered in order with the spots.
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    Connecting(String),
    Connected,
    /// The server greeted us by call sign.
    Authenticated,
    /// Handshake done, alerts are flowing.
    Ready,
    /// The ingestion thread stopped on a fatal error.
    Disconnected(String),
    /// The ingestion thread stopped on shutdown.
    Exiting,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Connecting,
    Connected,
    Ready,
    Disconnected,
    Stopped,
}

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("failed to connect to {0}: {1}")]
    Connect(String, #[source] io::Error),
    #[error(transparent)]
    Session(#[from] session::Error),
    #[error("connection lost: {0}")]
    ConnectionLost(#[from] RecvError),
    #[error(transparent)]
    Dispatch(#[from] Closed),
    #[error("ingestion thread panicked")]
    Panicked,
}

#[derive(Debug, Clone)]
pub struct ClientOptions {
    /// `host[:port]` of the alert service.
    pub address: String,
    pub credentials: Credentials,
    /// Number of recent spots to replay after login. `None` or 0 disables.
    pub load_recent: Option<u32>,
    pub handshake_timeout: Duration,
    pub poll_interval: Duration,
}

impl ClientOptions {
    pub fn new(address: impl Into<String>, credentials: Credentials) -> ClientOptions {
        ClientOptions {
            address: address.into(),
            credentials,
            load_recent: Some(session::DEFAULT_LOAD_RECENT),
            handshake_timeout: session::DEFAULT_HANDSHAKE_TIMEOUT,
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }
}

/// What happened to one line of the alert stream.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    Blank,
    Undecodable,
    Filtered,
    Queued { timestamp: Option<DateTime<Utc>> },
}

/// Per-line pipeline: decode, filter, resolve time, update cadence, enqueue.
pub struct Ingest {
    filters: Arc<FilterSet>,
    estimator: Estimator,
    dispatcher: Dispatcher,
}

impl Ingest {
    pub fn new(filters: Arc<FilterSet>, dispatcher: Dispatcher) -> Ingest {
        Ingest {
            filters,
            estimator: Estimator::new(),
            dispatcher,
        }
    }

    pub fn estimate_reader(&self) -> EstimateReader {
        self.estimator.reader()
    }

    /// Processes one line received at `now`. Only a closed dispatch queue
    /// is an error; everything wrong with the line itself is logged.
    pub fn process_line(&mut self, line: &str, now: DateTime<Utc>) -> Result<Outcome, Closed> {
        let line = line.trim();
        if line.is_empty() {
            return Ok(Outcome::Blank);
        }
        let alert = match Alert::decode(line) {
            Ok(alert) => alert,
            Err(e) => {
                warn!("skipping undecodable line ({}): {}", e, line);
                return Ok(Outcome::Undecodable);
            }
        };
        if !self.filters.accept(&alert) {
            debug!(
                "filtered {} on {:?}/{:?}",
                alert.display_callsign(),
                alert.band,
                alert.source
            );
            return Ok(Outcome::Filtered);
        }

        let timestamp = match alert.time.as_deref() {
            Some(time) => match timestamp::resolve(time, now) {
                Ok(ts) => Some(ts),
                Err(e) => {
                    warn!("{} in record {:?}", e, alert);
                    None
                }
            },
            None => {
                warn!("record without time: {:?}", alert);
                None
            }
        };
        if let Some(ts) = timestamp {
            if let Some(est) = self.estimator.update(ts) {
                debug!("alert interval estimate: {:.1} s", est);
            }
        }

        self.dispatcher
            .enqueue(Action::AddSpot(Box::new(Spot::new(alert, timestamp))))?;
        Ok(Outcome::Queued { timestamp })
    }

    /// Consumes the alert stream until it breaks or shutdown is triggered.
    pub fn run<S: Stream>(
        &mut self,
        session: &mut Session<S>,
        shutdown: &ShutdownSignal,
    ) -> Result<(), Error> {
        loop {
            if shutdown.is_triggered() {
                return Ok(());
            }
            match session.read_line() {
                Ok(line) => {
                    self.process_line(&line, Utc::now())?;
                }
                Err(RecvError::Timeout) => continue,
                Err(RecvError::Overflow) => {
                    warn!("discarding oversized line");
                    continue;
                }
                Err(e) => return Err(e.into()),
            }
        }
    }
}

/// Handle to the ingestion thread.
pub struct Client {
    state: Arc<AtomicCell<ConnectionState>>,
    estimate: EstimateReader,
    thread: Option<thread::JoinHandle<Result<(), Error>>>,
}

impl Client {
    /// Starts the ingestion thread. Alerts accepted by `filters` and status
    /// events are sent to `dispatcher`.
    pub fn spawn(
        options: ClientOptions,
        filters: Arc<FilterSet>,
        dispatcher: Dispatcher,
        shutdown: ShutdownSignal,
    ) -> io::Result<Client> {
        let state = Arc::new(AtomicCell::new(ConnectionState::Connecting));
        let ingest = Ingest::new(filters, dispatcher.clone());
        let estimate = ingest.estimate_reader();
        let thread_state = state.clone();
        let thread = thread::Builder::new()
            .name("ingestion".to_string())
            .spawn(move || {
                let res = ingest_thread(&options, ingest, &dispatcher, &thread_state, &shutdown);
                match &res {
                    Ok(()) => {
                        info!("alert stream closed on shutdown");
                        thread_state.store(ConnectionState::Stopped);
                        let _ = dispatcher.enqueue(Action::Status(Event::Exiting));
                    }
                    Err(e) => {
                        error!("alert stream terminated: {}", e);
                        thread_state.store(ConnectionState::Disconnected);
                        let event = Event::Disconnected(e.to_string());
                        let _ = dispatcher.enqueue(Action::Status(event));
                    }
                }
                res
            })?;
        Ok(Client {
            state,
            estimate,
            thread: Some(thread),
        })
    }

    pub fn state(&self) -> ConnectionState {
        self.state.load()
    }

    /// Live cadence estimate, for the scheduler.
    pub fn estimate(&self) -> EstimateReader {
        self.estimate.clone()
    }

    pub fn is_finished(&self) -> bool {
        self.thread.as_ref().map_or(true, |t| t.is_finished())
    }

    /// Waits for the ingestion thread and returns why it stopped.
    pub fn join(mut self) -> Result<(), Error> {
        match self.thread.take() {
            Some(t) => t.join().map_err(|_| Error::Panicked)?,
            None => Ok(()),
        }
    }
}

fn ingest_thread(
    options: &ClientOptions,
    mut ingest: Ingest,
    dispatcher: &Dispatcher,
    state: &AtomicCell<ConnectionState>,
    shutdown: &ShutdownSignal,
) -> Result<(), Error> {
    dispatcher.enqueue(Action::Status(Event::Connecting(options.address.clone())))?;
    let stream = tcp::connect(&options.address, options.handshake_timeout)
        .map_err(|e| Error::Connect(options.address.clone(), e))?;
    state.store(ConnectionState::Connected);
    dispatcher.enqueue(Action::Status(Event::Connected))?;

    let mut session =
        Session::handshake(stream, &options.credentials, options.handshake_timeout)?;
    if session.is_authenticated() {
        dispatcher.enqueue(Action::Status(Event::Authenticated))?;
    }
    if let Some(n) = options.load_recent.filter(|n| *n > 0) {
        session.load_recent(n)?;
    }
    session.set_read_timeout(Some(options.poll_interval))?;
    state.store(ConnectionState::Ready);
    dispatcher.enqueue(Action::Status(Event::Ready))?;
    info!("logged in to {} as {}", options.address, options.credentials.username);

    ingest.run(&mut session, shutdown)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatch::{self, ActionQueue};
    use chrono::TimeZone;

    fn setup() -> (Ingest, ActionQueue, Arc<FilterSet>) {
        let filters = Arc::new(FilterSet::new());
        let (dispatcher, queue) = dispatch::queue();
        (Ingest::new(filters.clone(), dispatcher), queue, filters)
    }

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 10, 14, 10, 0).unwrap()
    }

    const SPOT: &str = r#"{"time":"14:05","fullCallsign":"W1AW","frequency":14070000,"mode":"CW","source":"cluster","band":"20m","entity":"USA"}"#;

    #[test]
    fn accepted_spot_is_queued_with_resolved_time() {
        let (mut ingest, queue, filters) = setup();
        filters.set_source("cluster", Some(true)).unwrap();
        filters.set_band("20m", Some(true)).unwrap();
        let expected = Utc.with_ymd_and_hms(2024, 1, 10, 14, 5, 0).unwrap();
        assert_eq!(
            ingest.process_line(SPOT, now()).unwrap(),
            Outcome::Queued {
                timestamp: Some(expected)
            }
        );
        match queue.receiver().try_recv().unwrap() {
            Action::AddSpot(spot) => {
                assert_eq!(spot.alert.display_callsign(), "W1AW");
                assert_eq!(spot.timestamp, Some(expected));
            }
            other => panic!("unexpected action {:?}", other),
        }
    }

    #[test]
    fn filter_changes_apply_to_later_lines_only() {
        let (mut ingest, queue, filters) = setup();
        ingest.process_line(SPOT, now()).unwrap();
        filters.set_band("20m", Some(false)).unwrap();
        assert_eq!(ingest.process_line(SPOT, now()).unwrap(), Outcome::Filtered);
        assert_eq!(queue.len(), 1);
    }

    #[test]
    fn bad_lines_are_skipped() {
        let (mut ingest, queue, _) = setup();
        assert_eq!(ingest.process_line("", now()).unwrap(), Outcome::Blank);
        assert_eq!(
            ingest.process_line("{\"time\": 14", now()).unwrap(),
            Outcome::Undecodable
        );
        assert_eq!(
            ingest.process_line("N0CALL de HamAlert >", now()).unwrap(),
            Outcome::Undecodable
        );
        assert!(queue.is_empty());
        assert!(matches!(
            ingest.process_line(SPOT, now()).unwrap(),
            Outcome::Queued { .. }
        ));
    }

    #[test]
    fn unparsable_time_still_presents_but_skips_estimator() {
        let (mut ingest, queue, _) = setup();
        let reader = ingest.estimate_reader();
        ingest
            .process_line(r#"{"time":"14:00","fullCallsign":"A"}"#, now())
            .unwrap();
        assert_eq!(
            ingest
                .process_line(r#"{"time":"soon","fullCallsign":"B"}"#, now())
                .unwrap(),
            Outcome::Queued { timestamp: None }
        );
        ingest
            .process_line(r#"{"fullCallsign":"C"}"#, now())
            .unwrap();
        assert_eq!(reader.get(), None);
        ingest
            .process_line(r#"{"time":"14:01","fullCallsign":"D"}"#, now())
            .unwrap();
        assert_eq!(reader.get(), Some(60.0));
        assert_eq!(queue.len(), 4);
    }

    #[test]
    fn closed_queue_stops_ingestion() {
        let (mut ingest, queue, _) = setup();
        drop(queue);
        assert!(ingest.process_line(SPOT, now()).is_err());
    }
}
