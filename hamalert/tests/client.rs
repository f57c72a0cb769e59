mod common;

use common::*;
use hamalert::client::{self, ConnectionState, Event};
use hamalert::dispatch::{self, Action, ActionQueue};
use hamalert::session;
use hamalert::{Client, ClientOptions, Credentials, FilterSet, Shutdown};
use std::sync::Arc;
use std::time::{Duration, Instant};

fn options(addr: &str, password: &str) -> ClientOptions {
    let mut options = ClientOptions::new(addr, Credentials::new(USER, password));
    options.load_recent = Some(5);
    options.handshake_timeout = Duration::from_secs(5);
    options.poll_interval = Duration::from_millis(50);
    options
}

/// Collects status events until `until` is seen; spots are returned by callsign.
fn collect_until(queue: &ActionQueue, until: fn(&Event) -> bool) -> (Vec<Event>, Vec<String>) {
    let deadline = Instant::now() + Duration::from_secs(10);
    let mut events = vec![];
    let mut spots = vec![];
    loop {
        let left = deadline.saturating_duration_since(Instant::now());
        match queue.receiver().recv_timeout(left).expect("timed out") {
            Action::Status(event) => {
                let done = until(&event);
                events.push(event);
                if done {
                    return (events, spots);
                }
            }
            Action::AddSpot(spot) => spots.push(spot.alert.display_callsign().to_string()),
            Action::Advance => {}
        }
    }
}

#[test]
fn streams_spots_then_reports_disconnect() {
    let mut script = login_script(5);
    script.push(send("\r\n"));
    script.push(send(
        "{\"time\":\"12:00\",\"fullCallsign\":\"W1AW\",\"band\":\"20m\",\"source\":\"cluster\"}\r\n",
    ));
    script.push(send("not json at all\r\n"));
    script.push(send("{\"time\":\"12:01\",\"fullCallsign\":\"K1ABC\",\"band\":\"6m\"}\r\n"));
    script.push(send("{\"time\":\"12:02\",\"fullCallsign\":\"DL1XYZ\",\"band\":\"40m\"}\r\n"));
    let (addr, server) = serve(script);

    let filters = Arc::new(FilterSet::new());
    filters.set_band("6m", Some(false)).unwrap();
    let (dispatcher, queue) = dispatch::queue();
    let shutdown = Shutdown::new();
    let client =
        Client::spawn(options(&addr, PASSWORD), filters, dispatcher, shutdown.signal()).unwrap();

    let (events, spots) = collect_until(&queue, |e| matches!(e, Event::Disconnected(_)));
    assert_eq!(
        &events[..4],
        &[
            Event::Connecting(addr.clone()),
            Event::Connected,
            Event::Authenticated,
            Event::Ready
        ]
    );
    assert_eq!(spots, vec!["W1AW", "DL1XYZ"]);
    assert_eq!(client.state(), ConnectionState::Disconnected);
    assert!(matches!(client.join(), Err(client::Error::ConnectionLost(_))));
    assert_eq!(server.join().unwrap().len(), 4);
}

#[test]
fn login_failure_is_reported_verbatim() {
    let (addr, server) = serve(vec![
        send("login: "),
        expect(USER),
        send("password: "),
        expect("wrong"),
        send("Login failed: bad password\r\n"),
    ]);
    let (dispatcher, queue) = dispatch::queue();
    let shutdown = Shutdown::new();
    let client = Client::spawn(
        options(&addr, "wrong"),
        Arc::new(FilterSet::new()),
        dispatcher,
        shutdown.signal(),
    )
    .unwrap();

    let (events, spots) = collect_until(&queue, |e| matches!(e, Event::Disconnected(_)));
    assert!(spots.is_empty());
    match events.last() {
        Some(Event::Disconnected(reason)) => assert!(reason.contains("Login failed: bad password")),
        other => panic!("unexpected {:?}", other),
    }
    match client.join() {
        Err(client::Error::Session(session::Error::Authentication(msg))) => {
            assert_eq!(msg, "Login failed: bad password")
        }
        other => panic!("unexpected {:?}", other),
    }
    server.join().unwrap();
}

#[test]
fn shutdown_stops_an_idle_stream() {
    let mut script = login_script(5);
    script.push(Step::Hold);
    let (addr, server) = serve(script);
    let (dispatcher, queue) = dispatch::queue();
    let shutdown = Shutdown::new();
    let client = Client::spawn(
        options(&addr, PASSWORD),
        Arc::new(FilterSet::new()),
        dispatcher,
        shutdown.signal(),
    )
    .unwrap();

    collect_until(&queue, |e| *e == Event::Ready);
    assert_eq!(client.state(), ConnectionState::Ready);
    shutdown.trigger();
    let (events, _) = collect_until(&queue, |e| *e == Event::Exiting);
    assert_eq!(events, vec![Event::Exiting]);
    assert!(client.join().is_ok());
    drop(queue);
    server.join().unwrap();
}
