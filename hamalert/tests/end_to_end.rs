mod common;

use common::*;
use hamalert::dispatch::{self, Action};
use hamalert::scheduler::{AutoAdvance, Scheduler};
use hamalert::{Client, ClientOptions, ConnectionState, Credentials, Event, FilterSet, Shutdown};
use std::sync::Arc;
use std::time::{Duration, Instant};

#[test]
fn paces_auto_advance_from_live_stream() {
    let start = chrono::Utc::now();
    let mut script = login_script(3);
    for i in 0..3 {
        let time = (start + chrono::Duration::seconds(i)).format("%H:%M:%S");
        script.push(send(&format!(
            "{{\"time\":\"{}\",\"fullCallsign\":\"K{}ABC\",\"frequency\":\"14.0{}\",\"mode\":\"cw\",\"band\":\"20m\",\"source\":\"cluster\"}}\r\n",
            time, i, i
        )));
        script.push(Step::Sleep(Duration::from_secs(1)));
    }
    let (addr, server) = serve(script);

    let mut options = ClientOptions::new(&addr, Credentials::new(USER, PASSWORD));
    options.load_recent = Some(3);
    options.handshake_timeout = Duration::from_secs(5);
    options.poll_interval = Duration::from_millis(50);

    let (dispatcher, queue) = dispatch::queue();
    let shutdown = Shutdown::new();
    let client = Client::spawn(
        options,
        Arc::new(FilterSet::new()),
        dispatcher.clone(),
        shutdown.signal(),
    )
    .unwrap();
    let scheduler = Scheduler::new(
        client.estimate(),
        AutoAdvance::new(true),
        Duration::from_millis(100),
    );
    let intervals = Scheduler::new(
        client.estimate(),
        AutoAdvance::new(false),
        Duration::from_millis(100),
    );
    let sched = scheduler.spawn(dispatcher, shutdown.signal()).unwrap();

    let deadline = Instant::now() + Duration::from_secs(15);
    let mut spots = vec![];
    let mut advances = 0;
    loop {
        let left = deadline.saturating_duration_since(Instant::now());
        match queue.receiver().recv_timeout(left).expect("timed out") {
            Action::AddSpot(spot) => spots.push(spot),
            Action::Advance => advances += 1,
            Action::Status(Event::Disconnected(_)) => break,
            Action::Status(_) => {}
        }
    }

    assert_eq!(spots.len(), 3);
    assert_eq!(spots[2].alert.frequency_hz(), Some(14_020_000));
    assert!(spots.iter().all(|s| s.timestamp.is_some()));
    let estimate = client.estimate().get().unwrap();
    assert!((estimate - 1.0).abs() < 1e-9, "estimate {}", estimate);
    let interval = intervals.next_interval().as_secs_f64();
    assert!((0.81..=0.99).contains(&interval), "interval {}", interval);
    assert!(advances > 0);

    assert_eq!(client.state(), ConnectionState::Disconnected);
    assert!(client.join().is_err());
    shutdown.trigger();
    sched.join().unwrap();
    server.join().unwrap();
}
