//! hamalert-dump
//!
//! Logs in, then prints every alert of the stream to stdout, one per line,
//! either as a table row or as received.

use chrono::Utc;
use clap::Parser;
use hamalert::session::Session;
use hamalert::transport::{tcp, RecvError};
use hamalert::{timestamp, Alert, Spot};
use hamalert_tools::{format_row, SessionOpts};
use log::warn;
use std::process::ExitCode;

#[derive(Parser, Debug)]
#[command(name = "hamalert-dump", version, about = "Print the HamAlert alert stream")]
struct Cli {
    #[command(flatten)]
    session: SessionOpts,

    /// Print lines exactly as received
    #[arg(long)]
    raw: bool,

    /// Print the decoded record as JSON instead of a table row
    #[arg(long, conflicts_with = "raw")]
    json: bool,

    /// Exit after this many alerts
    #[arg(long)]
    count: Option<usize>,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    cli.session.init_logger();

    macro_rules! die{
        ($f:expr,$($a:tt)*)=>{
        {
            die!(format!($f, $($a)*));
        }
        };
        ($msg:expr)=>{
        {
            eprintln!("ERROR: {}", $msg);
            return ExitCode::FAILURE;
        }
        };
    }

    let config = match cli.session.load_config() {
        Ok(config) => config,
        Err(e) => die!(e),
    };
    let options = match config.client_options() {
        Ok(options) => options,
        Err(e) => die!(e),
    };

    let stream = match tcp::connect(&options.address, options.handshake_timeout) {
        Ok(stream) => stream,
        Err(e) => die!("failed to connect to {}: {}", options.address, e),
    };
    let mut session =
        match Session::handshake(stream, &options.credentials, options.handshake_timeout) {
            Ok(session) => session,
            Err(e) => die!(e),
        };
    if let Some(n) = options.load_recent.filter(|n| *n > 0) {
        if let Err(e) = session.load_recent(n) {
            die!(e);
        }
    }
    if let Err(e) = session.set_read_timeout(None) {
        die!(e);
    }

    let mut printed = 0;
    while cli.count.map_or(true, |max| printed < max) {
        let line = match session.read_line() {
            Ok(line) => line,
            Err(RecvError::Overflow) => {
                warn!("discarding oversized line");
                continue;
            }
            Err(e) => die!("connection lost: {}", e),
        };
        if line.is_empty() {
            continue;
        }
        if cli.raw {
            println!("{}", line);
            printed += 1;
            continue;
        }
        match Alert::decode(&line) {
            Ok(alert) => {
                if cli.json {
                    match serde_json::from_str::<serde_json::Value>(&line) {
                        Ok(value) => println!("{}", value),
                        Err(e) => warn!("{}", e),
                    }
                } else {
                    let ts = alert
                        .time
                        .as_deref()
                        .and_then(|t| timestamp::resolve(t, Utc::now()).ok());
                    println!("{}", format_row(&Spot::new(alert, ts)));
                }
                printed += 1;
            }
            Err(e) => warn!("skipping undecodable line ({}): {}", e, line),
        }
    }
    ExitCode::SUCCESS
}
