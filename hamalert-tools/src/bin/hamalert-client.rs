//! hamalert-client
//!
//! Lists HamAlert spots in the terminal, newest first. Selecting a spot
//! (manually with `n`, or periodically with auto-advance) tunes the rig
//! through rigctld and reports the radio state to Wavelog when configured.

use clap::Parser;
use crossbeam::{channel, select};
use hamalert::dispatch::{self, Presenter};
use hamalert::logbook::{LogbookWorker, Wavelog};
use hamalert::rig::{Rigctld, TunerWorker};
use hamalert::scheduler::{AutoAdvance, Scheduler};
use hamalert::{Client, Shutdown};
use hamalert_tools::{describe_toggles, parse_command, Command, Console, SessionOpts, COMMAND_HELP};
use log::{info, warn};
use std::io::{self, BufRead};
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

const RIG_TIMEOUT: Duration = Duration::from_secs(2);

#[derive(Parser, Debug)]
#[command(name = "hamalert-client", version, about = "Live HamAlert spot list")]
struct Cli {
    #[command(flatten)]
    session: SessionOpts,

    /// Start with auto-advance enabled
    #[arg(short = 'a', long = "auto-advance")]
    auto_advance: bool,

    /// Number of spots kept in the list
    #[arg(long, default_value_t = 200)]
    capacity: usize,

    /// Do not connect to rigctld even if configured
    #[arg(long = "no-rig")]
    no_rig: bool,
}

fn spawn_stdin_reader() -> io::Result<channel::Receiver<String>> {
    let (tx, rx) = channel::unbounded();
    std::thread::Builder::new()
        .name("stdin".to_string())
        .spawn(move || {
            for line in io::stdin().lock().lines() {
                let Ok(line) = line else { break };
                if tx.send(line).is_err() {
                    break;
                }
            }
        })?;
    Ok(rx)
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
    if config.username.is_empty() {
        die!("no username given, use -u or set it in the configuration file");
    }
    let (options, filters, min_interval) = match (
        config.client_options(),
        config.filters(),
        config.min_advance_interval(),
    ) {
        (Ok(o), Ok(f), Ok(m)) => (o, Arc::new(f), m),
        (Err(e), _, _) | (_, Err(e), _) | (_, _, Err(e)) => die!(e),
    };

    let mut console = Console::new(io::stdout(), cli.capacity);
    if let (Some(rig), false) = (&config.rig, cli.no_rig) {
        match Rigctld::connect(&rig.address, RIG_TIMEOUT) {
            Ok(rigctld) => match TunerWorker::spawn(rigctld) {
                Ok(worker) => {
                    info!("rig control via rigctld at {}", rig.address);
                    console = console.with_tuner(Box::new(worker));
                }
                Err(e) => warn!("rig control disabled: {}", e),
            },
            Err(e) => warn!("rig control disabled, {}: {}", rig.address, e),
        }
    }
    if let Some(wl) = &config.wavelog {
        match LogbookWorker::spawn(Wavelog::new(&wl.url, &wl.key, &wl.radio)) {
            Ok(worker) => console = console.with_logbook(worker),
            Err(e) => warn!("logbook updates disabled: {}", e),
        }
    }

    let (dispatcher, queue) = dispatch::queue();
    let shutdown = Shutdown::new();
    let signal = shutdown.signal();
    let client = match Client::spawn(options, filters.clone(), dispatcher.clone(), signal) {
        Ok(client) => client,
        Err(e) => die!("failed to start ingestion: {}", e),
    };
    let auto_advance = AutoAdvance::new(config.auto_advance || cli.auto_advance);
    let scheduler = Scheduler::new(client.estimate(), auto_advance.clone(), min_interval);
    let scheduler = match scheduler.spawn(dispatcher, shutdown.signal()) {
        Ok(handle) => handle,
        Err(e) => die!("failed to start scheduler: {}", e),
    };
    let mut commands = match spawn_stdin_reader() {
        Ok(rx) => rx,
        Err(e) => die!("failed to read commands: {}", e),
    };

    let mut stdin_closed = false;
    while !console.is_finished() {
        if stdin_closed {
            // keep streaming without commands
            commands = channel::never();
            stdin_closed = false;
        }
        select! {
            recv(queue.receiver()) -> action => {
                let Ok(action) = action else { break };
                queue.execute(action, &mut console);
                queue.drain_and_execute(&mut console);
            }
            recv(commands) -> line => {
                let Ok(line) = line else {
                    stdin_closed = true;
                    continue;
                };
                if line.trim().is_empty() {
                    continue;
                }
                match parse_command(&line) {
                    Ok(Command::Quit) => break,
                    Ok(Command::Next) => {
                        if let Err(e) = console.advance() {
                            warn!("{}", e);
                        }
                    }
                    Ok(Command::ToggleAuto) => {
                        let on = auto_advance.toggle();
                        info!("auto-advance {}", if on { "on" } else { "off" });
                    }
                    Ok(Command::Band(name, state)) => {
                        if let Err(e) = filters.set_band(&name, state) {
                            warn!("{}", e);
                        }
                    }
                    Ok(Command::Source(name, state)) => {
                        if let Err(e) = filters.set_source(&name, state) {
                            warn!("{}", e);
                        }
                    }
                    Ok(Command::Filters) => {
                        println!("bands: {}", describe_toggles(&filters.bands()));
                        println!("sources: {}", describe_toggles(&filters.sources()));
                    }
                    Ok(Command::Help) => println!("{}", COMMAND_HELP),
                    Err(e) => println!("{}\n{}", e, COMMAND_HELP),
                }
            }
        }
    }

    shutdown.trigger();
    let result = client.join();
    if scheduler.join().is_err() {
        warn!("scheduler thread panicked");
    }
    queue.drain_and_execute(&mut console);

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => die!(e),
    }
}
