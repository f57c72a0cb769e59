use clap::Parser;
use hamalert::config::{self, Config};
use hamalert::dispatch::Presenter;
use hamalert::logbook::{self, LogbookWorker};
use hamalert::rig::{self, RigMode, Tuner};
use hamalert::{ConnectionState, Event, Spot};
use log::{debug, info, warn};
use std::collections::VecDeque;
use std::io::{self, Write};
use std::path::PathBuf;

#[derive(Parser, Debug, Clone)]
pub struct SessionOpts {
    /// YAML configuration file
    #[arg(short = 'c', long = "config")]
    pub config: Option<PathBuf>,

    /// HamAlert username (call sign)
    #[arg(short = 'u', long = "user")]
    pub username: Option<String>,

    /// HamAlert password
    #[arg(long, env = "HAMALERT_PASSWORD", hide_env_values = true)]
    pub password: Option<String>,

    /// Alert service host (default hamalert.org)
    #[arg(long)]
    pub host: Option<String>,

    /// Alert service port (default 7300)
    #[arg(short = 'p', long)]
    pub port: Option<u16>,

    /// Recent spots to replay after login, 0 to disable
    #[arg(short = 'n', long = "load-recent")]
    pub load_recent: Option<u32>,

    /// Verbose output
    #[arg(short = 'v', long)]
    pub verbose: bool,

    /// Timestamp format for log lines
    #[arg(short = 't', long = "time-format", default_value = "%T%.3f ")]
    pub timestamp_format: String,
}

impl SessionOpts {
    /// Configuration file (or defaults) with the command line applied on top.
    pub fn load_config(&self) -> Result<Config, config::Error> {
        let mut config = match &self.config {
            Some(path) => Config::load(path)?,
            None => Config::default(),
        };
        if let Some(username) = &self.username {
            config.username = username.clone();
        }
        if let Some(password) = &self.password {
            config.password = password.clone();
        }
        if let Some(host) = &self.host {
            config.host = host.clone();
        }
        if let Some(port) = self.port {
            config.port = port;
        }
        if let Some(n) = self.load_recent {
            config.load_recent = n;
        }
        Ok(config)
    }

    /// Installs the process logger. `RUST_LOG` overrides the level chosen by `-v`.
    pub fn init_logger(&self) {
        let level = if self.verbose {
            log::LevelFilter::Debug
        } else {
            log::LevelFilter::Info
        };
        let tf = self.timestamp_format.clone();
        let _ = env_logger::Builder::new()
            .filter_level(level)
            .parse_default_env()
            .format(move |buf, record| {
                writeln!(
                    buf,
                    "{}{:5} {}",
                    chrono::Local::now().format(&tf),
                    record.level(),
                    record.args()
                )
            })
            .try_init();
    }
}

/// One table row: time, call, MHz, mode, source, reference, location.
pub fn format_row(spot: &Spot) -> String {
    let alert = &spot.alert;
    let frequency = alert
        .frequency_hz()
        .map(|hz| format!("{:.3}", hz as f64 / 1e6))
        .unwrap_or_default();
    format!(
        "{:8} {:10} {:>10} {:6} {:9} {:10} {}",
        spot.display_time(),
        alert.display_callsign(),
        frequency,
        alert.mode.as_deref().unwrap_or(""),
        alert.source.as_deref().unwrap_or(""),
        alert.reference().unwrap_or(""),
        alert.location()
    )
}

#[derive(Debug, thiserror::Error)]
pub enum ConsoleError {
    #[error("terminal output failed: {0}")]
    IO(#[from] io::Error),
    #[error(transparent)]
    Rig(#[from] rig::Error),
    #[error(transparent)]
    Logbook(#[from] logbook::Error),
}

/// Terminal presentation of the spot list.
///
/// Spots are kept newest first. Advancing walks the selection from the
/// oldest shown spot towards the newest one, tuning the rig and updating
/// the logbook for every spot it lands on.
pub struct Console<W: Write> {
    out: W,
    spots: VecDeque<Spot>,
    capacity: usize,
    selected: Option<usize>,
    state: ConnectionState,
    tuner: Option<Box<dyn Tuner>>,
    logbook: Option<LogbookWorker>,
}

impl<W: Write> Console<W> {
    pub fn new(out: W, capacity: usize) -> Console<W> {
        Console {
            out,
            spots: VecDeque::new(),
            capacity: capacity.max(1),
            selected: None,
            state: ConnectionState::Connecting,
            tuner: None,
            logbook: None,
        }
    }

    pub fn with_tuner(mut self, tuner: Box<dyn Tuner>) -> Self {
        self.tuner = Some(tuner);
        self
    }

    pub fn with_logbook(mut self, logbook: LogbookWorker) -> Self {
        self.logbook = Some(logbook);
        self
    }

    /// Newest first.
    pub fn spots(&self) -> impl Iterator<Item = &Spot> {
        self.spots.iter()
    }

    pub fn len(&self) -> usize {
        self.spots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.spots.is_empty()
    }

    pub fn selected_index(&self) -> Option<usize> {
        self.selected
    }

    pub fn selected(&self) -> Option<&Spot> {
        self.selected.and_then(|i| self.spots.get(i))
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// The stream has ended, for whatever reason.
    pub fn is_finished(&self) -> bool {
        matches!(
            self.state,
            ConnectionState::Disconnected | ConnectionState::Stopped
        )
    }

    pub fn writer(&mut self) -> &mut W {
        &mut self.out
    }

    /// Selects the spot at `index` (0 is the newest) and tunes to it.
    pub fn select(&mut self, index: usize) -> Result<(), ConsoleError> {
        let Some(spot) = self.spots.get(index) else {
            return Ok(());
        };
        self.selected = Some(index);
        writeln!(self.out, ">> {}", format_row(spot))?;
        let spot = spot.clone();
        self.tune(&spot)
    }

    fn tune(&mut self, spot: &Spot) -> Result<(), ConsoleError> {
        let Some(hz) = spot.alert.frequency_hz() else {
            debug!("{} has no frequency, not tuning", spot.alert.display_callsign());
            return Ok(());
        };
        let mode = match spot.alert.mode.as_deref() {
            Some(mode) => Some(RigMode::from_spot(mode, hz)?),
            None => None,
        };
        if let Some(tuner) = self.tuner.as_mut() {
            tuner.set_frequency(hz)?;
            if let Some(mode) = mode {
                tuner.set_mode(mode)?;
            }
        }
        if let Some(logbook) = &self.logbook {
            let mode = mode.map_or("", |m| m.as_str());
            logbook.post(hz, mode)?;
        }
        Ok(())
    }
}

impl<W: Write> Presenter for Console<W> {
    type Error = ConsoleError;

    fn add_spot(&mut self, spot: Spot) -> Result<(), ConsoleError> {
        writeln!(self.out, "   {}", format_row(&spot))?;
        self.spots.push_front(spot);
        self.selected = self.selected.map(|i| i + 1);
        if self.spots.len() > self.capacity {
            self.spots.truncate(self.capacity);
            if self.selected.is_some_and(|i| i >= self.capacity) {
                self.selected = None;
            }
        }
        Ok(())
    }

    fn advance(&mut self) -> Result<(), ConsoleError> {
        let next = match self.selected {
            None if self.spots.is_empty() => return Ok(()),
            None => self.spots.len() - 1,
            Some(0) => return Ok(()),
            Some(i) => i - 1,
        };
        self.select(next)
    }

    fn status(&mut self, event: Event) -> Result<(), ConsoleError> {
        self.state = match &event {
            Event::Connecting(addr) => {
                info!("connecting to {}", addr);
                ConnectionState::Connecting
            }
            Event::Connected | Event::Authenticated => ConnectionState::Connected,
            Event::Ready => ConnectionState::Ready,
            Event::Disconnected(reason) => {
                warn!("disconnected: {}", reason);
                ConnectionState::Disconnected
            }
            Event::Exiting => ConnectionState::Stopped,
        };
        writeln!(self.out, "-- {:?}", self.state)?;
        Ok(())
    }
}

/// Interactive commands read from stdin.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Next,
    ToggleAuto,
    Band(String, Option<bool>),
    Source(String, Option<bool>),
    Filters,
    Help,
    Quit,
}

pub const COMMAND_HELP: &str = "\
commands:
  n                      select the next spot
  a                      toggle auto-advance
  band <band> on|off|-   show, hide or reset a band
  source <src> on|off|-  show, hide or reset a source
  f                      show filters
  q                      quit";

fn parse_toggle(word: &str) -> Result<Option<bool>, String> {
    match word {
        "on" => Ok(Some(true)),
        "off" => Ok(Some(false)),
        "-" | "reset" => Ok(None),
        other => Err(format!("expected on, off or -, got '{}'", other)),
    }
}

pub fn parse_command(line: &str) -> Result<Command, String> {
    let words: Vec<&str> = line.split_whitespace().collect();
    match words.as_slice() {
        ["n"] | ["next"] => Ok(Command::Next),
        ["a"] | ["auto"] => Ok(Command::ToggleAuto),
        ["band", name, toggle] => Ok(Command::Band(name.to_string(), parse_toggle(toggle)?)),
        ["source", name, toggle] => Ok(Command::Source(name.to_string(), parse_toggle(toggle)?)),
        ["f"] | ["filters"] => Ok(Command::Filters),
        ["h"] | ["help"] | ["?"] => Ok(Command::Help),
        ["q"] | ["quit"] => Ok(Command::Quit),
        _ => Err(format!("unknown command '{}'", line.trim())),
    }
}

/// `name=on name=off ...` for the entries that have been set.
pub fn describe_toggles(entries: &[(&'static str, Option<bool>)]) -> String {
    let set: Vec<String> = entries
        .iter()
        .filter_map(|(name, state)| {
            state.map(|on| format!("{}={}", name, if on { "on" } else { "off" }))
        })
        .collect();
    if set.is_empty() {
        "all".to_string()
    } else {
        set.join(" ")
    }
}
