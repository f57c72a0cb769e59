//! Rig control
//!
//! The presentation thread tunes the radio through the `Tuner` trait.
//! `Rigctld` implements it over the hamlib `rigctld` network protocol, which
//! keeps the serial port and the rig model details in the daemon.

use crossbeam::channel;
use log::{debug, warn};
use std::fmt;
use std::io::{self, BufRead, BufReader, Write};
use std::net::TcpStream;
use std::thread;
use std::time::Duration;

/// Default `rigctld` listening address.
pub const DEFAULT_RIGCTLD_ADDRESS: &str = "localhost:4532";

/// SSB below this frequency is lower sideband by convention.
const USB_THRESHOLD_HZ: u64 = 10_000_000;

/// Rig commands waiting for the worker beyond this are dropped.
const WORKER_QUEUE_SIZE: usize = 8;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("rig I/O error: {0}")]
    IO(#[from] io::Error),
    /// Negative hamlib status code returned by the daemon.
    #[error("rig command '{0}' failed with RPRT {1}")]
    Rejected(String, i32),
    #[error("unexpected reply from rigctld: {0}")]
    Reply(String),
    #[error("no rig mode for '{0}'")]
    UnsupportedMode(String),
    #[error("rig worker stopped")]
    WorkerGone,
}

/// Operating modes understood by hamlib.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RigMode {
    AM,
    CW,
    USB,
    LSB,
    RTTY,
    FM,
    PKTUSB,
}

impl RigMode {
    /// Maps a spot's mode to a rig mode. SSB picks the conventional
    /// sideband for the frequency; data modes use the packet sideband.
    pub fn from_spot(mode: &str, frequency_hz: u64) -> Result<RigMode, Error> {
        let upper = mode.trim().to_ascii_uppercase();
        Ok(match upper.as_str() {
            "SSB" | "PHONE" => {
                if frequency_hz >= USB_THRESHOLD_HZ {
                    RigMode::USB
                } else {
                    RigMode::LSB
                }
            }
            "USB" => RigMode::USB,
            "LSB" => RigMode::LSB,
            "CW" => RigMode::CW,
            "AM" => RigMode::AM,
            "FM" => RigMode::FM,
            "RTTY" => RigMode::RTTY,
            "FT8" | "FT4" | "PSK" | "PSK31" | "JT65" | "JT9" | "JS8" | "DIGI" | "DATA"
            | "OLIVIA" | "MFSK" => RigMode::PKTUSB,
            _ => return Err(Error::UnsupportedMode(mode.to_string())),
        })
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RigMode::AM => "AM",
            RigMode::CW => "CW",
            RigMode::USB => "USB",
            RigMode::LSB => "LSB",
            RigMode::RTTY => "RTTY",
            RigMode::FM => "FM",
            RigMode::PKTUSB => "PKTUSB",
        }
    }
}

impl fmt::Display for RigMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Tuning interface used by the presentation thread.
pub trait Tuner {
    fn set_frequency(&mut self, hz: u64) -> Result<(), Error>;
    fn set_mode(&mut self, mode: RigMode) -> Result<(), Error>;
}

/// Client for a hamlib `rigctld` daemon.
pub struct Rigctld {
    reader: BufReader<TcpStream>,
    writer: TcpStream,
}

impl Rigctld {
    pub fn connect(address: &str, timeout: Duration) -> Result<Rigctld, Error> {
        let stream = TcpStream::connect(address)?;
        stream.set_read_timeout(Some(timeout))?;
        stream.set_write_timeout(Some(timeout))?;
        let writer = stream.try_clone()?;
        let mut rig = Rigctld {
            reader: BufReader::new(stream),
            writer,
        };
        rig.command("V VFOA")?;
        Ok(rig)
    }

    /// Sends one command and waits for its `RPRT <code>` status line.
    fn command(&mut self, cmd: &str) -> Result<(), Error> {
        debug!("rigctld <- {}", cmd);
        self.writer.write_all(format!("{}\n", cmd).as_bytes())?;
        self.writer.flush()?;
        let mut line = String::new();
        if self.reader.read_line(&mut line)? == 0 {
            return Err(Error::IO(io::Error::from(io::ErrorKind::UnexpectedEof)));
        }
        let line = line.trim();
        debug!("rigctld -> {}", line);
        let code = line
            .strip_prefix("RPRT ")
            .and_then(|c| c.trim().parse::<i32>().ok())
            .ok_or_else(|| Error::Reply(line.to_string()))?;
        if code < 0 {
            Err(Error::Rejected(cmd.to_string(), code))
        } else {
            Ok(())
        }
    }
}

impl Tuner for Rigctld {
    fn set_frequency(&mut self, hz: u64) -> Result<(), Error> {
        self.command(&format!("F {}", hz))
    }

    fn set_mode(&mut self, mode: RigMode) -> Result<(), Error> {
        // -1: keep the current passband
        self.command(&format!("M {} -1", mode))
    }
}

enum RigCommand {
    Frequency(u64),
    Mode(RigMode),
}

/// Runs a `Tuner` on its own thread. The worker is itself a `Tuner` that
/// only queues commands, so the presentation thread never waits on the rig.
/// Failures are logged by the worker.
pub struct TunerWorker {
    tx: channel::Sender<RigCommand>,
}

impl TunerWorker {
    pub fn spawn<T: Tuner + Send + 'static>(mut tuner: T) -> io::Result<TunerWorker> {
        let (tx, rx) = channel::bounded::<RigCommand>(WORKER_QUEUE_SIZE);
        thread::Builder::new()
            .name("rig".to_string())
            .spawn(move || {
                for cmd in rx.iter() {
                    let res = match cmd {
                        RigCommand::Frequency(hz) => tuner.set_frequency(hz),
                        RigCommand::Mode(mode) => tuner.set_mode(mode),
                    };
                    if let Err(e) = res {
                        warn!("{}", e);
                    }
                }
            })?;
        Ok(TunerWorker { tx })
    }

    fn queue(&self, cmd: RigCommand) -> Result<(), Error> {
        match self.tx.try_send(cmd) {
            Ok(()) => Ok(()),
            Err(channel::TrySendError::Full(_)) => {
                warn!("rig busy, dropping command");
                Ok(())
            }
            Err(channel::TrySendError::Disconnected(_)) => Err(Error::WorkerGone),
        }
    }
}

impl Tuner for TunerWorker {
    fn set_frequency(&mut self, hz: u64) -> Result<(), Error> {
        self.queue(RigCommand::Frequency(hz))
    }

    fn set_mode(&mut self, mode: RigMode) -> Result<(), Error> {
        self.queue(RigCommand::Mode(mode))
    }
}
