//! Session transport
//!
//! The `Transport` owns the single byte stream to the alert service and
//! provides the few primitives the protocol needs:
//! - reading until an arbitrary marker is seen (the login prompts are not
//!   newline terminated),
//! - reading one `\n` terminated line,
//! - writing one line, appending the `\n`.
//!
//! The stream is anything implementing `Stream`; in practice a
//! `std::net::TcpStream` (see `tcp`), in tests any scripted `Read + Write`.

mod linebuf;
pub mod tcp;

use linebuf::LineBuf;
use std::io;
use std::time::Duration;

/// Possible errors when receiving from a `Transport`
#[derive(Debug, thiserror::Error)]
pub enum RecvError {
    /// No complete line arrived within the read timeout.
    #[error("timed out waiting for data")]
    Timeout,
    /// The remote end closed the stream.
    #[error("connection closed by the remote end")]
    Disconnected,
    /// A single line did not fit in the receive buffer.
    #[error("line exceeds the receive buffer")]
    Overflow,
    /// Low level IO error.
    #[error("receive failed: {0}")]
    IO(#[from] io::Error),
}

impl RecvError {
    /// Whether the stream can still be used after this error.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, RecvError::Timeout | RecvError::Overflow)
    }
}

/// Possible errors when sending to a `Transport`
#[derive(Debug, thiserror::Error)]
pub enum SendError {
    /// Lines cannot embed a line terminator.
    #[error("line contains a line terminator")]
    EmbeddedNewline,
    /// Issue with the underlying IO operation.
    #[error("send failed: {0}")]
    IO(#[from] io::Error),
}

/// A bidirectional byte stream usable by a `Transport`.
pub trait Stream: io::Read + io::Write + Send {
    /// Bound the time a single read may block. `None` blocks forever.
    /// Streams without timeouts may ignore this.
    fn set_read_timeout(&mut self, _timeout: Option<Duration>) -> io::Result<()> {
        Ok(())
    }
}

/// Line-oriented transport over a `Stream`.
pub struct Transport<S: Stream> {
    /// Underlying stream
    stream: S,
    /// Incoming buffer, holding partial lines between reads.
    rxbuf: LineBuf,
}

impl<S: Stream> Transport<S> {
    pub fn new(stream: S) -> Transport<S> {
        Transport {
            stream,
            rxbuf: LineBuf::new(),
        }
    }

    pub fn set_read_timeout(&mut self, timeout: Option<Duration>) -> Result<(), RecvError> {
        self.stream.set_read_timeout(timeout)?;
        Ok(())
    }

    /// Reads until `marker` is seen, returning everything up to and
    /// including it. Data after the marker stays buffered.
    pub fn read_until(&mut self, marker: &[u8]) -> Result<Vec<u8>, RecvError> {
        loop {
            if let Some(chunk) = self.rxbuf.take_through(marker) {
                return Ok(chunk);
            }
            if self.rxbuf.full() {
                // Nothing buffered can ever match now, drop it so the
                // stream stays usable for the next line.
                self.rxbuf.flush();
                return Err(RecvError::Overflow);
            }
            self.rxbuf.refill(&mut self.stream)?;
        }
    }

    /// Reads one line, returned without its terminator and surrounding
    /// whitespace. Invalid UTF-8 is replaced rather than rejected.
    pub fn read_line(&mut self) -> Result<String, RecvError> {
        let raw = self.read_until(b"\n")?;
        Ok(String::from_utf8_lossy(&raw).trim().to_string())
    }

    /// Writes `line` followed by `\n`.
    pub fn write_line(&mut self, line: &str) -> Result<(), SendError> {
        if line.contains(['\n', '\r']) {
            return Err(SendError::EmbeddedNewline);
        }
        let mut raw = Vec::with_capacity(line.len() + 1);
        raw.extend_from_slice(line.as_bytes());
        raw.push(b'\n');
        self.stream.write_all(&raw)?;
        self.stream.flush()?;
        Ok(())
    }

    pub fn get_ref(&self) -> &S {
        &self.stream
    }
}
