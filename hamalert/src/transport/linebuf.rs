//! Internal receive buffer for the line-oriented session stream.

use std::io;

use super::RecvError;

/// Size of the internal buffer. A single JSON alert line is well below this.
const LINEBUF_SIZE: usize = 16384;

/// Buffer used by the transport to split the incoming byte stream into
/// lines, or into chunks terminated by an arbitrary marker (the login
/// prompts are not newline terminated).
pub struct LineBuf {
    /// Internal buffer. Valid data (possibly none) is
    /// in a slice delimited by `start` and `end`.
    buf: Box<[u8; LINEBUF_SIZE]>,
    /// Start offset of valid data in `buf`.
    start: usize,
    /// End offset of valid data in `buf`.
    end: usize,
}

impl LineBuf {
    /// Returns an empty `LineBuf`.
    pub fn new() -> LineBuf {
        LineBuf {
            buf: Box::new([0; LINEBUF_SIZE]),
            start: 0,
            end: 0,
        }
    }

    /// No buffered data.
    #[cfg(test)]
    pub fn empty(&self) -> bool {
        self.start == self.end
    }

    /// Buffered bytes.
    pub fn size(&self) -> usize {
        self.end - self.start
    }

    /// Returns whether there is no room left to refill.
    pub fn full(&self) -> bool {
        self.size() == LINEBUF_SIZE
    }

    /// Returns the data contained in this buffer.
    pub fn data(&self) -> &[u8] {
        &self.buf[self.start..self.end]
    }

    /// Drops `len` bytes from the front. `len` must not exceed `size()`.
    pub fn consume(&mut self, len: usize) {
        assert!(len <= self.size(), "consume past the end of buffered data");
        self.start += len;
    }

    /// Discard the entire content of the buffer.
    pub fn flush(&mut self) {
        self.start = 0;
        self.end = 0;
    }

    /// If `marker` occurs in the buffered data, removes and returns everything
    /// up to and including it.
    pub fn take_through(&mut self, marker: &[u8]) -> Option<Vec<u8>> {
        if marker.is_empty() {
            return Some(Vec::new());
        }
        let pos = self
            .data()
            .windows(marker.len())
            .position(|window| window == marker)?;
        let len = pos + marker.len();
        let chunk = self.data()[..len].to_vec();
        self.consume(len);
        Some(chunk)
    }

    /// Moves the data internally to the start of the buffer.
    fn compact(&mut self) {
        if self.start != 0 {
            let len = self.size();
            self.buf.copy_within(self.start..self.end, 0);
            self.start = 0;
            self.end = len;
        }
    }

    /// One read from `reader` into the free tail of the buffer.
    pub fn refill<T: io::Read>(&mut self, reader: &mut T) -> Result<(), RecvError> {
        self.compact();
        if self.end == LINEBUF_SIZE {
            return Err(RecvError::Overflow);
        }
        match reader.read(&mut self.buf[self.end..]) {
            Ok(size) => {
                if size > 0 {
                    self.end += size;
                    Ok(())
                } else {
                    Err(RecvError::Disconnected)
                }
            }
            Err(e) => match e.kind() {
                io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut => Err(RecvError::Timeout),
                io::ErrorKind::Interrupted => Ok(()),
                _ => Err(RecvError::IO(e)),
            },
        }
    }
}
