//! TCP stream
//!
//! The alert service is a plain telnet-style TCP service. Reads use socket
//! timeouts so the blocking ingestion thread can both bound the handshake
//! and periodically look at the shutdown signal.

use std::io;
use std::net::{SocketAddr, TcpStream, ToSocketAddrs};
use std::time::Duration;

use super::Stream;

/// Default host of the HamAlert telnet service.
pub const DEFAULT_HOST: &str = "hamalert.org";

/// Default TCP port of the HamAlert telnet service.
pub const DEFAULT_PORT: u16 = 7300;

impl Stream for TcpStream {
    fn set_read_timeout(&mut self, timeout: Option<Duration>) -> io::Result<()> {
        // A zero timeout is rejected by the OS layer, treat it as the
        // shortest possible one instead.
        let timeout = timeout.map(|t| t.max(Duration::from_millis(1)));
        TcpStream::set_read_timeout(self, timeout)
    }
}

/// Resolve `addr` to a socket address, appending the default port if the
/// address does not carry one.
pub fn find_addr(addr: &str) -> Result<SocketAddr, io::Error> {
    // It would be possible to determine if the port is missing, but it's
    // simpler to try to parse as-is, and if it fails try again with the port.
    let mut iter = match addr.to_socket_addrs() {
        Ok(iter) => iter,
        Err(err) => {
            let addr_port = format!("{}:{}", addr, DEFAULT_PORT);
            match addr_port.to_socket_addrs() {
                Ok(iter) => iter,
                Err(_) => {
                    // Final attempt: numeric IPv6 address without brackets.
                    let addr_port = format!("[{}]:{}", addr, DEFAULT_PORT);
                    match addr_port.to_socket_addrs() {
                        Ok(iter) => iter,
                        _ => {
                            return Err(err);
                        }
                    }
                }
            }
        }
    };
    iter.next().ok_or_else(|| {
        io::Error::new(io::ErrorKind::NotFound, "address resolution failed")
    })
}

/// Open a TCP connection to the alert service at `addr`.
pub fn connect(addr: &str, timeout: Duration) -> Result<TcpStream, io::Error> {
    let sa = find_addr(addr)?;
    let stream = TcpStream::connect_timeout(&sa, timeout)?;
    stream.set_nodelay(true)?;
    Ok(stream)
}
