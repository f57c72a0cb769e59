//! Protocol handshake
//!
//! HamAlert speaks a DX-cluster style telnet dialect. Before alerts flow the
//! client has to:
//! 1. answer the `login: ` and `password: ` prompts,
//! 2. wait for the cluster prompt (`<call> de HamAlert >`), noting the
//!    `Hello <call>, this is HamAlert` greeting on the way,
//! 3. switch the session to one JSON object per line with `set/json`,
//! 4. optionally ask for a replay of recent spots with `sh/dx <N>`.
//!
//! Any deviation is fatal; there is no retry at this level.

use crate::transport::{RecvError, SendError, Stream, Transport};
use log::{debug, warn};
use std::time::Duration;

pub const LOGIN_PROMPT: &[u8] = b"login: ";
pub const PASSWORD_PROMPT: &[u8] = b"password: ";
const GREETING_PREFIX: &str = "Hello ";
const GREETING_SUFFIX: &str = ", this is HamAlert";
const CLUSTER_PROMPT: &str = " de HamAlert >";
const LOGIN_FAILED: &str = "Login failed";
const OPERATION_SUCCESSFUL: &str = "Operation successful";
const SET_JSON: &str = "set/json";

/// Number of recent spots replayed after login unless configured otherwise.
pub const DEFAULT_LOAD_RECENT: u32 = 20;

/// Default bound on any single read during the handshake.
pub const DEFAULT_HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The server rejected the credentials; carries its message verbatim.
    #[error("HamAlert authentication failed: {0}")]
    Authentication(String),
    /// The server answered something unexpected; carries its message verbatim.
    #[error("HamAlert protocol error: {0}")]
    Protocol(String),
    #[error(transparent)]
    Recv(#[from] RecvError),
    #[error(transparent)]
    Send(#[from] SendError),
}

/// Login for the alert service.
#[derive(Clone)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl Credentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Credentials {
        Credentials {
            username: username.into(),
            password: password.into(),
        }
    }
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"***")
            .finish()
    }
}

/// Classification of a line received while waiting for the cluster prompt.
#[derive(Debug, PartialEq)]
enum LoginLine {
    Greeting,
    Prompt,
    Failed,
    Other,
}

fn classify(line: &str) -> LoginLine {
    if line.starts_with(LOGIN_FAILED) {
        LoginLine::Failed
    } else if line.contains(CLUSTER_PROMPT) {
        LoginLine::Prompt
    } else if line.starts_with(GREETING_PREFIX) && line.contains(GREETING_SUFFIX) {
        LoginLine::Greeting
    } else {
        LoginLine::Other
    }
}

/// An established session with the alert service, in JSON mode.
pub struct Session<S: Stream> {
    transport: Transport<S>,
    authenticated: bool,
}

impl<S: Stream> Session<S> {
    /// Runs the full handshake over `stream`. `timeout` bounds every read.
    pub fn handshake(
        stream: S,
        credentials: &Credentials,
        timeout: Duration,
    ) -> Result<Session<S>, Error> {
        let mut transport = Transport::new(stream);
        transport.set_read_timeout(Some(timeout))?;
        let mut session = Session {
            transport,
            authenticated: false,
        };
        session.authenticate(credentials)?;
        session.configure()?;
        Ok(session)
    }

    fn authenticate(&mut self, credentials: &Credentials) -> Result<(), Error> {
        self.transport.read_until(LOGIN_PROMPT)?;
        self.transport.write_line(&credentials.username)?;
        self.transport.read_until(PASSWORD_PROMPT)?;
        self.transport.write_line(&credentials.password)?;

        loop {
            let line = self.transport.read_line()?;
            match classify(&line) {
                LoginLine::Greeting => {
                    debug!("greeting: {}", line);
                    self.authenticated = true;
                }
                LoginLine::Prompt => {
                    if !self.authenticated {
                        warn!("reached prompt without a greeting: {}", line);
                    }
                    return Ok(());
                }
                LoginLine::Failed => return Err(Error::Authentication(line)),
                LoginLine::Other => debug!("login banner: {}", line),
            }
        }
    }

    fn configure(&mut self) -> Result<(), Error> {
        self.transport.write_line(SET_JSON)?;
        let line = self.transport.read_line()?;
        if line.starts_with(OPERATION_SUCCESSFUL) {
            Ok(())
        } else {
            Err(Error::Protocol(line))
        }
    }

    /// Asks the server to replay the `n` most recent spots. No reply is
    /// expected; the spots simply arrive as regular alert lines.
    pub fn load_recent(&mut self, n: u32) -> Result<(), Error> {
        self.transport.write_line(&format!("sh/dx {}", n))?;
        Ok(())
    }

    pub fn is_authenticated(&self) -> bool {
        self.authenticated
    }

    /// Reads the next line of the alert stream.
    pub fn read_line(&mut self) -> Result<String, RecvError> {
        self.transport.read_line()
    }

    /// Changes the read timeout used once the handshake is over.
    pub fn set_read_timeout(&mut self, timeout: Option<Duration>) -> Result<(), RecvError> {
        self.transport.set_read_timeout(timeout)
    }

    pub fn transport(&self) -> &Transport<S> {
        &self.transport
    }
}
