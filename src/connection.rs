//! The physical session: one TLS connection to a single Cast receiver,
//! together with the frame demultiplexer reading it and the monotonic
//! request-id counter operations draw from.
//!
//! State only ever moves forward - `Init -> TcpOpen -> TlsUp -> Connected ->
//! Closed` - mirroring the handshake in [`crate::orchestrator::connect`].
//! There is no reconnect; a closed or failed `Connection` is discarded.

use std::fmt;
use std::net::SocketAddr;
use std::time::Instant;

use crate::context::Context;
use crate::frame::{Demux, Envelope};
use crate::testdata::TestTransport;
use crate::transport::{self, Transport};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    Init,
    TcpOpen,
    TlsUp,
    Connected,
    Closed,
}

#[derive(Debug)]
pub enum Error {
    Transport(transport::Error),
    Frame(crate::frame::Error),
    /// A forward-only state transition was attempted out of order.
    WrongState { expected: State, actual: State },
}

impl From<transport::Error> for Error {
    fn from(err: transport::Error) -> Self {
        Error::Transport(err)
    }
}

impl From<crate::frame::Error> for Error {
    fn from(err: crate::frame::Error) -> Self {
        Error::Frame(err)
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Transport(err) => write!(f, "{}", err),
            Error::Frame(err) => write!(f, "{}", err),
            Error::WrongState { expected, actual } => {
                write!(f, "expected connection state {:?}, found {:?}", expected, actual)
            }
        }
    }
}

impl std::error::Error for Error {}

/// Either a live TLS transport or the in-memory fixture substituted when
/// [`Context::test_mode`] is set - the connection logic above this point is
/// identical either way.
enum Link {
    Tls(Transport),
    Test(TestTransport),
}

impl Link {
    fn write_all(&mut self, buf: &[u8], deadline: Instant) -> Result<(), transport::Error> {
        match self {
            Link::Tls(t) => t.write_all(buf, deadline),
            Link::Test(t) => t.write_all(buf, deadline),
        }
    }

    fn read_available(&mut self, buf: &mut [u8], deadline: Instant) -> Result<usize, transport::Error> {
        match self {
            Link::Tls(t) => t.read_available(buf, deadline),
            Link::Test(t) => t.read_available(buf, deadline),
        }
    }

    fn shutdown(&mut self) {
        match self {
            Link::Tls(t) => t.shutdown(),
            Link::Test(t) => t.shutdown(),
        }
    }
}

pub struct Connection {
    state: State,
    link: Link,
    demux: Demux,
    context: Context,
    next_request_id: i64,
    /// Session-scoped sender/receiver ids, set only once an app session is
    /// addressed; absent for every operation in the current Callable Surface,
    /// which all talk to the global `sender-0`/`receiver-0` pair.
    sender_id: Option<String>,
    receiver_id: Option<String>,
}

impl Connection {
    pub(crate) fn open(addr: SocketAddr, context: Context, deadline: Instant) -> Result<Self, Error> {
        let link = if context.test_mode() {
            Link::Test(TestTransport::new())
        } else {
            Link::Tls(Transport::connect(addr, deadline)?)
        };
        Ok(Connection {
            state: State::TlsUp,
            link,
            demux: Demux::new(crate::frame::DEFAULT_MAX_FRAME_LEN),
            context,
            // Pre-incremented so the first id handed out by `next_request_id` is 1.
            next_request_id: 0,
            sender_id: None,
            receiver_id: None,
        })
    }

    pub fn state(&self) -> State {
        self.state
    }

    pub(crate) fn set_state(&mut self, state: State) {
        self.state = state;
    }

    pub fn context(&self) -> &Context {
        &self.context
    }

    pub fn next_request_id(&mut self) -> i64 {
        self.next_request_id += 1;
        self.next_request_id
    }

    pub fn sender_id(&self) -> Option<&str> {
        self.sender_id.as_deref()
    }

    pub fn receiver_id(&self) -> Option<&str> {
        self.receiver_id.as_deref()
    }

    pub fn send(&mut self, envelope: &Envelope, deadline: Instant) -> Result<(), Error> {
        let bytes = Demux::encode_frame(envelope);
        self.link.write_all(&bytes, deadline).map_err(Error::from)
    }

    /// Pulls bytes off the wire and hands back the next fully-decoded
    /// frame, or `Ok(None)` if `deadline` passed with no frame ready.
    /// Frame-level decode errors are surfaced to the caller rather than
    /// silently dropped - the caller decides whether one malformed message
    /// should end the session.
    pub fn next_frame(&mut self, deadline: Instant) -> Result<Option<Envelope>, Error> {
        loop {
            if let Some(envelope) = self.demux.next_frame()? {
                return Ok(Some(envelope));
            }
            if deadline <= Instant::now() {
                return Ok(None);
            }
            let mut buf = [0u8; 4096];
            let n = self.link.read_available(&mut buf, deadline)?;
            if n == 0 {
                if deadline <= Instant::now() {
                    return Ok(None);
                }
                continue;
            }
            self.demux.feed(&buf[..n]);
        }
    }

    /// Primes the in-memory test transport with a canned frame. No-op (and
    /// silently ignored) when this connection is backed by a real TLS
    /// transport - only meaningful under [`Context::test_mode`].
    pub(crate) fn feed_test_frame(&mut self, frame: &[u8]) {
        if let Link::Test(t) = &mut self.link {
            t.push_frame(frame);
        }
    }

    pub fn close(&mut self) {
        self.link.shutdown();
        self.state = State::Closed;
    }
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("state", &self.state)
            .field("sender_id", &self.sender_id)
            .field("receiver_id", &self.receiver_id)
            .finish()
    }
}
