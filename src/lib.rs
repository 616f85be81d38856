//! Discovery and session client for Google Cast (Chromecast) receivers:
//! mDNS discovery, a TLS-framed Cast v2 channel, and the handful of
//! control operations (ping, app-availability probe, device-auth stub)
//! built on top of it.
//!
//! The networking stack is the point of this crate - wire-format parsing
//! with DNS pointer compression, a TLS adapter bridging a non-blocking
//! socket into a synchronous handshake, and a length-prefixed framing
//! demultiplexer. Everything above that (a host-language binding, process
//! wide crypto-library init, config loading) is left to callers.

use std::fmt;
use std::net::{IpAddr, SocketAddr};
use std::time::Duration;

mod channel;
mod connection;
mod context;
mod discovery;
mod frame;
mod orchestrator;
mod testdata;
mod transport;
mod wire;

pub use connection::{Connection, State as ConnectionState};
pub use context::Context;
pub use discovery::{DeviceRecord, IPV4, IPV6};
pub use orchestrator::Error as OperationError;

#[derive(Debug)]
pub enum Error {
    /// `connect`'s address string did not parse as an IPv4/IPv6 literal.
    InvalidAddress,
    Operation(orchestrator::Error),
}

impl From<orchestrator::Error> for Error {
    fn from(err: orchestrator::Error) -> Self {
        Error::Operation(err)
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::InvalidAddress => write!(f, "address was not a valid IP literal"),
            Error::Operation(err) => write!(f, "{}", err),
        }
    }
}

impl std::error::Error for Error {}

/// Discovers Cast devices on the families selected by `ip_modes` (a bitset
/// of [`IPV4`]/[`IPV6`]). `wait` overrides `context`'s configured discovery
/// timeout for this call only; `None` uses the configured default.
///
/// Under [`Context::test_mode`] this bypasses the network entirely and
/// replays the two canned fixtures described in the test-mode hook, still
/// through the real mDNS decoder.
pub fn discover(ip_modes: u8, wait: Option<Duration>, context: &Context) -> Vec<DeviceRecord> {
    if context.test_mode() {
        return testdata::replay_discover();
    }
    let wait = wait.unwrap_or_else(|| context.discovery_timeout());
    discovery::discover(ip_modes, wait)
}

/// Opens a TLS session to `addr:port`, performs the handshake, and sends
/// the unsolicited initial `CONNECT` envelope.
pub fn connect(addr: &str, port: u16, context: Context) -> Result<Connection, Error> {
    let ip: IpAddr = addr.parse().map_err(|_| Error::InvalidAddress)?;
    orchestrator::connect(SocketAddr::new(ip, port), context).map_err(Error::from)
}

/// Sends `PING` on the heartbeat channel and waits for `PONG`.
pub fn ping(conn: &mut Connection) -> Result<(), Error> {
    orchestrator::ping(conn).map_err(Error::from)
}

/// Probes whether `app_id` is available on the connected receiver.
pub fn app_available(conn: &mut Connection, app_id: &str) -> Result<(), Error> {
    orchestrator::app_available(conn, app_id).map_err(Error::from)
}

/// Reserved interface slot for the signed-nonce device-authenticity
/// challenge; currently always fails.
pub fn device_auth(conn: &mut Connection) -> Result<(), Error> {
    orchestrator::device_auth(conn).map_err(Error::from)
}

/// Best-effort `CLOSE`, then TLS/socket teardown.
pub fn close(conn: &mut Connection) {
    orchestrator::close(conn)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn discover_in_test_mode_returns_the_two_canned_devices() {
        let mut context = Context::new();
        context.set_test_mode(true);
        let devices = discover(IPV4 | IPV6, None, &context);
        assert_eq!(devices.len(), 2);
    }

    #[test]
    fn connect_rejects_unparseable_addresses() {
        let context = Context::new();
        assert!(matches!(connect("not-an-ip", 8009, context), Err(Error::InvalidAddress)));
    }
}
