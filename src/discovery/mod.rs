//! mDNS discovery of Cast devices: send one PTR query for
//! `_googlecast._tcp.local` over IPv4 and/or IPv6 multicast, collect
//! answers within a bounded wait, and decode each into a [`DeviceRecord`].

pub mod device;
pub mod dns;

use std::io;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr, SocketAddrV4, SocketAddrV6};
use std::time::{Duration, Instant};

use mio::net::UdpSocket;
use mio::{Events, Interest, Poll, Token};
use socket2::{Domain, Protocol, Socket, Type};

pub use device::DeviceRecord;
use device::{DEFAULT_MODEL, DEFAULT_PORT};

/// Bitset values for the `ip_modes` parameter to [`discover`].
pub const IPV4: u8 = 1;
pub const IPV6: u8 = 2;

const MDNS_PORT: u16 = 5353;
const IPV4_GROUP: Ipv4Addr = Ipv4Addr::new(224, 0, 0, 251);
const IPV6_GROUP: Ipv6Addr = Ipv6Addr::new(0xff02, 0, 0, 0, 0, 0, 0, 0x00fb);

const RECV_TOKEN: Token = Token(0);
/// UDP datagrams for this query are never larger than this; oversized reads
/// are truncated by the OS and fail decode harmlessly.
const DATAGRAM_BUF_LEN: usize = 4096;

#[derive(Debug)]
pub enum Error {
    Socket(io::Error),
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::Socket(err) => write!(f, "discovery socket error: {}", err),
        }
    }
}

impl std::error::Error for Error {}

/// Discovers Cast devices on the families selected by `ip_modes` (a bitset
/// of [`IPV4`]/[`IPV6`]), waiting up to `wait` for responses per family.
/// Socket errors abort only the family that produced them; a malformed
/// datagram is dropped without affecting the rest of the wait window.
pub fn discover(ip_modes: u8, wait: Duration) -> Vec<DeviceRecord> {
    let mut devices = Vec::new();
    if ip_modes & IPV4 != 0 {
        match discover_v4(wait) {
            Ok(mut found) => devices.append(&mut found),
            Err(err) => warn_socket_error("IPv4", &err),
        }
    }
    if ip_modes & IPV6 != 0 {
        match discover_v6(wait) {
            Ok(mut found) => devices.append(&mut found),
            Err(err) => warn_socket_error("IPv6", &err),
        }
    }
    devices
}

fn warn_socket_error(family: &str, err: &Error) {
    log::warn!("{} mDNS discovery aborted: {}", family, err);
}

fn discover_v4(wait: Duration) -> Result<Vec<DeviceRecord>, Error> {
    let socket = Socket::new(Domain::IPV4, Type::DGRAM, Some(Protocol::UDP)).map_err(Error::Socket)?;
    socket.set_reuse_address(true).map_err(Error::Socket)?;
    socket
        .bind(&SocketAddr::V4(SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, MDNS_PORT)).into())
        .map_err(Error::Socket)?;
    socket
        .join_multicast_v4(&IPV4_GROUP, &Ipv4Addr::UNSPECIFIED)
        .map_err(Error::Socket)?;
    socket.set_multicast_loop_v4(true).map_err(Error::Socket)?;
    socket.set_multicast_ttl_v4(1).map_err(Error::Socket)?;
    socket.set_nonblocking(true).map_err(Error::Socket)?;

    let target = SocketAddr::V4(SocketAddrV4::new(IPV4_GROUP, MDNS_PORT));
    run_query(socket, target, wait)
}

fn discover_v6(wait: Duration) -> Result<Vec<DeviceRecord>, Error> {
    let socket = Socket::new(Domain::IPV6, Type::DGRAM, Some(Protocol::UDP)).map_err(Error::Socket)?;
    socket.set_reuse_address(true).map_err(Error::Socket)?;
    socket
        .bind(&SocketAddr::V6(SocketAddrV6::new(Ipv6Addr::UNSPECIFIED, MDNS_PORT, 0, 0)).into())
        .map_err(Error::Socket)?;
    socket.join_multicast_v6(&IPV6_GROUP, 0).map_err(Error::Socket)?;
    socket.set_multicast_loop_v6(true).map_err(Error::Socket)?;
    socket.set_multicast_hops_v6(1).map_err(Error::Socket)?;
    socket.set_nonblocking(true).map_err(Error::Socket)?;

    let target = SocketAddr::V6(SocketAddrV6::new(IPV6_GROUP, MDNS_PORT, 0, 0));
    run_query(socket, target, wait)
}

/// Sends the query and collects every answer that arrives before `wait`
/// elapses, using a non-blocking socket and an `mio` readiness poll in
/// place of the source's manual select-and-retry loop.
fn run_query(socket: Socket, target: SocketAddr, wait: Duration) -> Result<Vec<DeviceRecord>, Error> {
    let std_socket: std::net::UdpSocket = socket.into();
    let mut socket = UdpSocket::from_std(std_socket);
    socket
        .send_to(&dns::build_query(), target)
        .map_err(Error::Socket)?;

    let mut poll = Poll::new().map_err(Error::Socket)?;
    poll.registry()
        .register(&mut socket, RECV_TOKEN, Interest::READABLE)
        .map_err(Error::Socket)?;
    let mut events = Events::with_capacity(16);

    let deadline = Instant::now() + wait;
    let mut devices = Vec::new();
    let mut buf = [0u8; DATAGRAM_BUF_LEN];

    loop {
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            break;
        }
        poll.poll(&mut events, Some(remaining)).map_err(Error::Socket)?;
        if events.iter().next().is_none() {
            break;
        }
        loop {
            match socket.recv_from(&mut buf) {
                Ok((n, from)) => {
                    if let Some(device) = parse_response(&buf[..n], from.ip()) {
                        devices.push(device);
                    }
                }
                Err(err) if err.kind() == io::ErrorKind::WouldBlock => break,
                Err(err) => return Err(Error::Socket(err)),
            }
        }
    }
    Ok(devices)
}

/// Decodes one mDNS response datagram into a `DeviceRecord`. Any parse
/// failure drops the datagram silently - a discovery error is absorbed
/// locally and never fails the enclosing `discover` call.
pub(crate) fn parse_response(datagram: &[u8], source_ip: IpAddr) -> Option<DeviceRecord> {
    let response = dns::decode_response(datagram).ok()?;

    let mut address = source_ip;
    let mut port = DEFAULT_PORT;
    let mut device_id = String::new();
    let mut friendly_name = response.ptr_target_label.clone();
    let mut model = DEFAULT_MODEL.to_owned();

    for record in &response.additional {
        match record.rtype {
            dns::TYPE_A if record.rdata.len() == 4 => {
                if let Some(addr) = dns::decode_ipv4(record.rdata) {
                    address = IpAddr::V4(addr);
                }
            }
            dns::TYPE_AAAA if record.rdata.len() == 16 => {
                if let Some(addr) = dns::decode_ipv6(record.rdata) {
                    address = IpAddr::V6(addr);
                }
            }
            dns::TYPE_TXT => {
                for (key, value) in dns::decode_txt(record.rdata) {
                    match key.as_str() {
                        "id" => device_id = value,
                        "fn" => friendly_name = value,
                        "md" => model = value,
                        _ => {}
                    }
                }
            }
            dns::TYPE_SRV => {
                if let Some(p) = dns::decode_srv_port(record.rdata) {
                    port = p;
                }
            }
            _ => {}
        }
    }

    Some(DeviceRecord {
        device_id,
        friendly_name,
        model,
        address,
        port,
    })
}
