//! Canned fixtures for the test-mode replay hook described in the external
//! interfaces: two hard-coded mDNS responses (one IPv4, one IPv6 with
//! pointer-compressed additional records) and scripted Cast frames for
//! `ping` and `appAvailable`, plus the in-memory byte sink/source that
//! stands in for a TLS transport when [`crate::context::Context::test_mode`]
//! is set.
//!
//! Building these by hand (rather than storing opaque binary blobs) keeps
//! the fixtures self-documenting and exercises the same encoders the rest
//! of the crate ships, including the name compression the discovery engine
//! must decode correctly.

use std::collections::VecDeque;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use std::time::Instant;

use crate::discovery::{self, dns, DeviceRecord};
use crate::frame::{Demux, Envelope, Namespace, Payload, GLOBAL_RECEIVER_ID, GLOBAL_SENDER_ID};
use crate::transport;
use crate::wire::Writer;

/// Offset of the question name in every response we build: six u16 header
/// fields, always 12 bytes.
const HEADER_LEN: u16 = 12;
const CLASS_IN_FLUSH: u16 = 0x8001;
const CLASS_IN: u16 = dns::CLASS_IN;

fn header(arcount: u16) -> Writer {
    let mut w = Writer::new();
    w.write_u16(dns::QUERY_TRANSACTION_ID);
    w.write_u16(dns::RESPONSE_FLAGS);
    w.write_u16(0); // qdcount
    w.write_u16(1); // ancount
    w.write_u16(0); // nscount
    w.write_u16(arcount);
    w
}

/// Writes the PTR answer (owner `_googlecast._tcp.local`, RDATA
/// `<instance-label>` followed by a pointer back to the owner name) and
/// returns the offset at which the instance name begins - the anchor every
/// additional record's owner name compresses against.
fn write_ptr_answer(w: &mut Writer, instance_label: &str) -> u16 {
    dns::write_name(w, &dns::SERVICE_LABELS);
    w.write_u16(dns::TYPE_PTR);
    w.write_u16(CLASS_IN_FLUSH);
    w.write_u32(120); // ttl
    let rdlen = 1 + instance_label.len() as u16 + 2;
    w.write_u16(rdlen);
    let instance_offset = w.len() as u16;
    w.write_u8(instance_label.len() as u8);
    w.write_bytes(instance_label.as_bytes());
    w.write_u8(0xC0 | ((HEADER_LEN >> 8) as u8));
    w.write_u8((HEADER_LEN & 0xFF) as u8);
    instance_offset
}

fn write_owner_pointer(w: &mut Writer, instance_offset: u16) {
    w.write_u8(0xC0 | ((instance_offset >> 8) as u8));
    w.write_u8((instance_offset & 0xFF) as u8);
}

fn write_txt_record(w: &mut Writer, instance_offset: u16, entries: &[(&str, &str)]) {
    write_owner_pointer(w, instance_offset);
    w.write_u16(dns::TYPE_TXT);
    w.write_u16(CLASS_IN);
    w.write_u32(120);
    let mut rdata = Writer::new();
    for (key, value) in entries {
        let entry = format!("{}={}", key, value);
        rdata.write_u8(entry.len() as u8);
        rdata.write_bytes(entry.as_bytes());
    }
    let rdata = rdata.into_vec();
    w.write_u16(rdata.len() as u16);
    w.write_bytes(&rdata);
}

fn write_a_record(w: &mut Writer, instance_offset: u16, addr: Ipv4Addr) {
    write_owner_pointer(w, instance_offset);
    w.write_u16(dns::TYPE_A);
    w.write_u16(CLASS_IN);
    w.write_u32(120);
    w.write_u16(4);
    w.write_bytes(&addr.octets());
}

fn write_aaaa_record(w: &mut Writer, instance_offset: u16, addr: Ipv6Addr) {
    write_owner_pointer(w, instance_offset);
    w.write_u16(dns::TYPE_AAAA);
    w.write_u16(CLASS_IN);
    w.write_u32(120);
    w.write_u16(16);
    w.write_bytes(&addr.octets());
}

fn write_srv_record(w: &mut Writer, instance_offset: u16, port: u16) {
    write_owner_pointer(w, instance_offset);
    w.write_u16(dns::TYPE_SRV);
    w.write_u16(CLASS_IN);
    w.write_u32(120);
    w.write_u16(6);
    w.write_u16(0); // priority
    w.write_u16(0); // weight
    w.write_u16(port);
}

/// Scenario 1: IPv4 canned response decoding to `"Den TV"` / id
/// `63970hbc22h26b6b2a0492825db8d2f4` / `10.12.1.141:8009`.
pub fn ipv4_discovery_response() -> Vec<u8> {
    let mut w = header(3); // A, TXT, SRV
    let instance_offset = write_ptr_answer(&mut w, "Den TV");
    write_a_record(&mut w, instance_offset, Ipv4Addr::new(10, 12, 1, 141));
    write_txt_record(
        &mut w,
        instance_offset,
        &[
            ("id", "63970hbc22h26b6b2a0492825db8d2f4"),
            ("fn", "Den TV"),
            ("md", "Chromecast"),
        ],
    );
    write_srv_record(&mut w, instance_offset, 8009);
    w.into_vec()
}

/// Scenario 2: IPv6 canned response decoding to `"TST Chrome Panel"` /
/// `Chromecast Ultra` / `2016:cd8:4567:2cd0::12`.
pub fn ipv6_discovery_response() -> Vec<u8> {
    let mut w = header(2); // AAAA, TXT
    let instance_offset = write_ptr_answer(&mut w, "TST Chrome Panel");
    let addr: Ipv6Addr = "2016:cd8:4567:2cd0::12".parse().unwrap();
    write_aaaa_record(&mut w, instance_offset, addr);
    write_txt_record(
        &mut w,
        instance_offset,
        &[("fn", "TST Chrome Panel"), ("md", "Chromecast Ultra")],
    );
    w.into_vec()
}

/// Runs the two canned responses through the real discovery decoder rather
/// than duplicating its field-mapping logic, so the fixtures only ever
/// disagree with the parser if the parser itself changes.
pub fn replay_discover() -> Vec<DeviceRecord> {
    let placeholder = IpAddr::V4(Ipv4Addr::UNSPECIFIED);
    [ipv4_discovery_response(), ipv6_discovery_response()]
        .iter()
        .filter_map(|datagram| discovery::parse_response(datagram, placeholder))
        .collect()
}

/// Scenario 3: the canned PONG frame, 84 bytes of record preceded by its
/// own 4-byte length prefix (`00 00 00 54`). Built in the *reply*
/// orientation - source `receiver-0`, destination `sender-0` - matching
/// what `global_filter` requires of an inbound message from the device.
pub fn pong_frame() -> Vec<u8> {
    let envelope = Envelope::new(
        GLOBAL_RECEIVER_ID,
        GLOBAL_SENDER_ID,
        Namespace::Heartbeat,
        Payload::Str(r#"{"type":"PONG"}"#.to_owned()),
    );
    Demux::encode_frame(&envelope)
}

/// Sentinel app id the test-mode replay hook treats as unavailable, so
/// callers can exercise the APP_UNAVAILABLE path (scenario 5) through the
/// same `appAvailable` entry point used for the happy path.
pub const UNAVAILABLE_APP_ID: &str = "unavailable-app";

/// Scenarios 4/5: canned `GET_APP_AVAILABILITY` responses for a probed
/// `app_id`, either available or not. Reply orientation - source
/// `receiver-0`, destination `sender-0` - matching `global_filter`.
pub fn app_availability_frame(app_id: &str, request_id: i64, available: bool) -> Vec<u8> {
    let status = if available {
        "APP_AVAILABLE"
    } else {
        "APP_UNAVAILABLE"
    };
    let payload = format!(
        r#"{{"responseType":"GET_APP_AVAILABILITY","requestId":{},"availability":{{"{}":"{}"}}}}"#,
        request_id, app_id, status
    );
    let envelope = Envelope::new(
        GLOBAL_RECEIVER_ID,
        GLOBAL_SENDER_ID,
        Namespace::Receiver,
        Payload::Str(payload),
    );
    Demux::encode_frame(&envelope)
}

/// Scenario 6: a frame whose payload-kind field is out of range (2),
/// followed immediately by a well-formed PONG frame - exercises consume-
/// on-error followed by resumed parsing.
pub fn malformed_then_pong_frame() -> Vec<u8> {
    let mut w = Writer::new();
    w.write_tag(1, crate::wire::WireType::Varint);
    w.write_varint(0);
    w.write_tag(2, crate::wire::WireType::LengthDelimited);
    w.write_length_prefixed(GLOBAL_SENDER_ID.as_bytes());
    w.write_tag(3, crate::wire::WireType::LengthDelimited);
    w.write_length_prefixed(GLOBAL_RECEIVER_ID.as_bytes());
    w.write_tag(4, crate::wire::WireType::LengthDelimited);
    w.write_length_prefixed(Namespace::Heartbeat.urn().as_bytes());
    w.write_tag(5, crate::wire::WireType::Varint);
    w.write_varint(2); // invalid payload kind
    let record = w.into_vec();

    let mut frame = Writer::with_capacity(4 + record.len());
    frame.write_u32(record.len() as u32);
    frame.write_bytes(&record);
    let mut out = frame.into_vec();
    out.extend_from_slice(&pong_frame());
    out
}

/// An in-memory byte sink/source used in place of a real TLS transport when
/// [`crate::context::Context::test_mode`] is set. Writes are recorded for
/// assertions; reads are served from a queue of pre-scripted frames.
pub struct TestTransport {
    inbound: VecDeque<u8>,
    pub sent: Vec<u8>,
}

impl TestTransport {
    pub fn new() -> Self {
        TestTransport {
            inbound: VecDeque::new(),
            sent: Vec::new(),
        }
    }

    pub fn push_frame(&mut self, frame: &[u8]) {
        self.inbound.extend(frame.iter().copied());
    }

    pub fn write_all(&mut self, buf: &[u8], _deadline: Instant) -> Result<(), transport::Error> {
        self.sent.extend_from_slice(buf);
        Ok(())
    }

    pub fn read_available(
        &mut self,
        buf: &mut [u8],
        _deadline: Instant,
    ) -> Result<usize, transport::Error> {
        if self.inbound.is_empty() {
            return Ok(0);
        }
        let n = buf.len().min(self.inbound.len());
        for slot in buf.iter_mut().take(n) {
            *slot = self.inbound.pop_front().expect("checked non-empty above");
        }
        Ok(n)
    }

    pub fn shutdown(&mut self) {}
}

impl Default for TestTransport {
    fn default() -> Self {
        TestTransport::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ipv4_fixture_decodes_to_the_documented_device() {
        let devices = replay_discover();
        let den_tv = devices
            .iter()
            .find(|d| d.friendly_name == "Den TV")
            .expect("IPv4 fixture present");
        assert_eq!(den_tv.device_id, "63970hbc22h26b6b2a0492825db8d2f4");
        assert_eq!(den_tv.model, "Chromecast");
        assert_eq!(den_tv.address, IpAddr::V4(Ipv4Addr::new(10, 12, 1, 141)));
        assert_eq!(den_tv.port, 8009);
    }

    #[test]
    fn ipv6_fixture_decodes_to_the_documented_device() {
        let devices = replay_discover();
        let panel = devices
            .iter()
            .find(|d| d.friendly_name == "TST Chrome Panel")
            .expect("IPv6 fixture present");
        assert_eq!(panel.model, "Chromecast Ultra");
        assert_eq!(
            panel.address,
            IpAddr::V6("2016:cd8:4567:2cd0::12".parse().unwrap())
        );
    }

    #[test]
    fn pong_frame_record_is_84_bytes() {
        let frame = pong_frame();
        assert_eq!(&frame[0..4], &84u32.to_be_bytes());
    }

    #[test]
    fn malformed_frame_is_followed_by_a_recoverable_pong() {
        let mut demux = Demux::new(crate::frame::DEFAULT_MAX_FRAME_LEN);
        demux.feed(&malformed_then_pong_frame());
        assert!(demux.next_frame().is_err());
        let recovered = demux.next_frame().unwrap().expect("pong frame parses");
        assert_eq!(recovered.payload.as_str(), Some(r#"{"type":"PONG"}"#));
    }
}
