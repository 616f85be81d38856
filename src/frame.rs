//! The Cast v2 message envelope: a protobuf-style record carrying protocol
//! version, source/destination ids, namespace, and a STRING or BINARY
//! payload. Every frame on the wire is this record prefixed by its own
//! length as a big-endian u32 (see [`Demux`] for the length-prefix framing).

use std::fmt;

use crate::wire::{self, Reader, WireType, Writer};

/// `sender-0` / `receiver-0`, the ids used outside of an app session.
pub const GLOBAL_SENDER_ID: &str = "sender-0";
pub const GLOBAL_RECEIVER_ID: &str = "receiver-0";

pub const CASTV2_1_0: u32 = 0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Namespace {
    Connection,
    DeviceAuth,
    Heartbeat,
    Receiver,
}

impl Namespace {
    pub const fn urn(self) -> &'static str {
        match self {
            Namespace::Connection => "urn:x-cast:com.google.cast.tp.connection",
            Namespace::DeviceAuth => "urn:x-cast:com.google.cast.tp.deviceauth",
            Namespace::Heartbeat => "urn:x-cast:com.google.cast.tp.heartbeat",
            Namespace::Receiver => "urn:x-cast:com.google.cast.receiver",
        }
    }

    /// Classifies a URN into one of the four known namespaces, or `None` if
    /// it does not match any of them (the caller maps this to the `UNKNOWN`
    /// sentinel described in the data model).
    pub fn from_urn(urn: &str) -> Option<Namespace> {
        match urn {
            "urn:x-cast:com.google.cast.tp.connection" => Some(Namespace::Connection),
            "urn:x-cast:com.google.cast.tp.deviceauth" => Some(Namespace::DeviceAuth),
            "urn:x-cast:com.google.cast.tp.heartbeat" => Some(Namespace::Heartbeat),
            "urn:x-cast:com.google.cast.receiver" => Some(Namespace::Receiver),
            _ => None,
        }
    }
}

/// A namespace match used by the receive loop's filter descriptor. `Any`
/// matches every known or unknown namespace; `Exact` matches one namespace.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NamespaceFilter {
    Any,
    Exact(Namespace),
}

impl NamespaceFilter {
    pub fn matches(self, namespace: Option<Namespace>) -> bool {
        match self {
            NamespaceFilter::Any => true,
            NamespaceFilter::Exact(expected) => namespace == Some(expected),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PayloadKind {
    Str = 0,
    Binary = 1,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PayloadKindFilter {
    Any,
    Exact(PayloadKind),
}

impl PayloadKindFilter {
    pub fn matches(self, kind: PayloadKind) -> bool {
        match self {
            PayloadKindFilter::Any => true,
            PayloadKindFilter::Exact(expected) => expected == kind,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Payload {
    Str(String),
    Binary(Vec<u8>),
}

impl Payload {
    pub fn kind(&self) -> PayloadKind {
        match self {
            Payload::Str(_) => PayloadKind::Str,
            Payload::Binary(_) => PayloadKind::Binary,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Payload::Str(s) => Some(s),
            Payload::Binary(_) => None,
        }
    }
}

/// One Cast v2 message: the decoded form of a single length-prefixed frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Envelope {
    pub protocol_version: u32,
    pub source_id: String,
    pub destination_id: String,
    pub namespace_urn: String,
    pub payload: Payload,
}

impl Envelope {
    pub fn namespace(&self) -> Option<Namespace> {
        Namespace::from_urn(&self.namespace_urn)
    }

    pub fn new(
        source_id: impl Into<String>,
        destination_id: impl Into<String>,
        namespace: Namespace,
        payload: Payload,
    ) -> Self {
        Envelope {
            protocol_version: CASTV2_1_0,
            source_id: source_id.into(),
            destination_id: destination_id.into(),
            namespace_urn: namespace.urn().to_owned(),
            payload,
        }
    }

    /// Encodes the protobuf-style record described by the wire table (no
    /// length prefix; [`Demux::encode_frame`] adds that).
    pub fn encode(&self) -> Vec<u8> {
        let mut w = Writer::new();
        w.write_tag(1, WireType::Varint);
        w.write_varint(u64::from(self.protocol_version));
        w.write_tag(2, WireType::LengthDelimited);
        w.write_length_prefixed(self.source_id.as_bytes());
        w.write_tag(3, WireType::LengthDelimited);
        w.write_length_prefixed(self.destination_id.as_bytes());
        w.write_tag(4, WireType::LengthDelimited);
        w.write_length_prefixed(self.namespace_urn.as_bytes());
        w.write_tag(5, WireType::Varint);
        w.write_varint(self.payload.kind() as u64);
        match &self.payload {
            Payload::Str(s) => {
                w.write_tag(6, WireType::LengthDelimited);
                w.write_length_prefixed(s.as_bytes());
            }
            Payload::Binary(b) => {
                w.write_tag(7, WireType::LengthDelimited);
                w.write_length_prefixed(b);
            }
        }
        w.into_vec()
    }

    /// Decodes a single protobuf-style record (the bytes between the 4-byte
    /// length prefix and the next frame). All six logical fields -
    /// version, source id, destination id, namespace, payload kind, and
    /// payload - must be present or the frame is rejected.
    pub fn decode(src: &[u8]) -> Result<Envelope, Error> {
        let mut r = Reader::new(src);
        let mut protocol_version = None;
        let mut source_id = None;
        let mut destination_id = None;
        let mut namespace_urn = None;
        let mut payload_kind = None;
        let mut payload_str = None;
        let mut payload_bin = None;

        while !r.is_empty() {
            let (field_number, wire_type) = r.read_tag()?;
            match (field_number, wire_type) {
                (1, WireType::Varint) => {
                    let v = r.read_varint()?;
                    protocol_version = Some(v as u32);
                }
                (2, WireType::LengthDelimited) => {
                    source_id = Some(utf8(r.read_length_prefixed()?)?);
                }
                (3, WireType::LengthDelimited) => {
                    destination_id = Some(utf8(r.read_length_prefixed()?)?);
                }
                (4, WireType::LengthDelimited) => {
                    namespace_urn = Some(utf8(r.read_length_prefixed()?)?);
                }
                (5, WireType::Varint) => {
                    let v = r.read_varint()?;
                    payload_kind = Some(match v {
                        0 => PayloadKind::Str,
                        1 => PayloadKind::Binary,
                        other => return Err(Error::InvalidPayloadKind(other)),
                    });
                }
                (6, WireType::LengthDelimited) => {
                    payload_str = Some(utf8(r.read_length_prefixed()?)?);
                }
                (7, WireType::LengthDelimited) => {
                    payload_bin = Some(r.read_length_prefixed()?.to_vec());
                }
                (n, _) => return Err(Error::UnknownField(n)),
            }
        }

        let protocol_version = protocol_version.ok_or(Error::MissingField("version"))?;
        let source_id = source_id.ok_or(Error::MissingField("source_id"))?;
        let destination_id = destination_id.ok_or(Error::MissingField("destination_id"))?;
        let namespace_urn = namespace_urn.ok_or(Error::MissingField("namespace"))?;
        let payload_kind = payload_kind.ok_or(Error::MissingField("payload_kind"))?;

        let payload = match payload_kind {
            PayloadKind::Str => Payload::Str(payload_str.ok_or(Error::MissingField("payload"))?),
            PayloadKind::Binary => {
                Payload::Binary(payload_bin.ok_or(Error::MissingField("payload"))?)
            }
        };

        Ok(Envelope {
            protocol_version,
            source_id,
            destination_id,
            namespace_urn,
            payload,
        })
    }
}

fn utf8(bytes: &[u8]) -> Result<String, Error> {
    String::from_utf8(bytes.to_vec()).map_err(|_| Error::InvalidUtf8)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    Wire(wire::Error),
    MissingField(&'static str),
    UnknownField(u32),
    InvalidPayloadKind(u64),
    InvalidUtf8,
    FrameTooLarge { len: u32, max: u32 },
}

impl From<wire::Error> for Error {
    fn from(err: wire::Error) -> Self {
        Error::Wire(err)
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Wire(err) => write!(f, "malformed frame: {}", err),
            Error::MissingField(name) => write!(f, "frame missing required field {}", name),
            Error::UnknownField(n) => write!(f, "frame has unknown field number {}", n),
            Error::InvalidPayloadKind(v) => write!(f, "frame has invalid payload kind {}", v),
            Error::InvalidUtf8 => write!(f, "frame field was not valid utf-8"),
            Error::FrameTooLarge { len, max } => {
                write!(f, "frame of {} bytes exceeds ceiling of {}", len, max)
            }
        }
    }
}

impl std::error::Error for Error {}

/// Default ceiling on a single frame's protobuf record length, matching the
/// maximum Cast message size the receiver protocol documents. Configurable
/// so tests can exercise the oversized-frame rejection path cheaply.
pub const DEFAULT_MAX_FRAME_LEN: u32 = 64 << 10;

/// Length-prefix framing and demultiplexing over a rolling read buffer. The
/// buffer is fed raw bytes as they arrive from the TLS transport; each call
/// to [`Demux::next_frame`] extracts at most one complete frame.
#[derive(Debug)]
pub struct Demux {
    buf: Vec<u8>,
    max_frame_len: u32,
}

impl Demux {
    pub fn new(max_frame_len: u32) -> Self {
        Demux {
            buf: Vec::new(),
            max_frame_len,
        }
    }

    pub fn feed(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    /// Attempts to extract and decode one frame from the front of the
    /// buffer. Returns `Ok(None)` if fewer than a full frame's bytes are
    /// buffered yet. On a frame-level error the malformed frame's bytes are
    /// still consumed (the read buffer never contains a half-parsed frame)
    /// and the error is returned to the caller.
    pub fn next_frame(&mut self) -> Result<Option<Envelope>, Error> {
        if self.buf.len() < 4 {
            return Ok(None);
        }
        let len = {
            let mut r = Reader::new(&self.buf[..4]);
            r.read_u32()?
        };
        if len > self.max_frame_len {
            // The length prefix itself is consumed; there is no well-formed
            // frame to preserve, so drop only the header we've read so far
            // and report the error - the sender is misbehaving regardless
            // of what follows.
            self.buf.drain(..4);
            return Err(Error::FrameTooLarge {
                len,
                max: self.max_frame_len,
            });
        }
        let total = 4 + len as usize;
        if self.buf.len() < total {
            return Ok(None);
        }
        let record = self.buf[4..total].to_vec();
        self.buf.drain(..total);
        Envelope::decode(&record).map(Some)
    }

    /// Encodes an envelope with its 4-byte big-endian length prefix, ready
    /// to hand to the TLS write sink as one contiguous transmission.
    pub fn encode_frame(envelope: &Envelope) -> Vec<u8> {
        let record = envelope.encode();
        let mut w = Writer::with_capacity(4 + record.len());
        w.write_u32(record.len() as u32);
        w.write_bytes(&record);
        w.into_vec()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Envelope {
        Envelope::new(
            GLOBAL_SENDER_ID,
            GLOBAL_RECEIVER_ID,
            Namespace::Heartbeat,
            Payload::Str("{\"type\":\"PING\"}".to_owned()),
        )
    }

    #[test]
    fn envelope_round_trip() {
        let envelope = sample();
        let encoded = envelope.encode();
        let decoded = Envelope::decode(&encoded).unwrap();
        assert_eq!(envelope, decoded);
    }

    #[test]
    fn envelope_round_trip_empty_payload() {
        let envelope = Envelope::new(
            GLOBAL_SENDER_ID,
            GLOBAL_RECEIVER_ID,
            Namespace::Connection,
            Payload::Str(String::new()),
        );
        let decoded = Envelope::decode(&envelope.encode()).unwrap();
        assert_eq!(envelope, decoded);

        let binary = Envelope::new(
            GLOBAL_SENDER_ID,
            GLOBAL_RECEIVER_ID,
            Namespace::Connection,
            Payload::Binary(Vec::new()),
        );
        let decoded = Envelope::decode(&binary.encode()).unwrap();
        assert_eq!(binary, decoded);
    }

    #[test]
    fn unknown_field_number_rejected() {
        let mut w = Writer::new();
        w.write_tag(1, WireType::Varint);
        w.write_varint(0);
        w.write_tag(99, WireType::Varint);
        w.write_varint(0);
        assert_eq!(Envelope::decode(w.as_slice()), Err(Error::UnknownField(99)));
    }

    #[test]
    fn missing_field_rejected() {
        let mut w = Writer::new();
        w.write_tag(1, WireType::Varint);
        w.write_varint(0);
        // No source_id, destination_id, namespace, payload kind or payload.
        assert!(Envelope::decode(w.as_slice()).is_err());
    }

    #[test]
    fn invalid_payload_kind_is_frame_error() {
        // Scenario: payload-kind field carries an out-of-range value (2).
        let mut w = Writer::new();
        w.write_tag(1, WireType::Varint);
        w.write_varint(0);
        w.write_tag(2, WireType::LengthDelimited);
        w.write_length_prefixed(b"sender-0");
        w.write_tag(3, WireType::LengthDelimited);
        w.write_length_prefixed(b"receiver-0");
        w.write_tag(4, WireType::LengthDelimited);
        w.write_length_prefixed(Namespace::Heartbeat.urn().as_bytes());
        w.write_tag(5, WireType::Varint);
        w.write_varint(2);
        assert_eq!(
            Envelope::decode(w.as_slice()),
            Err(Error::InvalidPayloadKind(2))
        );
    }

    #[test]
    fn demux_reassembles_split_frame_and_resumes_after_error() {
        let good = sample();
        let good_frame = Demux::encode_frame(&good);

        let mut bad = Writer::new();
        bad.write_tag(1, WireType::Varint);
        bad.write_varint(0);
        bad.write_tag(2, WireType::LengthDelimited);
        bad.write_length_prefixed(b"sender-0");
        bad.write_tag(3, WireType::LengthDelimited);
        bad.write_length_prefixed(b"receiver-0");
        bad.write_tag(4, WireType::LengthDelimited);
        bad.write_length_prefixed(Namespace::Heartbeat.urn().as_bytes());
        bad.write_tag(5, WireType::Varint);
        bad.write_varint(2); // invalid payload kind
        let bad_record = bad.into_vec();
        let mut bad_frame = Writer::new();
        bad_frame.write_u32(bad_record.len() as u32);
        bad_frame.write_bytes(&bad_record);
        let bad_frame = bad_frame.into_vec();

        let mut demux = Demux::new(DEFAULT_MAX_FRAME_LEN);
        demux.feed(&bad_frame);
        demux.feed(&good_frame);

        assert!(matches!(demux.next_frame(), Err(Error::InvalidPayloadKind(2))));
        assert_eq!(demux.next_frame().unwrap(), Some(good));
    }

    #[test]
    fn demux_waits_for_full_frame() {
        let frame = Demux::encode_frame(&sample());
        let mut demux = Demux::new(DEFAULT_MAX_FRAME_LEN);
        demux.feed(&frame[..frame.len() - 1]);
        assert_eq!(demux.next_frame().unwrap(), None);
        demux.feed(&frame[frame.len() - 1..]);
        assert_eq!(demux.next_frame().unwrap(), Some(sample()));
    }

    #[test]
    fn oversized_frame_rejected() {
        let mut demux = Demux::new(8);
        let mut w = Writer::new();
        w.write_u32(9);
        w.write_bytes(&[0u8; 9]);
        demux.feed(w.as_slice());
        assert_eq!(
            demux.next_frame(),
            Err(Error::FrameTooLarge { len: 9, max: 8 })
        );
    }
}
