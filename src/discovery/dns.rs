//! DNS message encode/decode for the `_googlecast._tcp.local` mDNS query
//! and its responses, including the RFC 1035 §4.1.4 pointer-compression
//! name decoder.

use std::fmt;
use std::net::{Ipv4Addr, Ipv6Addr};

use crate::wire::{self, Reader, Writer};

pub const QUERY_TRANSACTION_ID: u16 = 0xFEED;
pub const RESPONSE_FLAGS: u16 = 0x8400;

pub const SERVICE_LABELS: [&str; 3] = ["_googlecast", "_tcp", "local"];

pub const TYPE_A: u16 = 1;
pub const TYPE_PTR: u16 = 12;
pub const TYPE_TXT: u16 = 16;
pub const TYPE_AAAA: u16 = 28;
pub const TYPE_SRV: u16 = 33;
pub const CLASS_IN: u16 = 1;

/// Bounds the total number of label-or-pointer steps a single name decode
/// may take, so a pointer cycle fails fast instead of looping forever.
const MAX_NAME_STEPS: usize = 128;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    Wire(wire::Error),
    /// A name read more label-or-pointer steps than the budget allows -
    /// this is how pointer cycles and runaway chains are rejected.
    NameTooLong,
    InvalidLabel,
    HeaderMismatch,
    AnswerNameMismatch,
    AnswerTypeMismatch,
    AnswerClassMismatch,
}

impl From<wire::Error> for Error {
    fn from(err: wire::Error) -> Self {
        Error::Wire(err)
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Wire(err) => write!(f, "malformed DNS message: {}", err),
            Error::NameTooLong => write!(f, "name exceeded the pointer-chain step budget"),
            Error::InvalidLabel => write!(f, "invalid DNS label"),
            Error::HeaderMismatch => write!(f, "response header did not match the expected shape"),
            Error::AnswerNameMismatch => write!(f, "answer name was not _googlecast._tcp.local"),
            Error::AnswerTypeMismatch => write!(f, "answer record was not a PTR record"),
            Error::AnswerClassMismatch => write!(f, "answer record class was not IN"),
        }
    }
}

impl std::error::Error for Error {}

/// Builds the 34-byte mDNS query: a header requesting one PTR question for
/// `_googlecast._tcp.local`, QCLASS IN with the unicast-response bit set.
pub fn build_query() -> Vec<u8> {
    let mut w = Writer::new();
    w.write_u16(QUERY_TRANSACTION_ID);
    w.write_u16(0x0000); // flags
    w.write_u16(1); // qdcount
    w.write_u16(0); // ancount
    w.write_u16(0); // nscount
    w.write_u16(0); // arcount
    write_name(&mut w, &SERVICE_LABELS);
    w.write_u16(TYPE_PTR);
    w.write_u16(0x8001); // QCLASS IN with the unicast-response bit set
    w.into_vec()
}

pub(crate) fn write_name(w: &mut Writer, labels: &[&str]) {
    for label in labels {
        w.write_u8(label.len() as u8);
        w.write_bytes(label.as_bytes());
    }
    w.write_u8(0);
}

/// Decodes a (possibly compressed) DNS name starting at `start` within the
/// full message `msg`. `limit` bounds how far into the message the
/// *uncompressed* portion of the name may run (the RDLEN boundary when
/// decoding RDATA); once a pointer redirects into the shared dictionary the
/// limit no longer applies, only the message's own bounds do.
///
/// Returns the label sequence and the cursor position immediately after the
/// name *as it appeared at `start`* - i.e. right after the terminator or
/// pointer that was first encountered, never advancing past a followed
/// pointer itself.
pub fn decode_name(msg: &[u8], start: usize, limit: usize) -> Result<(Vec<String>, usize), Error> {
    let mut labels = Vec::new();
    let mut pos = start;
    let mut end_pos = None;
    let mut redirected = false;
    let mut steps = 0usize;

    loop {
        steps += 1;
        if steps > MAX_NAME_STEPS {
            return Err(Error::NameTooLong);
        }
        let bound = if redirected { msg.len() } else { limit };
        if pos >= bound {
            return Err(Error::Wire(wire::Error::Eof));
        }
        let len_byte = msg[pos];
        if len_byte == 0 {
            if end_pos.is_none() {
                end_pos = Some(pos + 1);
            }
            break;
        } else if len_byte & 0xC0 == 0xC0 {
            if pos + 1 >= msg.len() {
                return Err(Error::Wire(wire::Error::Eof));
            }
            let offset = ((u16::from(len_byte & 0x3F)) << 8 | u16::from(msg[pos + 1])) as usize;
            if end_pos.is_none() {
                end_pos = Some(pos + 2);
            }
            if offset >= msg.len() {
                return Err(Error::Wire(wire::Error::Eof));
            }
            pos = offset;
            redirected = true;
        } else if len_byte & 0xC0 != 0 {
            // Top two bits set but not both (0x40, 0x80) are reserved.
            return Err(Error::InvalidLabel);
        } else {
            let len = len_byte as usize;
            let label_start = pos + 1;
            let label_end = label_start + len;
            let label_bound = if redirected { msg.len() } else { limit };
            if label_end > label_bound {
                return Err(Error::Wire(wire::Error::Eof));
            }
            let label = std::str::from_utf8(&msg[label_start..label_end])
                .map_err(|_| Error::InvalidLabel)?;
            labels.push(label.to_owned());
            pos = label_end;
        }
    }
    Ok((labels, end_pos.unwrap_or(pos)))
}

/// One additional/authority resource record, decoded generically; the
/// discovery engine interprets `rdata` according to `rtype`.
#[derive(Debug)]
pub struct ResourceRecord<'a> {
    pub rtype: u16,
    pub rclass: u16,
    pub rdata: &'a [u8],
}

/// Reads a resource record (name, type, class, ttl, rdlength, rdata) at the
/// reader's current position, following compressed names in the owner field.
fn read_record<'a>(r: &mut Reader<'a>) -> Result<ResourceRecord<'a>, Error> {
    let (_name, after_name) = decode_name(r.buf(), r.position(), r.buf().len())?;
    r.seek(after_name)?;
    let rtype = r.read_u16()?;
    let rclass = r.read_u16()?;
    let _ttl = r.read_u32()?;
    let rdlength = r.read_u16()? as usize;
    let rdata = r.read_bytes(rdlength)?;
    Ok(ResourceRecord { rtype, rclass, rdata })
}

/// The result of successfully decoding one mDNS response datagram: the PTR
/// target's first label (candidate friendly name) plus the additional
/// records, left for the discovery engine to fold into a `DeviceRecord`.
pub struct Response<'a> {
    pub ptr_target_label: String,
    pub additional: Vec<ResourceRecord<'a>>,
}

/// Decodes one mDNS response datagram per §4.2: validates the header and
/// the single answer record, then collects (but does not interpret) every
/// additional record. Authority records are read past but discarded.
pub fn decode_response(msg: &[u8]) -> Result<Response<'_>, Error> {
    let mut r = Reader::new(msg);
    let id = r.read_u16()?;
    let flags = r.read_u16()?;
    let qdcount = r.read_u16()?;
    let ancount = r.read_u16()?;
    let nscount = r.read_u16()?;
    let arcount = r.read_u16()?;

    if id != QUERY_TRANSACTION_ID || flags != RESPONSE_FLAGS || qdcount != 0 || ancount != 1 {
        return Err(Error::HeaderMismatch);
    }

    let (answer_name, after_name) = decode_name(msg, r.position(), msg.len())?;
    r.seek(after_name)?;
    if answer_name != SERVICE_LABELS {
        return Err(Error::AnswerNameMismatch);
    }
    let rtype = r.read_u16()?;
    let rclass = r.read_u16()?;
    let _ttl = r.read_u32()?;
    let rdlength = r.read_u16()? as usize;
    let rdata_start = r.position();
    let rdata = r.read_bytes(rdlength)?;

    if rtype != TYPE_PTR {
        return Err(Error::AnswerTypeMismatch);
    }
    if rclass & 0x7fff != CLASS_IN {
        return Err(Error::AnswerClassMismatch);
    }

    let (ptr_labels, _) = decode_name(msg, rdata_start, rdata_start + rdata.len())?;
    let ptr_target_label = ptr_labels.first().cloned().unwrap_or_default();

    for _ in 0..nscount {
        read_record(&mut r)?;
    }

    let mut additional = Vec::with_capacity(arcount as usize);
    for _ in 0..arcount {
        additional.push(read_record(&mut r)?);
    }

    Ok(Response {
        ptr_target_label,
        additional,
    })
}

/// Decodes a TXT record's RDATA into its length-prefixed `key=value`
/// strings.
pub fn decode_txt(rdata: &[u8]) -> Vec<(String, String)> {
    let mut out = Vec::new();
    let mut r = Reader::new(rdata);
    while !r.is_empty() {
        let len = match r.read_u8() {
            Ok(len) => len as usize,
            Err(_) => break,
        };
        let entry = match r.read_bytes(len) {
            Ok(bytes) => bytes,
            Err(_) => break,
        };
        if let Ok(text) = std::str::from_utf8(entry) {
            if let Some((key, value)) = text.split_once('=') {
                out.push((key.to_owned(), value.to_owned()));
            }
        }
    }
    out
}

pub fn decode_ipv4(rdata: &[u8]) -> Option<Ipv4Addr> {
    if rdata.len() != 4 {
        return None;
    }
    Some(Ipv4Addr::new(rdata[0], rdata[1], rdata[2], rdata[3]))
}

pub fn decode_ipv6(rdata: &[u8]) -> Option<Ipv6Addr> {
    let bytes: [u8; 16] = rdata.try_into().ok()?;
    Some(Ipv6Addr::from(bytes))
}

/// SRV RDATA is priority(2) + weight(2) + port(2) + target name; only the
/// port is used.
pub fn decode_srv_port(rdata: &[u8]) -> Option<u16> {
    if rdata.len() < 6 {
        return None;
    }
    Some(u16::from_be_bytes([rdata[4], rdata[5]]))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn query_packet_is_34_bytes() {
        let query = build_query();
        assert_eq!(query.len(), 34);
        assert_eq!(&query[0..2], &QUERY_TRANSACTION_ID.to_be_bytes());
    }

    #[test]
    fn name_decoder_matches_compressed_and_uncompressed() {
        // Message: [_googlecast][_tcp][local]\0 then a pointer back to the
        // start of `_tcp` for a second name.
        let mut w = Writer::new();
        let base = 0;
        write_name(&mut w, &SERVICE_LABELS);
        let tcp_offset = "_googlecast".len() as u16 + 1 + base as u16;
        w.write_u8(0xC0 | ((tcp_offset >> 8) as u8));
        w.write_u8((tcp_offset & 0xFF) as u8);
        let msg = w.into_vec();

        let (uncompressed, _) = decode_name(&msg, 0, msg.len()).unwrap();
        assert_eq!(uncompressed, SERVICE_LABELS);

        let pointer_start = msg.len() - 2;
        let (compressed, _) = decode_name(&msg, pointer_start, msg.len()).unwrap();
        assert_eq!(compressed, vec!["_tcp", "local"]);
    }

    #[test]
    fn name_decoder_terminates_on_pointer_cycle() {
        // Byte 0 points to itself - a cycle the decoder must reject rather
        // than loop on.
        let msg = [0xC0u8, 0x00];
        assert_eq!(decode_name(&msg, 0, msg.len()), Err(Error::NameTooLong));
    }

    #[test]
    fn txt_parses_key_value_pairs() {
        let mut w = Writer::new();
        w.write_u8(5);
        w.write_bytes(b"id=ab");
        w.write_u8(9);
        w.write_bytes(b"fn=Den TV");
        let pairs = decode_txt(w.as_slice());
        assert_eq!(
            pairs,
            vec![
                ("id".to_owned(), "ab".to_owned()),
                ("fn".to_owned(), "Den TV".to_owned()),
            ]
        );
    }

    #[test]
    fn srv_port_requires_minimum_length() {
        assert_eq!(decode_srv_port(&[0, 0, 0, 0, 0x1F, 0x49]), Some(8009));
        assert_eq!(decode_srv_port(&[0, 0, 0, 0]), None);
    }
}
