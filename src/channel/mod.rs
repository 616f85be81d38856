//! JSON request/response payloads for the four Cast namespaces, and the
//! builder that wraps a serialised payload into a [`crate::frame::Envelope`].
//!
//! Each submodule owns one namespace's wire vocabulary: `connection` (the
//! unsolicited CONNECT/CLOSE pair), `heartbeat` (PING/PONG), `receiver`
//! (GET_APP_AVAILABILITY, the only receiver operation in the callable
//! surface). Device-auth has no payload vocabulary of its own yet - see
//! [`crate::orchestrator::device_auth`].

use std::fmt;

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::frame::{Envelope, Namespace, Payload};

pub mod connection;
pub mod heartbeat;
pub mod receiver;

#[derive(Debug)]
pub enum Error {
    /// The payload could not be serialised to JSON.
    Serialize,
    /// A received STRING payload was not valid JSON for the type expected.
    Parse,
    /// A received envelope carried a BINARY payload where JSON was expected.
    NotJson,
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Serialize => write!(f, "failed to serialize JSON payload"),
            Error::Parse => write!(f, "failed to parse JSON payload"),
            Error::NotJson => write!(f, "envelope payload was binary, expected JSON"),
        }
    }
}

impl std::error::Error for Error {}

/// Builds one outbound envelope: fixes namespace and endpoint ids, then
/// serialises a typed payload as the envelope's STRING body.
pub struct MessageBuilder<'a> {
    namespace: Namespace,
    source: &'a str,
    destination: &'a str,
}

impl<'a> MessageBuilder<'a> {
    pub fn new(namespace: Namespace, source: &'a str, destination: &'a str) -> Self {
        MessageBuilder {
            namespace,
            source,
            destination,
        }
    }

    pub fn build<T: Serialize>(self, payload: &T) -> Result<Envelope, Error> {
        let json = serde_json::to_string(payload).map_err(|_| Error::Serialize)?;
        Ok(Envelope::new(
            self.source,
            self.destination,
            self.namespace,
            Payload::Str(json),
        ))
    }
}

/// Parses an envelope's STRING payload as JSON of type `T`.
pub fn parse_payload<T: DeserializeOwned>(envelope: &Envelope) -> Result<T, Error> {
    let json = envelope.payload.as_str().ok_or(Error::NotJson)?;
    serde_json::from_str(json).map_err(|_| Error::Parse)
}
