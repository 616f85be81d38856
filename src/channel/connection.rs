//! The CONNECTION namespace: an unsolicited `CONNECT` sent once the TLS
//! handshake completes, and a best-effort `CLOSE` sent on teardown. Neither
//! expects a reply; an inbound `CLOSE` (the receiver hanging up first) is
//! modeled as [`Response::Close`] for callers that want to notice it.

use serde::{Deserialize, Serialize};

use crate::frame::{Envelope, Namespace, GLOBAL_RECEIVER_ID, GLOBAL_SENDER_ID};

use super::MessageBuilder;

const USER_AGENT: &str = "cast-client";

#[derive(Serialize, Debug)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Request {
    #[serde(rename_all = "camelCase")]
    Connect { user_agent: String },
    Close,
}

#[derive(Deserialize, Debug, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Response {
    Close,
}

pub fn connect() -> Envelope {
    let payload = Request::Connect {
        user_agent: USER_AGENT.to_owned(),
    };
    MessageBuilder::new(Namespace::Connection, GLOBAL_SENDER_ID, GLOBAL_RECEIVER_ID)
        .build(&payload)
        .expect("Request::Connect always serializes")
}

pub fn close() -> Envelope {
    MessageBuilder::new(Namespace::Connection, GLOBAL_SENDER_ID, GLOBAL_RECEIVER_ID)
        .build(&Request::Close)
        .expect("Request::Close always serializes")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::parse_payload;

    #[test]
    fn connect_envelope_carries_the_user_agent() {
        let envelope = connect();
        assert_eq!(envelope.payload.as_str(), Some(r#"{"type":"CONNECT","userAgent":"cast-client"}"#));
    }

    #[test]
    fn close_response_parses() {
        let envelope = Envelope::new(
            GLOBAL_RECEIVER_ID,
            GLOBAL_SENDER_ID,
            Namespace::Connection,
            crate::frame::Payload::Str(r#"{"type":"CLOSE"}"#.to_owned()),
        );
        assert_eq!(parse_payload::<Response>(&envelope).unwrap(), Response::Close);
    }
}
