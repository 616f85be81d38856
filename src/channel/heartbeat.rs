//! The HEARTBEAT namespace: a liveness `PING`/`PONG` pair exchanged on the
//! global sender/receiver endpoints.

use serde::{Deserialize, Serialize};

use crate::frame::{Envelope, Namespace, GLOBAL_RECEIVER_ID, GLOBAL_SENDER_ID};

use super::MessageBuilder;

#[derive(Serialize, Debug)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Request {
    Ping,
    Pong,
}

#[derive(Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Response {
    Ping,
    Pong,
}

pub fn ping() -> Envelope {
    MessageBuilder::new(Namespace::Heartbeat, GLOBAL_SENDER_ID, GLOBAL_RECEIVER_ID)
        .build(&Request::Ping)
        .expect("Request::Ping always serializes")
}

pub fn pong() -> Envelope {
    MessageBuilder::new(Namespace::Heartbeat, GLOBAL_SENDER_ID, GLOBAL_RECEIVER_ID)
        .build(&Request::Pong)
        .expect("Request::Pong always serializes")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::parse_payload;
    use crate::frame::Payload;

    #[test]
    fn ping_envelope_round_trips_through_json() {
        let envelope = ping();
        assert_eq!(envelope.payload.as_str(), Some(r#"{"type":"PING"}"#));
    }

    #[test]
    fn pong_response_parses() {
        let envelope = Envelope::new(
            GLOBAL_RECEIVER_ID,
            GLOBAL_SENDER_ID,
            Namespace::Heartbeat,
            Payload::Str(r#"{"type":"PONG"}"#.to_owned()),
        );
        assert_eq!(parse_payload::<Response>(&envelope).unwrap(), Response::Pong);
    }
}
