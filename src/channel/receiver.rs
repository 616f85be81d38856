//! The RECEIVER namespace. Only `GET_APP_AVAILABILITY` is in the callable
//! surface; app launch, status and volume control are source features this
//! client does not expose (see the crate's non-goals).

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::frame::{Envelope, Namespace, GLOBAL_RECEIVER_ID, GLOBAL_SENDER_ID};

use super::MessageBuilder;

pub const AVAILABLE: &str = "APP_AVAILABLE";
pub const UNAVAILABLE: &str = "APP_UNAVAILABLE";

#[derive(Serialize, Debug)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Request {
    #[serde(rename_all = "camelCase")]
    GetAppAvailability { request_id: i64, app_id: Vec<String> },
}

/// The real Cast wire format tags this response with `responseType`, not
/// `type` - the one namespace payload in this crate that breaks the
/// otherwise uniform `#[serde(tag = "type")]` convention, so it gets its
/// own untagged struct instead of joining the shared `Response` enum shape.
#[derive(Deserialize, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AvailabilityResponse {
    pub response_type: String,
    pub request_id: i64,
    pub availability: HashMap<String, String>,
}

pub fn get_app_availability(app_id: &str, request_id: i64) -> Envelope {
    let payload = Request::GetAppAvailability {
        request_id,
        app_id: vec![app_id.to_owned()],
    };
    MessageBuilder::new(Namespace::Receiver, GLOBAL_SENDER_ID, GLOBAL_RECEIVER_ID)
        .build(&payload)
        .expect("Request::GetAppAvailability always serializes")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::parse_payload;
    use crate::frame::Payload;

    #[test]
    fn request_envelope_carries_the_requested_app_id() {
        let envelope = get_app_availability("02834648", 7);
        assert_eq!(
            envelope.payload.as_str(),
            Some(r#"{"type":"GET_APP_AVAILABILITY","requestId":7,"appId":["02834648"]}"#)
        );
    }

    #[test]
    fn availability_response_uses_response_type_not_type() {
        let envelope = Envelope::new(
            GLOBAL_RECEIVER_ID,
            GLOBAL_SENDER_ID,
            Namespace::Receiver,
            Payload::Str(
                r#"{"responseType":"GET_APP_AVAILABILITY","requestId":7,"availability":{"02834648":"APP_AVAILABLE"}}"#
                    .to_owned(),
            ),
        );
        let response: AvailabilityResponse = parse_payload(&envelope).unwrap();
        assert_eq!(response.request_id, 7);
        assert_eq!(
            response.availability.get("02834648").map(String::as_str),
            Some(AVAILABLE)
        );
    }
}
