//! Wire messages exchanged with the authorization service.
//!
//! Outbound requests carry a single `rfid` field:
//!
//! ```text
//! {"rfid":" 04 A2 3B 9C"}
//! ```
//!
//! Inbound decisions carry a `door` command and an optional human-readable
//! `message`:
//!
//! ```text
//! {"door":"open","message":"welcome"}
//! ```

use bytes::Bytes;
use latchkey_core::{CredentialId, constants::OPEN_COMMAND};
use serde::{Deserialize, Deserializer, Serialize};

/// Access request published when a card is captured.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AccessRequest {
    /// Canonical credential string.
    pub rfid: String,
}

impl AccessRequest {
    /// Build the request for a captured credential.
    pub fn new(credential: &CredentialId) -> Self {
        Self {
            rfid: credential.as_str().to_string(),
        }
    }

    /// Serialize to the JSON payload published on the request topic.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_payload(&self) -> serde_json::Result<Vec<u8>> {
        serde_json::to_vec(self)
    }
}

/// Decision received from the authorization service.
///
/// Fields that are missing or not strings are treated as absent.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct AccessDecision {
    /// Door command; only `"open"` authorizes actuation.
    #[serde(default, deserialize_with = "string_or_none")]
    pub door: Option<String>,

    /// Informational text, used for logging only.
    #[serde(default, deserialize_with = "string_or_none")]
    pub message: Option<String>,
}

/// How a decision should be acted upon.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    /// Drive the actuator.
    Open,

    /// The service answered with another door command.
    Refused { door: String },

    /// The decision carried no usable door command.
    MissingDoor,
}

impl AccessDecision {
    /// Decode a decision payload.
    ///
    /// # Errors
    ///
    /// Returns an error if the payload is not a JSON object.
    ///
    /// # Examples
    ///
    /// ```
    /// use latchkey_bus::{AccessDecision, Verdict};
    ///
    /// let decision = AccessDecision::decode(br#"{"door":"open","message":"welcome"}"#).unwrap();
    /// assert_eq!(decision.verdict(), Verdict::Open);
    /// assert_eq!(decision.message.as_deref(), Some("welcome"));
    /// ```
    pub fn decode(payload: &[u8]) -> serde_json::Result<Self> {
        serde_json::from_slice(payload)
    }

    /// Evaluate the door command. Comparison is exact and case-sensitive.
    pub fn verdict(&self) -> Verdict {
        match self.door.as_deref() {
            Some(OPEN_COMMAND) => Verdict::Open,
            Some(other) => Verdict::Refused {
                door: other.to_string(),
            },
            None => Verdict::MissingDoor,
        }
    }

    /// Returns `true` if the decision authorizes actuation.
    pub fn is_open(&self) -> bool {
        matches!(self.verdict(), Verdict::Open)
    }
}

fn string_or_none<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = serde_json::Value::deserialize(deserializer)?;
    Ok(match value {
        serde_json::Value::String(s) => Some(s),
        _ => None,
    })
}

/// Raw message delivered on a subscribed topic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundMessage {
    /// Topic the message was published on.
    pub topic: String,

    /// Raw payload bytes.
    pub payload: Bytes,
}

impl InboundMessage {
    /// Create an inbound message.
    pub fn new(topic: impl Into<String>, payload: impl Into<Bytes>) -> Self {
        Self {
            topic: topic.into(),
            payload: payload.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[test]
    fn test_access_request_payload() {
        let credential = CredentialId::new([0x04, 0xA2, 0x3B, 0x9C]).unwrap();
        let request = AccessRequest::new(&credential);

        let payload = request.to_payload().unwrap();
        assert_eq!(payload, br#"{"rfid":" 04 A2 3B 9C"}"#);
    }

    #[test]
    fn test_access_request_has_single_field() {
        let credential = CredentialId::new([0x01, 0x02, 0x03, 0x04]).unwrap();
        let payload = AccessRequest::new(&credential).to_payload().unwrap();

        let value: serde_json::Value = serde_json::from_slice(&payload).unwrap();
        let object = value.as_object().unwrap();
        assert_eq!(object.len(), 1);
        assert_eq!(object["rfid"], " 01 02 03 04");
    }

    #[rstest]
    #[case(br#"{"door":"open"}"#.as_slice(), Verdict::Open)]
    #[case(br#"{"door":"open","message":"welcome"}"#.as_slice(), Verdict::Open)]
    #[case(br#"{"door":"open","extra":42}"#.as_slice(), Verdict::Open)]
    #[case(br#"{"door":"open","message":7}"#.as_slice(), Verdict::Open)]
    #[case(br#"{"door":"closed"}"#.as_slice(), Verdict::Refused { door: "closed".to_string() })]
    #[case(br#"{"door":"OPEN"}"#.as_slice(), Verdict::Refused { door: "OPEN".to_string() })]
    #[case(br#"{"door":"open "}"#.as_slice(), Verdict::Refused { door: "open ".to_string() })]
    #[case(br#"{}"#.as_slice(), Verdict::MissingDoor)]
    #[case(br#"{"door":null}"#.as_slice(), Verdict::MissingDoor)]
    #[case(br#"{"door":1}"#.as_slice(), Verdict::MissingDoor)]
    #[case(br#"{"message":"denied"}"#.as_slice(), Verdict::MissingDoor)]
    fn test_decision_verdict(#[case] payload: &[u8], #[case] expected: Verdict) {
        let decision = AccessDecision::decode(payload).unwrap();
        assert_eq!(decision.verdict(), expected);
        assert_eq!(decision.is_open(), expected == Verdict::Open);
    }

    #[rstest]
    #[case(b"not json".as_slice())]
    #[case(br#"{"door":"open""#.as_slice())]
    #[case(b"[]".as_slice())]
    #[case(b"\"open\"".as_slice())]
    fn test_decision_unreadable(#[case] payload: &[u8]) {
        assert!(AccessDecision::decode(payload).is_err());
    }

    #[test]
    fn test_decision_message_field() {
        let decision = AccessDecision::decode(br#"{"door":"closed","message":"unknown card"}"#).unwrap();
        assert_eq!(decision.message.as_deref(), Some("unknown card"));
    }

    #[test]
    fn test_inbound_message_new() {
        let message = InboundMessage::new("RFID_PORBLE/SUB", &b"{}"[..]);
        assert_eq!(message.topic, "RFID_PORBLE/SUB");
        assert_eq!(message.payload.as_ref(), b"{}");
    }
}
