//! Inbound Slack Events API payloads (the JSON body POSTed to the webhook).
//!
//! Parsing is deliberately lenient: the envelope is shared by every event type, so fields
//! that are not strings (e.g. `user` as an object in `user_change`) decode as absent
//! instead of rejecting the whole payload.

use serde::{Deserialize, Deserializer};

/// Envelope `type`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PayloadType {
    /// Endpoint ownership handshake; the challenge must be echoed back.
    UrlVerification,
    /// A workspace event wrapped with an `event_id`.
    EventCallback,
    #[default]
    #[serde(other)]
    Other,
}

/// The webhook body.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct InboundPayload {
    #[serde(rename = "type", default)]
    pub kind: PayloadType,
    #[serde(default, deserialize_with = "lenient_string")]
    pub challenge: Option<String>,
    /// Repeated on provider retries of the same event.
    #[serde(default, deserialize_with = "lenient_string")]
    pub event_id: Option<String>,
    #[serde(default)]
    pub event: Option<MessageEvent>,
}

/// The inner `event` object; only the fields the relay acts on.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct MessageEvent {
    #[serde(rename = "type", default, deserialize_with = "lenient_string")]
    pub kind: Option<String>,
    #[serde(rename = "channel", default, deserialize_with = "lenient_string")]
    pub channel_id: Option<String>,
    #[serde(rename = "user", default, deserialize_with = "lenient_string")]
    pub user_id: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub text: Option<String>,
    /// Message timestamp; used as the thread anchor for the reply.
    #[serde(default, deserialize_with = "lenient_string")]
    pub ts: Option<String>,
}

impl InboundPayload {
    pub fn from_slice(body: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(body)
    }
}

impl MessageEvent {
    pub fn is_message(&self) -> bool {
        self.kind.as_deref() == Some("message")
    }
}

fn lenient_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(serde_json::Value::String(s)) => Some(s),
        _ => None,
    })
}
