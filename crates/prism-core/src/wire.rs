//! Event-stream framing.
//!
//! Server → subscriber frames are envelopes `{ event, sessionId, timestamp, data }`.
//! Subscriber → server frames are control messages `{ event, data: { session_id } }`.

use serde::{Deserialize, Serialize};

use crate::errors::WireError;
use crate::events::{PublishEvent, EVENT_NAMES};
use crate::ids::SessionId;

pub const JOIN_STREAM: &str = "join_stream";
pub const LEAVE_STREAM: &str = "leave_stream";
pub const JOINED_STREAM: &str = "joined_stream";
pub const LEFT_STREAM: &str = "left_stream";
pub const ERROR: &str = "error";

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct WireEnvelope {
    pub event: String,
    #[serde(rename = "sessionId", default)]
    pub session_id: String,
    #[serde(default)]
    pub timestamp: String,
    #[serde(default)]
    pub data: serde_json::Value,
}

impl WireEnvelope {
    pub fn new(event: impl Into<String>, session_id: impl Into<String>, data: serde_json::Value) -> Self {
        Self {
            event: event.into(),
            session_id: session_id.into(),
            timestamp: now_iso8601(),
            data,
        }
    }

    pub fn to_json(&self) -> Result<String, WireError> {
        Ok(serde_json::to_string(self)?)
    }
}

/// Frame an event for one session's subscribers.
pub fn encode_event(session_id: &SessionId, event: &PublishEvent) -> Result<WireEnvelope, WireError> {
    let serde_json::Value::Object(mut data) = serde_json::to_value(event)? else {
        return Err(WireError::Malformed("event did not serialize to an object".into()));
    };
    data.remove("type");
    Ok(WireEnvelope::new(
        event.event_type(),
        session_id.as_str(),
        serde_json::Value::Object(data),
    ))
}

/// A decoded server → subscriber frame.
#[derive(Clone, Debug, PartialEq)]
pub enum Inbound {
    Event(PublishEvent),
    Joined { session_id: String },
    Left { session_id: String },
    Error { message: String },
    /// Informational frames outside the vocabulary (`publish_started`, `adaptation_complete`, ...).
    Other { event: String },
}

pub fn decode(text: &str) -> Result<Inbound, WireError> {
    let envelope: WireEnvelope = serde_json::from_str(text)?;
    decode_envelope(envelope)
}

pub fn decode_envelope(envelope: WireEnvelope) -> Result<Inbound, WireError> {
    let name = envelope.event.as_str();
    match name {
        JOINED_STREAM => Ok(Inbound::Joined {
            session_id: str_field(&envelope.data, "session_id").unwrap_or(envelope.session_id),
        }),
        LEFT_STREAM => Ok(Inbound::Left {
            session_id: str_field(&envelope.data, "session_id").unwrap_or(envelope.session_id),
        }),
        ERROR => Ok(Inbound::Error {
            message: str_field(&envelope.data, "message").unwrap_or_else(|| "unknown error".into()),
        }),
        _ if EVENT_NAMES.contains(&name) => {
            let mut data = match envelope.data {
                serde_json::Value::Object(map) => map,
                serde_json::Value::Null => serde_json::Map::new(),
                other => {
                    return Err(WireError::Malformed(format!("{name}: data is not an object: {other}")));
                }
            };
            data.insert("type".into(), serde_json::Value::String(name.to_owned()));
            let event = serde_json::from_value(serde_json::Value::Object(data))?;
            Ok(Inbound::Event(event))
        }
        _ => Ok(Inbound::Other { event: name.to_owned() }),
    }
}

fn str_field(data: &serde_json::Value, key: &str) -> Option<String> {
    data.get(key).and_then(|v| v.as_str()).map(str::to_owned)
}

/// Subscriber → server control frame.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ControlMessage {
    JoinStream { session_id: Option<String> },
    LeaveStream { session_id: Option<String> },
}

impl ControlMessage {
    pub fn join(session_id: &SessionId) -> Self {
        Self::JoinStream {
            session_id: Some(session_id.to_string()),
        }
    }

    pub fn leave(session_id: &SessionId) -> Self {
        Self::LeaveStream {
            session_id: Some(session_id.to_string()),
        }
    }

    pub fn parse(text: &str) -> Result<Self, WireError> {
        let raw: serde_json::Value = serde_json::from_str(text)?;
        let event = raw
            .get("event")
            .and_then(|v| v.as_str())
            .ok_or_else(|| WireError::Malformed("missing event name".into()))?;
        let session_id = raw
            .get("data")
            .and_then(|d| d.get("session_id"))
            .and_then(|v| v.as_str())
            .filter(|s| !s.is_empty())
            .map(str::to_owned);
        match event {
            JOIN_STREAM => Ok(Self::JoinStream { session_id }),
            LEAVE_STREAM => Ok(Self::LeaveStream { session_id }),
            other => Err(WireError::Malformed(format!("unknown control message: {other}"))),
        }
    }

    pub fn to_json(&self) -> String {
        let (event, session_id) = match self {
            Self::JoinStream { session_id } => (JOIN_STREAM, session_id),
            Self::LeaveStream { session_id } => (LEAVE_STREAM, session_id),
        };
        serde_json::json!({ "event": event, "data": { "session_id": session_id } }).to_string()
    }
}

pub fn now_iso8601() -> String {
    chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true)
}

/// Serde adapter carrying frame bytes as standard base64 text.
pub(crate) mod base64_frame {
    use base64::Engine as _;
    use bytes::Bytes;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(frame: &Bytes, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&base64::engine::general_purpose::STANDARD.encode(frame))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Bytes, D::Error> {
        let text = String::deserialize(deserializer)?;
        base64::engine::general_purpose::STANDARD
            .decode(text.as_bytes())
            .map(Bytes::from)
            .map_err(serde::de::Error::custom)
    }
}
