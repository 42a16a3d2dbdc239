//! Push-channel wire format.
//!
//! Outbound frames are subscription requests:
//! `{"type": "SUBSCRIBE" | "UNSUBSCRIBE", "models": ["device/attr", ...]}`.
//!
//! Inbound frames are either a single event object or a JSON array of them.
//! Every event carries a `type` discriminator and a `data` payload keyed by
//! entity id:
//!
//! ```json
//! [
//!   {"type": "CHANGE", "data": {"sys/tg/1/ampli": {"value": 1.5, "quality": "ATTR_VALID", "time": 1700000000.25}}},
//!   {"type": "CONFIG", "data": {"sys/tg/1/ampli": {"label": "Amplitude", "unit": "V"}}}
//! ]
//! ```

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::Error;

/// Entity-kind discriminators accepted on the push channel, mapped to the
/// catalog's singular kind names.
const ENTITY_EVENT_KINDS: &[(&str, &str)] = &[
    ("DOMAIN", "domain"),
    ("FAMILY", "family"),
    ("MEMBER", "member"),
    ("DEVICE", "device"),
    ("ATTRIBUTE", "attribute"),
    ("PROPERTY", "property"),
];

// ── Outbound ─────────────────────────────────────────────────────────

/// Direction of a subscription request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SubscriptionKind {
    Subscribe,
    Unsubscribe,
}

/// A single outbound frame. Fire-and-forget: the server never acknowledges.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutboundFrame {
    #[serde(rename = "type")]
    pub kind: SubscriptionKind,
    pub models: Vec<String>,
}

impl OutboundFrame {
    pub fn subscribe(models: Vec<String>) -> Self {
        Self {
            kind: SubscriptionKind::Subscribe,
            models,
        }
    }

    pub fn unsubscribe(models: Vec<String>) -> Self {
        Self {
            kind: SubscriptionKind::Unsubscribe,
            models,
        }
    }

    /// Serialize to the JSON text sent over the socket.
    pub fn to_text(&self) -> Result<String, Error> {
        Ok(serde_json::to_string(self)?)
    }
}

// ── Inbound ──────────────────────────────────────────────────────────

/// Fields of a `CHANGE` event for one attribute.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangePayload {
    #[serde(default)]
    pub value: Value,

    /// Set-point (write value), when the attribute is writable.
    #[serde(default)]
    pub w_value: Option<Value>,

    #[serde(default)]
    pub quality: Option<String>,

    /// Seconds since the Unix epoch, fractional.
    #[serde(default, alias = "timestamp")]
    pub time: Option<f64>,
}

/// Fields of a `CONFIG` event for one attribute. Absent fields are left
/// untouched by the receiver.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigPayload {
    #[serde(default)]
    pub label: Option<String>,
    #[serde(default)]
    pub unit: Option<String>,
    #[serde(default)]
    pub format: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default, alias = "dataformat", alias = "dataFormat")]
    pub data_format: Option<String>,
    #[serde(default, alias = "datatype", alias = "dataType")]
    pub data_type: Option<String>,
}

/// A catalog record as received: a flat JSON object.
pub type Record = Map<String, Value>;

/// One decoded event from a push-channel frame.
#[derive(Debug, Clone, PartialEq)]
pub enum PushEvent {
    /// Latest value/quality per attribute id.
    Change(BTreeMap<String, ChangePayload>),
    /// Display metadata per attribute id.
    Config(BTreeMap<String, ConfigPayload>),
    /// Server-side read error per attribute id.
    Error(BTreeMap<String, String>),
    /// Catalog records of a single kind, keyed by entity id.
    Entities {
        kind: &'static str,
        records: BTreeMap<String, Record>,
    },
    /// Already-normalized catalog tables: kind → id → record.
    Receive(BTreeMap<String, BTreeMap<String, Record>>),
}

/// Result of parsing one frame: the events that decoded, in frame order,
/// plus the number of events that were skipped.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParsedFrame {
    pub events: Vec<PushEvent>,
    pub skipped: usize,
}

#[derive(Debug, Deserialize)]
struct RawEvent {
    #[serde(rename = "type", default)]
    kind: Option<String>,
    #[serde(default)]
    data: Value,
}

/// Parse an inbound text frame.
///
/// A frame that is not JSON, or whose top level is neither an object nor an
/// array, is rejected with [`Error::MalformedFrame`]. Inside a batch, events
/// with a missing or unknown discriminator (or an undecodable payload) are
/// skipped and counted; the rest still decode in order.
pub fn parse_frame(text: &str) -> Result<ParsedFrame, Error> {
    let root: Value = serde_json::from_str(text).map_err(|e| Error::MalformedFrame {
        reason: format!("not JSON: {e}"),
    })?;

    let raw_events = match root {
        Value::Array(items) => items,
        obj @ Value::Object(_) => vec![obj],
        other => {
            return Err(Error::MalformedFrame {
                reason: format!("expected an event object or array, got {}", json_kind(&other)),
            });
        }
    };

    let mut parsed = ParsedFrame::default();
    for raw in raw_events {
        match decode_event(raw) {
            Ok(event) => parsed.events.push(event),
            Err(reason) => {
                tracing::warn!(%reason, "skipping push event");
                parsed.skipped += 1;
            }
        }
    }

    // A single-event frame that failed to decode is malformed as a whole.
    if parsed.events.is_empty() && parsed.skipped > 0 {
        return Err(Error::MalformedFrame {
            reason: format!("no decodable events ({} skipped)", parsed.skipped),
        });
    }

    Ok(parsed)
}

fn decode_event(raw: Value) -> Result<PushEvent, String> {
    let raw: RawEvent = serde_json::from_value(raw).map_err(|e| e.to_string())?;
    let kind = raw.kind.ok_or_else(|| "missing `type` discriminator".to_owned())?;

    let event = match kind.as_str() {
        "CHANGE" => PushEvent::Change(payload(raw.data, &kind)?),
        "CONFIG" => PushEvent::Config(payload(raw.data, &kind)?),
        "ERROR" => PushEvent::Error(payload(raw.data, &kind)?),
        "RECEIVE" => PushEvent::Receive(payload(raw.data, &kind)?),
        other => {
            let Some((_, entity_kind)) = ENTITY_EVENT_KINDS.iter().find(|(tag, _)| *tag == other)
            else {
                return Err(format!("unknown event type `{other}`"));
            };
            PushEvent::Entities {
                kind: *entity_kind,
                records: payload(raw.data, &kind)?,
            }
        }
    };
    Ok(event)
}

fn payload<T: serde::de::DeserializeOwned>(data: Value, kind: &str) -> Result<T, String> {
    serde_json::from_value(data).map_err(|e| format!("invalid `{kind}` payload: {e}"))
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
