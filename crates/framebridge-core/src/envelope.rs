//! Wire envelope and the inbound sanitizer.
//!
//! The envelope keys match the established postMessage wire shape so either
//! side can talk to an existing peer:
//!
//! ```text
//! { "postmate": <kind>, "type": PROTOCOL_TAG, "uid": u64?, "property": str?,
//!   "value": any?, "data": any?, "model": object? }
//! ```
//!
//! `sanitize` is the only security boundary. Every inbound message on both
//! sides passes through it before any field is read.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::origin::Origin;

/// Discriminator separating our traffic from anything else on the channel.
pub const PROTOCOL_TAG: &str = "application/x-postmate-v1+json";

/// Key carrying the message kind. Its presence marks a message as ours.
pub const KIND_KEY: &str = "postmate";

/// Key carrying the protocol tag.
pub const TAG_KEY: &str = "type";

/// Message kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Kind {
    Handshake,
    HandshakeReply,
    Request,
    Reply,
    Call,
    Emit,
}

impl Kind {
    pub fn from_wire(s: &str) -> Option<Self> {
        match s {
            "handshake" => Some(Self::Handshake),
            "handshake-reply" => Some(Self::HandshakeReply),
            "request" => Some(Self::Request),
            "reply" => Some(Self::Reply),
            "call" => Some(Self::Call),
            "emit" => Some(Self::Emit),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Handshake => "handshake",
            Self::HandshakeReply => "handshake-reply",
            Self::Request => "request",
            Self::Reply => "reply",
            Self::Call => "call",
            Self::Emit => "emit",
        }
    }
}

/// One message unit on the channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    #[serde(rename = "postmate")]
    pub kind: Kind,

    #[serde(rename = "type")]
    pub tag: String,

    /// Correlates a `request` with its `reply`.
    #[serde(rename = "uid", default, skip_serializing_if = "Option::is_none")]
    pub request_id: Option<u64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub property: Option<String>,

    /// Reply value, or `{name, data}` for an emitted event.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<Value>,

    /// Argument of a `call`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,

    /// Initiator-supplied model defaults, `handshake` only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<Map<String, Value>>,
}

/// Payload of an `emit` envelope, carried in `value`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmittedEvent {
    pub name: String,
    #[serde(default)]
    pub data: Value,
}

impl Envelope {
    fn bare(kind: Kind) -> Self {
        Self {
            kind,
            tag: PROTOCOL_TAG.to_string(),
            request_id: None,
            property: None,
            value: None,
            data: None,
            model: None,
        }
    }

    pub fn handshake(model: Map<String, Value>) -> Self {
        Self {
            model: Some(model),
            ..Self::bare(Kind::Handshake)
        }
    }

    pub fn handshake_reply() -> Self {
        Self::bare(Kind::HandshakeReply)
    }

    pub fn request(request_id: u64, property: impl Into<String>) -> Self {
        Self {
            request_id: Some(request_id),
            property: Some(property.into()),
            ..Self::bare(Kind::Request)
        }
    }

    pub fn reply(request_id: u64, property: Option<String>, value: Value) -> Self {
        Self {
            request_id: Some(request_id),
            property,
            value: Some(value),
            ..Self::bare(Kind::Reply)
        }
    }

    pub fn call(property: impl Into<String>, data: Value) -> Self {
        Self {
            property: Some(property.into()),
            data: Some(data),
            ..Self::bare(Kind::Call)
        }
    }

    pub fn emit(name: impl Into<String>, data: Value) -> Self {
        let event = EmittedEvent {
            name: name.into(),
            data,
        };
        Self {
            value: serde_json::to_value(event).ok(),
            ..Self::bare(Kind::Emit)
        }
    }

    /// The event carried by an `emit` envelope.
    pub fn emitted(&self) -> Option<EmittedEvent> {
        if self.kind != Kind::Emit {
            return None;
        }
        self.value
            .clone()
            .and_then(|v| serde_json::from_value(v).ok())
    }

    pub fn to_value(&self) -> Value {
        // Every field is a plain JSON type, so this cannot fail.
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}

// ── Sanitizer ─────────────────────────────────────────────────────────────────

/// Why a message was not accepted. Only ever logged, never surfaced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rejection {
    OriginMismatch,
    NotAnObject,
    NotOurs,
    TagMismatch,
    UnknownKind,
    Malformed,
}

/// Parse `data` as one of our envelopes, ignoring who sent it.
///
/// Only the responder's handshake listener uses this directly, because it has
/// no origin to check against until the handshake itself arrives.
pub fn parse(data: &Value) -> Result<Envelope, Rejection> {
    let obj = data.as_object().ok_or(Rejection::NotAnObject)?;
    let kind = obj.get(KIND_KEY).ok_or(Rejection::NotOurs)?;
    match obj.get(TAG_KEY).and_then(Value::as_str) {
        Some(PROTOCOL_TAG) => {}
        _ => return Err(Rejection::TagMismatch),
    }
    kind.as_str()
        .and_then(Kind::from_wire)
        .ok_or(Rejection::UnknownKind)?;
    serde_json::from_value(data.clone()).map_err(|_| Rejection::Malformed)
}

/// Accept `data` from `sender` only if the sender is `expected` and the
/// payload is a well-formed envelope of a known kind.
pub fn sanitize(sender: &Origin, data: &Value, expected: &Origin) -> Result<Envelope, Rejection> {
    if sender != expected {
        return Err(Rejection::OriginMismatch);
    }
    parse(data)
}

pub fn is_trusted(sender: &Origin, data: &Value, expected: &Origin) -> bool {
    sanitize(sender, data, expected).is_ok()
}
