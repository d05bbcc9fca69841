//! Wire codec for the Z-Wave JS Server JSON protocol.
//!
//! Every inbound text frame is one JSON object carrying a `type`
//! discriminator. Three shapes matter to the client:
//!
//! - `{"type":"version", ...}`: the handshake sent once after connect
//! - `{"type":"result","success":bool,"messageId":"...","result":{...}}`
//! - `{"type":"event","event":{"source":"...","event":"...", ...}}`
//!
//! Outbound frames are commands: `{"messageId":"...","command":"...",...}`.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

// ── Decode errors ────────────────────────────────────────────────────

/// Why an inbound frame could not be turned into an [`InboundMessage`].
///
/// The connection treats every variant as "ignore this frame".
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("frame is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("frame is not a JSON object")]
    NotAnObject,

    #[error("frame has no `type` discriminator")]
    MissingType,

    #[error("unrecognized message type `{0}`")]
    UnknownType(String),

    #[error("malformed {kind} message: {reason}")]
    Malformed { kind: &'static str, reason: String },
}

// ── Inbound messages ─────────────────────────────────────────────────

/// A decoded inbound frame.
#[derive(Debug, Clone, PartialEq)]
pub enum InboundMessage {
    Version(VersionInfo),
    Result(ResultMessage),
    Event(EventMessage),
}

/// Informational fields from the server handshake.
///
/// All fields are optional: the handshake is acted on by its type alone,
/// so a server that omits or reshapes these must still be bootstrapped.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VersionInfo {
    pub driver_version: Option<String>,
    pub server_version: Option<String>,
    pub home_id: Option<u64>,
    pub min_schema_version: Option<u64>,
    pub max_schema_version: Option<u64>,
}

impl VersionInfo {
    fn from_object(obj: &Map<String, Value>) -> Self {
        let text = |key: &str| obj.get(key).and_then(Value::as_str).map(String::from);
        let number = |key: &str| obj.get(key).and_then(Value::as_u64);
        Self {
            driver_version: text("driverVersion"),
            server_version: text("serverVersion"),
            home_id: number("homeId"),
            min_schema_version: number("minSchemaVersion"),
            max_schema_version: number("maxSchemaVersion"),
        }
    }
}

/// Server reply correlated to a prior command by `messageId`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResultMessage {
    /// Outer envelope success: did the server execute the command at all.
    #[serde(default)]
    pub success: bool,

    /// Identifier of the command this result answers.
    pub message_id: String,

    /// Command-specific result payload. Empty when the server sent none.
    #[serde(default, deserialize_with = "null_as_empty")]
    pub result: Map<String, Value>,

    /// Present on failed results, e.g. `"unknown_command"`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_code: Option<String>,
}

impl ResultMessage {
    /// Two-level success check used by controller commands.
    ///
    /// True only when the envelope reports success AND the nested
    /// `result.success` field is the boolean `true`. A missing or
    /// non-boolean nested field counts as failure.
    pub fn command_succeeded(&self) -> bool {
        self.success
            && self
                .result
                .get("success")
                .and_then(Value::as_bool)
                .unwrap_or(false)
    }
}

/// Unsolicited server push notification.
///
/// `source` and `event` are lifted out; every other field of the event
/// object lands in `payload` untouched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventMessage {
    /// Emitting component: `"controller"`, `"node"`, `"driver"`.
    #[serde(default)]
    pub source: String,

    /// Event name, e.g. `"exclusion stopped"`, `"value updated"`.
    #[serde(default)]
    pub event: String,

    /// All remaining fields the server sent with the event.
    #[serde(flatten)]
    pub payload: Map<String, Value>,
}

impl EventMessage {
    /// Matches on both source and event name.
    pub fn is(&self, source: &str, event: &str) -> bool {
        self.source == source && self.event == event
    }

    /// Look up a raw payload field.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.payload.get(key)
    }
}

fn null_as_empty<'de, D>(deserializer: D) -> Result<Map<String, Value>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    Ok(Option::<Map<String, Value>>::deserialize(deserializer)?.unwrap_or_default())
}

// ── Decoding ─────────────────────────────────────────────────────────

/// Decode one inbound text frame.
pub fn decode(frame: &str) -> Result<InboundMessage, DecodeError> {
    let value: Value = serde_json::from_str(frame)?;
    let Value::Object(mut obj) = value else {
        return Err(DecodeError::NotAnObject);
    };

    let kind = match obj.get("type") {
        Some(Value::String(kind)) => kind.clone(),
        _ => return Err(DecodeError::MissingType),
    };

    match kind.as_str() {
        "version" => Ok(InboundMessage::Version(VersionInfo::from_object(&obj))),
        "result" => serde_json::from_value::<ResultMessage>(Value::Object(obj))
            .map(InboundMessage::Result)
            .map_err(|e| DecodeError::Malformed {
                kind: "result",
                reason: e.to_string(),
            }),
        "event" => {
            let event = obj.remove("event").ok_or(DecodeError::Malformed {
                kind: "event",
                reason: "missing `event` object".into(),
            })?;
            serde_json::from_value::<EventMessage>(event)
                .map(InboundMessage::Event)
                .map_err(|e| DecodeError::Malformed {
                    kind: "event",
                    reason: e.to_string(),
                })
        }
        _ => Err(DecodeError::UnknownType(kind)),
    }
}

// ── Encoding ─────────────────────────────────────────────────────────

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct OutboundCommand<'a> {
    message_id: &'a str,
    command: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    options: Option<&'a Value>,
    #[serde(flatten)]
    params: &'a Map<String, Value>,
}

/// Encode a command frame.
///
/// The `options` key is omitted entirely when `options` is `None`;
/// the server distinguishes a missing key from an empty object.
pub fn encode(
    command: &str,
    message_id: &str,
    options: Option<&Value>,
) -> Result<String, serde_json::Error> {
    serde_json::to_string(&OutboundCommand {
        message_id,
        command,
        options,
        params: &Map::new(),
    })
}

/// Encode a command whose arguments sit at the top level of the frame,
/// next to `messageId` and `command` (e.g. `node.set_value`).
pub fn encode_with_params(
    command: &str,
    message_id: &str,
    params: &Map<String, Value>,
) -> Result<String, serde_json::Error> {
    serde_json::to_string(&OutboundCommand {
        message_id,
        command,
        options: None,
        params,
    })
}

// ── Tests ────────────────────────────────────────────────────────────
