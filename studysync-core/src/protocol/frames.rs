use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::channel::ChannelKind;
use crate::error::SyncError;
use crate::session::{present, Patch};

/// Identifier of a group member (the member's study result ID).
pub type MemberId = String;

/// Action tag of a channel frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Action {
    Session,
    SessionAck,
    SessionFail,
    Opened,
    Closed,
    Joined,
    Left,
    Fixed,
    Error,
    #[serde(other)]
    Unknown,
}

/// Heartbeat marker carried in `{"heartbeat": ...}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Heartbeat {
    Ping,
    Pong,
    #[serde(other)]
    Other,
}

/// A frame received on a batch or group channel.
///
/// A frame may carry any subset of these fields. Group channels use the
/// `session*` spellings; both spellings decode into the same field.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InboundFrame {
    #[serde(default)]
    pub heartbeat: Option<Heartbeat>,
    #[serde(default, alias = "sessionPatches")]
    pub patches: Option<Vec<Patch>>,
    /// `Some(Value::Null)` when the frame explicitly clears the document
    #[serde(default, alias = "sessionData", deserialize_with = "present")]
    pub data: Option<Value>,
    #[serde(default, alias = "sessionVersion")]
    pub version: Option<u64>,
    #[serde(default, deserialize_with = "id_list")]
    pub members: Option<Vec<MemberId>>,
    #[serde(default, deserialize_with = "id_list")]
    pub channels: Option<Vec<MemberId>>,
    #[serde(default, deserialize_with = "id")]
    pub group_result_id: Option<String>,
    #[serde(default)]
    pub action: Option<Action>,
    #[serde(default, deserialize_with = "id")]
    pub member_id: Option<MemberId>,
    #[serde(default)]
    pub error_msg: Option<String>,
    #[serde(default, deserialize_with = "present")]
    pub msg: Option<Value>,
    #[serde(default, deserialize_with = "id")]
    pub recipient: Option<MemberId>,
}

impl InboundFrame {
    pub fn parse(text: &str) -> Result<Self, SyncError> {
        serde_json::from_str(text).map_err(|e| SyncError::Protocol(e.to_string()))
    }
}

fn id_from_value(value: Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

// IDs arrive as numbers or strings depending on the coordinator version.
fn id<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<Value>::deserialize(deserializer)?.and_then(id_from_value))
}

fn id_list<'de, D>(deserializer: D) -> Result<Option<Vec<String>>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<Vec<Value>>::deserialize(deserializer)?
        .map(|ids| ids.into_iter().filter_map(id_from_value).collect()))
}

/// A frame sent by this client.
#[derive(Debug, Clone, PartialEq)]
pub enum OutboundFrame {
    /// Session patches against `version`
    Session {
        kind: ChannelKind,
        patches: Vec<Patch>,
        version: u64,
        versioning: bool,
    },
    /// Request to fix the group
    Fixed,
    /// Application message, broadcast or addressed to one member
    Message {
        msg: Value,
        recipient: Option<MemberId>,
    },
    Ping,
}

#[derive(Serialize)]
struct BatchSession<'a> {
    action: Action,
    patches: &'a [Patch],
    version: u64,
    versioning: bool,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GroupSession<'a> {
    action: Action,
    session_patches: &'a [Patch],
    session_version: u64,
    session_versioning: bool,
}

#[derive(Serialize)]
struct ActionOnly {
    action: Action,
}

#[derive(Serialize)]
struct AppMessage<'a> {
    msg: &'a Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    recipient: Option<&'a MemberId>,
}

#[derive(Serialize)]
struct HeartbeatFrame {
    heartbeat: Heartbeat,
}

impl OutboundFrame {
    /// Encodes the frame as JSON text.
    pub fn encode(&self) -> Result<String, SyncError> {
        let encoded = match self {
            OutboundFrame::Session {
                kind: ChannelKind::Batch,
                patches,
                version,
                versioning,
            } => serde_json::to_string(&BatchSession {
                action: Action::Session,
                patches,
                version: *version,
                versioning: *versioning,
            }),
            OutboundFrame::Session {
                kind: ChannelKind::Group,
                patches,
                version,
                versioning,
            } => serde_json::to_string(&GroupSession {
                action: Action::Session,
                session_patches: patches,
                session_version: *version,
                session_versioning: *versioning,
            }),
            OutboundFrame::Fixed => serde_json::to_string(&ActionOnly {
                action: Action::Fixed,
            }),
            OutboundFrame::Message { msg, recipient } => serde_json::to_string(&AppMessage {
                msg,
                recipient: recipient.as_ref(),
            }),
            OutboundFrame::Ping => serde_json::to_string(&HeartbeatFrame {
                heartbeat: Heartbeat::Ping,
            }),
        };
        encoded.map_err(|e| SyncError::Protocol(e.to_string()))
    }
}
