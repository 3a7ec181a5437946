use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ProtocolError;

pub type AvatarId = String;

/// Every `kind` the server is known to send.
pub const SERVER_KINDS: &[&str] = &[
    "connect",
    "players",
    "playerJoined",
    "playerUpdate",
    "playerDisconnect",
    "chat",
    "onlineUsersCount",
];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum ClientMessage {
    Authenticate {
        token: String,
        #[serde(rename = "displayName")]
        display_name: String,
        skin: String,
    },
    Update {
        x: f32,
        y: f32,
        animation: String,
    },
    Chat {
        message: String,
        id: String,
    },
}

impl ClientMessage {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Authenticate { .. } => "authenticate",
            Self::Update { .. } => "update",
            Self::Chat { .. } => "chat",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlayerInfo {
    pub id: AvatarId,
    #[serde(default)]
    pub username: String,
    pub x: f32,
    pub y: f32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub animation: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub skin: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum ServerMessage {
    Connect {
        id: AvatarId,
    },
    Players {
        list: Vec<PlayerInfo>,
    },
    PlayerJoined {
        player: PlayerInfo,
    },
    PlayerUpdate {
        player: PlayerInfo,
    },
    PlayerDisconnect {
        id: AvatarId,
        #[serde(default)]
        username: Option<String>,
    },
    Chat {
        #[serde(default)]
        id: Option<String>,
        #[serde(default)]
        username: String,
        #[serde(default)]
        message: String,
    },
    OnlineUsersCount {
        count: u32,
    },
}

pub fn encode_client_frame(message: &ClientMessage) -> serde_json::Result<String> {
    serde_json::to_string(message)
}

/// Decodes one inbound text frame. Frames whose `kind` is not in
/// [`SERVER_KINDS`] are reported as `UnknownKind` so the caller can skip them
/// without treating the stream as corrupt.
pub fn decode_server_frame(frame: &str) -> Result<ServerMessage, ProtocolError> {
    let value: Value =
        serde_json::from_str(frame).map_err(|e| ProtocolError::MalformedFrame(e.to_string()))?;

    let kind = value
        .get("kind")
        .and_then(Value::as_str)
        .ok_or_else(|| ProtocolError::MalformedFrame(String::from("missing kind")))?;

    if !SERVER_KINDS.contains(&kind) {
        return Err(ProtocolError::UnknownKind(kind.to_string()));
    }

    serde_json::from_value(value).map_err(|e| ProtocolError::MalformedFrame(e.to_string()))
}
