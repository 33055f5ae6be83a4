use serde::{Deserialize, Serialize};
use time::{OffsetDateTime, macros::format_description};

pub const SYSTEM: &str = "system";

pub const EVERYONE: &str = "all";

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct JoinRoom {
    #[serde(default)]
    pub room: String,
    #[serde(default)]
    pub username: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct SendMessage {
    #[serde(default)]
    pub room: String,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub message: String,
    pub to: Option<String>,
    pub time: Option<String>,
    // accepted for compatibility, the relay decides the delivered type itself
    #[serde(rename = "type")]
    pub kind: Option<String>,
}

impl SendMessage {
    pub fn recipient(&self) -> Option<&str> {
        match self.to.as_deref() {
            None | Some("") | Some(EVERYONE) => None,
            Some(to) => Some(to),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageKind {
    System,
    User,
    Dm,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReceiveMessage {
    pub room: String,
    pub username: String,
    pub message: String,
    pub time: String,
    #[serde(rename = "type")]
    pub kind: MessageKind,
    #[serde(rename = "senderId")]
    pub sender_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub to: Option<String>,
}

impl ReceiveMessage {
    pub fn system(room: &str, message: String) -> Self {
        Self {
            room: room.to_owned(),
            username: SYSTEM.to_owned(),
            message,
            time: time_now(),
            kind: MessageKind::System,
            sender_id: SYSTEM.to_owned(),
            to: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RoomUsers {
    pub room: String,
    pub users: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum ClientEvent {
    JoinRoom(JoinRoom),
    SendMessage(SendMessage),
}

impl ClientEvent {
    pub fn decode(bytes: &[u8]) -> serde_json::Result<Self> {
        serde_json::from_slice(bytes)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum ServerEvent {
    ReceiveMessage(ReceiveMessage),
    RoomUsers(RoomUsers),
}

impl ServerEvent {
    pub fn encode(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

// local offset is unavailable on multi-threaded unix, fall back to UTC
pub fn time_now() -> String {
    let now = OffsetDateTime::now_local().unwrap_or_else(|_| OffsetDateTime::now_utc());
    now.format(format_description!("[hour]:[minute]"))
        .unwrap_or_default()
}
