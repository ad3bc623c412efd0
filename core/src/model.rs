/// Shared types for conversations and messages
use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

pub type ConversationId = u64;

/// Prefix of locally generated message ids
pub const TEMP_ID_PREFIX: &str = "tmp_";

/// Message identifier: assigned by the server, or a local temporary id for
/// optimistic messages that have not been confirmed yet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageId {
    Server(u64),
    Temp(u64),
}

impl MessageId {
    pub fn is_temp(&self) -> bool {
        matches!(self, MessageId::Temp(_))
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MessageId::Server(id) => write!(f, "{}", id),
            MessageId::Temp(n) => write!(f, "{}{}", TEMP_ID_PREFIX, n),
        }
    }
}

impl Serialize for MessageId {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        match self {
            MessageId::Server(id) => serializer.serialize_u64(*id),
            MessageId::Temp(_) => serializer.serialize_str(&self.to_string()),
        }
    }
}

impl<'de> Deserialize<'de> for MessageId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Num(u64),
            Str(String),
        }

        match Raw::deserialize(deserializer)? {
            Raw::Num(id) => Ok(MessageId::Server(id)),
            Raw::Str(s) => {
                if let Some(n) = s.strip_prefix(TEMP_ID_PREFIX) {
                    n.parse()
                        .map(MessageId::Temp)
                        .map_err(|_| serde::de::Error::custom(format!("bad temp id: {}", s)))
                } else {
                    s.parse()
                        .map(MessageId::Server)
                        .map_err(|_| serde::de::Error::custom(format!("bad message id: {}", s)))
                }
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryState {
    /// Created locally, not yet seen in a server read
    Pending,
    /// Present in the server's authoritative read
    Confirmed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub id: MessageId,
    pub text: String,
    pub created_at: DateTime<Utc>,
    pub is_mine: bool,
    pub delivery: DeliveryState,
}

impl Message {
    pub fn is_pending(&self) -> bool {
        self.delivery == DeliveryState::Pending
    }
}

/// The other party of a conversation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Counterpart {
    /// Profile id, usable with "open conversation with" (not every listing carries it)
    pub identity: Option<u64>,
    pub display_name: String,
    pub avatar_ref: Option<String>,
}

/// One conversation row as shown in the directory
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Conversation {
    pub id: ConversationId,
    pub counterpart: Counterpart,
    pub last_message_preview: String,
    pub last_message_at: Option<DateTime<Utc>>,
    pub unread_count: u32,
}

/// Which side of the marketplace the signed-in user is on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// Brand looking for bloggers
    Requester,
    /// Blogger answering brands
    Responder,
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "requester" | "brand" => Ok(Role::Requester),
            "responder" | "blogger" => Ok(Role::Responder),
            other => Err(format!("unknown role: {}", other)),
        }
    }
}
