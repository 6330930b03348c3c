//! Sync server protocol message types
//!
//! The closed set of room-scoped events, one tagged variant per event
//! name. Shapes are validated here at the transport boundary; anything
//! malformed becomes a [`ProtocolError`] and never reaches a component.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ProtocolError;
use crate::session::Identity;
use crate::store::FileTree;

/// Client-to-server event
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum ClientMessage {
    /// Overwrite one file; echoed to peers, not persisted.
    FileUpdate { path: String, contents: String },
    /// Remove one file; echoed to peers, not persisted.
    FileDelete { path: String },
    /// Chat to the room; may carry the assistant trigger.
    ChatMessage { body: String },
    /// Full-tree durable checkpoint, sent after a client-side debounce.
    Checkpoint {
        #[serde(rename = "fileTree")]
        file_tree: FileTree,
    },
}

/// Server-to-client event
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum ServerMessage {
    /// Edit echo, delivered to every member except the sender.
    FileUpdate {
        path: String,
        contents: String,
        #[serde(rename = "senderEmail")]
        sender_email: String,
    },
    /// Delete echo, delivered to every member except the sender.
    FileDelete {
        path: String,
        #[serde(rename = "senderEmail")]
        sender_email: String,
    },
    /// Human chat, delivered to every member except the sender.
    ChatBroadcast { body: String, sender: SenderInfo },
    /// Assistant reply, delivered to every member including the sender.
    AssistantReply { result: String, sender: String },
}

/// Identity summary attached to human chat broadcasts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SenderInfo {
    #[serde(rename = "userId")]
    pub user_id: String,
    pub email: String,
}

impl From<&Identity> for SenderInfo {
    fn from(identity: &Identity) -> Self {
        Self {
            user_id: identity.user_id.clone(),
            email: identity.email.clone(),
        }
    }
}

/// Name the assistant signs its replies with.
pub const ASSISTANT_SENDER: &str = "assistant";

/// An in-flight chat event. Never persisted.
#[derive(Debug, Clone)]
pub struct ChatEvent {
    pub kind: ChatKind,
    pub body: String,
    pub sender: Option<SenderInfo>,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChatKind {
    Human,
    Assistant,
}

impl ChatEvent {
    pub fn human(body: impl Into<String>, identity: &Identity) -> Self {
        Self {
            kind: ChatKind::Human,
            body: body.into(),
            sender: Some(SenderInfo::from(identity)),
            timestamp: Utc::now(),
        }
    }

    pub fn assistant(body: impl Into<String>) -> Self {
        Self {
            kind: ChatKind::Assistant,
            body: body.into(),
            sender: None,
            timestamp: Utc::now(),
        }
    }

    pub fn into_message(self) -> ServerMessage {
        match self.kind {
            ChatKind::Human => ServerMessage::ChatBroadcast {
                body: self.body,
                sender: self.sender.unwrap_or_else(|| SenderInfo {
                    user_id: String::new(),
                    email: String::new(),
                }),
            },
            ChatKind::Assistant => ServerMessage::AssistantReply {
                result: self.body,
                sender: ASSISTANT_SENDER.to_string(),
            },
        }
    }
}

/// Parse one inbound frame at the transport boundary.
pub fn parse_client_message(text: &str) -> Result<ClientMessage, ProtocolError> {
    Ok(serde_json::from_str(text)?)
}
