//! Application message record: the JSON object carried inside a
//! connection's segment payloads once reassembled.

use serde::{Deserialize, Serialize};

/// One chat-level message. `System` messages have no sender (they come
/// from the server itself); the reserved content `__SHUTDOWN__` on a
/// `System` message tells a client to close and exit.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Message {
    Text {
        sender: String,
        recipient: String,
        timestamp: u64,
        content: String,
    },
    File {
        sender: String,
        recipient: String,
        timestamp: u64,
        name: String,
        mime: String,
        size: u64,
        data: String,
    },
    System {
        recipient: String,
        timestamp: u64,
        content: String,
    },
}

/// Reserved `system` content that tells a client to close its connection
/// and exit.
pub const SHUTDOWN_SENTINEL: &str = "__SHUTDOWN__";

impl Message {
    pub fn recipient(&self) -> &str {
        match self {
            Message::Text { recipient, .. } => recipient,
            Message::File { recipient, .. } => recipient,
            Message::System { recipient, .. } => recipient,
        }
    }

    pub fn sender(&self) -> Option<&str> {
        match self {
            Message::Text { sender, .. } => Some(sender),
            Message::File { sender, .. } => Some(sender),
            Message::System { .. } => None,
        }
    }

    /// This message's scheduling priority under `PrioritySender`: system
    /// first, then text, then file.
    pub fn priority(&self) -> u8 {
        match self {
            Message::System { .. } => 0,
            Message::Text { .. } => 1,
            Message::File { .. } => 2,
        }
    }

    pub fn system(recipient: impl Into<String>, content: impl Into<String>, timestamp: u64) -> Self {
        Message::System {
            recipient: recipient.into(),
            timestamp,
            content: content.into(),
        }
    }

    pub fn is_shutdown(&self) -> bool {
        matches!(self, Message::System { content, .. } if content == SHUTDOWN_SENTINEL)
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        serde_json::to_vec(self).expect("Message always serializes")
    }

    pub fn from_bytes(bytes: &[u8]) -> Option<Self> {
        serde_json::from_slice(bytes).ok()
    }
}
