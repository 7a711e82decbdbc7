use std::fmt;

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

/// Identifier of a message within one session store.
///
/// Ids are handed out by the store from a monotonically increasing counter and are never reused,
/// even across `clear()`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MessageId(u64);

impl MessageId {
    /// Create a message id from its raw counter value.
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    /// The raw counter value.
    pub const fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "msg_{}", self.0)
    }
}

/// The author of a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    /// Typed by the person at the keyboard.
    User,
    /// Produced by the agent, or synthesized on failure.
    Assistant,
}

impl fmt::Display for MessageRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MessageRole::User => write!(f, "user"),
            MessageRole::Assistant => write!(f, "assistant"),
        }
    }
}

/// Optional bookkeeping attached to a finalized assistant message.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageMetadata {
    /// Completion tokens reported by the service.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tokens: Option<u32>,

    /// Wall-clock time from placeholder creation to finalize.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub processing_time_ms: Option<u64>,

    /// Source URLs cited while streaming.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub sources: Vec<String>,
}

/// One entry of the conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    /// Unique id within the store.
    pub id: MessageId,

    /// Author of the message.
    pub role: MessageRole,

    /// Text of the message.  Only the live streaming placeholder ever changes.
    pub content: String,

    /// Creation time.
    #[serde(with = "time::serde::rfc3339")]
    pub timestamp: OffsetDateTime,

    /// Agent that produced an assistant message.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub agent_name: Option<String>,

    /// Metadata recorded at finalize.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<MessageMetadata>,
}

impl Message {
    /// A user message stamped now.
    pub fn user(id: MessageId, content: impl Into<String>) -> Self {
        Self {
            id,
            role: MessageRole::User,
            content: content.into(),
            timestamp: OffsetDateTime::now_utc(),
            agent_name: None,
            metadata: None,
        }
    }

    /// An assistant message stamped now.
    pub fn assistant(id: MessageId, content: impl Into<String>, agent_name: &str) -> Self {
        Self {
            id,
            role: MessageRole::Assistant,
            content: content.into(),
            timestamp: OffsetDateTime::now_utc(),
            agent_name: Some(agent_name.to_string()),
            metadata: None,
        }
    }

    /// Returns true for user messages.
    pub fn is_user(&self) -> bool {
        self.role == MessageRole::User
    }

    /// Returns true for assistant messages.
    pub fn is_assistant(&self) -> bool {
        self.role == MessageRole::Assistant
    }
}
