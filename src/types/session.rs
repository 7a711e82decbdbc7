use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::types::ConversationId;

/// Lifecycle status of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    /// Accepting turns.
    Active,
    /// Finished normally.
    Completed,
    /// The most recent turn failed.
    Error,
    /// Superseded or disposed.
    Archived,
}

/// A conversation with one agent.
///
/// Sessions are replaced rather than mutated when the agent changes or the chat is cleared; the
/// `id` doubles as the conversation id sent to the agent service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    /// Session and conversation id.
    pub id: ConversationId,

    /// Agent this session talks to.
    pub agent_name: String,

    /// Current status.
    pub status: SessionStatus,

    /// Creation time.
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,

    /// Last time a message or status changed.
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

impl Session {
    /// Start a new active session with a freshly generated id.
    pub fn new(agent_name: impl Into<String>) -> Self {
        let now = OffsetDateTime::now_utc();
        Self {
            id: ConversationId::generate(),
            agent_name: agent_name.into(),
            status: SessionStatus::Active,
            created_at: now,
            updated_at: now,
        }
    }

    /// A copy of this session with the given status and a bumped `updated_at`.
    pub fn with_status(&self, status: SessionStatus) -> Self {
        Self {
            status,
            updated_at: OffsetDateTime::now_utc(),
            ..self.clone()
        }
    }

    /// Returns true if the session accepts turns.
    pub fn is_active(&self) -> bool {
        matches!(self.status, SessionStatus::Active | SessionStatus::Error)
    }
}
