use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Opaque correlation token scoping a sequence of turns to one logical session.
///
/// A fresh id is generated whenever a session is cleared or replaced; ids are never reused.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConversationId(String);

impl ConversationId {
    /// Generate a new, unique conversation id.
    pub fn generate() -> Self {
        Self(format!("conv_{}", Uuid::new_v4().simple()))
    }

    /// The id as sent on the wire.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ConversationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
