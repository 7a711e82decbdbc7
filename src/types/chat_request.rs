use serde::Serialize;

use crate::error::{Error, Result};
use crate::types::{ConversationId, MessageRole};

/// A validated request to chat with an agent.
///
/// Construction trims both fields and rejects empty values, so a `ChatRequest` that exists can be
/// sent without further checks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatRequest {
    agent_name: String,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    conversation_id: Option<ConversationId>,
}

impl ChatRequest {
    /// Validate and build a request.
    pub fn new(
        agent_name: &str,
        message: &str,
        conversation_id: Option<ConversationId>,
    ) -> Result<Self> {
        let agent_name = agent_name.trim();
        if agent_name.is_empty() {
            return Err(Error::validation(
                "Agent name is required",
                Some("agentName".to_string()),
            ));
        }
        let message = message.trim();
        if message.is_empty() {
            return Err(Error::validation(
                "Message is required",
                Some("message".to_string()),
            ));
        }
        Ok(Self {
            agent_name: agent_name.to_string(),
            message: message.to_string(),
            conversation_id,
        })
    }

    /// The agent to address.
    pub fn agent_name(&self) -> &str {
        &self.agent_name
    }

    /// The trimmed user message.
    pub fn message(&self) -> &str {
        &self.message
    }

    /// The conversation this request belongs to.
    pub fn conversation_id(&self) -> Option<&ConversationId> {
        self.conversation_id.as_ref()
    }

    /// The JSON body posted to the agent service.
    pub fn body(&self) -> ChatRequestBody<'_> {
        ChatRequestBody {
            messages: vec![WireMessage {
                role: MessageRole::User,
                content: &self.message,
            }],
            conversation_id: self.conversation_id.as_ref(),
        }
    }
}

/// Wire shape of a chat request.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatRequestBody<'a> {
    messages: Vec<WireMessage<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    conversation_id: Option<&'a ConversationId>,
}

#[derive(Debug, Serialize)]
struct WireMessage<'a> {
    role: MessageRole,
    content: &'a str,
}
