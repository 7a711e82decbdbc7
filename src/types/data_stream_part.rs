use serde::{Deserialize, Serialize};

/// Token usage reported with a finish part.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StreamUsage {
    /// Tokens in the prompt.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prompt_tokens: Option<u32>,

    /// Tokens in the completion.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completion_tokens: Option<u32>,
}

/// Payload of a finish-step or finish-message part.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FinishPart {
    /// Why generation stopped (e.g. `stop`, `length`, `tool-calls`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finish_reason: Option<String>,

    /// Token usage, if reported.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<StreamUsage>,

    /// Whether another step follows (finish-step only).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_continued: Option<bool>,
}

/// Payload of a start-step part.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartPart {
    /// Id the service assigned to the message being generated.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message_id: Option<String>,
}

/// A source cited by the agent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourcePart {
    /// Kind of source; `url` in practice.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_type: Option<String>,

    /// Source id.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,

    /// Location of the source.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,

    /// Title of the source.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
}

/// One decoded line of the agent service's data stream.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DataStreamPart {
    /// `f:` a generation step started.
    Start(StartPart),
    /// `0:` a chunk of response text.
    Text {
        /// The text chunk.
        text: String,
    },
    /// `2:` structured data attached to the response.
    Data {
        /// The data values.
        values: Vec<serde_json::Value>,
    },
    /// `3:` the service reported an error.
    Error {
        /// The error message.
        message: String,
    },
    /// `h:` a cited source.
    Source(SourcePart),
    /// `e:` a generation step finished.
    StepFinish(FinishPart),
    /// `d:` the whole message finished.
    Finish(FinishPart),
    /// Any other part (tool calls, reasoning, annotations); not interpreted.
    Other {
        /// The part's type code.
        code: String,
    },
}

impl DataStreamPart {
    /// Returns true for the part that ends the stream.
    pub fn is_finish(&self) -> bool {
        matches!(self, DataStreamPart::Finish(_))
    }
}
