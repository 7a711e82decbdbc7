// Public modules
pub mod agent_info;
pub mod chat_request;
pub mod conversation_id;
pub mod data_stream_part;
pub mod message;
pub mod progress;
pub mod session;

// Re-exports
pub use agent_info::{AgentInfo, AgentListResponse, AgentRecord, AgentResponse};
pub use chat_request::{ChatRequest, ChatRequestBody};
pub use conversation_id::ConversationId;
pub use data_stream_part::{DataStreamPart, FinishPart, SourcePart, StartPart, StreamUsage};
pub use message::{Message, MessageId, MessageMetadata, MessageRole};
pub use progress::{Phase, Progress};
pub use session::{Session, SessionStatus};
