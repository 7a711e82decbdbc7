//! A streaming chat client for conversational agent services.
//!
//! [`AgentClient`] talks to the service.  A [`ChatController`] owns one conversation with one
//! agent: it commits the user's message and an assistant placeholder to its [`SessionStore`],
//! pumps the streamed response into the placeholder, infers coarse progress from the text, and
//! reconciles completion, failure, and cancellation.  Front-ends observe the conversation by
//! subscribing to committed [`ChatState`]s.

// Public modules
pub mod catalog;
pub mod chat;
pub mod chat_logger;
pub mod client;
pub mod controller;
pub mod data_stream;
pub mod error;
pub mod observability;
pub mod phase;
pub mod render;
pub mod store;
pub mod transport;
pub mod types;

// Re-exports
pub use catalog::AgentCatalog;
pub use chat_logger::{ChatLogger, JsonLinesLogger};
pub use client::AgentClient;
pub use controller::{ChatController, EventOutcome, TurnOutcome, TurnState};
pub use data_stream::{ChatStream, DataStreamCodec, decode_stream};
pub use error::{Error, Result};
pub use observability::register_biometrics;
pub use phase::infer_phase;
pub use store::{ChatState, SessionStore, StreamState};
pub use transport::{
    CancelHandle, ChatTransport, Completion, StreamEvent, TaggedEvent, spawn_stream,
};
pub use types::*;
