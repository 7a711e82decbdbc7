//! The observable session state store.
//!
//! [`SessionStore`] owns the session, the message list, the stream flags, and the progress of
//! one conversation.  Every mutation is a pure transition from the current [`ChatState`] to the
//! next one; a transition that does not apply (for example a fragment for a message that is no
//! longer streaming) yields no new state and notifies no one.
//!
//! Every committed state is delivered to every subscriber, in commit order, on its own
//! unbounded channel; a subscriber that falls behind still sees each intermediate state.  The
//! latest state is also kept on a `tokio::sync::watch` channel for readers that only care about
//! the present.

use std::sync::{Mutex, PoisonError};

use time::OffsetDateTime;
use tokio::sync::{mpsc, watch};

use crate::observability::{SESSION_COMMITS, SESSION_STALE_UPDATES};
use crate::phase::infer_phase;
use crate::transport::Completion;
use crate::types::{
    ConversationId, Message, MessageId, MessageMetadata, Progress, Session, SessionStatus,
};

/// Prefix of the synthetic assistant message that replaces a failed response.
pub const ERROR_MESSAGE_PREFIX: &str = "Sorry, I encountered an error: ";

/// Streaming flags of the conversation.
///
/// `streaming_message_id` is `Some` exactly when `is_streaming` is set, and `progress` is only
/// `Some` while streaming.
#[derive(Debug, Clone, PartialEq)]
pub struct StreamState {
    /// Whether a response is being streamed.
    pub is_streaming: bool,
    /// The placeholder being filled.
    pub streaming_message_id: Option<MessageId>,
    /// Inferred progress of the agent.
    pub progress: Option<Progress>,
}

impl StreamState {
    fn idle() -> Self {
        Self {
            is_streaming: false,
            streaming_message_id: None,
            progress: None,
        }
    }

    fn streaming(id: MessageId) -> Self {
        Self {
            is_streaming: true,
            streaming_message_id: Some(id),
            progress: Some(Progress::initializing()),
        }
    }

    fn is_live(&self, id: MessageId) -> bool {
        self.streaming_message_id == Some(id)
    }
}

/// Everything a subscriber can observe about a conversation.
#[derive(Debug, Clone, PartialEq)]
pub struct ChatState {
    /// The live session, if an agent has been chosen.
    pub session: Option<Session>,
    /// Correlation token sent with every request.
    pub conversation_id: ConversationId,
    /// The conversation, oldest first.
    pub messages: Vec<Message>,
    /// Streaming flags and progress.
    pub stream: StreamState,
    /// The most recent turn failure, cleared on the next send.
    pub error: Option<String>,
}

impl ChatState {
    fn new() -> Self {
        Self {
            session: None,
            conversation_id: ConversationId::generate(),
            messages: Vec::new(),
            stream: StreamState::idle(),
            error: None,
        }
    }

    /// Returns true while a response streams.
    pub fn is_streaming(&self) -> bool {
        self.stream.is_streaming
    }

    /// Current progress, if streaming.
    pub fn progress(&self) -> Option<&Progress> {
        self.stream.progress.as_ref()
    }

    /// The agent of the live session.
    pub fn agent_name(&self) -> Option<&str> {
        self.session.as_ref().map(|s| s.agent_name.as_str())
    }

    /// Look up a message by id.
    pub fn message(&self, id: MessageId) -> Option<&Message> {
        self.messages.iter().find(|m| m.id == id)
    }

    /// The newest message.
    pub fn last_message(&self) -> Option<&Message> {
        self.messages.last()
    }

    fn position(&self, id: MessageId) -> Option<usize> {
        self.messages.iter().position(|m| m.id == id)
    }

    fn touch_session(&mut self, status: SessionStatus) {
        if let Some(session) = &self.session {
            self.session = Some(session.with_status(status));
        }
    }

    fn with_user_message(&self, user: Message, placeholder_id: MessageId) -> Option<Self> {
        if self.stream.is_streaming {
            return None;
        }
        let mut next = self.clone();
        next.messages.push(user);
        next.stream = StreamState::streaming(placeholder_id);
        next.error = None;
        next.touch_session(SessionStatus::Active);
        Some(next)
    }

    fn with_placeholder(&self, agent_name: &str) -> Option<(Self, MessageId)> {
        let id = self.stream.streaming_message_id?;
        if self.position(id).is_some() {
            return None;
        }
        let mut next = self.clone();
        next.messages.push(Message::assistant(id, "", agent_name));
        Some((next, id))
    }

    fn with_fragment(&self, id: MessageId, text: &str) -> Option<Self> {
        if !self.stream.is_live(id) || text.is_empty() {
            return None;
        }
        let idx = self.position(id)?;
        let mut next = self.clone();
        next.messages[idx].content.push_str(text);
        if let Some(progress) = infer_phase(text) {
            next.stream.progress = Some(progress);
        }
        Some(next)
    }

    fn with_finalized(&self, id: MessageId, completion: &Completion) -> Option<Self> {
        if !self.stream.is_live(id) {
            return None;
        }
        let mut next = self.clone();
        if let Some(idx) = next.position(id) {
            let message = &mut next.messages[idx];
            if let Some(final_text) = &completion.final_text {
                message.content.clone_from(final_text);
            }
            let elapsed = OffsetDateTime::now_utc() - message.timestamp;
            message.metadata = Some(MessageMetadata {
                tokens: completion.tokens,
                processing_time_ms: Some(elapsed.whole_milliseconds().max(0) as u64),
                sources: completion.sources.clone(),
            });
        }
        next.stream = StreamState::idle();
        next.touch_session(SessionStatus::Active);
        Some(next)
    }

    fn with_failure(&self, id: MessageId, error: &str, error_id: MessageId) -> Option<Self> {
        if !self.stream.is_live(id) {
            return None;
        }
        let agent_name = self
            .message(id)
            .and_then(|m| m.agent_name.clone())
            .or_else(|| self.agent_name().map(String::from))
            .unwrap_or_default();
        let mut next = self.clone();
        // Partial output stays visible; only an untouched placeholder is dropped.
        if let Some(idx) = next.position(id)
            && next.messages[idx].content.is_empty()
        {
            next.messages.remove(idx);
        }
        next.messages.push(Message::assistant(
            error_id,
            format!("{ERROR_MESSAGE_PREFIX}{error}"),
            &agent_name,
        ));
        next.stream = StreamState::idle();
        next.error = Some(error.to_string());
        next.touch_session(SessionStatus::Error);
        Some(next)
    }
}

/// In-memory, observable store for one conversation.
///
/// The store is owned by a single writer (the controller).  Message ids come from a counter that
/// is never reset, so an id from a cleared conversation can never match a live placeholder.
#[derive(Debug)]
pub struct SessionStore {
    state: watch::Sender<ChatState>,
    subscribers: Mutex<Vec<mpsc::UnboundedSender<ChatState>>>,
    next_message_id: u64,
}

impl SessionStore {
    /// Create an empty store with no session and a fresh conversation id.
    pub fn new() -> Self {
        let (state, _) = watch::channel(ChatState::new());
        Self {
            state,
            subscribers: Mutex::new(Vec::new()),
            next_message_id: 1,
        }
    }

    /// A copy of the current state.
    pub fn snapshot(&self) -> ChatState {
        self.state.borrow().clone()
    }

    /// Inspect the current state without copying it.
    pub fn with_state<R>(&self, f: impl FnOnce(&ChatState) -> R) -> R {
        f(&self.state.borrow())
    }

    /// Receive every state committed from now on, one message per commit.
    pub fn subscribe(&self) -> mpsc::UnboundedReceiver<ChatState> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(tx);
        rx
    }

    /// Observe the latest committed state only.  Commits made between two reads are merged.
    pub fn watch(&self) -> watch::Receiver<ChatState> {
        self.state.subscribe()
    }

    /// Append a user message and enter the streaming state.
    ///
    /// Progress resets to `Initializing` and the id of the forthcoming assistant placeholder is
    /// reserved and returned.  No-op if a response is already streaming.
    pub fn apply_user_message(&mut self, content: &str) -> Option<MessageId> {
        let user = Message::user(self.allocate_id(), content);
        let placeholder_id = self.allocate_id();
        self.commit(|state| {
            state
                .with_user_message(user, placeholder_id)
                .map(|next| (next, placeholder_id))
        })
    }

    /// Append the empty assistant message under the reserved streaming id.
    pub fn begin_assistant_placeholder(&mut self, agent_name: &str) -> Option<MessageId> {
        self.commit(|state| state.with_placeholder(agent_name))
    }

    /// Append a fragment to the live placeholder.
    ///
    /// Returns false, and leaves the state untouched, if `id` is not the live streaming id.
    pub fn append_fragment(&mut self, id: MessageId, text: &str) -> bool {
        let applied = self
            .commit(|state| state.with_fragment(id, text).map(|next| (next, ())))
            .is_some();
        if !applied && !text.is_empty() {
            SESSION_STALE_UPDATES.click();
        }
        applied
    }

    /// Finalize the live placeholder and leave the streaming state.
    ///
    /// When the completion carries final text it overwrites the accumulated content rather than
    /// appending to it.  Finalizing an id that is not live (including a second finalize of the
    /// same id) is a no-op that returns false.
    pub fn finalize_assistant(&mut self, id: MessageId, completion: &Completion) -> bool {
        let applied = self
            .commit(|state| state.with_finalized(id, completion).map(|next| (next, ())))
            .is_some();
        if !applied {
            SESSION_STALE_UPDATES.click();
        }
        applied
    }

    /// Replace the live placeholder with a synthetic error message and leave the streaming
    /// state.
    ///
    /// An empty placeholder is removed; one that already received fragments is kept so partial
    /// output stays visible.  Returns false if `id` is not live.
    pub fn fail_assistant(&mut self, id: MessageId, error: &str) -> bool {
        let error_id = self.allocate_id();
        let applied = self
            .commit(|state| {
                state
                    .with_failure(id, error, error_id)
                    .map(|next| (next, ()))
            })
            .is_some();
        if !applied {
            SESSION_STALE_UPDATES.click();
        }
        applied
    }

    /// Drop every message and supersede the session with a fresh one for the same agent.
    pub fn clear(&mut self) {
        self.commit(|state| {
            let session = state
                .session
                .as_ref()
                .map(|old| Session::new(old.agent_name.clone()));
            let conversation_id = match &session {
                Some(session) => session.id.clone(),
                None => ConversationId::generate(),
            };
            let next = ChatState {
                session,
                conversation_id,
                messages: Vec::new(),
                stream: StreamState::idle(),
                error: None,
            };
            Some((next, ()))
        });
    }

    /// Start a new, empty session with `agent_name`.
    pub fn start_session(&mut self, agent_name: &str) -> ConversationId {
        let session = Session::new(agent_name);
        let conversation_id = session.id.clone();
        self.commit(|_| {
            let next = ChatState {
                session: Some(session),
                conversation_id: conversation_id.clone(),
                messages: Vec::new(),
                stream: StreamState::idle(),
                error: None,
            };
            Some((next, ()))
        });
        conversation_id
    }

    /// Mark the live session archived and stop streaming.
    pub fn archive_session(&mut self) {
        self.commit(|state| {
            let mut next = state.clone();
            next.stream = StreamState::idle();
            next.touch_session(SessionStatus::Archived);
            Some((next, ()))
        });
    }

    fn allocate_id(&mut self) -> MessageId {
        let id = MessageId::new(self.next_message_id);
        self.next_message_id += 1;
        id
    }

    fn commit<R>(
        &mut self,
        transition: impl FnOnce(&ChatState) -> Option<(ChatState, R)>,
    ) -> Option<R> {
        let outcome = {
            let current = self.state.borrow();
            transition(&current)
        };
        let (next, result) = outcome?;
        // Dropped receivers are pruned on the first commit they miss.
        self.subscribers
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner)
            .retain(|tx| tx.send(next.clone()).is_ok());
        self.state.send_replace(next);
        SESSION_COMMITS.click();
        Some(result)
    }
}

impl Default for SessionStore {
    fn default() -> Self {
        Self::new()
    }
}
