//! The session controller.
//!
//! [`ChatController`] owns one conversation: a [`SessionStore`], the event channel every stream
//! pump reports on, and the cancel handle of the turn in flight.  A turn moves
//! `Idle -> Sending -> Streaming` and ends `Completed` or `Failed`, after which the controller is
//! `Idle` again.  Every event carries the id of the placeholder it was started for; events for
//! anything but the live placeholder are dropped, so a pump that outlives its turn (because the
//! chat was cleared or the agent switched) cannot touch the new conversation.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::mpsc;

use crate::chat_logger::ChatLogger;
use crate::error::{Error, Result};
use crate::observability::{
    SESSION_REJECTED, SESSION_STALE_UPDATES, SESSION_TURN_DURATION, SESSION_TURN_FAILURES,
    SESSION_TURNS,
};
use crate::store::{ChatState, SessionStore};
use crate::transport::{
    CancelHandle, ChatTransport, Completion, StreamEvent, TaggedEvent, spawn_stream,
};
use crate::types::{ChatRequest, ConversationId, MessageId};

/// Where the controller is in the current turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnState {
    /// No turn in flight.
    Idle,
    /// The user message is committed and the stream is being opened.
    Sending,
    /// Fragments are arriving.
    Streaming,
}

/// How a turn ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TurnOutcome {
    /// The placeholder was finalized.
    Completed {
        /// The finalized assistant message.
        message_id: MessageId,
    },
    /// The placeholder was replaced by an error message.
    Failed {
        /// The placeholder of the failed turn.
        message_id: MessageId,
        /// Human-readable cause.
        error: String,
    },
}

impl TurnOutcome {
    /// The placeholder this turn streamed into.
    pub fn message_id(&self) -> MessageId {
        match self {
            TurnOutcome::Completed { message_id } | TurnOutcome::Failed { message_id, .. } => {
                *message_id
            }
        }
    }

    /// Returns true if the turn completed.
    pub fn is_completed(&self) -> bool {
        matches!(self, TurnOutcome::Completed { .. })
    }
}

/// What processing one event did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventOutcome {
    /// A fragment was appended to the placeholder.
    Fragment,
    /// The turn ended.
    Finished(TurnOutcome),
    /// The event belonged to a turn that is no longer live and was dropped.
    Stale,
}

/// The event that ends a turn.
enum Terminal {
    Complete(Completion),
    Error(String),
}

struct InFlight {
    message_id: MessageId,
    cancel: Option<CancelHandle>,
    started: Instant,
}

/// Drives one conversation against a [`ChatTransport`].
///
/// The controller is the only writer of its store.  Front-ends call [`send_message`],
/// [`clear_messages`], and [`start_new_session`], and observe the conversation through
/// [`state`] or [`subscribe`].
///
/// [`send_message`]: ChatController::send_message
/// [`clear_messages`]: ChatController::clear_messages
/// [`start_new_session`]: ChatController::start_new_session
/// [`state`]: ChatController::state
/// [`subscribe`]: ChatController::subscribe
pub struct ChatController<T: ChatTransport + ?Sized> {
    transport: Arc<T>,
    store: SessionStore,
    quiescence: Option<Duration>,
    logger: Option<Arc<dyn ChatLogger>>,
    events_tx: mpsc::UnboundedSender<TaggedEvent>,
    events_rx: mpsc::UnboundedReceiver<TaggedEvent>,
    in_flight: Option<InFlight>,
    turn: TurnState,
    last_outcome: Option<TurnOutcome>,
}

impl<T: ChatTransport + ?Sized> ChatController<T> {
    /// Create a controller with no session.
    ///
    /// `quiescence` is how long a stream may stay silent before the turn is completed with what
    /// has arrived; `None` waits for the stream to finish on its own.
    pub fn new(transport: Arc<T>, quiescence: Option<Duration>) -> Self {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        Self {
            transport,
            store: SessionStore::new(),
            quiescence,
            logger: None,
            events_tx,
            events_rx,
            in_flight: None,
            turn: TurnState::Idle,
            last_outcome: None,
        }
    }

    /// Attach a logger that sees the assistant message ending every turn.
    pub fn with_logger(mut self, logger: Arc<dyn ChatLogger>) -> Self {
        self.logger = Some(logger);
        self
    }

    /// A copy of the current state.
    pub fn state(&self) -> ChatState {
        self.store.snapshot()
    }

    /// Receive every committed state, one message per commit.
    pub fn subscribe(&self) -> mpsc::UnboundedReceiver<ChatState> {
        self.store.subscribe()
    }

    /// Where the controller is in the current turn.
    pub fn turn_state(&self) -> TurnState {
        self.turn
    }

    /// Returns true while a turn is in flight.
    pub fn is_busy(&self) -> bool {
        self.turn != TurnState::Idle
    }

    /// How the most recent turn ended.
    pub fn last_outcome(&self) -> Option<&TurnOutcome> {
        self.last_outcome.as_ref()
    }

    /// The configured quiescence interval.
    pub fn quiescence(&self) -> Option<Duration> {
        self.quiescence
    }

    /// Start an empty session with `agent_name`, cancelling any turn in flight.
    pub fn start_new_session(&mut self, agent_name: &str) -> Result<ConversationId> {
        let agent_name = agent_name.trim();
        if agent_name.is_empty() {
            return Err(Error::validation(
                "Agent name is required",
                Some("agentName".to_string()),
            ));
        }
        self.abandon_turn();
        Ok(self.store.start_session(agent_name))
    }

    /// Drop every message and start over with the same agent and a new conversation id,
    /// cancelling any turn in flight.
    pub fn clear_messages(&mut self) {
        self.abandon_turn();
        self.store.clear();
    }

    /// Cancel any turn in flight and archive the session.
    pub fn dispose(&mut self) {
        self.abandon_turn();
        self.store.archive_session();
    }

    /// Send `content` to the session's agent.
    ///
    /// Returns the id of the assistant placeholder.  Empty content, a missing or archived
    /// session, and a turn already in flight are rejected without touching the conversation.
    /// Once the user message is committed, failures to reach the agent are reported through the
    /// conversation (an error message and [`ChatState::error`]) rather than returned.
    pub async fn send_message(&mut self, content: &str) -> Result<MessageId> {
        let content = content.trim();
        if content.is_empty() {
            SESSION_REJECTED.click();
            return Err(Error::validation(
                "Message is required",
                Some("message".to_string()),
            ));
        }
        if self.is_busy() {
            SESSION_REJECTED.click();
            return Err(Error::busy("a response is still streaming"));
        }
        let (agent_name, conversation_id) = self.store.with_state(|state| {
            let agent_name = state
                .session
                .as_ref()
                .filter(|session| session.is_active())
                .map(|session| session.agent_name.clone());
            (agent_name, state.conversation_id.clone())
        });
        let Some(agent_name) = agent_name else {
            SESSION_REJECTED.click();
            return Err(Error::validation(
                "No active session; choose an agent first",
                Some("agentName".to_string()),
            ));
        };
        let request = ChatRequest::new(&agent_name, content, Some(conversation_id))?;

        let Some(message_id) = self.store.apply_user_message(request.message()) else {
            SESSION_REJECTED.click();
            return Err(Error::busy("a response is still streaming"));
        };
        self.store.begin_assistant_placeholder(&agent_name);
        self.turn = TurnState::Sending;
        self.in_flight = Some(InFlight {
            message_id,
            cancel: None,
            started: Instant::now(),
        });
        SESSION_TURNS.click();

        match self.transport.open_stream(&request).await {
            Ok(stream) => {
                let cancel =
                    spawn_stream(stream, message_id, self.quiescence, self.events_tx.clone());
                if let Some(in_flight) = &mut self.in_flight {
                    in_flight.cancel = Some(cancel);
                }
                self.turn = TurnState::Streaming;
            }
            Err(err) => {
                self.finish_turn(message_id, Terminal::Error(err.to_string()));
            }
        }
        Ok(message_id)
    }

    /// Apply the next event from the stream in flight.
    ///
    /// Waits for an event while a turn is streaming.  When idle, returns `None` once no event is
    /// queued; anything still queued then belongs to an abandoned turn and is reported as
    /// [`EventOutcome::Stale`].
    pub async fn process_next_event(&mut self) -> Option<EventOutcome> {
        let tagged = if self.turn == TurnState::Streaming {
            self.events_rx.recv().await?
        } else {
            self.events_rx.try_recv().ok()?
        };
        Some(self.apply_event(tagged))
    }

    /// Process events until the turn in flight ends, and report how the latest turn ended.
    pub async fn wait_for_turn(&mut self) -> Option<TurnOutcome> {
        while self.turn == TurnState::Streaming {
            if self.process_next_event().await.is_none() {
                break;
            }
        }
        self.last_outcome.clone()
    }

    fn apply_event(&mut self, tagged: TaggedEvent) -> EventOutcome {
        let live = self.in_flight.as_ref().map(|f| f.message_id) == Some(tagged.message_id);
        if !live {
            SESSION_STALE_UPDATES.click();
            return EventOutcome::Stale;
        }
        let terminal = match tagged.event {
            StreamEvent::Fragment(text) => {
                self.store.append_fragment(tagged.message_id, &text);
                return EventOutcome::Fragment;
            }
            StreamEvent::Complete(completion) => Terminal::Complete(completion),
            StreamEvent::Error(error) => Terminal::Error(error),
        };
        EventOutcome::Finished(self.finish_turn(tagged.message_id, terminal))
    }

    fn finish_turn(&mut self, message_id: MessageId, terminal: Terminal) -> TurnOutcome {
        let outcome = match terminal {
            Terminal::Complete(completion) => {
                self.store.finalize_assistant(message_id, &completion);
                TurnOutcome::Completed { message_id }
            }
            Terminal::Error(error) => {
                self.store.fail_assistant(message_id, &error);
                SESSION_TURN_FAILURES.click();
                TurnOutcome::Failed { message_id, error }
            }
        };
        if let Some(in_flight) = self.in_flight.take() {
            SESSION_TURN_DURATION.add(in_flight.started.elapsed().as_secs_f64());
        }
        self.turn = TurnState::Idle;
        if let Some(logger) = &self.logger {
            self.store.with_state(|state| {
                if let Some(message) = state.last_message() {
                    logger.log_turn(message);
                }
            });
        }
        self.last_outcome = Some(outcome.clone());
        outcome
    }

    fn abandon_turn(&mut self) {
        if let Some(in_flight) = self.in_flight.take()
            && let Some(cancel) = in_flight.cancel
        {
            cancel.cancel();
        }
        self.turn = TurnState::Idle;
        while self.events_rx.try_recv().is_ok() {
            SESSION_STALE_UPDATES.click();
        }
    }
}

impl<T: ChatTransport + ?Sized> Drop for ChatController<T> {
    fn drop(&mut self) {
        if let Some(cancel) = self.in_flight.as_ref().and_then(|f| f.cancel.as_ref()) {
            cancel.cancel();
        }
    }
}
