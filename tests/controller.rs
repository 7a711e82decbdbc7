//! Integration tests for the session controller, driven by a scripted transport.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use futures::stream;
use tokio::sync::mpsc;
use tokio_test::{assert_err, assert_ok};

use agentchat::{
    ChatController, ChatRequest, ChatStream, ChatTransport, DataStreamPart, Error, EventOutcome,
    FinishPart, MessageRole, Phase, Result, SessionStatus, SourcePart, StreamUsage, TurnOutcome,
    TurnState,
};

type PartSender = mpsc::UnboundedSender<Result<DataStreamPart>>;

enum Script {
    Live(mpsc::UnboundedReceiver<Result<DataStreamPart>>),
    Fail(Error),
}

/// Hands out one scripted response per `open_stream` call, in order.
#[derive(Default)]
struct ScriptedTransport {
    scripts: Mutex<VecDeque<Script>>,
    requests: Mutex<Vec<ChatRequest>>,
}

impl ScriptedTransport {
    /// Queue a response whose parts the test pushes through the returned sender.
    fn live(&self) -> PartSender {
        let (tx, rx) = mpsc::unbounded_channel();
        self.scripts.lock().unwrap().push_back(Script::Live(rx));
        tx
    }

    /// Queue a response that fails before streaming.
    fn fail(&self, err: Error) {
        self.scripts.lock().unwrap().push_back(Script::Fail(err));
    }

    fn requests(&self) -> Vec<ChatRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl ChatTransport for ScriptedTransport {
    async fn open_stream(&self, request: &ChatRequest) -> Result<ChatStream> {
        self.requests.lock().unwrap().push(request.clone());
        let script = self.scripts.lock().unwrap().pop_front();
        match script {
            Some(Script::Live(rx)) => Ok(Box::pin(stream::unfold(rx, |mut rx| async move {
                rx.recv().await.map(|part| (part, rx))
            }))),
            Some(Script::Fail(err)) => Err(err),
            None => Err(Error::connection("no scripted response", None)),
        }
    }
}

fn text(t: &str) -> Result<DataStreamPart> {
    Ok(DataStreamPart::Text {
        text: t.to_string(),
    })
}

fn finish(tokens: u32) -> Result<DataStreamPart> {
    Ok(DataStreamPart::Finish(FinishPart {
        finish_reason: Some("stop".to_string()),
        usage: Some(StreamUsage {
            prompt_tokens: Some(12),
            completion_tokens: Some(tokens),
        }),
        is_continued: None,
    }))
}

fn setup(
    quiescence: Option<Duration>,
) -> (Arc<ScriptedTransport>, ChatController<ScriptedTransport>) {
    let transport = Arc::new(ScriptedTransport::default());
    let mut controller = ChatController::new(Arc::clone(&transport), quiescence);
    assert_ok!(controller.start_new_session("researchAgent"));
    (transport, controller)
}

#[tokio::test]
async fn at_most_one_live_stream() {
    let (transport, mut controller) = setup(None);
    let _parts = transport.live();

    assert_ok!(controller.send_message("first").await);
    assert_eq!(controller.turn_state(), TurnState::Streaming);

    let err = assert_err!(controller.send_message("second").await);
    assert!(err.is_busy());

    let state = controller.state();
    assert_eq!(state.messages.len(), 2);
    assert_eq!(state.messages[0].content, "first");
    assert_eq!(state.messages[1].role, MessageRole::Assistant);
    assert_eq!(transport.requests().len(), 1);
}

#[tokio::test]
async fn fragments_are_concatenated_in_order() {
    let (transport, mut controller) = setup(None);
    let parts = transport.live();
    let id = assert_ok!(controller.send_message("greet me").await);

    for fragment in ["Hello, ", "world", "!"] {
        parts.send(text(fragment)).unwrap();
    }
    parts
        .send(Ok(DataStreamPart::Source(SourcePart {
            source_type: Some("url".to_string()),
            id: Some("1".to_string()),
            url: Some("https://example.com/greetings".to_string()),
            title: Some("Greetings".to_string()),
        })))
        .unwrap();
    parts.send(finish(3)).unwrap();

    let outcome = controller.wait_for_turn().await;
    assert_eq!(outcome, Some(TurnOutcome::Completed { message_id: id }));
    assert_eq!(controller.turn_state(), TurnState::Idle);

    let state = controller.state();
    let message = state.message(id).unwrap();
    assert_eq!(message.content, "Hello, world!");
    let metadata = message.metadata.as_ref().unwrap();
    assert_eq!(metadata.tokens, Some(3));
    assert_eq!(metadata.sources, vec!["https://example.com/greetings"]);
    assert!(!state.is_streaming());
    assert!(state.progress().is_none());
}

#[tokio::test]
async fn request_carries_agent_and_conversation() {
    let (transport, mut controller) = setup(None);
    let parts = transport.live();
    assert_ok!(controller.send_message("  padded  ").await);
    parts.send(finish(1)).unwrap();
    controller.wait_for_turn().await;

    let requests = transport.requests();
    assert_eq!(requests[0].agent_name(), "researchAgent");
    assert_eq!(requests[0].message(), "padded");
    assert_eq!(
        requests[0].conversation_id(),
        Some(&controller.state().conversation_id)
    );
}

#[tokio::test]
async fn phase_is_observed_and_retained() {
    let (transport, mut controller) = setup(None);
    let mut updates = controller.subscribe();
    let parts = transport.live();
    let id = assert_ok!(controller.send_message("What is quantum computing?").await);
    assert_eq!(
        controller.state().progress().map(|p| p.phase),
        Some(Phase::Initializing)
    );

    parts
        .send(text("**Planning Phase** breaking down..."))
        .unwrap();
    assert_eq!(
        controller.process_next_event().await,
        Some(EventOutcome::Fragment)
    );
    // User message, placeholder, then the fragment.
    let seen: Vec<_> = std::iter::from_fn(|| updates.try_recv().ok()).collect();
    assert_eq!(seen.len(), 3);
    assert_eq!(seen[1].message(id).unwrap().content, "");
    assert_eq!(seen[2].progress().map(|p| p.phase), Some(Phase::Planning));

    parts.send(text("quantum computing overview")).unwrap();
    assert_eq!(
        controller.process_next_event().await,
        Some(EventOutcome::Fragment)
    );
    assert_eq!(
        controller.state().progress().map(|p| p.phase),
        Some(Phase::Planning)
    );

    parts.send(finish(9)).unwrap();
    let outcome = controller.wait_for_turn().await.unwrap();
    assert!(outcome.is_completed());

    let state = controller.state();
    assert!(!state.is_streaming());
    assert!(state.progress().is_none());
    assert_eq!(
        state.message(id).unwrap().content,
        "**Planning Phase** breaking down...quantum computing overview"
    );
}

#[tokio::test]
async fn error_replaces_placeholder_not_user_message() {
    let (transport, mut controller) = setup(None);
    let parts = transport.live();
    let id = assert_ok!(controller.send_message("test").await);
    parts
        .send(Ok(DataStreamPart::Error {
            message: "timeout".to_string(),
        }))
        .unwrap();

    let outcome = controller.wait_for_turn().await.unwrap();
    assert_eq!(
        outcome,
        TurnOutcome::Failed {
            message_id: id,
            error: "timeout".to_string(),
        }
    );

    let state = controller.state();
    assert_eq!(state.messages.len(), 2);
    assert_eq!(state.messages[0].role, MessageRole::User);
    assert_eq!(state.messages[0].content, "test");
    assert_eq!(state.messages[1].role, MessageRole::Assistant);
    assert!(state.messages[1].content.contains("timeout"));
    assert!(state.messages.iter().all(|m| !m.content.is_empty()));
    assert_eq!(state.error.as_deref(), Some("timeout"));
    assert_eq!(
        state.session.as_ref().map(|s| s.status),
        Some(SessionStatus::Error)
    );
}

#[tokio::test]
async fn failed_turn_is_recoverable() {
    let (transport, mut controller) = setup(None);
    let parts = transport.live();
    assert_ok!(controller.send_message("first").await);
    parts
        .send(Ok(DataStreamPart::Error {
            message: "overloaded".to_string(),
        }))
        .unwrap();
    controller.wait_for_turn().await;

    let parts = transport.live();
    let id = assert_ok!(controller.send_message("again").await);
    let state = controller.state();
    assert!(state.error.is_none());
    assert_eq!(
        state.session.as_ref().map(|s| s.status),
        Some(SessionStatus::Active)
    );
    parts.send(text("ok")).unwrap();
    parts.send(finish(1)).unwrap();
    controller.wait_for_turn().await;
    assert_eq!(controller.state().message(id).unwrap().content, "ok");
    assert_eq!(controller.state().messages.len(), 4);
}

#[tokio::test]
async fn protocol_error_keeps_partial_output() {
    let (transport, mut controller) = setup(None);
    let parts = transport.live();
    let id = assert_ok!(controller.send_message("explain").await);
    parts.send(text("partial answer")).unwrap();
    parts
        .send(Err(Error::serialization(
            "Malformed data stream line: missing ':' separator in 'garbage'",
            None,
        )))
        .unwrap();

    let outcome = controller.wait_for_turn().await.unwrap();
    assert!(!outcome.is_completed());

    let state = controller.state();
    assert_eq!(state.messages.len(), 3);
    assert_eq!(state.message(id).unwrap().content, "partial answer");
    assert!(state.messages[2].content.contains("Malformed data stream line"));
    assert!(!state.is_streaming());
}

#[tokio::test]
async fn setup_failure_becomes_error_message() {
    let (transport, mut controller) = setup(None);
    transport.fail(Error::connection("Connection refused", None));

    let id = assert_ok!(controller.send_message("hello?").await);
    assert_eq!(controller.turn_state(), TurnState::Idle);
    assert_eq!(
        controller.wait_for_turn().await,
        Some(TurnOutcome::Failed {
            message_id: id,
            error: "Connection error: Connection refused".to_string(),
        })
    );

    let state = controller.state();
    assert_eq!(state.messages.len(), 2);
    assert!(state.messages[1].content.contains("Connection refused"));
    assert!(!state.is_streaming());
}

#[tokio::test]
async fn clear_mid_stream_neutralizes_old_stream() {
    let (transport, mut controller) = setup(None);
    let old_parts = transport.live();
    assert_ok!(controller.send_message("first").await);
    old_parts.send(text("partial")).unwrap();
    assert_eq!(
        controller.process_next_event().await,
        Some(EventOutcome::Fragment)
    );
    let old_conversation = controller.state().conversation_id;

    controller.clear_messages();
    assert_eq!(controller.turn_state(), TurnState::Idle);
    let _ = old_parts.send(text("late"));
    let _ = old_parts.send(finish(1));
    tokio::task::yield_now().await;
    assert_eq!(controller.process_next_event().await, None);

    let state = controller.state();
    assert!(state.messages.is_empty());
    assert!(!state.is_streaming());
    assert_ne!(state.conversation_id, old_conversation);
    assert_eq!(state.agent_name(), Some("researchAgent"));

    let parts = transport.live();
    let id = assert_ok!(controller.send_message("second").await);
    let _ = old_parts.send(text("stale"));
    parts.send(text("fresh")).unwrap();
    parts.send(finish(1)).unwrap();
    controller.wait_for_turn().await;

    let state = controller.state();
    assert_eq!(state.messages.len(), 2);
    assert_eq!(state.message(id).unwrap().content, "fresh");
    assert_eq!(
        transport.requests()[1].conversation_id(),
        Some(&state.conversation_id)
    );
}

#[tokio::test]
async fn switching_agents_starts_a_new_session() {
    let (transport, mut controller) = setup(None);
    let _old_parts = transport.live();
    assert_ok!(controller.send_message("first").await);
    let old_session = controller.state().session.unwrap();

    assert_ok!(controller.start_new_session("weatherAgent"));
    let state = controller.state();
    let session = state.session.clone().unwrap();
    assert_ne!(session.id, old_session.id);
    assert_eq!(session.agent_name, "weatherAgent");
    assert!(state.messages.is_empty());
    assert_eq!(controller.turn_state(), TurnState::Idle);

    let parts = transport.live();
    assert_ok!(controller.send_message("weather?").await);
    parts.send(finish(1)).unwrap();
    controller.wait_for_turn().await;
    assert_eq!(transport.requests()[1].agent_name(), "weatherAgent");
}

#[tokio::test(start_paused = true)]
async fn silent_stream_completes_by_quiescence() {
    let (transport, mut controller) = setup(Some(Duration::from_secs(30)));
    let parts = transport.live();
    let id = assert_ok!(controller.send_message("slow agent").await);
    parts.send(text("everything I have")).unwrap();

    let outcome = controller.wait_for_turn().await;
    assert_eq!(outcome, Some(TurnOutcome::Completed { message_id: id }));
    assert_eq!(
        controller.state().message(id).unwrap().content,
        "everything I have"
    );
    drop(parts);
}

#[tokio::test]
async fn dispose_archives_the_session() {
    let (transport, mut controller) = setup(None);
    let _parts = transport.live();
    assert_ok!(controller.send_message("first").await);

    controller.dispose();
    assert_eq!(controller.turn_state(), TurnState::Idle);
    let state = controller.state();
    assert!(!state.is_streaming());
    assert_eq!(
        state.session.as_ref().map(|s| s.status),
        Some(SessionStatus::Archived)
    );
    assert!(assert_err!(controller.send_message("more").await).is_validation());
}

#[tokio::test]
async fn idle_controller_has_no_events() {
    let (_, mut controller) = setup(None);
    assert_eq!(controller.process_next_event().await, None);
    assert_eq!(controller.wait_for_turn().await, None);
}
