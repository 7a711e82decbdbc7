//! The transport adapter.
//!
//! A [`ChatTransport`] opens one streamed response per request.  [`spawn_stream`] pumps that
//! response on its own task and reports it as [`TaggedEvent`]s: text fragments in arrival order
//! followed by exactly one terminal event, unless the returned [`CancelHandle`] is cancelled
//! first.
//!
//! # Quiescence
//!
//! The data-stream protocol ends with a finish part, but not every server sends one before going
//! silent.  When a quiescence interval is configured and no part arrives within it, the pump
//! completes the turn with whatever content has accumulated.  This is a heuristic fallback, not a
//! protocol guarantee: a slow agent that pauses longer than the interval is cut short.  The timer
//! restarts on every part, and `None` disables it.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use futures::StreamExt;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::data_stream::ChatStream;
use crate::error::Result;
use crate::observability::{
    STREAM_CANCELLED, STREAM_DURATION, STREAM_ERRORS, STREAM_FRAGMENTS, STREAM_PARTS,
    STREAM_QUIESCENT, STREAM_TTFB,
};
use crate::types::{ChatRequest, DataStreamPart, MessageId};

/// Default quiescence interval.
pub const DEFAULT_QUIESCENCE: Duration = Duration::from_secs(30);

/// Opens streamed chat responses.
#[async_trait]
pub trait ChatTransport: Send + Sync + 'static {
    /// Open exactly one network stream for `request`.
    ///
    /// Failures before the first byte (connection refused, timeout, non-success status) are
    /// returned here; failures after that surface as items of the returned stream.
    async fn open_stream(&self, request: &ChatRequest) -> Result<ChatStream>;
}

/// How a stream ended successfully.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Completion {
    /// Text that replaces the accumulated content.  `None` keeps the accumulation.
    pub final_text: Option<String>,
    /// Completion tokens reported by the service.
    pub tokens: Option<u32>,
    /// URLs of sources cited during the stream.
    pub sources: Vec<String>,
}

impl Completion {
    /// A completion that overwrites the message with `text`.
    pub fn with_text(text: impl Into<String>) -> Self {
        Self {
            final_text: Some(text.into()),
            ..Self::default()
        }
    }
}

/// An event produced while streaming one response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamEvent {
    /// A chunk of assistant text.
    Fragment(String),
    /// The stream finished.
    Complete(Completion),
    /// The stream failed; the message is human readable.
    Error(String),
}

impl StreamEvent {
    /// Returns true for `Complete` and `Error`.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, StreamEvent::Fragment(_))
    }
}

/// A [`StreamEvent`] tagged with the placeholder it belongs to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaggedEvent {
    /// The placeholder being streamed into.
    pub message_id: MessageId,
    /// What happened.
    pub event: StreamEvent,
}

/// Stops a pump started by [`spawn_stream`].
#[derive(Debug, Clone)]
pub struct CancelHandle {
    token: CancellationToken,
}

impl CancelHandle {
    /// Stop the pump.  The network stream is dropped and no further event is emitted.
    pub fn cancel(&self) {
        self.token.cancel();
    }

    /// Returns true once cancelled.
    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }
}

/// Pump `stream` on a new task, sending events for `message_id` to `events`.
pub fn spawn_stream(
    stream: ChatStream,
    message_id: MessageId,
    quiescence: Option<Duration>,
    events: mpsc::UnboundedSender<TaggedEvent>,
) -> CancelHandle {
    let token = CancellationToken::new();
    let pump = Pump {
        message_id,
        quiescence,
        events,
        token: token.clone(),
    };
    tokio::spawn(async move {
        tokio::select! {
            biased;
            _ = pump.token.cancelled() => {
                STREAM_CANCELLED.click();
            }
            _ = pump.run(stream) => {}
        }
    });
    CancelHandle { token }
}

struct Pump {
    message_id: MessageId,
    quiescence: Option<Duration>,
    events: mpsc::UnboundedSender<TaggedEvent>,
    token: CancellationToken,
}

impl Pump {
    async fn run(&self, mut stream: ChatStream) {
        let started = Instant::now();
        let mut saw_text = false;
        let mut sources = Vec::new();
        let terminal = loop {
            let next = match self.quiescence {
                Some(limit) => match tokio::time::timeout(limit, stream.next()).await {
                    Ok(next) => next,
                    Err(_) => {
                        STREAM_QUIESCENT.click();
                        break StreamEvent::Complete(Completion {
                            sources,
                            ..Completion::default()
                        });
                    }
                },
                None => stream.next().await,
            };
            let part = match next {
                Some(Ok(part)) => part,
                Some(Err(err)) => break StreamEvent::Error(err.to_string()),
                None => {
                    break StreamEvent::Complete(Completion {
                        sources,
                        ..Completion::default()
                    });
                }
            };
            STREAM_PARTS.click();
            match part {
                DataStreamPart::Text { text } => {
                    if !saw_text {
                        saw_text = true;
                        STREAM_TTFB.add(started.elapsed().as_secs_f64());
                    }
                    if !text.is_empty() {
                        STREAM_FRAGMENTS.click();
                        self.emit(StreamEvent::Fragment(text));
                    }
                }
                DataStreamPart::Source(source) => {
                    if let Some(url) = source.url {
                        sources.push(url);
                    }
                }
                DataStreamPart::Error { message } => break StreamEvent::Error(message),
                DataStreamPart::Finish(finish) => {
                    break StreamEvent::Complete(Completion {
                        final_text: None,
                        tokens: finish.usage.and_then(|u| u.completion_tokens),
                        sources,
                    });
                }
                DataStreamPart::Start(_)
                | DataStreamPart::Data { .. }
                | DataStreamPart::StepFinish(_)
                | DataStreamPart::Other { .. } => {}
            }
        };
        STREAM_DURATION.add(started.elapsed().as_secs_f64());
        if matches!(terminal, StreamEvent::Error(_)) {
            STREAM_ERRORS.click();
        }
        self.emit(terminal);
    }

    fn emit(&self, event: StreamEvent) {
        if self.token.is_cancelled() {
            return;
        }
        // A closed channel means the controller is gone; nothing left to tell.
        let _ = self.events.send(TaggedEvent {
            message_id: self.message_id,
            event,
        });
    }
}
