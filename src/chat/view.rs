//! Incremental rendering of a streaming turn from committed states.

use crate::render::Renderer;
use crate::store::ChatState;
use crate::types::{MessageId, Phase};

/// Tracks how much of one turn has been rendered.
///
/// Each call to [`TurnView::render`] prints only what changed since the previous call: a new
/// phase, and the text appended to the placeholder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TurnView {
    message_id: MessageId,
    printed: usize,
    phase: Option<Phase>,
}

impl TurnView {
    /// Start rendering the turn streaming into `message_id`.
    pub fn new(message_id: MessageId) -> Self {
        Self {
            message_id,
            printed: 0,
            phase: None,
        }
    }

    /// The placeholder this view follows.
    pub fn message_id(&self) -> MessageId {
        self.message_id
    }

    /// Render whatever `state` adds over what has been printed.
    pub fn render(&mut self, state: &ChatState, renderer: &mut dyn Renderer) {
        if let Some(progress) = state.progress()
            && self.phase != Some(progress.phase)
        {
            self.phase = Some(progress.phase);
            renderer.print_progress(progress);
        }
        let Some(message) = state.message(self.message_id) else {
            return;
        };
        let content = message.content.as_str();
        if content.len() > self.printed && content.is_char_boundary(self.printed) {
            renderer.print_text(&content[self.printed..]);
            self.printed = content.len();
        }
    }
}
