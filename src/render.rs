//! Output rendering for the chat front-end.
//!
//! This module provides the renderer trait and a plain-text implementation with optional ANSI
//! styling for progress lines.

use std::io::{self, Stdout, Write};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::types::Progress;

/// ANSI escape code for dim text (used for progress lines).
const ANSI_DIM: &str = "\x1b[2m";

/// ANSI escape code for italic text (used for progress lines).
const ANSI_ITALIC: &str = "\x1b[3m";

/// ANSI escape code to reset all styling.
const ANSI_RESET: &str = "\x1b[0m";

/// ANSI escape code for cyan text (used for agent labels).
const ANSI_CYAN: &str = "\x1b[36m";

/// ANSI escape code for red text (used for errors).
const ANSI_RED: &str = "\x1b[31m";

/// Trait for rendering a conversation as it streams.
pub trait Renderer: Send {
    /// Called before the first fragment of a response.
    fn start_response(&mut self, agent_label: &str);

    /// Print a chunk of response text.
    fn print_text(&mut self, text: &str);

    /// Show that the agent entered a new phase.
    fn print_progress(&mut self, progress: &Progress);

    /// Print an error message.
    fn print_error(&mut self, error: &str);

    /// Print an informational message.
    fn print_info(&mut self, info: &str);

    /// Called when a response is complete.
    fn finish_response(&mut self);

    /// Called when the user abandons a streaming response.
    fn print_interrupted(&mut self) {}

    /// Returns true if streaming should be interrupted.
    fn should_interrupt(&self) -> bool {
        false
    }
}

/// Plain text renderer with optional ANSI styling.
pub struct PlainTextRenderer<W: Write + Send = Stdout> {
    out: W,
    use_color: bool,
    line_start: bool,
    interrupted: Option<Arc<AtomicBool>>,
}

impl PlainTextRenderer {
    /// Creates a new PlainTextRenderer on stdout with ANSI colors enabled.
    pub fn new() -> Self {
        Self::with_color(true)
    }

    /// Creates a new PlainTextRenderer on stdout with specified color setting.
    pub fn with_color(use_color: bool) -> Self {
        Self::with_writer(io::stdout(), use_color)
    }
}

impl<W: Write + Send> PlainTextRenderer<W> {
    /// Creates a renderer that writes to `out`.
    pub fn with_writer(out: W, use_color: bool) -> Self {
        Self {
            out,
            use_color,
            line_start: true,
            interrupted: None,
        }
    }

    /// Attaches an interrupt flag to the renderer.
    pub fn with_interrupt(mut self, interrupted: Arc<AtomicBool>) -> Self {
        self.interrupted = Some(interrupted);
        self
    }

    /// Consume the renderer and return its writer.
    pub fn into_inner(self) -> W {
        self.out
    }

    fn write(&mut self, text: &str) {
        if text.is_empty() {
            return;
        }
        let _ = self.out.write_all(text.as_bytes());
        let _ = self.out.flush();
        self.line_start = text.ends_with('\n');
    }

    fn ensure_line_start(&mut self) {
        if !self.line_start {
            self.write("\n");
        }
    }

    fn styled(&self, style: &str, text: &str) -> String {
        if self.use_color {
            format!("{style}{text}{ANSI_RESET}")
        } else {
            text.to_string()
        }
    }
}

impl Default for PlainTextRenderer {
    fn default() -> Self {
        Self::new()
    }
}

impl<W: Write + Send> Renderer for PlainTextRenderer<W> {
    fn start_response(&mut self, agent_label: &str) {
        self.ensure_line_start();
        let label = self.styled(ANSI_CYAN, &format!("{agent_label}:"));
        self.write(&format!("{label}\n"));
    }

    fn print_text(&mut self, text: &str) {
        self.write(text);
    }

    fn print_progress(&mut self, progress: &Progress) {
        self.ensure_line_start();
        let line = format!("[{}] {} ({})", progress.phase, progress.action, progress.thinking);
        let line = if self.use_color {
            format!("{ANSI_DIM}{ANSI_ITALIC}{line}{ANSI_RESET}")
        } else {
            line
        };
        self.write(&format!("{line}\n"));
    }

    fn print_error(&mut self, error: &str) {
        self.ensure_line_start();
        let line = self.styled(ANSI_RED, &format!("Error: {error}"));
        self.write(&format!("{line}\n"));
    }

    fn print_info(&mut self, info: &str) {
        self.ensure_line_start();
        self.write(&format!("{info}\n"));
    }

    fn finish_response(&mut self) {
        self.ensure_line_start();
        self.write("\n");
    }

    fn print_interrupted(&mut self) {
        self.ensure_line_start();
        self.write("[interrupted]\n");
    }

    fn should_interrupt(&self) -> bool {
        self.interrupted
            .as_ref()
            .is_some_and(|flag| flag.load(Ordering::Relaxed))
    }
}
