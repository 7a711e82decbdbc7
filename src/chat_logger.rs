//! Logging hooks for agent service traffic.
//!
//! The [`ChatLogger`] trait lets callers capture every request the [`AgentClient`] issues, every
//! decoded stream part, and every finished turn.  [`JsonLinesLogger`] is the implementation the
//! `agentchat` binary installs for `--log <file>`.
//!
//! [`AgentClient`]: crate::AgentClient

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::Path;
use std::sync::Mutex;

use serde_json::json;
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;

use crate::error::{Error, Result};
use crate::types::{DataStreamPart, Message};

/// A trait for logging agent service traffic.
///
/// # Example
///
/// ```rust,ignore
/// use agentchat::{ChatLogger, DataStreamPart, Message};
///
/// struct StderrLogger;
///
/// impl ChatLogger for StderrLogger {
///     fn log_request(&self, method: &str, url: &str) {
///         eprintln!("{method} {url}");
///     }
///
///     fn log_stream_part(&self, part: &DataStreamPart) {
///         eprintln!("part: {part:?}");
///     }
///
///     fn log_turn(&self, message: &Message) {
///         eprintln!("turn done: {}", message.content);
///     }
/// }
/// ```
pub trait ChatLogger: Send + Sync {
    /// Log an HTTP request before it is sent.
    fn log_request(&self, method: &str, url: &str);

    /// Log one decoded part of a streamed response.
    fn log_stream_part(&self, part: &DataStreamPart);

    /// Log the assistant message that ended a turn, whether finalized or synthesized from an
    /// error.
    fn log_turn(&self, message: &Message);
}

/// Appends one JSON object per line to a file.
#[derive(Debug)]
pub struct JsonLinesLogger {
    file: Mutex<File>,
}

impl JsonLinesLogger {
    /// Open `path` for appending, creating it if needed.
    pub fn create(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .map_err(|e| Error::io(format!("cannot open log file {}", path.display()), e))?;
        Ok(Self {
            file: Mutex::new(file),
        })
    }

    fn write_record(&self, record: serde_json::Value) {
        let Ok(line) = serde_json::to_string(&record) else {
            return;
        };
        if let Ok(mut file) = self.file.lock() {
            // Logging never fails a turn.
            let _ = writeln!(file, "{line}");
        }
    }
}

fn now() -> String {
    OffsetDateTime::now_utc()
        .format(&Rfc3339)
        .unwrap_or_default()
}

impl ChatLogger for JsonLinesLogger {
    fn log_request(&self, method: &str, url: &str) {
        self.write_record(json!({
            "kind": "request",
            "timestamp": now(),
            "method": method,
            "url": url,
        }));
    }

    fn log_stream_part(&self, part: &DataStreamPart) {
        self.write_record(json!({
            "kind": "stream_part",
            "timestamp": now(),
            "part": part,
        }));
    }

    fn log_turn(&self, message: &Message) {
        self.write_record(json!({
            "kind": "turn",
            "timestamp": now(),
            "message": message,
        }));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::MessageId;

    #[test]
    fn writes_one_json_object_per_line() {
        let path = std::env::temp_dir().join(format!(
            "agentchat-logger-{}.jsonl",
            uuid::Uuid::new_v4().simple()
        ));
        let logger = JsonLinesLogger::create(&path).unwrap();
        logger.log_request("POST", "http://localhost:4112/api/agents/a/stream");
        logger.log_stream_part(&DataStreamPart::Text {
            text: "hi".to_string(),
        });
        logger.log_turn(&Message::assistant(MessageId::new(2), "hi", "a"));
        drop(logger);

        let contents = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<serde_json::Value> = contents
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect();
        std::fs::remove_file(&path).unwrap();

        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0]["kind"], "request");
        assert_eq!(lines[0]["method"], "POST");
        assert_eq!(lines[1]["part"]["type"], "text");
        assert_eq!(lines[1]["part"]["text"], "hi");
        assert_eq!(lines[2]["message"]["role"], "assistant");
    }
}
