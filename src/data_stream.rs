//! Decoding of the agent service's data-stream protocol.
//!
//! A streamed chat response is a sequence of newline-terminated lines of the form
//! `<code>:<json>`, where the one-character code selects the meaning of the JSON payload.  This
//! module turns a raw byte stream into a stream of [`DataStreamPart`]s, handling lines that are
//! split across network chunks.

use std::io;
use std::pin::Pin;

use bytes::{Bytes, BytesMut};
use futures::stream::{Stream, StreamExt};
use serde_json::Value;
use tokio_util::codec::{Decoder, FramedRead, LinesCodec, LinesCodecError};
use tokio_util::io::StreamReader;

use crate::error::{Error, Result};
use crate::types::DataStreamPart;

/// Longest line accepted from the service.
const MAX_LINE_LENGTH: usize = 1 << 20;

/// A decoded chat response.
pub type ChatStream = Pin<Box<dyn Stream<Item = Result<DataStreamPart>> + Send>>;

/// Decodes `<code>:<json>` lines into [`DataStreamPart`]s.
#[derive(Debug)]
pub struct DataStreamCodec {
    lines: LinesCodec,
}

impl DataStreamCodec {
    /// Create a codec with the default line length limit.
    pub fn new() -> Self {
        Self {
            lines: LinesCodec::new_with_max_length(MAX_LINE_LENGTH),
        }
    }
}

impl Default for DataStreamCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl Decoder for DataStreamCodec {
    type Item = DataStreamPart;
    type Error = Error;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<DataStreamPart>> {
        // Blank lines produce no part; keep pulling lines until one does.
        while let Some(line) = self.lines.decode(src).map_err(lines_error)? {
            if let Some(part) = parse_line(&line)? {
                return Ok(Some(part));
            }
        }
        Ok(None)
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<DataStreamPart>> {
        while let Some(line) = self.lines.decode_eof(src).map_err(lines_error)? {
            if let Some(part) = parse_line(&line)? {
                return Ok(Some(part));
            }
        }
        Ok(None)
    }
}

/// Decode a byte stream (typically an HTTP response body) into data-stream parts.
pub fn decode_stream<S, E>(byte_stream: S) -> ChatStream
where
    S: Stream<Item = std::result::Result<Bytes, E>> + Send + 'static,
    E: std::error::Error + Send + Sync + 'static,
{
    let reader = StreamReader::new(byte_stream.map(|chunk| chunk.map_err(io::Error::other)));
    Box::pin(FramedRead::new(reader, DataStreamCodec::new()))
}

/// Parse a single line.  Returns `Ok(None)` for blank lines.
pub fn parse_line(line: &str) -> Result<Option<DataStreamPart>> {
    let line = line.trim_end();
    if line.is_empty() {
        return Ok(None);
    }
    let Some((code, payload)) = line.split_once(':') else {
        return Err(Error::serialization(
            format!("Malformed data stream line: missing ':' separator in '{line}'"),
            None,
        ));
    };
    if code.is_empty() || code.len() > 2 || !code.chars().all(|c| c.is_ascii_alphanumeric()) {
        return Err(Error::serialization(
            format!("Malformed data stream line: invalid type code '{code}'"),
            None,
        ));
    }
    let part = match code {
        "0" => DataStreamPart::Text {
            text: serde_json::from_str(payload)?,
        },
        "2" => DataStreamPart::Data {
            values: serde_json::from_str(payload)?,
        },
        "3" => DataStreamPart::Error {
            message: error_message(serde_json::from_str(payload)?),
        },
        "d" => DataStreamPart::Finish(serde_json::from_str(payload)?),
        "e" => DataStreamPart::StepFinish(serde_json::from_str(payload)?),
        "f" => DataStreamPart::Start(serde_json::from_str(payload)?),
        "h" => DataStreamPart::Source(serde_json::from_str(payload)?),
        _ => DataStreamPart::Other {
            code: code.to_string(),
        },
    };
    Ok(Some(part))
}

fn error_message(value: Value) -> String {
    match value {
        Value::String(message) => message,
        Value::Object(ref map) => match map.get("message") {
            Some(Value::String(message)) => message.clone(),
            _ => value.to_string(),
        },
        other => other.to_string(),
    }
}

fn lines_error(err: LinesCodecError) -> Error {
    match err {
        LinesCodecError::MaxLineLengthExceeded => Error::streaming(
            format!("Data stream line exceeds {MAX_LINE_LENGTH} bytes"),
            None,
        ),
        LinesCodecError::Io(e) if e.kind() == io::ErrorKind::InvalidData => {
            Error::encoding(format!("Invalid UTF-8 in stream: {e}"), Some(Box::new(e)))
        }
        LinesCodecError::Io(e) => {
            Error::streaming(format!("Error in HTTP stream: {e}"), Some(Box::new(e)))
        }
    }
}
