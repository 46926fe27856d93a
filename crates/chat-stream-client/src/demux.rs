//! Classifies decoded SSE frames and accumulates the token transcript.

use std::fmt;

use serde_json::Value;
use tracing::{debug, warn};

use crate::sse::SseFrame;
use crate::stream::StreamEvent;

/// Text produced by one stream, grown only by the demultiplexer.
#[derive(Clone, Debug, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(transparent)]
pub struct Transcript(String);

impl Transcript {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    fn append(&mut self, fragment: &str) {
        self.0.push_str(fragment);
    }
}

impl fmt::Display for Transcript {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<Transcript> for String {
    fn from(value: Transcript) -> Self {
        value.0
    }
}

impl PartialEq<&str> for Transcript {
    fn eq(&self, other: &&str) -> bool {
        self.0 == *other
    }
}

/// Stateless classification of a single frame.
#[derive(Clone, Debug, PartialEq)]
pub enum ParsedFrame {
    Step(Value),
    /// The fragment carried by this frame alone.
    Token(String),
    Done(Value),
    Error(Value),
    /// Event kind this client does not know; skipped.
    Unknown(String),
    /// Payload could not be parsed for a known event kind.
    Malformed { event: String, reason: String },
}

/// Classifies a frame by its declared kind and parses its payload.
///
/// Pure: the same frame always yields the same result.
pub fn parse_frame(frame: &SseFrame) -> ParsedFrame {
    let kind = frame.kind();
    match kind {
        "token" => match parse_token_content(&frame.data) {
            Ok(content) => ParsedFrame::Token(content),
            Err(reason) => malformed(kind, reason),
        },
        "step" => parse_json_payload(kind, &frame.data).map_or_else(|m| m, ParsedFrame::Step),
        "done" => parse_json_payload(kind, &frame.data).map_or_else(|m| m, ParsedFrame::Done),
        "error" => parse_json_payload(kind, &frame.data).map_or_else(|m| m, ParsedFrame::Error),
        other => ParsedFrame::Unknown(other.to_string()),
    }
}

fn malformed(event: &str, reason: impl Into<String>) -> ParsedFrame {
    ParsedFrame::Malformed {
        event: event.to_string(),
        reason: reason.into(),
    }
}

fn parse_json_payload(event: &str, data: &str) -> Result<Value, ParsedFrame> {
    if data.trim().is_empty() {
        return Ok(Value::Null);
    }
    serde_json::from_str(data).map_err(|e| malformed(event, format!("invalid JSON payload: {e}")))
}

fn parse_token_content(data: &str) -> Result<String, String> {
    let value: Value =
        serde_json::from_str(data).map_err(|e| format!("invalid JSON payload: {e}"))?;
    match value.get("content") {
        Some(Value::String(content)) => Ok(content.clone()),
        Some(_) => Err("token `content` is not a string".into()),
        None => Err("token payload has no `content` field".into()),
    }
}

/// How a stream ended, as seen by the demultiplexer.
#[derive(Clone, Debug, PartialEq)]
pub enum Termination {
    Done(Value),
    ServerError(Value),
    Malformed { event: String, reason: String },
}

/// Per-stream state: the transcript plus whether a terminal frame was seen.
///
/// One instance serves exactly one stream; it is never shared.
#[derive(Debug, Default)]
pub struct Demultiplexer {
    transcript: Transcript,
    termination: Option<Termination>,
    ignored_after_close: usize,
}

impl Demultiplexer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Applies one frame and returns the event to forward, if any.
    ///
    /// Unknown kinds and anything after a terminal frame yield `None` and leave
    /// the transcript untouched.
    pub fn consume_frame(&mut self, frame: &SseFrame) -> Option<StreamEvent> {
        if self.termination.is_some() {
            self.ignored_after_close += 1;
            warn!(
                event = frame.kind(),
                ignored = self.ignored_after_close,
                "frame received after stream closed; ignoring"
            );
            return None;
        }

        match parse_frame(frame) {
            ParsedFrame::Token(fragment) => {
                self.transcript.append(&fragment);
                Some(StreamEvent::Token {
                    content: self.transcript.as_str().to_string(),
                })
            }
            ParsedFrame::Step(payload) => Some(StreamEvent::Step { payload }),
            ParsedFrame::Done(payload) => {
                self.termination = Some(Termination::Done(payload.clone()));
                Some(StreamEvent::Done { payload })
            }
            ParsedFrame::Error(payload) => {
                self.termination = Some(Termination::ServerError(payload.clone()));
                Some(StreamEvent::Error { payload })
            }
            ParsedFrame::Unknown(kind) => {
                debug!(event = %kind, "ignoring unrecognized event kind");
                None
            }
            ParsedFrame::Malformed { event, reason } => {
                warn!(event = %event, reason = %reason, "malformed frame terminates stream");
                let payload = serde_json::json!({
                    "kind": "malformed_frame",
                    "event": event,
                    "message": reason,
                });
                self.termination = Some(Termination::Malformed { event, reason });
                Some(StreamEvent::Error { payload })
            }
        }
    }

    /// Text accumulated so far.
    pub fn transcript(&self) -> &Transcript {
        &self.transcript
    }

    /// Set once a terminal frame (or a malformed one) has been consumed.
    pub fn termination(&self) -> Option<&Termination> {
        self.termination.as_ref()
    }

    pub fn is_closed(&self) -> bool {
        self.termination.is_some()
    }

    /// Consumes the demultiplexer, yielding the final transcript and outcome.
    pub fn into_parts(self) -> (Transcript, Option<Termination>) {
        (self.transcript, self.termination)
    }
}
