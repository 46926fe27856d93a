//! Incremental `text/event-stream` decoding.
//!
//! Chunks coming off the wire may split a frame (or a UTF-8 sequence) at any
//! byte. Text is only decoded once a whole line has arrived.

/// Event kind implied by a frame without an `event:` field.
pub const DEFAULT_EVENT_KIND: &str = "message";

/// One decoded server-sent event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SseFrame {
    /// Value of the `event:` field, if the frame declared one.
    pub event: Option<String>,
    /// All `data:` lines joined with `\n`.
    pub data: String,
}

impl SseFrame {
    /// Builds a frame with an explicit event kind.
    pub fn new(event: impl Into<String>, data: impl Into<String>) -> Self {
        Self {
            event: Some(event.into()),
            data: data.into(),
        }
    }

    /// Declared event kind, falling back to the SSE default `message`.
    pub fn kind(&self) -> &str {
        self.event.as_deref().unwrap_or(DEFAULT_EVENT_KIND)
    }
}

/// Line-oriented SSE decoder.
///
/// Lines may end in `\n`, `\r\n`, or a bare `\r`, and a blank line closes
/// the pending frame. Each input byte is scanned once; only the unfinished
/// line is kept as raw bytes.
#[derive(Debug, Default)]
pub struct SseDecoder {
    line: Vec<u8>,
    /// The previous chunk ended on `\r`; a leading `\n` belongs to it.
    pending_cr: bool,
    event: Option<String>,
    data: Vec<String>,
}

impl SseDecoder {
    /// Feeds one network chunk and returns every frame it completed.
    pub fn push_chunk(&mut self, chunk: &[u8]) -> Vec<SseFrame> {
        let mut rest = chunk;
        if self.pending_cr && !rest.is_empty() {
            self.pending_cr = false;
            rest = rest.strip_prefix(b"\n").unwrap_or(rest);
        }

        let mut frames = Vec::new();
        while let Some(pos) = rest.iter().position(|b| matches!(b, b'\r' | b'\n')) {
            self.line.extend_from_slice(&rest[..pos]);
            let ending = rest[pos];
            rest = &rest[pos + 1..];
            if ending == b'\r' {
                match rest.first() {
                    Some(b'\n') => rest = &rest[1..],
                    Some(_) => {}
                    None => self.pending_cr = true,
                }
            }
            if let Some(frame) = self.end_line() {
                frames.push(frame);
            }
        }
        self.line.extend_from_slice(rest);
        frames
    }

    /// Flushes a trailing frame that was never terminated by a blank line.
    ///
    /// Call once the byte stream has ended.
    pub fn finish(&mut self) -> Option<SseFrame> {
        self.pending_cr = false;
        if !self.line.is_empty() {
            self.end_line();
        }
        self.dispatch()
    }

    /// Returns true when no partial frame is buffered.
    pub fn is_empty(&self) -> bool {
        self.line.is_empty() && self.event.is_none() && self.data.is_empty()
    }

    fn end_line(&mut self) -> Option<SseFrame> {
        let raw = std::mem::take(&mut self.line);
        if raw.is_empty() {
            return self.dispatch();
        }
        let line = String::from_utf8_lossy(&raw);
        if line.starts_with(':') {
            return None;
        }
        let (field, value) = match line.split_once(':') {
            Some((field, value)) => (field, value.strip_prefix(' ').unwrap_or(value)),
            None => (&*line, ""),
        };
        match field {
            "event" => self.event = Some(value.trim().to_string()),
            "data" => self.data.push(value.to_string()),
            // `id` and `retry` only drive browser reconnection.
            _ => {}
        }
        None
    }

    fn dispatch(&mut self) -> Option<SseFrame> {
        let event = self.event.take();
        let data = std::mem::take(&mut self.data);
        if event.is_none() && data.is_empty() {
            return None;
        }
        Some(SseFrame {
            event,
            data: data.join("\n"),
        })
    }
}
