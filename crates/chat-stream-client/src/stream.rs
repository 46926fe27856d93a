use serde_json::Value;

/// Events delivered to a `stream_chat` handler, in arrival order.
///
/// Exactly one terminal event (`Done` or `Error`) is delivered per stream and
/// nothing follows it.
#[derive(Clone, Debug, PartialEq)]
pub enum StreamEvent {
    /// Intermediate reasoning or tool-use notification.
    Step { payload: Value },
    /// Output so far: the *cumulative* transcript, not the latest fragment.
    Token { content: String },
    /// Terminal success marker.
    Done { payload: Value },
    /// Terminal failure marker with server-reported (or malformed-frame) detail.
    Error { payload: Value },
}

impl StreamEvent {
    /// Returns true for `Done` and `Error`.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done { .. } | Self::Error { .. })
    }

    /// Typed view of a `Step` payload, when it has the backend's step shape.
    pub fn step_info(&self) -> Option<StepInfo> {
        match self {
            Self::Step { payload } => serde_json::from_value(payload.clone()).ok(),
            _ => None,
        }
    }
}

/// Progress notice emitted by the chat backend while it routes a message.
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct StepInfo {
    /// Pipeline node, for example `intent_recognition` or `rag`.
    pub node: String,
    /// `processing` or `complete`.
    pub status: String,
    /// Human-readable progress text.
    pub message: String,
    /// Classified intent, present once recognition completes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub intent: Option<String>,
}

impl StepInfo {
    pub fn is_complete(&self) -> bool {
        self.status == "complete"
    }
}
