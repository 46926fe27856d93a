use crate::demux::Transcript;

/// Outcome of a stream that did not end with a `done` frame.
///
/// Variants raised after streaming began carry the partial transcript so no
/// output is lost.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum TransportError {
    /// No response reached the client, or the connection dropped before a
    /// terminal frame. Safe for the caller to retry.
    #[error("network unavailable: {message}")]
    NetworkUnavailable {
        message: String,
        transcript: Transcript,
    },
    /// Server answered with a non-success status before streaming began.
    #[error("request rejected with status {status_code}")]
    Rejected { status_code: u16, body: String },
    /// Caller cancelled the stream (directly or through a deadline).
    #[error("stream cancelled")]
    Cancelled { transcript: Transcript },
    /// A frame violated the event contract; the stream was terminated.
    #[error("malformed `{event}` frame: {reason}")]
    MalformedFrame {
        event: String,
        reason: String,
        transcript: Transcript,
    },
    /// Server reported a failure through an `error` frame.
    #[error("server reported error: {}", server_message(.payload))]
    ServerError {
        payload: serde_json::Value,
        transcript: Transcript,
    },
    /// Request was refused locally before any I/O.
    #[error("invalid request: {reason}")]
    InvalidRequest { reason: String },
}

fn server_message(payload: &serde_json::Value) -> String {
    payload
        .get("message")
        .and_then(|v| v.as_str())
        .map(ToOwned::to_owned)
        .unwrap_or_else(|| payload.to_string())
}

impl TransportError {
    pub(crate) fn network(message: impl Into<String>, transcript: Transcript) -> Self {
        Self::NetworkUnavailable {
            message: message.into(),
            transcript,
        }
    }

    pub(crate) fn invalid(reason: impl Into<String>) -> Self {
        Self::InvalidRequest {
            reason: reason.into(),
        }
    }

    /// Partial output accumulated before the failure, if streaming had begun.
    pub fn transcript(&self) -> Option<&Transcript> {
        match self {
            Self::NetworkUnavailable { transcript, .. }
            | Self::Cancelled { transcript }
            | Self::MalformedFrame { transcript, .. }
            | Self::ServerError { transcript, .. } => Some(transcript),
            Self::Rejected { .. } | Self::InvalidRequest { .. } => None,
        }
    }

    /// Caller-initiated cancellation is an outcome, not a system fault.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled { .. })
    }

    /// Status code for `Rejected`.
    pub fn status_code(&self) -> Option<u16> {
        match self {
            Self::Rejected { status_code, .. } => Some(*status_code),
            _ => None,
        }
    }

    /// Short message suitable for showing to an end user.
    pub fn user_message(&self) -> String {
        match self {
            Self::Rejected { status_code, .. } => status_message(*status_code),
            Self::NetworkUnavailable { .. } => {
                "Cannot connect to server, please check network".to_string()
            }
            Self::Cancelled { .. } => "Request cancelled".to_string(),
            Self::MalformedFrame { .. } => "Received an invalid response from server".to_string(),
            Self::ServerError { payload, .. } => server_message(payload),
            Self::InvalidRequest { reason } => reason.clone(),
        }
    }
}

/// Maps an HTTP status to the message shown for a rejected request.
pub fn status_message(status_code: u16) -> String {
    match status_code {
        400 => "Bad request parameters".to_string(),
        401 => "Unauthorized, please login again".to_string(),
        403 => "Access denied".to_string(),
        404 => "Resource not found".to_string(),
        500 => "Internal server error".to_string(),
        502 => "Bad gateway".to_string(),
        503 => "Service unavailable".to_string(),
        other => format!("Request failed ({other})"),
    }
}

/// Top-level error for configuration, auth, and history calls.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ClientError {
    /// Invalid client configuration.
    #[error("config error: {0}")]
    Config(String),
    /// Invalid caller input.
    #[error("validation error: {0}")]
    Validation(String),
    /// Response body did not have the expected shape.
    #[error("decode error: {0}")]
    Decode(String),
    /// Server refused a login or registration.
    #[error("authentication failed: {message}")]
    Auth { message: String },
    #[error(transparent)]
    Transport(TransportError),
}

impl From<TransportError> for ClientError {
    fn from(value: TransportError) -> Self {
        ClientError::Transport(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transcript_is_exposed_only_for_mid_stream_outcomes() {
        let partial = Transcript::default();
        assert!(
            TransportError::Cancelled {
                transcript: partial.clone()
            }
            .transcript()
            .is_some()
        );
        assert!(
            TransportError::Rejected {
                status_code: 500,
                body: String::new()
            }
            .transcript()
            .is_none()
        );
    }

    #[test]
    fn user_message_maps_known_and_unknown_statuses() {
        let rejected = |status_code| TransportError::Rejected {
            status_code,
            body: String::new(),
        };
        assert_eq!(rejected(401).user_message(), "Unauthorized, please login again");
        assert_eq!(rejected(418).user_message(), "Request failed (418)");
    }

    #[test]
    fn server_error_display_prefers_message_field() {
        let err = TransportError::ServerError {
            payload: serde_json::json!({"message": "quota exceeded"}),
            transcript: Transcript::default(),
        };
        assert_eq!(err.to_string(), "server reported error: quota exceeded");
    }
}
