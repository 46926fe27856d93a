use std::fmt;
use std::str::FromStr;

use crate::errors::ClientError;

/// Backend model selector.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatModel {
    Qwen,
    #[serde(rename = "deepseek")]
    DeepSeek,
}

impl ChatModel {
    /// Wire name understood by the chat endpoint.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Qwen => "qwen",
            Self::DeepSeek => "deepseek",
        }
    }

    pub fn all() -> [ChatModel; 2] {
        [Self::Qwen, Self::DeepSeek]
    }
}

impl fmt::Display for ChatModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ChatModel {
    type Err = ClientError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "qwen" => Ok(Self::Qwen),
            "deepseek" => Ok(Self::DeepSeek),
            other => Err(ClientError::Validation(format!("unknown model: {other}"))),
        }
    }
}

/// One chat send. Built by the caller per message and not mutated afterwards.
#[derive(Clone, Debug, Eq, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatRequest {
    pub message: String,
    pub model: ChatModel,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    /// Conversation to continue; the server starts a new one when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
}

impl ChatRequest {
    pub fn new(message: impl Into<String>, model: ChatModel) -> Self {
        Self {
            message: message.into(),
            model,
            user_id: None,
            session_id: None,
        }
    }

    pub fn session_id(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }

    pub fn user_id(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    /// Checks the constraints the client enforces before sending.
    pub fn validate(&self) -> Result<(), String> {
        if self.message.trim().is_empty() {
            return Err("message must not be empty".into());
        }
        if self
            .session_id
            .as_deref()
            .is_some_and(|id| id.trim().is_empty())
        {
            return Err("session id must not be blank when provided".into());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_serializes_camel_case_and_skips_absent_ids() {
        let body = serde_json::to_value(ChatRequest::new("hi", ChatModel::DeepSeek)).unwrap();
        assert_eq!(body, serde_json::json!({"message": "hi", "model": "deepseek"}));

        let body = serde_json::to_value(
            ChatRequest::new("hi", ChatModel::Qwen)
                .session_id("s-1")
                .user_id("u-1"),
        )
        .unwrap();
        assert_eq!(body["sessionId"], "s-1");
        assert_eq!(body["userId"], "u-1");
        assert_eq!(body["model"], "qwen");
    }

    #[test]
    fn model_parses_case_insensitively() {
        assert_eq!("DeepSeek".parse::<ChatModel>().unwrap(), ChatModel::DeepSeek);
        assert!("gpt".parse::<ChatModel>().is_err());
        for model in ChatModel::all() {
            assert_eq!(model.as_str().parse::<ChatModel>().unwrap(), model);
        }
    }

    #[test]
    fn validate_rejects_blank_message_and_session() {
        assert!(ChatRequest::new("  ", ChatModel::Qwen).validate().is_err());
        assert!(
            ChatRequest::new("hi", ChatModel::Qwen)
                .session_id(" ")
                .validate()
                .is_err()
        );
        assert!(ChatRequest::new("hi", ChatModel::Qwen).validate().is_ok());
    }
}
