//! Chat history and token-metric endpoints.

use chrono::NaiveDateTime;
use tracing::debug;

use crate::client::ChatClient;
use crate::errors::ClientError;
use crate::model::ChatRequest;

/// One stored message, as returned by the history endpoints.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatRecord {
    #[serde(default)]
    pub id: Option<i64>,
    pub user_id: String,
    pub session_id: String,
    /// `user` or `assistant`.
    pub role: String,
    pub content: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub tokens: Option<u32>,
    #[serde(default)]
    pub create_time: Option<NaiveDateTime>,
}

impl ChatRecord {
    pub fn is_assistant(&self) -> bool {
        self.role == "assistant"
    }
}

/// Reply plus token usage from `POST /chat/chatWithMetric`.
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatMetrics {
    pub content: String,
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    pub total_tokens: u64,
}

fn require_id(name: &str, value: &str) -> Result<(), ClientError> {
    if value.trim().is_empty() {
        return Err(ClientError::Validation(format!("{name} must not be empty")));
    }
    Ok(())
}

impl ChatClient {
    /// All stored messages for `user_id`, oldest first as the server orders them.
    pub async fn chat_history(&self, user_id: &str) -> Result<Vec<ChatRecord>, ClientError> {
        require_id("user id", user_id)?;
        let response = self
            .execute(
                self.http
                    .get(self.config.url("/chat/history"))
                    .query(&[("userId", user_id)]),
            )
            .await?;
        let records: Vec<ChatRecord> = Self::decode(response).await?;
        debug!(user_id, count = records.len(), "fetched chat history");
        Ok(records)
    }

    /// Stored messages of one conversation.
    pub async fn chat_history_by_session(
        &self,
        user_id: &str,
        session_id: &str,
    ) -> Result<Vec<ChatRecord>, ClientError> {
        require_id("user id", user_id)?;
        require_id("session id", session_id)?;
        let response = self
            .execute(
                self.http
                    .get(self.config.url(&format!("/chat/history/{}", session_id.trim())))
                    .query(&[("userId", user_id)]),
            )
            .await?;
        Self::decode(response).await
    }

    /// Deletes every stored message of `session_id`.
    pub async fn delete_conversation(&self, session_id: &str) -> Result<(), ClientError> {
        require_id("session id", session_id)?;
        self.execute(
            self.http
                .delete(self.config.url(&format!("/chat/conversations/{}", session_id.trim()))),
        )
        .await?;
        debug!(session_id, "conversation deleted");
        Ok(())
    }

    /// Single-response chat that also reports token usage.
    pub async fn chat_with_metric(
        &self,
        request: &ChatRequest,
    ) -> Result<ChatMetrics, ClientError> {
        request.validate().map_err(ClientError::Validation)?;
        let response = self
            .execute(
                self.http
                    .post(self.config.url("/chat/chatWithMetric"))
                    .json(request),
            )
            .await?;
        Self::decode(response).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_deserializes_backend_shape() {
        let record: ChatRecord = serde_json::from_value(serde_json::json!({
            "id": 7,
            "userId": "u-1",
            "sessionId": "s-1",
            "role": "assistant",
            "content": "hi",
            "model": "qwen",
            "tokens": null,
            "createTime": "2025-03-01T10:15:30"
        }))
        .expect("record");
        assert!(record.is_assistant());
        assert_eq!(record.tokens, None);
        assert_eq!(
            record.create_time.map(|t| t.to_string()),
            Some("2025-03-01 10:15:30".to_string())
        );
    }

    #[test]
    fn metrics_use_camel_case_fields() {
        let metrics: ChatMetrics = serde_json::from_str(
            r#"{"content":"ok","promptTokens":3,"completionTokens":1,"totalTokens":4}"#,
        )
        .expect("metrics");
        assert_eq!(metrics.total_tokens, 4);
    }

    #[tokio::test]
    async fn blank_ids_are_refused_locally() {
        let client = ChatClient::builder()
            .base_url("http://127.0.0.1:9")
            .build()
            .expect("client");
        assert!(matches!(
            client.delete_conversation("  ").await,
            Err(ClientError::Validation(_))
        ));
        assert!(matches!(
            client.chat_history("").await,
            Err(ClientError::Validation(_))
        ));
    }
}
