use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt as _;
use reqwest::StatusCode;
use reqwest::header::ACCEPT;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::ClientConfig;
use crate::credentials::{CredentialProvider, NoCredentials, SessionStore};
use crate::demux::{Demultiplexer, Termination, Transcript};
use crate::errors::{ClientError, TransportError};
use crate::model::ChatRequest;
use crate::sse::SseDecoder;
use crate::stream::StreamEvent;

const CHAT_PATH: &str = "/chat";

/// HTTP client for the chat backend.
///
/// Cheap to clone. Concurrent `stream_chat` calls share only the connection
/// pool; each owns its transcript and cancellation token.
#[derive(Clone)]
pub struct ChatClient {
    pub(crate) http: reqwest::Client,
    pub(crate) config: ClientConfig,
    pub(crate) credentials: Arc<dyn CredentialProvider>,
    pub(crate) session: Option<SessionStore>,
}

impl fmt::Debug for ChatClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChatClient")
            .field("config", &self.config)
            .field("has_session_store", &self.session.is_some())
            .finish_non_exhaustive()
    }
}

impl ChatClient {
    pub fn builder() -> ChatClientBuilder {
        ChatClientBuilder::default()
    }

    /// Builds an anonymous client from `CHAT_API_*` environment variables.
    pub fn from_env() -> Result<Self, ClientError> {
        Self::builder().config(ClientConfig::from_env()?).build()
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Session store attached at build time, if any.
    pub fn session_store(&self) -> Option<&SessionStore> {
        self.session.as_ref()
    }

    /// Sends `request` and streams the reply, invoking `on_event` per event.
    ///
    /// Resolves with the final transcript after a `done` frame. Every other
    /// ending is a `TransportError`; those raised mid-stream carry the partial
    /// transcript. `on_event` is never invoked once cancellation is observed.
    pub async fn stream_chat<F>(
        &self,
        request: &ChatRequest,
        mut on_event: F,
        cancel: &CancellationToken,
    ) -> Result<Transcript, TransportError>
    where
        F: FnMut(StreamEvent),
    {
        request.validate().map_err(TransportError::invalid)?;
        if cancel.is_cancelled() {
            return Err(TransportError::Cancelled {
                transcript: Transcript::default(),
            });
        }

        // Credential lookups, the send, and any rejection body all race the token.
        let response = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                debug!("chat stream cancelled before the first frame");
                return Err(TransportError::Cancelled { transcript: Transcript::default() });
            }
            opened = self.open_stream(request) => opened?,
        };

        consume_stream(response.bytes_stream(), &mut on_event, cancel).await
    }

    /// `stream_chat` bounded by `deadline`.
    ///
    /// Expiry cancels a child of `cancel`, so it surfaces as `Cancelled` with
    /// the transcript accumulated so far.
    pub async fn stream_chat_with_deadline<F>(
        &self,
        request: &ChatRequest,
        on_event: F,
        cancel: &CancellationToken,
        deadline: Duration,
    ) -> Result<Transcript, TransportError>
    where
        F: FnMut(StreamEvent),
    {
        let scoped = cancel.child_token();
        let timer = scoped.clone();
        let _stop_timer = scoped.clone().drop_guard();
        tokio::spawn(async move {
            tokio::select! {
                _ = tokio::time::sleep(deadline) => {
                    info!(?deadline, "chat stream deadline elapsed");
                    timer.cancel();
                }
                _ = timer.cancelled() => {}
            }
        });
        self.stream_chat(request, on_event, &scoped).await
    }

    /// Non-streaming fallback: waits for the whole reply.
    pub async fn send_chat_message(
        &self,
        request: &ChatRequest,
    ) -> Result<Transcript, TransportError> {
        self.stream_chat(request, |_| {}, &CancellationToken::new())
            .await
    }

    async fn open_stream(
        &self,
        request: &ChatRequest,
    ) -> Result<reqwest::Response, TransportError> {
        let body = self.resolve_request(request).await;
        debug!(
            model = %body.model,
            session_id = body.session_id.as_deref().unwrap_or("-"),
            "opening chat stream"
        );
        let response = self
            .authorize(self.http.post(self.config.url(CHAT_PATH)))
            .await
            .header(ACCEPT, "text/event-stream")
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                warn!(error = %e, "chat request did not reach the server");
                TransportError::network(format!("chat request failed: {e}"), Transcript::default())
            })?;
        self.check_status(response).await
    }

    async fn resolve_request(&self, request: &ChatRequest) -> ChatRequest {
        let mut body = request.clone();
        if body.user_id.is_none() {
            body.user_id = self.credentials.user_id().await;
        }
        body
    }

    pub(crate) async fn authorize(&self, req: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match self.credentials.bearer_token().await {
            Some(token) => req.bearer_auth(token),
            None => req,
        }
    }

    pub(crate) async fn check_status(
        &self,
        response: reqwest::Response,
    ) -> Result<reqwest::Response, TransportError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        if status == StatusCode::UNAUTHORIZED {
            self.credentials.on_unauthorized();
        }
        let body = response
            .text()
            .await
            .unwrap_or_else(|_| "<unreadable body>".to_string());
        warn!(
            status = status.as_u16(),
            url = %self.config.base_url,
            "chat backend rejected request"
        );
        Err(TransportError::Rejected {
            status_code: status.as_u16(),
            body,
        })
    }

    /// Sends a non-streaming request with the configured request timeout.
    pub(crate) async fn execute(
        &self,
        req: reqwest::RequestBuilder,
    ) -> Result<reqwest::Response, TransportError> {
        let req = self.authorize(req).await.timeout(self.config.request_timeout);
        let response = req.send().await.map_err(|e| {
            TransportError::network(format!("request failed: {e}"), Transcript::default())
        })?;
        self.check_status(response).await
    }

    pub(crate) async fn decode<T: serde::de::DeserializeOwned>(
        response: reqwest::Response,
    ) -> Result<T, ClientError> {
        response
            .json::<T>()
            .await
            .map_err(|e| ClientError::Decode(e.to_string()))
    }
}

/// Drives one byte stream through the decoder and demultiplexer.
///
/// Cancellation is checked at every read and before every dispatch.
pub(crate) async fn consume_stream<S, B, E, F>(
    bytes: S,
    on_event: &mut F,
    cancel: &CancellationToken,
) -> Result<Transcript, TransportError>
where
    S: futures::Stream<Item = Result<B, E>>,
    B: AsRef<[u8]>,
    E: fmt::Display,
    F: FnMut(StreamEvent),
{
    let mut bytes = std::pin::pin!(bytes);
    let mut decoder = SseDecoder::default();
    let mut demux = Demultiplexer::new();

    loop {
        let next = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(cancelled(demux)),
            next = bytes.next() => next,
        };

        let (frames, ended) = match next {
            Some(Ok(chunk)) => (decoder.push_chunk(chunk.as_ref()), false),
            Some(Err(e)) => {
                warn!(error = %e, received = demux.transcript().len(), "chat stream read failed");
                let (transcript, _) = demux.into_parts();
                return Err(TransportError::network(
                    format!("stream read failed: {e}"),
                    transcript,
                ));
            }
            None => (decoder.finish().into_iter().collect(), true),
        };

        for frame in frames {
            if cancel.is_cancelled() {
                return Err(cancelled(demux));
            }
            if let Some(event) = demux.consume_frame(&frame) {
                on_event(event);
            }
            if demux.is_closed() {
                return conclude(demux);
            }
        }

        if ended {
            return conclude(demux);
        }
    }
}

fn cancelled(demux: Demultiplexer) -> TransportError {
    let (transcript, _) = demux.into_parts();
    debug!(received = transcript.len(), "chat stream cancelled");
    TransportError::Cancelled { transcript }
}

fn conclude(demux: Demultiplexer) -> Result<Transcript, TransportError> {
    let (transcript, termination) = demux.into_parts();
    match termination {
        Some(Termination::Done(_)) => {
            debug!(received = transcript.len(), "chat stream completed");
            Ok(transcript)
        }
        Some(Termination::ServerError(payload)) => {
            Err(TransportError::ServerError { payload, transcript })
        }
        Some(Termination::Malformed { event, reason }) => Err(TransportError::MalformedFrame {
            event,
            reason,
            transcript,
        }),
        None => Err(TransportError::network(
            "stream closed before a terminal event",
            transcript,
        )),
    }
}

/// Builder for `ChatClient`.
#[derive(Default)]
pub struct ChatClientBuilder {
    config: Option<ClientConfig>,
    credentials: Option<Arc<dyn CredentialProvider>>,
    session: Option<SessionStore>,
}

impl ChatClientBuilder {
    pub fn config(mut self, config: ClientConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Shorthand for `config(ClientConfig::new(base_url))`.
    pub fn base_url(self, base_url: impl Into<String>) -> Self {
        self.config(ClientConfig::new(base_url))
    }

    /// Sets the credential source. Overrides any earlier `session_store`.
    pub fn credentials(mut self, credentials: Arc<dyn CredentialProvider>) -> Self {
        self.credentials = Some(credentials);
        self
    }

    /// Uses `store` both as credential source and as the target of login/register.
    pub fn session_store(mut self, store: SessionStore) -> Self {
        self.credentials = Some(Arc::new(store.clone()));
        self.session = Some(store);
        self
    }

    pub fn build(self) -> Result<ChatClient, ClientError> {
        let config = self.config.unwrap_or_default();
        config.validate()?;
        let http = reqwest::Client::builder()
            .connect_timeout(config.connect_timeout)
            .build()
            .map_err(|e| ClientError::Config(format!("failed to build HTTP client: {e}")))?;
        Ok(ChatClient {
            http,
            config,
            credentials: self.credentials.unwrap_or_else(|| Arc::new(NoCredentials)),
            session: self.session,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ChatModel;
    use futures::StreamExt as _;
    use futures::stream;

    type Chunk = Result<&'static [u8], std::io::Error>;

    fn ok(bytes: &'static [u8]) -> Chunk {
        Ok(bytes)
    }

    const HELLO: &[u8] = b"event: step\ndata: {\"tool\":\"search\"}\n\n\
event: token\ndata: {\"content\":\"Hel\"}\n\n\
event: token\ndata: {\"content\":\"lo\"}\n\n";

    async fn drive(
        chunks: Vec<Chunk>,
        cancel: &CancellationToken,
    ) -> (Vec<StreamEvent>, Result<Transcript, TransportError>) {
        let mut events = Vec::new();
        let mut on_event = |e: StreamEvent| events.push(e);
        let result = consume_stream(stream::iter(chunks), &mut on_event, cancel).await;
        (events, result)
    }

    #[tokio::test]
    async fn done_frame_resolves_with_concatenated_tokens() {
        let (events, result) = drive(
            vec![ok(HELLO), ok(b"event: done\ndata: {}\n\n")],
            &CancellationToken::new(),
        )
        .await;
        assert_eq!(result.expect("transcript"), "Hello");
        assert_eq!(events.len(), 4);
        assert!(matches!(events[0], StreamEvent::Step { .. }));
        assert_eq!(
            events[2],
            StreamEvent::Token {
                content: "Hello".into()
            }
        );
        assert!(matches!(events[3], StreamEvent::Done { .. }));
    }

    #[tokio::test]
    async fn frames_after_done_in_same_chunk_are_not_delivered() {
        let (events, result) = drive(
            vec![ok(b"event: done\ndata: {}\n\nevent: token\ndata: {\"content\":\"x\"}\n\n")],
            &CancellationToken::new(),
        )
        .await;
        assert_eq!(result.expect("transcript"), "");
        assert_eq!(events.len(), 1);
    }

    #[tokio::test]
    async fn unterminated_final_frame_is_flushed_at_end_of_stream() {
        let (_, result) = drive(
            vec![ok(HELLO), ok(b"event: done\ndata: {}")],
            &CancellationToken::new(),
        )
        .await;
        assert_eq!(result.expect("transcript"), "Hello");
    }

    #[tokio::test]
    async fn server_error_frame_keeps_partial_transcript() {
        let (events, result) = drive(
            vec![ok(HELLO), ok(b"event: error\ndata: {\"message\":\"boom\"}\n\n")],
            &CancellationToken::new(),
        )
        .await;
        assert!(matches!(events.last(), Some(StreamEvent::Error { .. })));
        match result {
            Err(TransportError::ServerError { payload, transcript }) => {
                assert_eq!(payload["message"], "boom");
                assert_eq!(transcript, "Hello");
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[tokio::test]
    async fn malformed_frame_after_two_tokens_returns_partial_transcript() {
        let (_, result) = drive(
            vec![ok(HELLO), ok(b"event: token\ndata: {oops\n\n")],
            &CancellationToken::new(),
        )
        .await;
        match result {
            Err(TransportError::MalformedFrame {
                event, transcript, ..
            }) => {
                assert_eq!(event, "token");
                assert_eq!(transcript, "Hello");
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[tokio::test]
    async fn read_failure_and_early_eof_are_network_unavailable() {
        let (_, result) = drive(
            vec![ok(HELLO), Err(std::io::Error::other("reset"))],
            &CancellationToken::new(),
        )
        .await;
        assert!(matches!(
            result,
            Err(TransportError::NetworkUnavailable { ref transcript, .. }) if *transcript == "Hello"
        ));

        let (_, result) = drive(vec![ok(HELLO)], &CancellationToken::new()).await;
        assert!(matches!(
            result,
            Err(TransportError::NetworkUnavailable { .. })
        ));
    }

    #[tokio::test]
    async fn cancel_before_first_frame_yields_empty_transcript() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let (events, result) = drive(vec![ok(HELLO)], &cancel).await;
        assert!(events.is_empty());
        assert_eq!(
            result,
            Err(TransportError::Cancelled {
                transcript: Transcript::default()
            })
        );
    }

    #[tokio::test]
    async fn cancel_from_handler_stops_delivery_mid_chunk() {
        let cancel = CancellationToken::new();
        let handler_cancel = cancel.clone();
        let mut events = Vec::new();
        let chunks: Vec<Chunk> = vec![
            ok(HELLO),
            ok(b"event: token\ndata: {\"content\":\"!\"}\n\n"),
        ];
        let result = consume_stream(
            stream::iter(chunks).chain(stream::pending()),
            &mut |event: StreamEvent| {
                if let StreamEvent::Token { content } = &event
                    && content == "Hel"
                {
                    handler_cancel.cancel();
                }
                events.push(event);
            },
            &cancel,
        )
        .await;
        assert_eq!(events.len(), 2);
        match result {
            Err(TransportError::Cancelled { transcript }) => assert_eq!(transcript, "Hel"),
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[tokio::test]
    async fn cancel_while_waiting_for_bytes_returns_promptly() {
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            trigger.cancel();
        });
        let (events, result) = {
            let mut events = Vec::new();
            let chunks: Vec<Chunk> = vec![ok(HELLO)];
            let result = consume_stream(
                stream::iter(chunks).chain(stream::pending()),
                &mut |e: StreamEvent| events.push(e),
                &cancel,
            )
            .await;
            (events, result)
        };
        assert_eq!(events.len(), 3);
        assert!(matches!(
            result,
            Err(TransportError::Cancelled { ref transcript }) if *transcript == "Hello"
        ));
    }

    #[tokio::test]
    async fn stream_chat_refuses_blank_message_and_pre_cancelled_token() {
        let client = ChatClient::builder()
            .base_url("http://127.0.0.1:9")
            .build()
            .expect("client");
        let err = client
            .stream_chat(
                &ChatRequest::new(" ", ChatModel::Qwen),
                |_| panic!("no events expected"),
                &CancellationToken::new(),
            )
            .await
            .expect_err("blank message");
        assert!(matches!(err, TransportError::InvalidRequest { .. }));

        let cancel = CancellationToken::new();
        cancel.cancel();
        let err = client
            .stream_chat(
                &ChatRequest::new("hi", ChatModel::Qwen),
                |_| panic!("no events expected"),
                &cancel,
            )
            .await
            .expect_err("cancelled");
        assert!(err.is_cancelled());
        assert_eq!(err.transcript().map(Transcript::as_str), Some(""));
    }

    #[test]
    fn builder_rejects_invalid_base_url() {
        let err = ChatClient::builder().base_url("localhost").build().unwrap_err();
        assert!(matches!(err, ClientError::Config(_)));
    }
}
