//! Streaming chat client for an SSE chat backend.
//!
//! `ChatClient::stream_chat` posts a message, consumes the `step`/`token`/
//! `done`/`error` event stream, and hands each event to a caller-supplied
//! handler. Token events carry the cumulative text so far.
//!
//! ```no_run
//! use chat_stream_client::prelude::*;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> Result<(), ClientError> {
//! let client = ChatClient::builder()
//!     .base_url("http://localhost:8080")
//!     .session_store(SessionStore::new())
//!     .build()?;
//!
//! let cancel = CancellationToken::new();
//! let request = ChatRequest::new("Say hello", ChatModel::Qwen);
//! let transcript = client
//!     .stream_chat(
//!         &request,
//!         |event| match event {
//!             StreamEvent::Token { content } => println!("{content}"),
//!             StreamEvent::Step { .. }
//!             | StreamEvent::Done { .. }
//!             | StreamEvent::Error { .. } => {}
//!         },
//!         &cancel,
//!     )
//!     .await?;
//!
//! println!("{transcript}");
//! # Ok(())
//! # }
//! ```

/// Login, registration, and token validation.
pub mod auth;
/// `ChatClient`, its builder, and the streaming transport.
pub mod client;
/// Endpoint and timeout configuration.
pub mod config;
/// Credential provider capability and the in-memory session store.
pub mod credentials;
/// Frame classification and transcript accumulation.
pub mod demux;
/// Public error types.
pub mod errors;
/// Chat request and model selector.
pub mod model;
/// Tracing subscriber setup.
pub mod observability;
/// Common imports for typical usage.
pub mod prelude;
/// History and metric endpoints.
pub mod records;
/// SSE frame decoding.
pub mod sse;
/// Events delivered to stream handlers.
pub mod stream;

pub use auth::{LoginRequest, RegisterRequest, TokenValidation};
pub use client::{ChatClient, ChatClientBuilder};
pub use config::ClientConfig;
pub use credentials::{
    AuthSession, CredentialProvider, NoCredentials, SessionStore, StaticToken, UserInfo,
};
pub use demux::{Demultiplexer, ParsedFrame, Termination, Transcript, parse_frame};
pub use errors::{ClientError, TransportError, status_message};
pub use model::{ChatModel, ChatRequest};
pub use records::{ChatMetrics, ChatRecord};
pub use sse::{SseDecoder, SseFrame};
pub use stream::{StepInfo, StreamEvent};
pub use tokio_util::sync::CancellationToken;
