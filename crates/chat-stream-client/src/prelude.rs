//! Common imports for typical client usage.
pub use crate::{
    CancellationToken, ChatClient, ChatModel, ChatRequest, ClientConfig, ClientError,
    CredentialProvider, SessionStore, StreamEvent, Transcript, TransportError,
};
