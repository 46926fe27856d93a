//! Credential capability handed to the client instead of ambient storage.

use std::sync::{Arc, RwLock};

use tracing::info;

/// Source of the bearer token (and user id) attached to outgoing requests.
///
/// Absence of a token is legal: requests go out unauthenticated and the server
/// decides whether to reject them.
#[async_trait::async_trait]
pub trait CredentialProvider: Send + Sync {
    /// Token for the `Authorization: Bearer` header, if any.
    async fn bearer_token(&self) -> Option<String>;

    /// User id to attach when the request does not carry one.
    async fn user_id(&self) -> Option<String> {
        None
    }

    /// Called when the server answers 401.
    fn on_unauthorized(&self) {}
}

/// Always anonymous.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoCredentials;

#[async_trait::async_trait]
impl CredentialProvider for NoCredentials {
    async fn bearer_token(&self) -> Option<String> {
        None
    }
}

/// Fixed token, for scripts and tests.
#[derive(Clone, Debug)]
pub struct StaticToken(pub String);

#[async_trait::async_trait]
impl CredentialProvider for StaticToken {
    async fn bearer_token(&self) -> Option<String> {
        Some(self.0.clone()).filter(|t| !t.trim().is_empty())
    }
}

/// Identity returned by a successful login or registration.
#[derive(Clone, Debug, Eq, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthSession {
    pub token: String,
    pub user_id: String,
    pub username: String,
}

/// Non-secret identity fields of the current session.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct UserInfo {
    pub user_id: Option<String>,
    pub username: Option<String>,
}

#[derive(Debug, Default)]
struct SessionState {
    session: Option<AuthSession>,
}

/// In-memory login state plus a per-store device id.
///
/// Cheap to clone; clones share the same state.
#[derive(Clone, Debug)]
pub struct SessionStore {
    state: Arc<RwLock<SessionState>>,
    device_id: String,
}

impl Default for SessionStore {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionStore {
    pub fn new() -> Self {
        Self::with_device_id(uuid::Uuid::new_v4().to_string())
    }

    /// Reuses a device id remembered by the caller.
    pub fn with_device_id(device_id: impl Into<String>) -> Self {
        Self {
            state: Arc::new(RwLock::new(SessionState::default())),
            device_id: device_id.into(),
        }
    }

    pub fn device_id(&self) -> &str {
        &self.device_id
    }

    pub fn store(&self, session: AuthSession) {
        info!(user_id = %session.user_id, username = %session.username, "session stored");
        self.write().session = Some(session);
    }

    /// Forgets the token and user identity. The device id is kept.
    pub fn logout(&self) {
        if self.write().session.take().is_some() {
            info!("session cleared");
        }
    }

    pub fn is_authenticated(&self) -> bool {
        self.read().session.is_some()
    }

    pub fn token(&self) -> Option<String> {
        self.read().session.as_ref().map(|s| s.token.clone())
    }

    pub fn user_info(&self) -> UserInfo {
        match &self.read().session {
            Some(s) => UserInfo {
                user_id: Some(s.user_id.clone()),
                username: Some(s.username.clone()),
            },
            None => UserInfo::default(),
        }
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, SessionState> {
        self.state.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, SessionState> {
        self.state
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait::async_trait]
impl CredentialProvider for SessionStore {
    async fn bearer_token(&self) -> Option<String> {
        self.token()
    }

    async fn user_id(&self) -> Option<String> {
        self.user_info().user_id
    }

    fn on_unauthorized(&self) {
        self.logout();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session() -> AuthSession {
        AuthSession {
            token: "jwt".into(),
            user_id: "u-1".into(),
            username: "alice".into(),
        }
    }

    #[tokio::test]
    async fn store_exposes_token_and_user_id() {
        let store = SessionStore::new();
        assert!(!store.is_authenticated());
        assert_eq!(store.bearer_token().await, None);

        store.store(session());
        assert!(store.is_authenticated());
        assert_eq!(store.bearer_token().await.as_deref(), Some("jwt"));
        assert_eq!(store.user_id().await.as_deref(), Some("u-1"));
        assert_eq!(store.user_info().username.as_deref(), Some("alice"));
    }

    #[tokio::test]
    async fn unauthorized_clears_session_but_keeps_device_id() {
        let store = SessionStore::with_device_id("device-1");
        let shared = store.clone();
        store.store(session());
        shared.on_unauthorized();
        assert!(!store.is_authenticated());
        assert_eq!(store.user_info(), UserInfo::default());
        assert_eq!(store.device_id(), "device-1");
    }

    #[tokio::test]
    async fn static_token_ignores_blank_values() {
        assert_eq!(StaticToken(" ".into()).bearer_token().await, None);
        assert_eq!(
            StaticToken("t".into()).bearer_token().await.as_deref(),
            Some("t")
        );
        assert_eq!(NoCredentials.user_id().await, None);
    }
}
