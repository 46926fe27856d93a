//! Client side of login, registration, and token validation.

use tracing::info;

use crate::client::ChatClient;
use crate::credentials::AuthSession;
use crate::errors::{ClientError, TransportError};

const MIN_PASSWORD_LEN: usize = 6;

#[derive(Clone, Debug, Eq, PartialEq, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub device_id: Option<String>,
}

impl LoginRequest {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
            device_id: None,
        }
    }

    fn validate(&self) -> Result<(), ClientError> {
        require_credentials(&self.username, &self.password)
    }
}

#[derive(Clone, Debug, Eq, PartialEq, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterRequest {
    pub username: String,
    pub password: String,
    pub confirm_password: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub device_id: Option<String>,
}

impl RegisterRequest {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        let password = password.into();
        Self {
            username: username.into(),
            confirm_password: password.clone(),
            password,
            email: None,
            device_id: None,
        }
    }

    pub fn confirm_password(mut self, confirm: impl Into<String>) -> Self {
        self.confirm_password = confirm.into();
        self
    }

    pub fn email(mut self, email: impl Into<String>) -> Self {
        self.email = Some(email.into());
        self
    }

    fn validate(&self) -> Result<(), ClientError> {
        require_credentials(&self.username, &self.password)?;
        if self.password.chars().count() < MIN_PASSWORD_LEN {
            return Err(ClientError::Validation(format!(
                "password must be at least {MIN_PASSWORD_LEN} characters"
            )));
        }
        if self.password != self.confirm_password {
            return Err(ClientError::Validation("passwords do not match".into()));
        }
        Ok(())
    }
}

fn require_credentials(username: &str, password: &str) -> Result<(), ClientError> {
    if username.trim().is_empty() {
        return Err(ClientError::Validation("username must not be empty".into()));
    }
    if password.is_empty() {
        return Err(ClientError::Validation("password must not be empty".into()));
    }
    Ok(())
}

/// Result of `GET /auth/validate`.
#[derive(Clone, Debug, Eq, PartialEq, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenValidation {
    pub valid: bool,
    #[serde(default)]
    pub user_id: Option<String>,
}

#[derive(serde::Deserialize)]
struct ErrorBody {
    error: String,
}

/// Turns the backend's `400 {"error": ...}` replies into `ClientError::Auth`.
fn auth_failure(err: TransportError) -> ClientError {
    if let TransportError::Rejected {
        status_code: 400,
        body,
    } = &err
        && let Ok(parsed) = serde_json::from_str::<ErrorBody>(body)
    {
        return ClientError::Auth {
            message: parsed.error,
        };
    }
    ClientError::Transport(err)
}

impl ChatClient {
    /// Logs in and, when a session store is attached, remembers the session.
    pub async fn login(&self, mut request: LoginRequest) -> Result<AuthSession, ClientError> {
        request.validate()?;
        if request.device_id.is_none() {
            request.device_id = self.session.as_ref().map(|s| s.device_id().to_string());
        }
        let response = self
            .execute(self.http.post(self.config.url("/auth/login")).json(&request))
            .await
            .map_err(auth_failure)?;
        let session: AuthSession = Self::decode(response).await?;
        info!(user_id = %session.user_id, "login succeeded");
        self.remember(&session);
        Ok(session)
    }

    /// Registers a new account and remembers the returned session.
    pub async fn register(&self, mut request: RegisterRequest) -> Result<AuthSession, ClientError> {
        request.validate()?;
        if request.device_id.is_none() {
            request.device_id = self.session.as_ref().map(|s| s.device_id().to_string());
        }
        let response = self
            .execute(self.http.post(self.config.url("/auth/register")).json(&request))
            .await
            .map_err(auth_failure)?;
        let session: AuthSession = Self::decode(response).await?;
        info!(user_id = %session.user_id, "registration succeeded");
        self.remember(&session);
        Ok(session)
    }

    /// Asks the server whether the current credential is still valid.
    pub async fn validate_token(&self) -> Result<TokenValidation, ClientError> {
        let response = self
            .execute(self.http.get(self.config.url("/auth/validate")))
            .await?;
        Self::decode(response).await
    }

    /// Clears the attached session store, if any. Purely local.
    pub fn logout(&self) {
        if let Some(store) = &self.session {
            store.logout();
        }
    }

    fn remember(&self, session: &AuthSession) {
        if let Some(store) = &self.session {
            store.store(session.clone());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn register_validation_mirrors_backend_rules() {
        assert!(RegisterRequest::new("bob", "12345").validate().is_err());
        assert!(
            RegisterRequest::new("bob", "123456")
                .confirm_password("1234567")
                .validate()
                .is_err()
        );
        assert!(RegisterRequest::new("", "123456").validate().is_err());
        assert!(RegisterRequest::new("bob", "123456").validate().is_ok());
    }

    #[test]
    fn login_body_uses_camel_case_device_id() {
        let mut request = LoginRequest::new("bob", "pw");
        request.device_id = Some("d-1".into());
        let body = serde_json::to_value(&request).unwrap();
        assert_eq!(
            body,
            serde_json::json!({"username":"bob","password":"pw","deviceId":"d-1"})
        );
    }

    #[test]
    fn bad_request_with_error_body_becomes_auth_error() {
        let err = auth_failure(TransportError::Rejected {
            status_code: 400,
            body: r#"{"error":"wrong password"}"#.into(),
        });
        assert_eq!(
            err,
            ClientError::Auth {
                message: "wrong password".into()
            }
        );

        let err = auth_failure(TransportError::Rejected {
            status_code: 500,
            body: String::new(),
        });
        assert!(matches!(err, ClientError::Transport(_)));
    }
}
