//! API-key authentication
//!
//! Sessions created here carry the raw key and, when a secret is supplied,
//! both the secret (for services that need it transmitted) and its SHA-256
//! hash (for later comparison). An optional [`KeyValidator`] checks the pair
//! with an external authority at login and on every validation.

use crate::error::{AuthError, AuthResult};
use crate::provider::{ensure_auth_type, optional_object, optional_str, required_str, AuthProvider};
use crate::session::{lifetime_from_secs, AuthSession, Credentials, AUTH_TYPE_API_KEY};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use sha2::{Digest, Sha256};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Lowercase hex SHA-256 of `secret`.
pub fn hash_secret(secret: &str) -> String {
    format!("{:x}", Sha256::digest(secret.as_bytes()))
}

/// Outcome of an external key check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyCheck {
    /// Whether the key (and secret) were accepted
    pub valid: bool,
    /// Reason for rejection
    pub error: Option<String>,
}

impl KeyCheck {
    /// Accepted.
    pub fn valid() -> Self {
        Self {
            valid: true,
            error: None,
        }
    }

    /// Rejected with a reason.
    pub fn invalid(reason: impl Into<String>) -> Self {
        Self {
            valid: false,
            error: Some(reason.into()),
        }
    }
}

/// External authority for API keys.
#[async_trait]
pub trait KeyValidator: Send + Sync {
    /// Check a key and optional secret.
    async fn check(&self, api_key: &str, api_secret: Option<&str>) -> KeyCheck;
}

/// [`KeyValidator`] backed by a closure.
pub struct FnValidator<F> {
    check: F,
}

impl<F> FnValidator<F>
where
    F: Fn(&str, Option<&str>) -> KeyCheck + Send + Sync,
{
    /// Wrap `check`.
    pub fn new(check: F) -> Self {
        Self { check }
    }
}

#[async_trait]
impl<F> KeyValidator for FnValidator<F>
where
    F: Fn(&str, Option<&str>) -> KeyCheck + Send + Sync,
{
    async fn check(&self, api_key: &str, api_secret: Option<&str>) -> KeyCheck {
        (self.check)(api_key, api_secret)
    }
}

/// Validates token-id/secret pairs against a BookStack-style API.
///
/// Sends `GET {base_url}/api/books` with `Authorization: Token {key}:{secret}`.
#[derive(Debug, Clone)]
pub struct HttpKeyValidator {
    base_url: String,
    client: Client,
}

impl HttpKeyValidator {
    /// Create a validator for the service at `base_url`.
    pub fn new(base_url: impl Into<String>, timeout: std::time::Duration) -> AuthResult<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| AuthError::ConfigError(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client,
        })
    }

    /// Probe URL.
    pub fn probe_url(&self) -> String {
        format!("{}/api/books", self.base_url)
    }
}

#[async_trait]
impl KeyValidator for HttpKeyValidator {
    async fn check(&self, api_key: &str, api_secret: Option<&str>) -> KeyCheck {
        let Some(secret) = api_secret.filter(|s| !s.is_empty()) else {
            return KeyCheck::invalid("an API secret is required");
        };

        let response = self
            .client
            .get(self.probe_url())
            .header("Authorization", format!("Token {}:{}", api_key, secret))
            .header("Accept", "application/json")
            .send()
            .await;

        match response {
            Ok(response) => match response.status() {
                StatusCode::OK => KeyCheck::valid(),
                StatusCode::UNAUTHORIZED => KeyCheck::invalid("invalid authentication"),
                status => KeyCheck::invalid(format!("unexpected status code {}", status.as_u16())),
            },
            Err(e) => {
                debug!(error = %e, "Key probe request failed");
                KeyCheck::invalid(format!("connection error: {}", e))
            }
        }
    }
}

/// API-key credential strategy.
#[derive(Clone, Default)]
pub struct ApiKeyProvider {
    validator: Option<Arc<dyn KeyValidator>>,
}

impl std::fmt::Debug for ApiKeyProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiKeyProvider")
            .field("has_validator", &self.validator.is_some())
            .finish()
    }
}

impl ApiKeyProvider {
    /// Provider that accepts any key.
    pub fn new() -> Self {
        Self::default()
    }

    /// Provider that checks keys with `validator`.
    pub fn with_validator(validator: Arc<dyn KeyValidator>) -> Self {
        Self {
            validator: Some(validator),
        }
    }
}

#[async_trait]
impl AuthProvider for ApiKeyProvider {
    fn auth_type(&self) -> &str {
        AUTH_TYPE_API_KEY
    }

    async fn authenticate(&self, params: serde_json::Value) -> AuthResult<AuthSession> {
        let api_key = required_str(&params, "api_key")?;
        let api_secret = optional_str(&params, "api_secret")?.filter(|s| !s.is_empty());
        let key_id = optional_str(&params, "key_id")?;
        let metadata = optional_object(&params, "metadata")?.unwrap_or_default();
        let lifetime = match params.get("expires_in") {
            None | Some(serde_json::Value::Null) => None,
            Some(value) => {
                let seconds = value.as_i64().ok_or_else(|| {
                    AuthError::InvalidParams("expires_in must be an integer".to_string())
                })?;
                Some(lifetime_from_secs(seconds)?)
            }
        };

        if let Some(validator) = &self.validator {
            let check = validator.check(api_key, api_secret).await;
            if !check.valid {
                let reason = check.error.unwrap_or_else(|| "rejected".to_string());
                warn!(reason = %reason, "API key rejected");
                return Err(AuthError::AuthenticationFailed(format!(
                    "Invalid API key: {}",
                    reason
                )));
            }
        }

        let mut credentials = Credentials::new();
        credentials.insert("api_key".into(), api_key.into());
        if let Some(secret) = api_secret {
            credentials.insert("api_secret_hash".into(), hash_secret(secret).into());
            credentials.insert("api_secret".into(), secret.into());
        }
        if let Some(key_id) = key_id {
            credentials.insert("key_id".into(), key_id.into());
        }

        let mut session = AuthSession::new(AuthSession::generate_id(), AUTH_TYPE_API_KEY)
            .with_credentials(credentials)
            .with_metadata(metadata);
        if let Some(lifetime) = lifetime {
            session = session.with_expires_in(lifetime)?;
        }

        info!(session_id = %session.session_id, "Created API key session");
        Ok(session)
    }

    async fn refresh_session(&self, session: &AuthSession) -> AuthResult<AuthSession> {
        ensure_auth_type(session, AUTH_TYPE_API_KEY)?;
        // Keys do not rotate; nothing to renew.
        Ok(session.clone())
    }

    async fn validate_session(&self, session: &AuthSession) -> bool {
        if session.auth_type != AUTH_TYPE_API_KEY {
            return false;
        }
        if session.is_expired() {
            debug!(session_id = %session.session_id, "API key session expired");
            return false;
        }

        match &self.validator {
            Some(validator) => {
                let check = validator
                    .check(session.api_key(), session.api_secret())
                    .await;
                if !check.valid {
                    debug!(session_id = %session.session_id, "API key no longer accepted");
                }
                check.valid
            }
            None => true,
        }
    }
}

/// API-key accessors.
impl AuthSession {
    /// Stored API key, empty if none.
    pub fn api_key(&self) -> &str {
        self.credential_str("api_key").unwrap_or_default()
    }

    /// Stored API secret.
    pub fn api_secret(&self) -> Option<&str> {
        self.credential_str("api_secret")
    }

    /// Stored key id.
    pub fn key_id(&self) -> Option<&str> {
        self.credential_str("key_id")
    }

    /// Compare `secret` against the stored hash. False when no hash is stored.
    pub fn validate_secret(&self, secret: &str) -> bool {
        match self.credential_str("api_secret_hash") {
            Some(stored) => stored == hash_secret(secret),
            None => false,
        }
    }

    /// Request headers carrying the key (and secret, if present).
    pub fn api_key_headers(&self) -> Vec<(&'static str, String)> {
        let mut headers = vec![("X-API-Key", self.api_key().to_string())];
        if let Some(secret) = self.api_secret() {
            headers.push(("X-API-Secret", secret.to_string()));
        }
        headers
    }

    /// Query parameters carrying the key (and secret, if present).
    pub fn api_key_query(&self) -> Vec<(&'static str, String)> {
        let mut query = vec![("api_key", self.api_key().to_string())];
        if let Some(secret) = self.api_secret() {
            query.push(("api_secret", secret.to_string()));
        }
        query
    }
}
