//! Authentication sessions
//!
//! An [`AuthSession`] bundles the credentials one provider strategy produced
//! with expiry, usage timestamps and free-form metadata. Sessions are plain
//! data: providers create and replace them, storage owns them, and the
//! session manager moves them between the two.

use crate::error::{AuthError, AuthResult};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Strategy-specific credential values (tokens, keys, hashes).
pub type Credentials = serde_json::Map<String, serde_json::Value>;

/// Free-form session metadata.
pub type Metadata = serde_json::Map<String, serde_json::Value>;

/// Auth type tag for OAuth2 sessions.
pub const AUTH_TYPE_OAUTH2: &str = "oauth2";

/// Auth type tag for API-key sessions.
pub const AUTH_TYPE_API_KEY: &str = "api_key";

/// Longest lifetime accepted for a new session: ten years, in seconds.
pub const MAX_LIFETIME_SECS: i64 = 10 * 365 * 24 * 60 * 60;

/// Turn a caller-supplied lifetime in seconds into a [`Duration`].
///
/// # Errors
///
/// Returns [`AuthError::InvalidParams`] unless `seconds` is in
/// `1..=MAX_LIFETIME_SECS`.
pub fn lifetime_from_secs(seconds: i64) -> AuthResult<Duration> {
    if !(1..=MAX_LIFETIME_SECS).contains(&seconds) {
        return Err(AuthError::InvalidParams(format!(
            "expires_in must be between 1 and {} seconds, got {}",
            MAX_LIFETIME_SECS, seconds
        )));
    }
    Duration::try_seconds(seconds)
        .ok_or_else(|| AuthError::InvalidParams(format!("expires_in out of range: {}", seconds)))
}

/// An authenticated context for one credential strategy.
///
/// `expires_at == None` means the session never expires.
#[derive(Clone, PartialEq, Serialize, Deserialize)]
pub struct AuthSession {
    /// Opaque unique id
    pub session_id: String,

    /// Strategy tag ("oauth2", "api_key", ...)
    pub auth_type: String,

    /// Expiry instant
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,

    /// Strategy-specific credentials
    #[serde(default)]
    pub credentials: Credentials,

    /// Free-form metadata
    #[serde(default)]
    pub metadata: Metadata,

    /// Creation time
    pub created_at: DateTime<Utc>,

    /// Last successful lookup
    pub last_used_at: DateTime<Utc>,
}

impl std::fmt::Debug for AuthSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let keys: Vec<&String> = self.credentials.keys().collect();
        f.debug_struct("AuthSession")
            .field("session_id", &self.session_id)
            .field("auth_type", &self.auth_type)
            .field("expires_at", &self.expires_at)
            .field("credentials", &format_args!("[REDACTED] {:?}", keys))
            .field("metadata", &self.metadata)
            .field("created_at", &self.created_at)
            .field("last_used_at", &self.last_used_at)
            .finish()
    }
}

impl AuthSession {
    /// Create a session with no credentials that never expires.
    pub fn new(session_id: impl Into<String>, auth_type: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            session_id: session_id.into(),
            auth_type: auth_type.into(),
            expires_at: None,
            credentials: Credentials::new(),
            metadata: Metadata::new(),
            created_at: now,
            last_used_at: now,
        }
    }

    /// Generate a fresh session id (UUID v7, time ordered).
    pub fn generate_id() -> String {
        Uuid::now_v7().to_string()
    }

    /// Set the expiry instant.
    pub fn with_expires_at(mut self, expires_at: Option<DateTime<Utc>>) -> Self {
        self.expires_at = expires_at;
        self
    }

    /// Expire `lifetime` from now.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::InvalidParams`] if `lifetime` is not positive or
    /// the expiry instant is past the representable range.
    pub fn with_expires_in(mut self, lifetime: Duration) -> AuthResult<Self> {
        if lifetime <= Duration::zero() {
            return Err(AuthError::InvalidParams(
                "session lifetime must be positive".to_string(),
            ));
        }
        let expires_at = Utc::now().checked_add_signed(lifetime).ok_or_else(|| {
            AuthError::InvalidParams("session lifetime is out of range".to_string())
        })?;
        self.expires_at = Some(expires_at);
        Ok(self)
    }

    /// Set the credentials.
    pub fn with_credentials(mut self, credentials: Credentials) -> Self {
        self.credentials = credentials;
        self
    }

    /// Set the metadata.
    pub fn with_metadata(mut self, metadata: Metadata) -> Self {
        self.metadata = metadata;
        self
    }

    /// Whether the session is expired at `now` (strictly after `expires_at`).
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        match self.expires_at {
            Some(expires_at) => now > expires_at,
            None => false,
        }
    }

    /// Whether the session is expired now.
    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Utc::now())
    }

    /// Remaining lifetime; `None` if the session never expires.
    ///
    /// Negative once expired.
    pub fn expires_in(&self) -> Option<Duration> {
        self.expires_at.map(|at| at - Utc::now())
    }

    /// Mark the session as used now.
    pub fn update_last_used(&mut self) {
        self.last_used_at = Utc::now();
    }

    /// String credential by key.
    pub fn credential_str(&self, key: &str) -> Option<&str> {
        self.credentials.get(key).and_then(|v| v.as_str())
    }

    /// Serialize into a JSON record.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::Serialization`](crate::AuthError::Serialization) on failure.
    pub fn to_value(&self) -> AuthResult<serde_json::Value> {
        Ok(serde_json::to_value(self)?)
    }

    /// Rebuild a session from a JSON record produced by [`to_value`](Self::to_value).
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::Serialization`](crate::AuthError::Serialization) if
    /// required fields are missing or timestamps do not parse.
    pub fn from_value(value: serde_json::Value) -> AuthResult<Self> {
        Ok(serde_json::from_value(value)?)
    }
}
