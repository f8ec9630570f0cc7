//! Error types for authentication operations
//!
//! This module defines the errors raised while authenticating, refreshing,
//! validating and storing sessions.

use thiserror::Error;

/// Authentication error types.
///
/// Messages never include credential values.
#[derive(Debug, Error)]
pub enum AuthError {
    /// Credentials were rejected (by a validator or the upstream service)
    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    /// Authentication parameters are missing or malformed
    #[error("Invalid parameters: {0}")]
    InvalidParams(String),

    /// Session belongs to a different credential strategy
    #[error("Wrong session type: expected {expected}, found {actual}")]
    WrongSessionType {
        /// Auth type the provider handles
        expected: String,
        /// Auth type of the session
        actual: String,
    },

    /// Session cannot be refreshed (for example, no refresh token)
    #[error("Refresh unavailable: {0}")]
    RefreshUnavailable(String),

    /// Token endpoint answered with an error
    #[error("Token endpoint error ({status}): {message}")]
    TokenEndpoint {
        /// HTTP status code
        status: u16,
        /// Error description from the endpoint
        message: String,
    },

    /// Upstream request timed out
    #[error("Upstream request timed out")]
    Timeout,

    /// HTTP transport failure
    #[error("HTTP request failed: {0}")]
    Http(String),

    /// No provider registered for this auth type
    #[error("No provider registered for auth type: {0}")]
    ProviderNotFound(String),

    /// A provider for this auth type is already registered
    #[error("Provider already registered for auth type: {0}")]
    DuplicateProvider(String),

    /// No stored session with this id
    #[error("Session not found: {0}")]
    SessionNotFound(String),

    /// Session exists but is no longer usable
    #[error("Session invalid: {0}")]
    SessionInvalid(String),

    /// Session storage failure
    #[error("Storage error: {0}")]
    Storage(String),

    /// Session record could not be (de)serialized
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    ConfigError(String),
}

/// Result type for authentication operations.
pub type AuthResult<T> = Result<T, AuthError>;

impl AuthError {
    /// Whether the caller should fall back to a full login.
    ///
    /// Refresh failures and invalid sessions mean the stored credentials can
    /// no longer be used; configuration and storage problems do not.
    pub fn requires_reauthentication(&self) -> bool {
        matches!(
            self,
            AuthError::AuthenticationFailed(_)
                | AuthError::RefreshUnavailable(_)
                | AuthError::TokenEndpoint { .. }
                | AuthError::SessionNotFound(_)
                | AuthError::SessionInvalid(_)
        )
    }

    /// Check if this error should be logged at error level.
    ///
    /// Rejected credentials are expected and should not be.
    pub fn is_server_error(&self) -> bool {
        matches!(
            self,
            AuthError::Storage(_)
                | AuthError::Serialization(_)
                | AuthError::ConfigError(_)
                | AuthError::ProviderNotFound(_)
                | AuthError::DuplicateProvider(_)
        )
    }

    /// Get error code for tool responses.
    pub fn error_code(&self) -> &'static str {
        match self {
            AuthError::AuthenticationFailed(_) => "AUTHENTICATION_FAILED",
            AuthError::InvalidParams(_) => "INVALID_PARAMS",
            AuthError::WrongSessionType { .. } => "WRONG_SESSION_TYPE",
            AuthError::RefreshUnavailable(_) => "REFRESH_UNAVAILABLE",
            AuthError::TokenEndpoint { .. } => "TOKEN_ENDPOINT_ERROR",
            AuthError::Timeout => "TIMEOUT",
            AuthError::Http(_) => "HTTP_ERROR",
            AuthError::ProviderNotFound(_) => "PROVIDER_NOT_FOUND",
            AuthError::DuplicateProvider(_) => "DUPLICATE_PROVIDER",
            AuthError::SessionNotFound(_) => "SESSION_NOT_FOUND",
            AuthError::SessionInvalid(_) => "SESSION_INVALID",
            AuthError::Storage(_) => "STORAGE_ERROR",
            AuthError::Serialization(_) => "SERIALIZATION_ERROR",
            AuthError::ConfigError(_) => "CONFIG_ERROR",
        }
    }
}

impl From<reqwest::Error> for AuthError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            AuthError::Timeout
        } else {
            AuthError::Http(e.to_string())
        }
    }
}

impl From<serde_json::Error> for AuthError {
    fn from(e: serde_json::Error) -> Self {
        AuthError::Serialization(e.to_string())
    }
}
