//! # Suite Auth
//!
//! Session lifecycle and pluggable credential strategies for MCP tools that
//! call upstream services.
//!
//! ## Overview
//!
//! The suite-auth crate handles:
//! - **Sessions**: [`AuthSession`] records with expiry and usage timestamps
//! - **Storage**: the [`SessionStorage`] seam and an in-memory implementation
//! - **Providers**: the [`ProviderRegistry`] mapping auth types to strategies
//! - **Manager**: create / look up / refresh / sweep through [`SessionManager`]
//! - **API keys**: [`ApiKeyProvider`] with optional external key validation
//! - **OAuth 2.0**: [`OAuth2Provider`] for authorization-code and refresh flows
//!
//! ## Features
//!
//! - `oauth` (default): OAuth 2.0 provider support
//!
//! ## Usage
//!
//! ```rust,no_run
//! use suite_auth::{ApiKeyProvider, SessionManager, AUTH_TYPE_API_KEY};
//! use serde_json::json;
//! use std::sync::Arc;
//!
//! # async fn example() -> suite_auth::AuthResult<()> {
//! let manager = SessionManager::default();
//! manager.register_provider(Arc::new(ApiKeyProvider::new())).await?;
//!
//! let session = manager
//!     .authenticate(AUTH_TYPE_API_KEY, json!({"api_key": "k", "api_secret": "s"}))
//!     .await?;
//! assert!(session.validate_secret("s"));
//!
//! // Later: load, refresh if needed, validate.
//! let session = manager.valid_session(&session.session_id, AUTH_TYPE_API_KEY).await?;
//! # let _ = session;
//! # Ok(())
//! # }
//! ```
//!
//! Providers never write to storage. Errors for which
//! [`AuthError::requires_reauthentication`] is true mean the caller should
//! start a fresh login.

pub mod api_key;
pub mod error;
pub mod manager;
#[cfg(feature = "oauth")]
pub mod oauth;
pub mod provider;
pub mod registry;
pub mod session;
pub mod storage;

// Re-export main types
pub use api_key::{hash_secret, ApiKeyProvider, FnValidator, HttpKeyValidator, KeyCheck, KeyValidator};
pub use error::{AuthError, AuthResult};
pub use manager::SessionManager;
pub use provider::AuthProvider;
pub use registry::ProviderRegistry;
pub use session::{
    lifetime_from_secs, AuthSession, Credentials, Metadata, AUTH_TYPE_API_KEY, AUTH_TYPE_OAUTH2,
    MAX_LIFETIME_SECS,
};
pub use storage::{MemorySessionStorage, SessionStorage};

#[cfg(feature = "oauth")]
pub use oauth::{OAuth2Provider, OAuthConfig, OAuthState, OAuthTokens};
