//! OAuth 2.0 authentication
//!
//! Authorization-code login and refresh-token renewal against a configurable
//! authorization server. Authorize URLs are built with the `oauth2` crate;
//! token requests are plain form posts through the async `reqwest` client,
//! bounded by the configured timeout.

use crate::error::{AuthError, AuthResult};
use crate::provider::{ensure_auth_type, optional_object, optional_str, required_str, AuthProvider};
use crate::session::{AuthSession, Credentials, AUTH_TYPE_OAUTH2};
use async_trait::async_trait;
use chrono::{DateTime, Duration, TimeZone, Utc};
use oauth2::basic::BasicClient;
use oauth2::{
    AuthUrl, ClientId, ClientSecret, CsrfToken, PkceCodeChallenge, PkceCodeVerifier, RedirectUrl,
    Scope, TokenUrl,
};
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::{debug, info, warn};

/// Default token endpoint timeout in seconds.
pub const DEFAULT_TIMEOUT_SECS: u64 = 10;

/// Lifetime of an [`OAuthState`] in seconds.
pub const STATE_TTL_SECS: i64 = 600;

const MICROSOFT_AUTH_URL: &str = "https://login.microsoftonline.com/common/oauth2/v2.0/authorize";
const MICROSOFT_TOKEN_URL: &str = "https://login.microsoftonline.com/common/oauth2/v2.0/token";
const MICROSOFT_SCOPES: &[&str] = &[
    "offline_access",
    "User.Read",
    "Mail.Read",
    "Calendars.Read",
    "Files.Read",
];

fn default_timeout_secs() -> u64 {
    DEFAULT_TIMEOUT_SECS
}

/// Authorization server configuration.
#[derive(Clone, Serialize, Deserialize)]
pub struct OAuthConfig {
    /// Client ID
    pub client_id: String,

    /// Client secret
    pub client_secret: String,

    /// Authorization endpoint
    pub auth_url: String,

    /// Token endpoint
    pub token_url: String,

    /// Redirect URI registered with the server
    #[serde(default)]
    pub redirect_url: Option<String>,

    /// Scopes to request
    #[serde(default)]
    pub scopes: Vec<String>,

    /// Additional authorize URL parameters
    #[serde(default)]
    pub extra_params: HashMap<String, String>,

    /// Token endpoint timeout
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl std::fmt::Debug for OAuthConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OAuthConfig")
            .field("client_id", &self.client_id)
            .field("client_secret", &"[REDACTED]")
            .field("auth_url", &self.auth_url)
            .field("token_url", &self.token_url)
            .field("redirect_url", &self.redirect_url)
            .field("scopes", &self.scopes)
            .field("timeout_secs", &self.timeout_secs)
            .finish()
    }
}

impl OAuthConfig {
    /// Create a configuration with no scopes and no redirect URI.
    pub fn new(
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
        auth_url: impl Into<String>,
        token_url: impl Into<String>,
    ) -> Self {
        Self {
            client_id: client_id.into(),
            client_secret: client_secret.into(),
            auth_url: auth_url.into(),
            token_url: token_url.into(),
            redirect_url: None,
            scopes: Vec::new(),
            extra_params: HashMap::new(),
            timeout_secs: DEFAULT_TIMEOUT_SECS,
        }
    }

    /// Microsoft identity platform (common tenant) with mail, calendar and file read scopes.
    pub fn microsoft(
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
        redirect_url: impl Into<String>,
    ) -> Self {
        Self::new(client_id, client_secret, MICROSOFT_AUTH_URL, MICROSOFT_TOKEN_URL)
            .with_redirect_url(redirect_url)
            .with_scopes(MICROSOFT_SCOPES.iter().copied())
    }

    /// Set the redirect URI.
    pub fn with_redirect_url(mut self, redirect_url: impl Into<String>) -> Self {
        self.redirect_url = Some(redirect_url.into());
        self
    }

    /// Replace the requested scopes.
    pub fn with_scopes<I, S>(mut self, scopes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.scopes = scopes.into_iter().map(Into::into).collect();
        self
    }

    /// Add an authorize URL parameter.
    pub fn with_extra_param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.extra_params.insert(key.into(), value.into());
        self
    }

    /// Set the token endpoint timeout.
    pub fn with_timeout_secs(mut self, timeout_secs: u64) -> Self {
        self.timeout_secs = timeout_secs;
        self
    }

    /// Space-separated scope string.
    pub fn scope(&self) -> Option<String> {
        if self.scopes.is_empty() {
            None
        } else {
            Some(self.scopes.join(" "))
        }
    }
}

fn default_token_type() -> String {
    "Bearer".to_string()
}

/// Token endpoint response.
#[derive(Clone, Serialize, Deserialize)]
pub struct OAuthTokens {
    /// Access token
    pub access_token: String,

    /// Token type
    #[serde(default = "default_token_type")]
    pub token_type: String,

    /// Lifetime in seconds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_in: Option<i64>,

    /// Absolute expiry, seconds since the epoch
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<i64>,

    /// Refresh token
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,

    /// OpenID Connect ID token
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id_token: Option<String>,

    /// Granted scopes
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
}

impl std::fmt::Debug for OAuthTokens {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OAuthTokens")
            .field("token_type", &self.token_type)
            .field("expires_in", &self.expires_in)
            .field("expires_at", &self.expires_at)
            .field("has_refresh_token", &self.refresh_token.is_some())
            .field("scope", &self.scope)
            .finish()
    }
}

impl OAuthTokens {
    /// Expiry instant. `expires_in` wins over `expires_at`.
    ///
    /// A non-positive `expires_in` yields a token that is already expired.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::TokenEndpoint`] if the endpoint sent a lifetime or
    /// timestamp outside the representable range.
    pub fn expiry(&self) -> AuthResult<Option<DateTime<Utc>>> {
        match (self.expires_in, self.expires_at) {
            (Some(seconds), _) => Duration::try_seconds(seconds)
                .and_then(|lifetime| Utc::now().checked_add_signed(lifetime))
                .map(Some)
                .ok_or_else(|| {
                    malformed_token_response(format!("expires_in out of range: {}", seconds))
                }),
            (None, Some(epoch)) => Utc
                .timestamp_opt(epoch, 0)
                .single()
                .map(Some)
                .ok_or_else(|| {
                    malformed_token_response(format!("expires_at out of range: {}", epoch))
                }),
            (None, None) => Ok(None),
        }
    }
}

/// Error for a successful token response whose body cannot be used.
fn malformed_token_response(message: String) -> AuthError {
    AuthError::TokenEndpoint {
        status: StatusCode::OK.as_u16(),
        message,
    }
}

#[derive(Debug, Deserialize)]
struct TokenErrorBody {
    error: Option<String>,
    error_description: Option<String>,
}

/// CSRF state (and optional PKCE verifier) for one authorization round trip.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OAuthState {
    /// Random state value
    pub state: String,

    /// PKCE code verifier
    pub code_verifier: Option<String>,

    /// Creation time
    pub created_at: DateTime<Utc>,
}

fn random_string(len: usize) -> String {
    use rand::Rng;
    rand::thread_rng()
        .sample_iter(&rand::distributions::Alphanumeric)
        .take(len)
        .map(char::from)
        .collect()
}

impl OAuthState {
    /// Fresh state without PKCE.
    pub fn new() -> Self {
        Self {
            state: random_string(32),
            code_verifier: None,
            created_at: Utc::now(),
        }
    }

    /// Fresh state with a PKCE verifier.
    pub fn with_pkce() -> Self {
        Self {
            code_verifier: Some(random_string(64)),
            ..Self::new()
        }
    }

    /// S256 code challenge for the verifier.
    pub fn code_challenge(&self) -> Option<String> {
        use base64::Engine;
        use sha2::{Digest, Sha256};

        self.code_verifier.as_ref().map(|verifier| {
            let hash = Sha256::digest(verifier.as_bytes());
            base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(hash)
        })
    }

    /// Whether the state is older than ten minutes at `now`.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now - self.created_at > Duration::seconds(STATE_TTL_SECS)
    }

    /// Whether the state is older than ten minutes.
    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Utc::now())
    }
}

impl Default for OAuthState {
    fn default() -> Self {
        Self::new()
    }
}

/// OAuth 2.0 credential strategy.
#[derive(Debug, Clone)]
pub struct OAuth2Provider {
    config: OAuthConfig,
    client: Client,
}

impl OAuth2Provider {
    /// Create a provider for `config`.
    pub fn new(config: OAuthConfig) -> AuthResult<Self> {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| AuthError::ConfigError(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self { config, client })
    }

    /// The provider configuration.
    pub fn config(&self) -> &OAuthConfig {
        &self.config
    }

    /// Authorize URL the user should be sent to.
    pub fn authorization_url(&self, state: &OAuthState) -> AuthResult<String> {
        let auth_url = AuthUrl::new(self.config.auth_url.clone())
            .map_err(|e| AuthError::ConfigError(format!("Invalid authorization URL: {}", e)))?;
        let token_url = TokenUrl::new(self.config.token_url.clone())
            .map_err(|e| AuthError::ConfigError(format!("Invalid token URL: {}", e)))?;

        let mut client = BasicClient::new(
            ClientId::new(self.config.client_id.clone()),
            Some(ClientSecret::new(self.config.client_secret.clone())),
            auth_url,
            Some(token_url),
        );
        if let Some(redirect) = &self.config.redirect_url {
            let redirect = RedirectUrl::new(redirect.clone())
                .map_err(|e| AuthError::ConfigError(format!("Invalid redirect URL: {}", e)))?;
            client = client.set_redirect_uri(redirect);
        }

        let csrf = state.state.clone();
        let mut request = client.authorize_url(move || CsrfToken::new(csrf));
        for scope in &self.config.scopes {
            request = request.add_scope(Scope::new(scope.clone()));
        }
        if let Some(verifier) = &state.code_verifier {
            let verifier = PkceCodeVerifier::new(verifier.clone());
            request = request.set_pkce_challenge(PkceCodeChallenge::from_code_verifier_sha256(
                &verifier,
            ));
        }
        for (key, value) in &self.config.extra_params {
            request = request.add_extra_param(key.as_str(), value.as_str());
        }

        let (url, _) = request.url();
        Ok(url.to_string())
    }

    async fn token_request(&self, form: &[(&str, &str)]) -> AuthResult<OAuthTokens> {
        let response = self
            .client
            .post(&self.config.token_url)
            .header("Accept", "application/json")
            .form(form)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<TokenErrorBody>(&body)
                .ok()
                .and_then(|e| e.error_description.or(e.error))
                .unwrap_or_else(|| {
                    status
                        .canonical_reason()
                        .unwrap_or("token request failed")
                        .to_string()
                });
            warn!(status = status.as_u16(), message = %message, "Token endpoint returned error");
            return Err(AuthError::TokenEndpoint {
                status: status.as_u16(),
                message,
            });
        }

        Ok(response.json::<OAuthTokens>().await?)
    }

    /// Exchange an authorization code for tokens.
    pub async fn exchange_code(
        &self,
        code: &str,
        code_verifier: Option<&str>,
    ) -> AuthResult<OAuthTokens> {
        let mut form = vec![
            ("grant_type", "authorization_code"),
            ("code", code),
            ("client_id", self.config.client_id.as_str()),
            ("client_secret", self.config.client_secret.as_str()),
        ];
        if let Some(redirect) = &self.config.redirect_url {
            form.push(("redirect_uri", redirect.as_str()));
        }
        if let Some(verifier) = code_verifier {
            form.push(("code_verifier", verifier));
        }

        self.token_request(&form).await
    }

    /// Exchange a refresh token for new tokens.
    pub async fn refresh_tokens(&self, refresh_token: &str) -> AuthResult<OAuthTokens> {
        let mut form = vec![
            ("grant_type", "refresh_token"),
            ("refresh_token", refresh_token),
            ("client_id", self.config.client_id.as_str()),
            ("client_secret", self.config.client_secret.as_str()),
        ];
        let scope = self.config.scope();
        if let Some(scope) = &scope {
            form.push(("scope", scope.as_str()));
        }

        self.token_request(&form).await
    }
}

#[async_trait]
impl AuthProvider for OAuth2Provider {
    fn auth_type(&self) -> &str {
        AUTH_TYPE_OAUTH2
    }

    async fn authenticate(&self, params: serde_json::Value) -> AuthResult<AuthSession> {
        let code = required_str(&params, "code")?;
        let code_verifier = optional_str(&params, "code_verifier")?;
        let metadata = optional_object(&params, "metadata")?.unwrap_or_default();

        let tokens = self.exchange_code(code, code_verifier).await.map_err(|e| match e {
            AuthError::TokenEndpoint { message, .. } => AuthError::AuthenticationFailed(message),
            other => other,
        })?;

        let session = AuthSession::from_token_response(AuthSession::generate_id(), &tokens)
            .map_err(|e| AuthError::AuthenticationFailed(e.to_string()))?
            .with_metadata(metadata);
        info!(session_id = %session.session_id, "Created OAuth2 session");
        Ok(session)
    }

    async fn refresh_session(&self, session: &AuthSession) -> AuthResult<AuthSession> {
        ensure_auth_type(session, AUTH_TYPE_OAUTH2)?;
        let refresh_token = session
            .refresh_token()
            .ok_or_else(|| AuthError::RefreshUnavailable("session has no refresh token".into()))?;

        let mut tokens = self.refresh_tokens(refresh_token).await?;
        if tokens.refresh_token.is_none() {
            tokens.refresh_token = Some(refresh_token.to_string());
        }

        let mut refreshed = AuthSession::from_token_response(session.session_id.clone(), &tokens)?
            .with_metadata(session.metadata.clone());
        refreshed.created_at = session.created_at;

        info!(session_id = %session.session_id, "Refreshed OAuth2 session");
        Ok(refreshed)
    }

    async fn validate_session(&self, session: &AuthSession) -> bool {
        if session.auth_type != AUTH_TYPE_OAUTH2 {
            return false;
        }
        if !session.is_expired() {
            return !session.access_token().is_empty();
        }

        debug!(session_id = %session.session_id, "OAuth2 session expired");
        if session.refresh_token().is_none() {
            return false;
        }
        match self.refresh_session(session).await {
            Ok(_) => true,
            Err(e) => {
                warn!(session_id = %session.session_id, error = %e, "Refresh during validation failed");
                false
            }
        }
    }
}

/// OAuth2 accessors.
impl AuthSession {
    /// Build an OAuth2 session from a token response.
    ///
    /// # Errors
    ///
    /// Fails like [`OAuthTokens::expiry`].
    pub fn from_token_response(
        session_id: impl Into<String>,
        tokens: &OAuthTokens,
    ) -> AuthResult<Self> {
        let mut credentials = Credentials::new();
        credentials.insert("access_token".into(), tokens.access_token.clone().into());
        credentials.insert("token_type".into(), tokens.token_type.clone().into());
        if let Some(refresh_token) = &tokens.refresh_token {
            credentials.insert("refresh_token".into(), refresh_token.clone().into());
        }
        if let Some(scope) = &tokens.scope {
            credentials.insert("scope".into(), scope.clone().into());
        }
        if let Some(id_token) = &tokens.id_token {
            credentials.insert("id_token".into(), id_token.clone().into());
        }

        Ok(AuthSession::new(session_id, AUTH_TYPE_OAUTH2)
            .with_credentials(credentials)
            .with_expires_at(tokens.expiry()?))
    }

    /// Access token, empty if none.
    pub fn access_token(&self) -> &str {
        self.credential_str("access_token").unwrap_or_default()
    }

    /// Refresh token.
    pub fn refresh_token(&self) -> Option<&str> {
        self.credential_str("refresh_token")
            .filter(|token| !token.is_empty())
    }

    /// Token type, `Bearer` if unset.
    pub fn token_type(&self) -> &str {
        self.credential_str("token_type").unwrap_or("Bearer")
    }

    /// Granted scopes.
    pub fn scope(&self) -> Option<&str> {
        self.credential_str("scope")
    }

    /// `Authorization` header value.
    pub fn authorization_header(&self) -> String {
        format!("{} {}", self.token_type(), self.access_token())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tokens(json: serde_json::Value) -> OAuthTokens {
        serde_json::from_value(json).unwrap()
    }

    #[test]
    fn test_microsoft_preset() {
        let config = OAuthConfig::microsoft("id", "s3cr3t", "http://localhost/callback");
        assert_eq!(config.token_url, MICROSOFT_TOKEN_URL);
        assert_eq!(
            config.scope().as_deref(),
            Some("offline_access User.Read Mail.Read Calendars.Read Files.Read")
        );
        assert_eq!(config.timeout_secs, DEFAULT_TIMEOUT_SECS);
        assert!(!format!("{:?}", config).contains("s3cr3t"));
    }

    #[test]
    fn test_token_defaults() {
        let parsed = tokens(serde_json::json!({"access_token": "a"}));
        assert_eq!(parsed.token_type, "Bearer");
        assert!(parsed.expiry().unwrap().is_none());
    }

    #[test]
    fn test_expires_in_wins() {
        let parsed = tokens(serde_json::json!({
            "access_token": "a",
            "expires_in": 3600,
            "expires_at": 0
        }));
        let expiry = parsed.expiry().unwrap().unwrap();
        assert!(expiry > Utc::now() + Duration::minutes(59));

        let parsed = tokens(serde_json::json!({"access_token": "a", "expires_at": 1_700_000_000}));
        assert_eq!(parsed.expiry().unwrap().unwrap().timestamp(), 1_700_000_000);
    }

    #[test]
    fn test_out_of_range_expiry_is_endpoint_error() {
        for body in [
            serde_json::json!({"access_token": "a", "expires_in": i64::MAX}),
            serde_json::json!({"access_token": "a", "expires_in": 10_000_000_000_000i64}),
            serde_json::json!({"access_token": "a", "expires_at": i64::MAX}),
        ] {
            let parsed = tokens(body);
            assert!(matches!(
                parsed.expiry(),
                Err(AuthError::TokenEndpoint { status: 200, .. })
            ));
            assert!(AuthSession::from_token_response("s1", &parsed).is_err());
        }

        let already_expired = tokens(serde_json::json!({"access_token": "a", "expires_in": -60}));
        assert!(AuthSession::from_token_response("s1", &already_expired)
            .unwrap()
            .is_expired());
    }

    #[test]
    fn test_from_token_response() {
        let session = AuthSession::from_token_response(
            "s1",
            &tokens(serde_json::json!({
                "access_token": "a",
                "token_type": "Bearer",
                "refresh_token": "r",
                "scope": "User.Read",
                "expires_in": 60
            })),
        )
        .unwrap();

        assert_eq!(session.session_id, "s1");
        assert_eq!(session.auth_type, AUTH_TYPE_OAUTH2);
        assert_eq!(session.access_token(), "a");
        assert_eq!(session.refresh_token(), Some("r"));
        assert_eq!(session.scope(), Some("User.Read"));
        assert_eq!(session.authorization_header(), "Bearer a");
        assert!(!session.is_expired());
    }

    #[test]
    fn test_oauth_state() {
        let state = OAuthState::new();
        assert_eq!(state.state.len(), 32);
        assert!(state.code_challenge().is_none());
        assert!(!state.is_expired());
        assert!(state.is_expired_at(state.created_at + Duration::seconds(STATE_TTL_SECS + 1)));

        let pkce = OAuthState::with_pkce();
        assert_eq!(pkce.code_verifier.as_ref().map(String::len), Some(64));
        assert_ne!(pkce.state, state.state);
    }

    #[test]
    fn test_authorization_url() {
        let provider = OAuth2Provider::new(
            OAuthConfig::microsoft("client-1", "secret", "http://localhost/callback")
                .with_extra_param("prompt", "consent"),
        )
        .unwrap();
        let state = OAuthState::with_pkce();

        let url = provider.authorization_url(&state).unwrap();
        assert!(url.starts_with(MICROSOFT_AUTH_URL));
        assert!(url.contains("response_type=code"));
        assert!(url.contains("client_id=client-1"));
        assert!(url.contains(&format!("state={}", state.state)));
        assert!(url.contains("prompt=consent"));
        assert!(url.contains("code_challenge_method=S256"));
        assert!(url.contains(&format!("code_challenge={}", state.code_challenge().unwrap())));
        assert!(!url.contains("secret"));
    }

    #[test]
    fn test_invalid_auth_url() {
        let provider =
            OAuth2Provider::new(OAuthConfig::new("id", "secret", "not a url", "also not")).unwrap();
        assert!(matches!(
            provider.authorization_url(&OAuthState::new()),
            Err(AuthError::ConfigError(_))
        ));
    }

    #[tokio::test]
    async fn test_refresh_requires_token() {
        let provider =
            OAuth2Provider::new(OAuthConfig::new("id", "secret", MICROSOFT_AUTH_URL, MICROSOFT_TOKEN_URL))
                .unwrap();
        let session =
            AuthSession::from_token_response("s1", &tokens(serde_json::json!({"access_token": "a"})))
                .unwrap();

        assert!(matches!(
            provider.refresh_session(&session).await,
            Err(AuthError::RefreshUnavailable(_))
        ));
        assert!(matches!(
            provider
                .refresh_session(&AuthSession::new("s2", "api_key"))
                .await,
            Err(AuthError::WrongSessionType { .. })
        ));
    }

    #[tokio::test]
    async fn test_validate_without_network() {
        let provider =
            OAuth2Provider::new(OAuthConfig::new("id", "secret", MICROSOFT_AUTH_URL, MICROSOFT_TOKEN_URL))
                .unwrap();
        let live =
            AuthSession::from_token_response("s1", &tokens(serde_json::json!({"access_token": "a"})))
                .unwrap();
        assert!(provider.validate_session(&live).await);

        let expired = live
            .clone()
            .with_expires_at(Some(Utc::now() - Duration::seconds(1)));
        assert!(!provider.validate_session(&expired).await);

        assert!(!provider.validate_session(&AuthSession::new("x", "api_key")).await);
    }
}
