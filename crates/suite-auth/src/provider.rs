//! Authentication provider capability

use crate::error::{AuthError, AuthResult};
use crate::session::AuthSession;
use async_trait::async_trait;

/// A credential strategy.
///
/// Providers turn caller parameters into a new session, replace sessions with
/// refreshed ones and judge whether a session is still usable. They never
/// touch storage; the [`SessionManager`](crate::SessionManager) persists what
/// they return.
#[async_trait]
pub trait AuthProvider: Send + Sync {
    /// Auth type tag of the sessions this provider creates.
    fn auth_type(&self) -> &str;

    /// Build a new session from strategy-specific parameters.
    async fn authenticate(&self, params: serde_json::Value) -> AuthResult<AuthSession>;

    /// Return a replacement for `session` with renewed credentials.
    ///
    /// The input is never modified.
    async fn refresh_session(&self, session: &AuthSession) -> AuthResult<AuthSession>;

    /// Whether `session` is still usable.
    async fn validate_session(&self, session: &AuthSession) -> bool;
}

/// Fail with [`AuthError::WrongSessionType`] unless `session` has the expected tag.
pub(crate) fn ensure_auth_type(session: &AuthSession, expected: &str) -> AuthResult<()> {
    if session.auth_type == expected {
        Ok(())
    } else {
        Err(AuthError::WrongSessionType {
            expected: expected.to_string(),
            actual: session.auth_type.clone(),
        })
    }
}

/// Required string parameter.
pub(crate) fn required_str<'a>(params: &'a serde_json::Value, key: &str) -> AuthResult<&'a str> {
    match params.get(key) {
        Some(serde_json::Value::String(s)) if !s.is_empty() => Ok(s.as_str()),
        Some(serde_json::Value::String(_)) | None | Some(serde_json::Value::Null) => {
            Err(AuthError::InvalidParams(format!("{} is required", key)))
        }
        Some(_) => Err(AuthError::InvalidParams(format!("{} must be a string", key))),
    }
}

/// Optional string parameter; `null` counts as absent.
pub(crate) fn optional_str<'a>(
    params: &'a serde_json::Value,
    key: &str,
) -> AuthResult<Option<&'a str>> {
    match params.get(key) {
        None | Some(serde_json::Value::Null) => Ok(None),
        Some(serde_json::Value::String(s)) => Ok(Some(s.as_str())),
        Some(_) => Err(AuthError::InvalidParams(format!("{} must be a string", key))),
    }
}

/// Optional object parameter; `null` counts as absent.
pub(crate) fn optional_object(
    params: &serde_json::Value,
    key: &str,
) -> AuthResult<Option<serde_json::Map<String, serde_json::Value>>> {
    match params.get(key) {
        None | Some(serde_json::Value::Null) => Ok(None),
        Some(serde_json::Value::Object(map)) => Ok(Some(map.clone())),
        Some(_) => Err(AuthError::InvalidParams(format!("{} must be an object", key))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parameter_helpers() {
        let params = json!({"a": "x", "b": "", "c": 3, "d": null, "m": {"k": 1}});

        assert_eq!(required_str(&params, "a").unwrap(), "x");
        assert!(matches!(
            required_str(&params, "b"),
            Err(AuthError::InvalidParams(_))
        ));
        assert!(required_str(&params, "c").is_err());
        assert!(required_str(&params, "missing").is_err());

        assert_eq!(optional_str(&params, "d").unwrap(), None);
        assert!(optional_str(&params, "c").is_err());
        assert_eq!(optional_object(&params, "m").unwrap().unwrap()["k"], 1);
        assert!(optional_object(&params, "a").is_err());
    }

    #[test]
    fn test_ensure_auth_type() {
        let session = AuthSession::new("s1", "api_key");
        assert!(ensure_auth_type(&session, "api_key").is_ok());
        assert!(matches!(
            ensure_auth_type(&session, "oauth2"),
            Err(AuthError::WrongSessionType { .. })
        ));
    }
}
