//! Session lifecycle management
//!
//! The [`SessionManager`] sits between providers and storage. It never keeps
//! a session beyond a single call: every operation loads from storage, acts,
//! and writes back, so storage stays the single source of truth.
//!
//! Write-backs after a provider call go through the conditional storage
//! operations. A session deleted while a refresh is in flight stays deleted,
//! and the sweeper re-checks expiry at the moment of removal.

use crate::error::{AuthError, AuthResult};
use crate::provider::AuthProvider;
use crate::registry::ProviderRegistry;
use crate::session::{AuthSession, Credentials, Metadata};
use crate::storage::{MemorySessionStorage, SessionStorage};
use chrono::{Duration, Utc};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument, warn};

/// Creates, looks up, refreshes and sweeps sessions.
#[derive(Clone)]
pub struct SessionManager {
    storage: Arc<dyn SessionStorage>,
    providers: Arc<ProviderRegistry>,
}

impl std::fmt::Debug for SessionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionManager").finish_non_exhaustive()
    }
}

impl Default for SessionManager {
    fn default() -> Self {
        Self::new(Arc::new(MemorySessionStorage::new()))
    }
}

impl SessionManager {
    /// Create a manager over `storage` with no providers registered.
    pub fn new(storage: Arc<dyn SessionStorage>) -> Self {
        Self::with_providers(storage, Arc::new(ProviderRegistry::new()))
    }

    /// Create a manager over `storage` that resolves providers through `providers`.
    pub fn with_providers(
        storage: Arc<dyn SessionStorage>,
        providers: Arc<ProviderRegistry>,
    ) -> Self {
        Self { storage, providers }
    }

    /// The underlying storage.
    pub fn storage(&self) -> &Arc<dyn SessionStorage> {
        &self.storage
    }

    /// The provider registry.
    pub fn providers(&self) -> &Arc<ProviderRegistry> {
        &self.providers
    }

    /// Register a provider for its auth type.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::DuplicateProvider`] if the auth type is taken.
    pub async fn register_provider(&self, provider: Arc<dyn AuthProvider>) -> AuthResult<()> {
        self.providers.register(provider).await
    }

    /// Create and persist a session with a fresh id.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::InvalidParams`] if `expires_in` is not a positive,
    /// representable lifetime.
    #[instrument(skip(self, credentials, metadata))]
    pub async fn create_session(
        &self,
        auth_type: &str,
        expires_in: Option<Duration>,
        credentials: Credentials,
        metadata: Option<Metadata>,
    ) -> AuthResult<AuthSession> {
        let mut session = AuthSession::new(AuthSession::generate_id(), auth_type)
            .with_credentials(credentials)
            .with_metadata(metadata.unwrap_or_default());
        if let Some(lifetime) = expires_in {
            session = session.with_expires_in(lifetime)?;
        }

        self.storage.save(session.clone()).await?;
        info!(session_id = %session.session_id, "Created session");
        Ok(session)
    }

    /// Look up a session and mark it used.
    pub async fn get_session(&self, session_id: &str) -> AuthResult<Option<AuthSession>> {
        let session = self.storage.touch(session_id, Utc::now()).await?;
        if session.is_none() {
            debug!(session_id = %session_id, "Session not found");
        }
        Ok(session)
    }

    /// Delete a session. Returns whether it existed.
    pub async fn delete_session(&self, session_id: &str) -> AuthResult<bool> {
        let removed = self.storage.delete(session_id).await?;
        if removed {
            info!(session_id = %session_id, "Deleted session");
        }
        Ok(removed)
    }

    /// Persist caller-supplied changes to a stored session.
    ///
    /// Returns `false` without writing if the session is no longer stored.
    pub async fn update_session(&self, session: AuthSession) -> AuthResult<bool> {
        let updated = self.storage.replace(session).await?;
        if !updated {
            debug!("Not updating unknown session");
        }
        Ok(updated)
    }

    /// Delete every expired session. Returns how many were removed.
    ///
    /// Expiry is checked again under the storage lock, so a session renewed
    /// after the scan started is kept.
    pub async fn clean_expired_sessions(&self) -> AuthResult<usize> {
        let now = Utc::now();
        let expired = |session: &AuthSession| session.is_expired_at(now);

        let mut removed = 0;
        for session in self.storage.list_all().await? {
            if expired(&session) && self.storage.delete_if(&session.session_id, &expired).await? {
                removed += 1;
            }
        }

        if removed > 0 {
            info!(count = removed, "Removed expired sessions");
        }
        Ok(removed)
    }

    /// Authenticate through the provider for `auth_type` and persist the new session.
    #[instrument(skip(self, params))]
    pub async fn authenticate(
        &self,
        auth_type: &str,
        params: serde_json::Value,
    ) -> AuthResult<AuthSession> {
        let provider = self.providers.require(auth_type).await?;
        let session = provider.authenticate(params).await?;
        self.storage.save(session.clone()).await?;
        info!(session_id = %session.session_id, "Authenticated session");
        Ok(session)
    }

    /// Refresh a stored session through its provider and persist the replacement.
    ///
    /// On failure the stored session is left as it was. If the session is
    /// deleted while the provider is working, the replacement is discarded
    /// and [`AuthError::SessionNotFound`] is returned.
    #[instrument(skip(self))]
    pub async fn refresh_session(&self, session_id: &str) -> AuthResult<AuthSession> {
        let session = self.load_existing(session_id).await?;
        let provider = self.providers.require(&session.auth_type).await?;
        self.refresh_loaded(&session, provider.as_ref()).await
    }

    /// Load a session and make sure it is usable.
    ///
    /// Expired sessions are refreshed (and the replacement persisted) before
    /// the provider validates them. Any error means the caller has to
    /// authenticate again.
    pub async fn valid_session(&self, session_id: &str, auth_type: &str) -> AuthResult<AuthSession> {
        let stored = self.load_existing(session_id).await?;
        if stored.auth_type != auth_type {
            return Err(AuthError::WrongSessionType {
                expected: auth_type.to_string(),
                actual: stored.auth_type,
            });
        }
        let provider = self.providers.require(auth_type).await?;

        let session = if stored.is_expired() {
            debug!(session_id = %session_id, "Session expired, refreshing");
            self.refresh_loaded(&stored, provider.as_ref()).await?
        } else {
            stored
        };

        if !provider.validate_session(&session).await {
            return Err(AuthError::SessionInvalid(session_id.to_string()));
        }

        self.storage
            .touch(session_id, Utc::now())
            .await?
            .ok_or_else(|| AuthError::SessionNotFound(session_id.to_string()))
    }

    /// The best stored session of `auth_type`, made valid.
    ///
    /// Unexpired sessions win over expired ones; among equals the most
    /// recently used is picked.
    pub async fn session_for(&self, auth_type: &str) -> AuthResult<AuthSession> {
        let now = Utc::now();
        let best = self
            .storage
            .list_all()
            .await?
            .into_iter()
            .filter(|s| s.auth_type == auth_type)
            .max_by_key(|s| (!s.is_expired_at(now), s.last_used_at))
            .ok_or_else(|| AuthError::SessionNotFound(format!("no {} session", auth_type)))?;

        self.valid_session(&best.session_id, auth_type).await
    }

    /// Run [`clean_expired_sessions`](Self::clean_expired_sessions) every `interval`.
    ///
    /// The first sweep happens one interval after the call. Abort the returned
    /// handle to stop sweeping.
    pub fn spawn_sweeper(&self, interval: std::time::Duration) -> JoinHandle<()> {
        let manager = self.clone();
        tokio::spawn(async move {
            let start = tokio::time::Instant::now() + interval;
            let mut ticker = tokio::time::interval_at(start, interval);
            loop {
                ticker.tick().await;
                if let Err(e) = manager.clean_expired_sessions().await {
                    warn!(error = %e, "Session sweep failed");
                }
            }
        })
    }

    async fn load_existing(&self, session_id: &str) -> AuthResult<AuthSession> {
        self.storage
            .load(session_id)
            .await?
            .ok_or_else(|| AuthError::SessionNotFound(session_id.to_string()))
    }

    async fn refresh_loaded(
        &self,
        session: &AuthSession,
        provider: &dyn AuthProvider,
    ) -> AuthResult<AuthSession> {
        let refreshed = match provider.refresh_session(session).await {
            Ok(refreshed) => refreshed,
            Err(e) => {
                warn!(session_id = %session.session_id, error = %e, "Session refresh failed");
                return Err(e);
            }
        };

        if !self.storage.replace(refreshed.clone()).await? {
            warn!(session_id = %session.session_id, "Session removed during refresh");
            return Err(AuthError::SessionNotFound(session.session_id.clone()));
        }
        info!(session_id = %session.session_id, "Refreshed session");
        Ok(refreshed)
    }
}
