//! Session storage
//!
//! [`SessionStorage`] is the persistence seam for sessions. The in-memory
//! implementation keeps sessions in a map guarded by an async lock; durable
//! backends implement the same trait.
//!
//! The conditional operations ([`replace`](SessionStorage::replace) and
//! [`delete_if`](SessionStorage::delete_if)) check and write as one step, so a
//! session deleted by one task is never written back by another.

use crate::error::AuthResult;
use crate::session::AuthSession;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::debug;

/// Keyed persistence for sessions.
///
/// Implementations must be safe to call from concurrent tasks.
#[async_trait]
pub trait SessionStorage: Send + Sync {
    /// Store `session` under its id, replacing any previous value.
    async fn save(&self, session: AuthSession) -> AuthResult<()>;

    /// Load a session by id. `Ok(None)` if absent.
    async fn load(&self, session_id: &str) -> AuthResult<Option<AuthSession>>;

    /// Remove a session. Returns whether it existed.
    async fn delete(&self, session_id: &str) -> AuthResult<bool>;

    /// All stored sessions, in no particular order.
    async fn list_all(&self) -> AuthResult<Vec<AuthSession>>;

    /// Store `session` only if a session with its id is already stored.
    ///
    /// Returns whether the write happened. The check and the write must be
    /// atomic with respect to every other operation.
    async fn replace(&self, session: AuthSession) -> AuthResult<bool>;

    /// Remove a session only if `predicate` holds for the stored value.
    ///
    /// Returns whether it was removed. The check and the removal must be
    /// atomic with respect to every other operation.
    async fn delete_if(
        &self,
        session_id: &str,
        predicate: &(dyn for<'s> Fn(&'s AuthSession) -> bool + Send + Sync),
    ) -> AuthResult<bool>;

    /// Set `last_used_at` on a stored session and return the updated copy.
    ///
    /// The default implementation loads and saves; backends that can update
    /// in place should override it.
    async fn touch(&self, session_id: &str, at: DateTime<Utc>) -> AuthResult<Option<AuthSession>> {
        let Some(mut session) = self.load(session_id).await? else {
            return Ok(None);
        };
        session.last_used_at = at;
        self.save(session.clone()).await?;
        Ok(Some(session))
    }
}

/// In-memory session storage.
#[derive(Debug, Clone, Default)]
pub struct MemorySessionStorage {
    sessions: Arc<RwLock<HashMap<String, AuthSession>>>,
}

impl MemorySessionStorage {
    /// Create empty storage.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored sessions.
    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    /// Whether storage is empty.
    pub async fn is_empty(&self) -> bool {
        self.sessions.read().await.is_empty()
    }
}

#[async_trait]
impl SessionStorage for MemorySessionStorage {
    async fn save(&self, session: AuthSession) -> AuthResult<()> {
        debug!(session_id = %session.session_id, auth_type = %session.auth_type, "Saving session");
        self.sessions
            .write()
            .await
            .insert(session.session_id.clone(), session);
        Ok(())
    }

    async fn load(&self, session_id: &str) -> AuthResult<Option<AuthSession>> {
        Ok(self.sessions.read().await.get(session_id).cloned())
    }

    async fn delete(&self, session_id: &str) -> AuthResult<bool> {
        let removed = self.sessions.write().await.remove(session_id).is_some();
        if removed {
            debug!(session_id = %session_id, "Deleted session");
        }
        Ok(removed)
    }

    async fn list_all(&self) -> AuthResult<Vec<AuthSession>> {
        Ok(self.sessions.read().await.values().cloned().collect())
    }

    async fn replace(&self, session: AuthSession) -> AuthResult<bool> {
        let mut sessions = self.sessions.write().await;
        match sessions.get_mut(&session.session_id) {
            Some(stored) => {
                *stored = session;
                Ok(true)
            }
            None => {
                debug!(session_id = %session.session_id, "Not replacing missing session");
                Ok(false)
            }
        }
    }

    async fn delete_if(
        &self,
        session_id: &str,
        predicate: &(dyn for<'s> Fn(&'s AuthSession) -> bool + Send + Sync),
    ) -> AuthResult<bool> {
        let mut sessions = self.sessions.write().await;
        if !sessions.get(session_id).is_some_and(|s| predicate(s)) {
            return Ok(false);
        }
        sessions.remove(session_id);
        debug!(session_id = %session_id, "Deleted session");
        Ok(true)
    }

    async fn touch(&self, session_id: &str, at: DateTime<Utc>) -> AuthResult<Option<AuthSession>> {
        let mut sessions = self.sessions.write().await;
        Ok(sessions.get_mut(session_id).map(|session| {
            session.last_used_at = at;
            session.clone()
        }))
    }
}
