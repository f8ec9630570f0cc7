//! Provider registry
//!
//! Maps auth type tags to the provider that handles them. A registry is
//! created by the host and handed to the [`SessionManager`](crate::SessionManager);
//! there is no process-wide instance.

use crate::error::{AuthError, AuthResult};
use crate::provider::AuthProvider;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::info;

/// Auth type → provider table with unique tags.
#[derive(Default)]
pub struct ProviderRegistry {
    providers: RwLock<HashMap<String, Arc<dyn AuthProvider>>>,
}

impl std::fmt::Debug for ProviderRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderRegistry").finish_non_exhaustive()
    }
}

impl ProviderRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `provider` under its [`auth_type`](AuthProvider::auth_type).
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::DuplicateProvider`] if the tag is taken. The
    /// existing provider stays registered.
    pub async fn register(&self, provider: Arc<dyn AuthProvider>) -> AuthResult<()> {
        let auth_type = provider.auth_type().to_string();

        let mut providers = self.providers.write().await;
        if providers.contains_key(&auth_type) {
            return Err(AuthError::DuplicateProvider(auth_type));
        }

        providers.insert(auth_type.clone(), provider);
        info!(auth_type = %auth_type, "Auth provider registered");
        Ok(())
    }

    /// Provider for `auth_type`, if any.
    pub async fn get(&self, auth_type: &str) -> Option<Arc<dyn AuthProvider>> {
        self.providers.read().await.get(auth_type).cloned()
    }

    /// Provider for `auth_type`.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::ProviderNotFound`] if nothing handles the tag.
    pub async fn require(&self, auth_type: &str) -> AuthResult<Arc<dyn AuthProvider>> {
        self.get(auth_type)
            .await
            .ok_or_else(|| AuthError::ProviderNotFound(auth_type.to_string()))
    }

    /// Whether a provider handles `auth_type`.
    pub async fn contains(&self, auth_type: &str) -> bool {
        self.providers.read().await.contains_key(auth_type)
    }

    /// Registered auth types, sorted.
    pub async fn auth_types(&self) -> Vec<String> {
        let mut types: Vec<String> = self.providers.read().await.keys().cloned().collect();
        types.sort();
        types
    }
}
