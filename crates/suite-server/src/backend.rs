//! Host backend: session manager, providers and the expired-session sweeper.

use crate::config::ServerConfig;
use crate::tools::register_builtin_tools;
use async_trait::async_trait;
use std::sync::Arc;
use suite_auth::{ApiKeyProvider, HttpKeyValidator, SessionManager};
use suite_mcp::{McpServerError, McpServerResult, ServerBackend, ToolRegistry};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, info};

/// Backend wiring the built-in tools to one session manager.
pub struct HostBackend {
    config: ServerConfig,
    manager: SessionManager,
    sweeper: Mutex<Option<JoinHandle<()>>>,
}

impl HostBackend {
    /// Build the backend from configuration and register its auth providers.
    ///
    /// API keys are checked against `api_key_probe_url` when one is configured.
    pub async fn new(config: ServerConfig) -> McpServerResult<Self> {
        let provider = match &config.api_key_probe_url {
            Some(url) => {
                let validator = HttpKeyValidator::new(url.clone(), config.probe_timeout())
                    .map_err(|e| McpServerError::Internal(e.to_string()))?;
                info!(probe_url = %validator.probe_url(), "API keys are validated upstream");
                ApiKeyProvider::with_validator(Arc::new(validator))
            }
            None => ApiKeyProvider::new(),
        };

        let manager = SessionManager::default();
        manager
            .register_provider(Arc::new(provider))
            .await
            .map_err(|e| McpServerError::Internal(e.to_string()))?;

        Ok(Self {
            config,
            manager,
            sweeper: Mutex::new(None),
        })
    }
}

#[async_trait]
impl ServerBackend for HostBackend {
    async fn initialize(&self) -> McpServerResult<()> {
        let mut sweeper = self.sweeper.lock().await;
        if sweeper.is_none() {
            *sweeper = Some(self.manager.spawn_sweeper(self.config.sweep_interval()));
            debug!(
                interval_secs = self.config.sweep_interval_secs,
                "Session sweeper started"
            );
        }
        Ok(())
    }

    async fn register_tools(&self, registry: &Arc<ToolRegistry>) -> McpServerResult<()> {
        register_builtin_tools(registry, &self.manager, self.config.session_ttl_secs).await
    }

    async fn shutdown(&self) {
        if let Some(handle) = self.sweeper.lock().await.take() {
            handle.abort();
            debug!("Session sweeper stopped");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};
    use suite_auth::{AuthSession, SessionStorage};

    #[tokio::test]
    async fn test_registers_builtin_tools() {
        let backend = HostBackend::new(ServerConfig::default()).await.unwrap();
        let registry = Arc::new(ToolRegistry::new());

        backend.register_tools(&registry).await.unwrap();
        assert_eq!(registry.len().await, 5);
        assert!(registry.contains("api_key_login").await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_sweeper_lifecycle() {
        let config = ServerConfig {
            sweep_interval_secs: 30,
            ..ServerConfig::default()
        };
        let backend = HostBackend::new(config).await.unwrap();
        let expired = AuthSession::new("old", "api_key")
            .with_expires_at(Some(Utc::now() - Duration::minutes(1)));
        backend.manager.storage().save(expired).await.unwrap();

        backend.initialize().await.unwrap();
        tokio::time::sleep(std::time::Duration::from_secs(31)).await;
        assert!(backend.manager.storage().load("old").await.unwrap().is_none());

        backend.shutdown().await;
        assert!(backend.sweeper.lock().await.is_none());
    }

    #[tokio::test]
    async fn test_builds_probe_validator() {
        let config = ServerConfig {
            api_key_probe_url: Some("https://wiki.example.com".to_string()),
            ..ServerConfig::default()
        };
        let backend = HostBackend::new(config).await.unwrap();
        assert!(backend.manager.providers().contains("api_key").await);
    }
}
