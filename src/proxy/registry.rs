//! Proxy session registry
//!
//! Thread-safe map of nickname to session. Creation registers the session
//! first and handshakes in the background so a slow or absent worker never
//! stalls the caller; a failed handshake removes the session again.

use std::collections::HashMap;
use std::sync::Arc;

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use super::config::ProxyConfig;
use super::error::ProxyError;
use super::session::ProxySession;

/// Connection target of a proxy session
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProxyEndpoint {
    pub nickname: String,
    pub hostname: String,
    pub port: u16,
}

/// Registry of nicknamed proxy sessions
pub struct ProxyRegistry {
    sessions: RwLock<HashMap<String, Arc<ProxySession>>>,
    config: ProxyConfig,
}

impl ProxyRegistry {
    /// Create an empty registry
    pub fn new(config: ProxyConfig) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            config,
        }
    }

    /// Connection targets of all registered sessions
    pub async fn list(&self) -> Vec<ProxyEndpoint> {
        self.sessions
            .read()
            .await
            .values()
            .map(|session| ProxyEndpoint {
                nickname: session.nickname().to_string(),
                hostname: session.hostname().to_string(),
                port: session.port(),
            })
            .collect()
    }

    /// Whether any session is registered
    pub async fn is_empty(&self) -> bool {
        self.sessions.read().await.is_empty()
    }

    /// Register a session and start its handshake in the background
    ///
    /// Returns once the session is registered. If the handshake fails the
    /// session is torn down and removed, as if it had never been created.
    pub async fn create(self: &Arc<Self>, endpoint: ProxyEndpoint) -> Result<(), ProxyError> {
        let session = {
            let mut sessions = self.sessions.write().await;
            if sessions.contains_key(&endpoint.nickname) {
                return Err(ProxyError::SessionAlreadyExists(endpoint.nickname));
            }

            let session = Arc::new(ProxySession::new(
                endpoint.nickname.clone(),
                endpoint.hostname,
                endpoint.port,
                self.config.clone(),
            ));
            sessions.insert(endpoint.nickname, Arc::clone(&session));
            session
        };

        tracing::info!(nickname = %session.nickname(), "Starting command proxy");

        let registry = Arc::clone(self);
        tokio::spawn(async move {
            if let Err(e) = session.handshake().await {
                tracing::warn!(
                    nickname = %session.nickname(),
                    error = %e,
                    "Handshake failed, removing command proxy"
                );
                registry.remove_and_close(session.nickname()).await;
            }
        });

        Ok(())
    }

    /// Forward one command to a session and return the worker's reply
    ///
    /// A session whose lazy-pirate attempts are exhausted is considered
    /// dead: it is removed from the registry and closed before the error
    /// is returned.
    pub async fn send(&self, nickname: &str, payload: Bytes) -> Result<Bytes, ProxyError> {
        let session = self
            .sessions
            .read()
            .await
            .get(nickname)
            .cloned()
            .ok_or_else(|| ProxyError::SessionNotFound(nickname.to_string()))?;

        match session.send(payload).await {
            Err(e @ ProxyError::RetriesExhausted { .. }) => {
                tracing::warn!(nickname = %nickname, "Command proxy exhausted retries, destroying session");
                self.remove_and_close(nickname).await;
                Err(e)
            }
            other => other,
        }
    }

    /// Remove and close one session
    pub async fn delete(&self, nickname: &str) -> Result<(), ProxyError> {
        if !self.remove_and_close(nickname).await {
            return Err(ProxyError::SessionNotFound(nickname.to_string()));
        }
        tracing::info!(nickname = %nickname, "Command proxy deleted");
        Ok(())
    }

    /// Remove and close every session
    pub async fn delete_all(&self) {
        let sessions: Vec<Arc<ProxySession>> =
            self.sessions.write().await.drain().map(|(_, s)| s).collect();

        let count = sessions.len();
        futures::future::join_all(sessions.iter().map(|session| session.close())).await;

        if count > 0 {
            tracing::info!(count, "All command proxies deleted");
        }
    }

    async fn remove_and_close(&self, nickname: &str) -> bool {
        let removed = self.sessions.write().await.remove(nickname);
        match removed {
            Some(session) => {
                session.close().await;
                true
            }
            None => false,
        }
    }
}
