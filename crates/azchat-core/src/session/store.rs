//! Session storage interface and in-memory implementation

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;
use tracing::debug;

use crate::session::SessionState;
use crate::Result;

/// Key-value store of session state, keyed by session id
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Load a session; expired sessions are removed and reported as absent
    async fn load(&self, session_id: &str) -> Result<Option<SessionState>>;

    /// Insert or replace a session
    async fn save(&self, session_id: &str, state: &SessionState) -> Result<()>;

    /// Delete a session (no-op when absent)
    async fn remove(&self, session_id: &str) -> Result<()>;

    /// Delete every expired session, returning how many were removed
    async fn purge_expired(&self) -> Result<usize>;
}

/// In-memory session store
#[derive(Debug, Default, Clone)]
pub struct InMemorySessionStore {
    sessions: Arc<RwLock<HashMap<String, SessionState>>>,
}

impl InMemorySessionStore {
    /// Create a new session store
    pub fn new() -> Self {
        Self::default()
    }

    /// Get session count (expired entries included until purged)
    pub async fn session_count(&self) -> usize {
        self.sessions.read().await.len()
    }
}

#[async_trait]
impl SessionStore for InMemorySessionStore {
    async fn load(&self, session_id: &str) -> Result<Option<SessionState>> {
        {
            let sessions = self.sessions.read().await;
            match sessions.get(session_id) {
                Some(state) if !state.is_expired() => return Ok(Some(state.clone())),
                Some(_) => {}
                None => return Ok(None),
            }
        }

        debug!("Session {} expired", session_id);
        self.sessions.write().await.remove(session_id);
        Ok(None)
    }

    async fn save(&self, session_id: &str, state: &SessionState) -> Result<()> {
        self.sessions
            .write()
            .await
            .insert(session_id.to_string(), state.clone());
        Ok(())
    }

    async fn remove(&self, session_id: &str) -> Result<()> {
        self.sessions.write().await.remove(session_id);
        Ok(())
    }

    async fn purge_expired(&self) -> Result<usize> {
        let now = Utc::now();
        let mut sessions = self.sessions.write().await;
        let before = sessions.len();
        sessions.retain(|_, state| !state.is_expired_at(now));
        Ok(before - sessions.len())
    }
}
