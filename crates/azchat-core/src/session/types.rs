//! Session types

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::llm::ChatMessage;

/// Server-side state of one browser session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionState {
    /// Conversation identifier (completions mode)
    #[serde(default)]
    pub conversation_id: Option<String>,
    /// Conversation history in chronological order (completions mode)
    #[serde(default)]
    pub messages: Vec<ChatMessage>,
    /// Remote thread identifier (assistant mode)
    #[serde(default)]
    pub thread_id: Option<String>,
    /// Session creation timestamp
    pub created_at: DateTime<Utc>,
    /// Last update timestamp
    pub updated_at: DateTime<Utc>,
    /// After this instant the session is treated as absent
    pub expires_at: DateTime<Utc>,
}

impl SessionState {
    /// Create an empty session that lives for `lifetime`
    pub fn new(lifetime: Duration) -> Self {
        let now = Utc::now();
        Self {
            conversation_id: None,
            messages: Vec::new(),
            thread_id: None,
            created_at: now,
            updated_at: now,
            expires_at: now + lifetime,
        }
    }

    /// Mark the session as used now and push its expiry out by `lifetime`
    pub fn touch(&mut self, lifetime: Duration) {
        let now = Utc::now();
        self.updated_at = now;
        self.expires_at = now + lifetime;
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }

    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Utc::now())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_creation() {
        let state = SessionState::new(Duration::hours(8));
        assert!(state.conversation_id.is_none());
        assert!(state.thread_id.is_none());
        assert!(state.messages.is_empty());
        assert_eq!(state.expires_at - state.created_at, Duration::hours(8));
        assert!(!state.is_expired());
    }

    #[test]
    fn test_expiry() {
        let state = SessionState::new(Duration::seconds(10));
        assert!(!state.is_expired_at(state.created_at + Duration::seconds(9)));
        assert!(state.is_expired_at(state.created_at + Duration::seconds(10)));
    }

    #[test]
    fn test_touch_extends_expiry() {
        let mut state = SessionState::new(Duration::seconds(1));
        state.touch(Duration::days(7));
        assert!(state.expires_at > state.created_at + Duration::days(6));
    }
}
