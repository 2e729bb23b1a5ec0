//! Session storage traits and types for agent conversation state.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;

/// Opaque per-session key/value state.
pub type SessionState = HashMap<String, serde_json::Value>;

pub type SessionResult<T> = std::result::Result<T, SessionError>;

/// Errors surfaced by session stores.
///
/// Wrappers such as [`ImplicitSessionStore`](super::ImplicitSessionStore)
/// pass these through untouched.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    #[error("session already exists: {app_name}/{user_id}/{session_id}")]
    AlreadyExists {
        app_name: String,
        user_id: String,
        session_id: String,
    },
    #[error("session not found: {app_name}/{user_id}/{session_id}")]
    NotFound {
        app_name: String,
        user_id: String,
        session_id: String,
    },
    #[error("session backend returned {status}: {body}")]
    Backend { status: u16, body: String },
    #[error("session transport error: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("malformed session payload: {0}")]
    Decode(String),
}

/// Composite key identifying a unique session.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct SessionKey {
    pub app_name: String,
    pub user_id: String,
    pub session_id: String,
}

impl SessionKey {
    pub fn new(app_name: &str, user_id: &str, session_id: &str) -> Self {
        Self {
            app_name: app_name.to_string(),
            user_id: user_id.to_string(),
            session_id: session_id.to_string(),
        }
    }
}

/// A tracked conversation session.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Session {
    pub id: String,
    pub app_name: String,
    pub user_id: String,
    #[serde(default)]
    pub state: SessionState,
    #[serde(default)]
    pub events: Vec<SessionEvent>,
    pub last_update_time: DateTime<Utc>,
}

impl Session {
    pub fn key(&self) -> SessionKey {
        SessionKey::new(&self.app_name, &self.user_id, &self.id)
    }
}

/// A single entry in a session's conversation history.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SessionEvent {
    pub id: String,
    pub author: String,
    pub content: String,
    pub timestamp: DateTime<Utc>,
}

/// Read-side filter for the events returned with a session.
#[derive(Debug, Clone, Default)]
pub struct GetSessionConfig {
    /// Keep only the most recent N events.
    pub num_recent_events: Option<usize>,
    /// Keep only events at or after this instant.
    pub after_timestamp: Option<DateTime<Utc>>,
}

impl GetSessionConfig {
    /// Apply this filter to an event list, oldest first.
    pub fn apply(&self, events: &[SessionEvent]) -> Vec<SessionEvent> {
        let mut filtered: Vec<SessionEvent> = match self.after_timestamp {
            Some(after) => events
                .iter()
                .filter(|e| e.timestamp >= after)
                .cloned()
                .collect(),
            None => events.to_vec(),
        };
        if let Some(n) = self.num_recent_events {
            let start = filtered.len().saturating_sub(n);
            filtered.drain(..start);
        }
        filtered
    }
}

/// Sessions belonging to one (app, user) pair.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ListSessionsResponse {
    pub sessions: Vec<Session>,
}

/// Storage for agent conversation sessions, addressed by
/// (app name, user id, session id).
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Create a session. A missing `session_id` lets the store pick one.
    async fn create_session(
        &self,
        app_name: &str,
        user_id: &str,
        state: Option<SessionState>,
        session_id: Option<&str>,
    ) -> SessionResult<Session>;

    /// Fetch a session by id, if it exists.
    async fn get_session(
        &self,
        app_name: &str,
        user_id: &str,
        session_id: &str,
        config: Option<&GetSessionConfig>,
    ) -> SessionResult<Option<Session>>;

    /// List sessions for a user. Returned sessions carry no events.
    async fn list_sessions(&self, app_name: &str, user_id: &str)
        -> SessionResult<ListSessionsResponse>;

    /// Delete a session and its events.
    async fn delete_session(&self, app_name: &str, user_id: &str, session_id: &str)
        -> SessionResult<()>;

    /// Append an event to an existing session.
    async fn append_event(&self, session: &Session, event: SessionEvent)
        -> SessionResult<SessionEvent>;

    /// The name of this session store implementation.
    fn name(&self) -> &str;
}

#[async_trait]
impl<T: SessionStore + ?Sized> SessionStore for Arc<T> {
    async fn create_session(
        &self,
        app_name: &str,
        user_id: &str,
        state: Option<SessionState>,
        session_id: Option<&str>,
    ) -> SessionResult<Session> {
        (**self)
            .create_session(app_name, user_id, state, session_id)
            .await
    }

    async fn get_session(
        &self,
        app_name: &str,
        user_id: &str,
        session_id: &str,
        config: Option<&GetSessionConfig>,
    ) -> SessionResult<Option<Session>> {
        (**self)
            .get_session(app_name, user_id, session_id, config)
            .await
    }

    async fn list_sessions(
        &self,
        app_name: &str,
        user_id: &str,
    ) -> SessionResult<ListSessionsResponse> {
        (**self).list_sessions(app_name, user_id).await
    }

    async fn delete_session(
        &self,
        app_name: &str,
        user_id: &str,
        session_id: &str,
    ) -> SessionResult<()> {
        (**self).delete_session(app_name, user_id, session_id).await
    }

    async fn append_event(
        &self,
        session: &Session,
        event: SessionEvent,
    ) -> SessionResult<SessionEvent> {
        (**self).append_event(session, event).await
    }

    fn name(&self) -> &str {
        (**self).name()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn event(n: i64, at: DateTime<Utc>) -> SessionEvent {
        SessionEvent {
            id: format!("e{n}"),
            author: "user".into(),
            content: format!("message {n}"),
            timestamp: at + Duration::seconds(n),
        }
    }

    #[test]
    fn config_limits_to_most_recent_events() {
        let base = Utc::now();
        let events: Vec<_> = (0..5).map(|n| event(n, base)).collect();
        let cfg = GetSessionConfig {
            num_recent_events: Some(2),
            ..Default::default()
        };
        let kept = cfg.apply(&events);
        assert_eq!(kept.len(), 2);
        assert_eq!(kept[0].id, "e3");
        assert_eq!(kept[1].id, "e4");
    }

    #[test]
    fn config_filters_by_timestamp_then_count() {
        let base = Utc::now();
        let events: Vec<_> = (0..5).map(|n| event(n, base)).collect();
        let cfg = GetSessionConfig {
            num_recent_events: Some(10),
            after_timestamp: Some(base + Duration::seconds(3)),
        };
        let kept = cfg.apply(&events);
        assert_eq!(
            kept.iter().map(|e| e.id.as_str()).collect::<Vec<_>>(),
            vec!["e3", "e4"]
        );
    }

    #[test]
    fn default_config_keeps_everything() {
        let base = Utc::now();
        let events: Vec<_> = (0..3).map(|n| event(n, base)).collect();
        assert_eq!(GetSessionConfig::default().apply(&events), events);
    }

    #[test]
    fn session_key_matches_session_identity() {
        let session = Session {
            id: "s1".into(),
            app_name: "app".into(),
            user_id: "u1".into(),
            state: SessionState::new(),
            events: Vec::new(),
            last_update_time: Utc::now(),
        };
        assert_eq!(session.key(), SessionKey::new("app", "u1", "s1"));
    }
}
