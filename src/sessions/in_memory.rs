//! In-memory session store implementation.

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use std::collections::HashMap;

use super::traits::{
    GetSessionConfig, ListSessionsResponse, Session, SessionError, SessionEvent, SessionKey,
    SessionResult, SessionState, SessionStore,
};

/// An in-memory session store backed by a mutex-protected hash map.
///
/// List order is creation order, so the oldest session of a user comes first.
pub struct InMemorySessionStore {
    inner: Mutex<Inner>,
}

/// Map and creation order change together under one lock.
#[derive(Default)]
struct Inner {
    sessions: HashMap<SessionKey, Session>,
    order: Vec<SessionKey>,
}

impl InMemorySessionStore {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner::default()),
        }
    }

    pub fn len(&self) -> usize {
        self.inner.lock().sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for InMemorySessionStore {
    fn default() -> Self {
        Self::new()
    }
}

fn require_non_empty(field: &str, value: &str) -> SessionResult<()> {
    if value.trim().is_empty() {
        return Err(SessionError::InvalidArgument(format!(
            "{field} must not be empty"
        )));
    }
    Ok(())
}

#[async_trait]
impl SessionStore for InMemorySessionStore {
    async fn create_session(
        &self,
        app_name: &str,
        user_id: &str,
        state: Option<SessionState>,
        session_id: Option<&str>,
    ) -> SessionResult<Session> {
        require_non_empty("app_name", app_name)?;
        require_non_empty("user_id", user_id)?;

        let id = match session_id.map(str::trim) {
            Some(id) if !id.is_empty() => id.to_string(),
            _ => uuid::Uuid::new_v4().to_string(),
        };
        let key = SessionKey::new(app_name, user_id, &id);

        let session = Session {
            id,
            app_name: app_name.to_string(),
            user_id: user_id.to_string(),
            state: state.unwrap_or_default(),
            events: Vec::new(),
            last_update_time: Utc::now(),
        };

        let mut inner = self.inner.lock();
        if inner.sessions.contains_key(&key) {
            return Err(SessionError::AlreadyExists {
                app_name: key.app_name,
                user_id: key.user_id,
                session_id: key.session_id,
            });
        }
        inner.sessions.insert(key.clone(), session.clone());
        inner.order.push(key);
        Ok(session)
    }

    async fn get_session(
        &self,
        app_name: &str,
        user_id: &str,
        session_id: &str,
        config: Option<&GetSessionConfig>,
    ) -> SessionResult<Option<Session>> {
        let key = SessionKey::new(app_name, user_id, session_id);
        let inner = self.inner.lock();
        Ok(inner.sessions.get(&key).cloned().map(|mut session| {
            if let Some(cfg) = config {
                session.events = cfg.apply(&session.events);
            }
            session
        }))
    }

    async fn list_sessions(
        &self,
        app_name: &str,
        user_id: &str,
    ) -> SessionResult<ListSessionsResponse> {
        let inner = self.inner.lock();
        let results = inner
            .order
            .iter()
            .filter(|k| k.app_name == app_name && k.user_id == user_id)
            .filter_map(|k| inner.sessions.get(k))
            .map(|s| Session {
                events: Vec::new(),
                ..s.clone()
            })
            .collect();
        Ok(ListSessionsResponse { sessions: results })
    }

    async fn delete_session(
        &self,
        app_name: &str,
        user_id: &str,
        session_id: &str,
    ) -> SessionResult<()> {
        let key = SessionKey::new(app_name, user_id, session_id);
        let mut inner = self.inner.lock();
        if inner.sessions.remove(&key).is_some() {
            inner.order.retain(|k| *k != key);
        }
        Ok(())
    }

    async fn append_event(
        &self,
        session: &Session,
        event: SessionEvent,
    ) -> SessionResult<SessionEvent> {
        let key = session.key();
        let mut inner = self.inner.lock();
        match inner.sessions.get_mut(&key) {
            Some(stored) => {
                stored.events.push(event.clone());
                stored.last_update_time = Utc::now();
                Ok(event)
            }
            None => Err(SessionError::NotFound {
                app_name: key.app_name,
                user_id: key.user_id,
                session_id: key.session_id,
            }),
        }
    }

    fn name(&self) -> &str {
        "in_memory"
    }
}
