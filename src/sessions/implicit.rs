//! Session store proxy whose lookups never come back empty.
//!
//! [`ImplicitSessionStore`] wraps any [`SessionStore`] and upgrades
//! `get_session` from "may be absent" to "always returns a session": when the
//! wrapped store has no session under the requested id, one is created with
//! that exact id and an empty state. Every other operation is delegated
//! unchanged, and errors from the wrapped store are returned as-is.
//!
//! # Concurrency
//!
//! By default the lookup and the implicit create are two independent calls on
//! the wrapped store. Two callers racing on the same absent id can both see
//! "absent" and both issue a create; what happens next is up to the store
//! (the in-memory store rejects the second with
//! [`SessionError::AlreadyExists`]). Call
//! [`with_serialized_creation`](ImplicitSessionStore::with_serialized_creation)
//! to run check-then-create under a per-session async mutex instead.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::OwnedMutexGuard;

use super::traits::{
    GetSessionConfig, ListSessionsResponse, Session, SessionEvent, SessionKey, SessionResult,
    SessionState, SessionStore,
};

type CreationLocks = Mutex<HashMap<SessionKey, Arc<tokio::sync::Mutex<()>>>>;

/// Proxy over a [`SessionStore`] that creates sessions on first lookup.
pub struct ImplicitSessionStore<S> {
    inner: S,
    creation_locks: Option<CreationLocks>,
}

impl<S: SessionStore> ImplicitSessionStore<S> {
    pub fn new(inner: S) -> Self {
        Self {
            inner,
            creation_locks: None,
        }
    }

    /// Serialize lookup-or-create per (app, user, session id).
    pub fn with_serialized_creation(mut self) -> Self {
        self.creation_locks = Some(Mutex::new(HashMap::new()));
        self
    }

    pub fn serializes_creation(&self) -> bool {
        self.creation_locks.is_some()
    }

    /// The wrapped store.
    pub fn inner(&self) -> &S {
        &self.inner
    }

    /// Fetch a session, creating it under `session_id` when it does not exist.
    pub async fn get(
        &self,
        app_name: &str,
        user_id: &str,
        session_id: &str,
    ) -> SessionResult<Session> {
        self.get_with_config(app_name, user_id, session_id, None)
            .await
    }

    /// [`get`](Self::get) with an event filter passed through to the store.
    pub async fn get_with_config(
        &self,
        app_name: &str,
        user_id: &str,
        session_id: &str,
        config: Option<&GetSessionConfig>,
    ) -> SessionResult<Session> {
        tracing::debug!(app_name, user_id, session_id, "get session");

        let _guard = match &self.creation_locks {
            Some(locks) => {
                let key = SessionKey::new(app_name, user_id, session_id);
                Some(CreationGuard::acquire(locks, key).await)
            }
            None => None,
        };

        if let Some(session) = self
            .inner
            .get_session(app_name, user_id, session_id, config)
            .await?
        {
            return Ok(session);
        }

        tracing::info!(
            app_name,
            user_id,
            session_id,
            store = self.inner.name(),
            "session not found, creating implicitly"
        );
        self.inner
            .create_session(app_name, user_id, None, Some(session_id))
            .await
    }
}

/// Holds the per-key creation mutex; drops its table entry once unused.
struct CreationGuard<'a> {
    table: &'a CreationLocks,
    key: SessionKey,
    permit: Option<OwnedMutexGuard<()>>,
}

impl<'a> CreationGuard<'a> {
    async fn acquire(table: &'a CreationLocks, key: SessionKey) -> CreationGuard<'a> {
        let lock = table
            .lock()
            .entry(key.clone())
            .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())))
            .clone();
        let permit = lock.lock_owned().await;
        CreationGuard {
            table,
            key,
            permit: Some(permit),
        }
    }
}

impl Drop for CreationGuard<'_> {
    fn drop(&mut self) {
        self.permit.take();
        let mut table = self.table.lock();
        // Only the table's own reference left: nobody holds or waits on it.
        if table
            .get(&self.key)
            .is_some_and(|lock| Arc::strong_count(lock) == 1)
        {
            table.remove(&self.key);
        }
    }
}

#[async_trait]
impl<S: SessionStore> SessionStore for ImplicitSessionStore<S> {
    async fn create_session(
        &self,
        app_name: &str,
        user_id: &str,
        state: Option<SessionState>,
        session_id: Option<&str>,
    ) -> SessionResult<Session> {
        self.inner
            .create_session(app_name, user_id, state, session_id)
            .await
    }

    /// Always `Some`: a missing session is created first.
    async fn get_session(
        &self,
        app_name: &str,
        user_id: &str,
        session_id: &str,
        config: Option<&GetSessionConfig>,
    ) -> SessionResult<Option<Session>> {
        self.get_with_config(app_name, user_id, session_id, config)
            .await
            .map(Some)
    }

    async fn list_sessions(
        &self,
        app_name: &str,
        user_id: &str,
    ) -> SessionResult<ListSessionsResponse> {
        self.inner.list_sessions(app_name, user_id).await
    }

    async fn delete_session(
        &self,
        app_name: &str,
        user_id: &str,
        session_id: &str,
    ) -> SessionResult<()> {
        self.inner
            .delete_session(app_name, user_id, session_id)
            .await
    }

    async fn append_event(
        &self,
        session: &Session,
        event: SessionEvent,
    ) -> SessionResult<SessionEvent> {
        self.inner.append_event(session, event).await
    }

    fn name(&self) -> &str {
        "implicit"
    }
}
