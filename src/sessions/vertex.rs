//! Managed session store backed by the Agent Engine sessions REST API.
//!
//! Sessions live under a reasoning-engine resource
//! (`projects/{p}/locations/{l}/reasoningEngines/{id}`). The app name is not
//! part of the remote resource path; it is carried on the returned
//! [`Session`] only.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::{RequestBuilder, StatusCode};
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;

use crate::util::sanitize_api_error;

use super::traits::{
    GetSessionConfig, ListSessionsResponse, Session, SessionError, SessionEvent, SessionResult,
    SessionState, SessionStore,
};

const API_VERSION: &str = "v1beta1";
const CREATE_POLL_ATTEMPTS: usize = 5;

/// Session store that proxies every call to the managed platform.
pub struct VertexSessionStore {
    client: reqwest::Client,
    api_base: String,
    engine: String,
    access_token: Option<String>,
    poll_interval: Duration,
}

impl VertexSessionStore {
    /// `engine` is the full reasoning-engine resource name.
    pub fn new(
        client: reqwest::Client,
        api_base: &str,
        engine: &str,
        access_token: Option<String>,
    ) -> Self {
        Self {
            client,
            api_base: api_base.trim_end_matches('/').to_string(),
            engine: engine.trim_matches('/').to_string(),
            access_token,
            poll_interval: Duration::from_millis(250),
        }
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn engine(&self) -> &str {
        &self.engine
    }

    fn sessions_url(&self) -> String {
        format!("{}/{API_VERSION}/{}/sessions", self.api_base, self.engine)
    }

    fn session_url(&self, session_id: &str) -> SessionResult<String> {
        let session_id = checked_session_id(session_id)?;
        Ok(format!("{}/{session_id}", self.sessions_url()))
    }

    fn authorized(&self, builder: RequestBuilder) -> RequestBuilder {
        match &self.access_token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    async fn fetch_remote(&self, session_id: &str) -> SessionResult<Option<RemoteSession>> {
        let response = self
            .authorized(self.client.get(self.session_url(session_id)?))
            .send()
            .await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let response = check_status(response).await?;
        let remote = response
            .json::<RemoteSession>()
            .await
            .map_err(|e| SessionError::Decode(e.to_string()))?;
        Ok(Some(remote))
    }

    async fn fetch_events(&self, session_id: &str) -> SessionResult<Vec<SessionEvent>> {
        let events_url = format!("{}/events", self.session_url(session_id)?);
        let mut events = Vec::new();
        let mut page_token: Option<String> = None;
        loop {
            let mut request = self.client.get(&events_url);
            if let Some(token) = &page_token {
                request = request.query(&[("pageToken", token)]);
            }
            let response = check_status(self.authorized(request).send().await?).await?;
            let page = response
                .json::<RemoteEventPage>()
                .await
                .map_err(|e| SessionError::Decode(e.to_string()))?;
            events.extend(page.session_events.into_iter().map(RemoteEvent::into_event));
            match page.next_page_token.filter(|t| !t.is_empty()) {
                Some(token) => page_token = Some(token),
                None => break,
            }
        }
        Ok(events)
    }
}

async fn check_status(response: reqwest::Response) -> SessionResult<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(SessionError::Backend {
        status: status.as_u16(),
        body: sanitize_api_error(&body),
    })
}

/// A session id must stay a single path segment under `sessions/`.
fn checked_session_id(session_id: &str) -> SessionResult<&str> {
    let unsafe_char = |c: char| {
        matches!(c, '/' | '\\' | '?' | '#' | '%') || c.is_whitespace() || c.is_control()
    };
    if session_id.is_empty()
        || session_id == "."
        || session_id == ".."
        || session_id.contains(unsafe_char)
    {
        return Err(SessionError::InvalidArgument(format!(
            "invalid session id '{}'",
            session_id.escape_debug()
        )));
    }
    Ok(session_id)
}

/// `user_id="..."` list filter with quotes and backslashes escaped.
fn user_filter(user_id: &str) -> String {
    let escaped = user_id.replace('\\', "\\\\").replace('"', "\\\"");
    format!("user_id=\"{escaped}\"")
}

/// Extract the session id from a session or operation resource name.
fn session_id_from_name(name: &str) -> Option<&str> {
    let (_, rest) = name.split_once("/sessions/")?;
    let id = rest.split('/').next()?;
    (!id.is_empty()).then_some(id)
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RemoteSession {
    name: String,
    user_id: String,
    #[serde(default)]
    session_state: Option<SessionState>,
    #[serde(default)]
    update_time: Option<DateTime<Utc>>,
}

impl RemoteSession {
    fn into_session(self, app_name: &str) -> SessionResult<Session> {
        let id = session_id_from_name(&self.name)
            .ok_or_else(|| SessionError::Decode(format!("bad session name: {}", self.name)))?
            .to_string();
        Ok(Session {
            id,
            app_name: app_name.to_string(),
            user_id: self.user_id,
            state: self.session_state.unwrap_or_default(),
            events: Vec::new(),
            last_update_time: self.update_time.unwrap_or_else(Utc::now),
        })
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RemoteSessionPage {
    #[serde(default)]
    sessions: Vec<RemoteSession>,
    #[serde(default)]
    next_page_token: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RemoteOperation {
    name: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RemoteEventPage {
    #[serde(default)]
    session_events: Vec<RemoteEvent>,
    #[serde(default)]
    next_page_token: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RemoteEvent {
    name: String,
    author: String,
    #[serde(default)]
    content: Option<serde_json::Value>,
    timestamp: DateTime<Utc>,
}

impl RemoteEvent {
    fn into_event(self) -> SessionEvent {
        let id = self
            .name
            .rsplit('/')
            .next()
            .unwrap_or(self.name.as_str())
            .to_string();
        let content = self
            .content
            .as_ref()
            .and_then(|c| c.get("parts"))
            .and_then(|parts| parts.as_array())
            .map(|parts| {
                parts
                    .iter()
                    .filter_map(|p| p.get("text").and_then(|t| t.as_str()))
                    .collect::<Vec<_>>()
                    .join("")
            })
            .unwrap_or_default();
        SessionEvent {
            id,
            author: self.author,
            content,
            timestamp: self.timestamp,
        }
    }
}

#[async_trait]
impl SessionStore for VertexSessionStore {
    async fn create_session(
        &self,
        app_name: &str,
        user_id: &str,
        state: Option<SessionState>,
        session_id: Option<&str>,
    ) -> SessionResult<Session> {
        let mut request = self.client.post(self.sessions_url()).json(&json!({
            "userId": user_id,
            "sessionState": state.unwrap_or_default(),
        }));
        if let Some(id) = session_id {
            request = request.query(&[("sessionId", checked_session_id(id)?)]);
        }
        let response = check_status(self.authorized(request).send().await?).await?;
        let operation = response
            .json::<RemoteOperation>()
            .await
            .map_err(|e| SessionError::Decode(e.to_string()))?;
        let created_id = session_id_from_name(&operation.name)
            .ok_or_else(|| {
                SessionError::Decode(format!("operation names no session: {}", operation.name))
            })?
            .to_string();

        // Creation is a long-running operation; wait until the session is readable.
        for attempt in 0..CREATE_POLL_ATTEMPTS {
            if let Some(remote) = self.fetch_remote(&created_id).await? {
                tracing::debug!(session_id = %created_id, attempt, "remote session ready");
                return remote.into_session(app_name);
            }
            tokio::time::sleep(self.poll_interval).await;
        }
        Err(SessionError::NotFound {
            app_name: app_name.to_string(),
            user_id: user_id.to_string(),
            session_id: created_id,
        })
    }

    async fn get_session(
        &self,
        app_name: &str,
        user_id: &str,
        session_id: &str,
        config: Option<&GetSessionConfig>,
    ) -> SessionResult<Option<Session>> {
        let Some(remote) = self.fetch_remote(session_id).await? else {
            return Ok(None);
        };
        if remote.user_id != user_id {
            return Err(SessionError::InvalidArgument(format!(
                "session {session_id} does not belong to user {user_id}"
            )));
        }
        let mut session = remote.into_session(app_name)?;
        let events = self.fetch_events(session_id).await?;
        session.events = match config {
            Some(cfg) => cfg.apply(&events),
            None => events,
        };
        Ok(Some(session))
    }

    async fn list_sessions(
        &self,
        app_name: &str,
        user_id: &str,
    ) -> SessionResult<ListSessionsResponse> {
        let filter = user_filter(user_id);
        let mut sessions = Vec::new();
        let mut page_token: Option<String> = None;
        loop {
            let mut request = self
                .client
                .get(self.sessions_url())
                .query(&[("filter", filter.as_str())]);
            if let Some(token) = &page_token {
                request = request.query(&[("pageToken", token)]);
            }
            let response = check_status(self.authorized(request).send().await?).await?;
            let page = response
                .json::<RemoteSessionPage>()
                .await
                .map_err(|e| SessionError::Decode(e.to_string()))?;
            for remote in page.sessions {
                sessions.push(remote.into_session(app_name)?);
            }
            match page.next_page_token.filter(|t| !t.is_empty()) {
                Some(token) => page_token = Some(token),
                None => break,
            }
        }
        Ok(ListSessionsResponse { sessions })
    }

    async fn delete_session(
        &self,
        _app_name: &str,
        _user_id: &str,
        session_id: &str,
    ) -> SessionResult<()> {
        let response = self
            .authorized(self.client.delete(self.session_url(session_id)?))
            .send()
            .await?;
        check_status(response).await?;
        Ok(())
    }

    async fn append_event(
        &self,
        session: &Session,
        event: SessionEvent,
    ) -> SessionResult<SessionEvent> {
        let url = format!("{}:appendEvent", self.session_url(&session.id)?);
        let body = json!({
            "author": event.author,
            "invocationId": event.id,
            "timestamp": event.timestamp,
            "content": { "parts": [{ "text": event.content }] },
        });
        let response = self
            .authorized(self.client.post(url).json(&body))
            .send()
            .await?;
        check_status(response).await?;
        Ok(event)
    }

    fn name(&self) -> &str {
        "vertex"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{
        body::Bytes,
        extract::State,
        http::{HeaderMap, Method, StatusCode as HttpStatus, Uri},
        response::{IntoResponse, Response},
        Json, Router,
    };
    use parking_lot::Mutex;
    use serde_json::Value;
    use std::sync::Arc;

    const ENGINE: &str = "projects/p1/locations/us-central1/reasoningEngines/42";

    #[derive(Clone, Default)]
    struct MockEngine {
        sessions: Arc<Mutex<Vec<Value>>>,
        auth_headers: Arc<Mutex<Vec<String>>>,
        paths: Arc<Mutex<Vec<String>>>,
    }

    async fn handle(
        State(mock): State<MockEngine>,
        method: Method,
        uri: Uri,
        headers: HeaderMap,
        body: Bytes,
    ) -> Response {
        mock.paths.lock().push(uri.path().to_string());
        if let Some(auth) = headers.get("authorization").and_then(|v| v.to_str().ok()) {
            mock.auth_headers.lock().push(auth.to_string());
        }
        let prefix = format!("/{API_VERSION}/{ENGINE}/sessions");
        let Some(rest) = uri.path().strip_prefix(&prefix) else {
            return HttpStatus::NOT_FOUND.into_response();
        };
        let query = uri.query().unwrap_or("");

        match (method, rest) {
            (Method::POST, "") => {
                let req: Value = serde_json::from_slice(&body).unwrap();
                let id = query
                    .split('&')
                    .find_map(|kv| kv.strip_prefix("sessionId="))
                    .map(str::to_string)
                    .unwrap_or_else(|| format!("gen-{}", mock.sessions.lock().len() + 1));
                let name = format!("{ENGINE}/sessions/{id}");
                mock.sessions.lock().push(json!({
                    "name": name,
                    "userId": req["userId"],
                    "sessionState": req["sessionState"],
                    "updateTime": "2025-09-18T11:47:02Z",
                }));
                Json(json!({ "name": format!("{name}/operations/op-1"), "done": false }))
                    .into_response()
            }
            (Method::GET, "") => {
                let sessions: Vec<Value> = mock
                    .sessions
                    .lock()
                    .iter()
                    .filter(|s| {
                        let user = s["userId"].as_str().unwrap_or_default();
                        query.contains(&format!("%22{user}%22"))
                    })
                    .cloned()
                    .collect();
                Json(json!({ "sessions": sessions })).into_response()
            }
            (method, rest) => {
                let rest = rest.trim_start_matches('/');
                if let Some(id) = rest.strip_suffix("/events") {
                    let exists = mock
                        .sessions
                        .lock()
                        .iter()
                        .any(|s| s["name"] == format!("{ENGINE}/sessions/{id}"));
                    if !exists {
                        return HttpStatus::NOT_FOUND.into_response();
                    }
                    return Json(json!({
                        "sessionEvents": [{
                            "name": format!("{ENGINE}/sessions/{id}/events/ev-1"),
                            "author": "user",
                            "content": { "parts": [{ "text": "hello" }] },
                            "timestamp": "2025-09-18T11:47:03Z",
                        }]
                    }))
                    .into_response();
                }
                let name = format!("{ENGINE}/sessions/{rest}");
                let mut sessions = mock.sessions.lock();
                let pos = sessions.iter().position(|s| s["name"] == name);
                match (method, pos) {
                    (Method::GET, Some(i)) => Json(sessions[i].clone()).into_response(),
                    (Method::DELETE, Some(i)) => {
                        sessions.remove(i);
                        Json(json!({})).into_response()
                    }
                    _ => HttpStatus::NOT_FOUND.into_response(),
                }
            }
        }
    }

    async fn spawn_mock(mock: MockEngine) -> String {
        let app = Router::new().fallback(handle).with_state(mock);
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{addr}")
    }

    fn store(base: &str) -> VertexSessionStore {
        VertexSessionStore::new(
            reqwest::Client::new(),
            base,
            ENGINE,
            Some("test-token".into()),
        )
        .with_poll_interval(Duration::from_millis(10))
    }

    #[test]
    fn session_id_extraction() {
        assert_eq!(
            session_id_from_name(&format!("{ENGINE}/sessions/abc/operations/op")),
            Some("abc")
        );
        assert_eq!(session_id_from_name(&format!("{ENGINE}/sessions/abc")), Some("abc"));
        assert_eq!(session_id_from_name(ENGINE), None);
    }

    #[test]
    fn session_ids_must_be_single_segments() {
        for id in ["4200123412341234", "s1", "gen-7", "a..b"] {
            assert_eq!(checked_session_id(id).unwrap(), id);
        }
        for id in ["", ".", "..", "../x", "a/b", "a?b", "a#b", "a%2Fb", "a b", "a\\b"] {
            assert!(
                matches!(checked_session_id(id), Err(SessionError::InvalidArgument(_))),
                "{id:?} should be rejected"
            );
        }
    }

    #[test]
    fn user_filter_escapes_quotes() {
        assert_eq!(user_filter("u1"), r#"user_id="u1""#);
        assert_eq!(user_filter(r#"a"b\c"#), r#"user_id="a\"b\\c""#);
    }

    #[tokio::test]
    async fn traversal_ids_never_leave_the_sessions_collection() {
        let mock = MockEngine::default();
        let base = spawn_mock(mock.clone()).await;
        let store = store(&base);
        let id = "../../../../other/thing";

        let err = store.get_session("app", "u1", id, None).await.unwrap_err();
        assert!(matches!(err, SessionError::InvalidArgument(_)));
        let err = store.delete_session("app", "u1", id).await.unwrap_err();
        assert!(matches!(err, SessionError::InvalidArgument(_)));
        let err = store
            .create_session("app", "u1", None, Some(id))
            .await
            .unwrap_err();
        assert!(matches!(err, SessionError::InvalidArgument(_)));

        let proxy = crate::sessions::ImplicitSessionStore::new(store);
        let err = proxy.get("app", id, id).await.unwrap_err();
        assert!(matches!(err, SessionError::InvalidArgument(_)));

        assert!(mock.paths.lock().is_empty(), "{:?}", mock.paths.lock());
    }

    #[tokio::test]
    async fn get_missing_session_returns_none() {
        let base = spawn_mock(MockEngine::default()).await;
        let found = store(&base)
            .get_session("app", "u1", "nope", None)
            .await
            .unwrap();
        assert!(found.is_none());
    }

    #[tokio::test]
    async fn create_then_get_round_trips_through_remote() {
        let mock = MockEngine::default();
        let base = spawn_mock(mock.clone()).await;
        let store = store(&base);

        let created = store
            .create_session("app", "u1", None, Some("s1"))
            .await
            .unwrap();
        assert_eq!(created.id, "s1");
        assert_eq!(created.app_name, "app");

        let fetched = store
            .get_session("app", "u1", "s1", None)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(fetched.user_id, "u1");
        assert_eq!(fetched.events.len(), 1);
        assert_eq!(fetched.events[0].content, "hello");
        assert!(mock
            .auth_headers
            .lock()
            .iter()
            .all(|h| h == "Bearer test-token"));
    }

    #[tokio::test]
    async fn get_rejects_session_of_other_user() {
        let base = spawn_mock(MockEngine::default()).await;
        let store = store(&base);
        store.create_session("app", "u1", None, Some("s1")).await.unwrap();

        let err = store.get_session("app", "u2", "s1", None).await.unwrap_err();
        assert!(matches!(err, SessionError::InvalidArgument(_)));
    }

    #[tokio::test]
    async fn list_filters_by_user_and_delete_removes() {
        let base = spawn_mock(MockEngine::default()).await;
        let store = store(&base);
        store.create_session("app", "u1", None, Some("a")).await.unwrap();
        store.create_session("app", "u1", None, Some("b")).await.unwrap();
        store.create_session("app", "u2", None, Some("c")).await.unwrap();

        let listed = store.list_sessions("app", "u1").await.unwrap();
        let ids: Vec<&str> = listed.sessions.iter().map(|s| s.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b"]);

        store.delete_session("app", "u1", "a").await.unwrap();
        let listed = store.list_sessions("app", "u1").await.unwrap();
        assert!(listed.sessions.iter().all(|s| s.id != "a"));
    }

    #[tokio::test]
    async fn delete_missing_session_surfaces_backend_error() {
        let base = spawn_mock(MockEngine::default()).await;
        let err = store(&base)
            .delete_session("app", "u1", "ghost")
            .await
            .unwrap_err();
        assert!(matches!(err, SessionError::Backend { status: 404, .. }));
    }

    #[tokio::test]
    async fn implicit_proxy_over_remote_store() {
        let base = spawn_mock(MockEngine::default()).await;
        let proxy = crate::sessions::ImplicitSessionStore::new(store(&base));

        let session = proxy.get("app", "4200123412341234", "4200123412341234").await.unwrap();
        assert_eq!(session.id, "4200123412341234");
        let listed = proxy.list_sessions("app", "4200123412341234").await.unwrap();
        assert_eq!(listed.sessions.len(), 1);
    }
}
