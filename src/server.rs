//! HTTP adapter that lets a web widget drive chat sessions.

use std::collections::{BTreeMap, HashMap};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use futures::stream::Stream;
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::sync::RwLock;
use tokio_stream::wrappers::BroadcastStream;
use uuid::Uuid;

use crate::error::{ChatError, Result};
use crate::message::Message;
use crate::responder::Responder;
use crate::session::{ChatSession, SessionSettings};
use crate::telemetry::TelemetryCollector;

pub const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_secs(30 * 60);

pub const DEFAULT_MAX_SESSIONS: usize = 1000;

#[derive(Clone)]
pub struct ChatServer {
    sessions: Arc<RwLock<HashMap<Uuid, ChatSession>>>,
    settings: SessionSettings,
    responder: Arc<dyn Responder>,
    telemetry: TelemetryCollector,
    idle_timeout: Duration,
    max_sessions: usize,
}

#[derive(Serialize, Deserialize, Debug)]
pub struct SessionView {
    pub id: Uuid,
    pub transcript: Vec<Message>,
    pub composing: bool,
    pub suggestions: Vec<String>,
}

impl SessionView {
    fn of(session: &ChatSession) -> Self {
        Self {
            id: session.id(),
            transcript: session.transcript(),
            composing: session.is_composing(),
            suggestions: session.visible_suggestions().to_vec(),
        }
    }
}

#[derive(Serialize, Deserialize, Debug)]
pub struct SubmitRequest {
    pub text: String,
}

#[derive(Serialize, Deserialize, Debug)]
pub struct StatsResponse {
    pub sessions: usize,
    pub rule_hits: BTreeMap<String, u64>,
}

fn not_found(id: Uuid) -> Response {
    (
        StatusCode::NOT_FOUND,
        Json(json!({ "error": ChatError::SessionNotFound(id.to_string()).to_string() })),
    )
        .into_response()
}

impl ChatServer {
    /// Sessions record into `telemetry`; any collector already set on
    /// `settings` is replaced.
    pub fn new(
        settings: SessionSettings,
        responder: Arc<dyn Responder>,
        telemetry: TelemetryCollector,
    ) -> Self {
        Self {
            sessions: Arc::new(RwLock::new(HashMap::new())),
            settings: settings.with_telemetry(telemetry.clone()),
            responder,
            telemetry,
            idle_timeout: DEFAULT_IDLE_TIMEOUT,
            max_sessions: DEFAULT_MAX_SESSIONS,
        }
    }

    /// Sessions with no outstanding reply and no new message for this long
    /// are closed by [`ChatServer::reap_idle`].
    pub fn with_idle_timeout(mut self, timeout: Duration) -> Self {
        self.idle_timeout = timeout;
        self
    }

    pub fn with_max_sessions(mut self, max_sessions: usize) -> Self {
        self.max_sessions = max_sessions;
        self
    }

    /// Close and forget idle or closed sessions. Returns how many were
    /// removed.
    pub async fn reap_idle(&self) -> usize {
        let mut sessions = self.sessions.write().await;
        let before = sessions.len();
        sessions.retain(|_, session| {
            let stale = session.is_closed()
                || (!session.is_composing() && session.idle_for() >= self.idle_timeout);
            if stale {
                session.close();
            }
            !stale
        });
        let reaped = before - sessions.len();
        if reaped > 0 {
            tracing::info!(reaped, remaining = sessions.len(), "reaped idle chat sessions");
        }
        reaped
    }

    fn spawn_reaper(&self) {
        let server = self.clone();
        let every = (self.idle_timeout / 4).max(Duration::from_secs(1));
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            loop {
                ticker.tick().await;
                server.reap_idle().await;
            }
        });
    }

    pub fn router(self) -> Router {
        let app_state = Arc::new(self);
        Router::new()
            .route("/health", get(Self::health))
            .route("/suggestions", get(Self::suggestions))
            .route("/stats", get(Self::stats))
            .route("/sessions", post(Self::open_session))
            .route(
                "/sessions/:id",
                get(Self::session).delete(Self::close_session),
            )
            .route("/sessions/:id/messages", post(Self::submit))
            .route("/sessions/:id/events", get(Self::events))
            .with_state(app_state)
    }

    pub async fn serve(self, addr: SocketAddr) -> Result<()> {
        let listener = tokio::net::TcpListener::bind(addr).await?;
        tracing::info!(%addr, "chat server listening");
        self.spawn_reaper();
        axum::serve(listener, self.router())
            .await
            .map_err(|err| ChatError::Server(err.to_string()))?;
        Ok(())
    }

    async fn find(&self, id: Uuid) -> Option<ChatSession> {
        self.sessions.read().await.get(&id).cloned()
    }

    async fn health() -> impl IntoResponse {
        "ok"
    }

    async fn suggestions(State(state): State<Arc<Self>>) -> impl IntoResponse {
        Json(state.settings.suggestions.clone())
    }

    async fn stats(State(state): State<Arc<Self>>) -> impl IntoResponse {
        Json(StatsResponse {
            sessions: state.sessions.read().await.len(),
            rule_hits: state.telemetry.rule_hits(),
        })
    }

    async fn open_session(State(state): State<Arc<Self>>) -> Response {
        if state.sessions.read().await.len() >= state.max_sessions {
            state.reap_idle().await;
        }

        let mut sessions = state.sessions.write().await;
        if sessions.len() >= state.max_sessions {
            tracing::warn!(limit = state.max_sessions, "refusing new chat session");
            return (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(json!({ "error": "too many open chat sessions" })),
            )
                .into_response();
        }

        let session = ChatSession::open(state.settings.clone(), Arc::clone(&state.responder));
        let view = SessionView::of(&session);
        sessions.insert(session.id(), session);
        (StatusCode::CREATED, Json(view)).into_response()
    }

    async fn session(State(state): State<Arc<Self>>, Path(id): Path<Uuid>) -> Response {
        match state.find(id).await {
            Some(session) => Json(SessionView::of(&session)).into_response(),
            None => not_found(id),
        }
    }

    async fn submit(
        State(state): State<Arc<Self>>,
        Path(id): Path<Uuid>,
        Json(payload): Json<SubmitRequest>,
    ) -> Response {
        match state.find(id).await {
            Some(session) => {
                session.submit(&payload.text);
                (StatusCode::ACCEPTED, Json(SessionView::of(&session))).into_response()
            }
            None => not_found(id),
        }
    }

    async fn close_session(State(state): State<Arc<Self>>, Path(id): Path<Uuid>) -> Response {
        match state.sessions.write().await.remove(&id) {
            Some(session) => {
                session.close();
                StatusCode::NO_CONTENT.into_response()
            }
            None => not_found(id),
        }
    }

    async fn events(State(state): State<Arc<Self>>, Path(id): Path<Uuid>) -> Response {
        let Some(session) = state.find(id).await else {
            return not_found(id);
        };
        Sse::new(session_events(&session))
            .keep_alive(KeepAlive::default())
            .into_response()
    }
}

fn session_events(
    session: &ChatSession,
) -> impl Stream<Item = std::result::Result<Event, axum::Error>> {
    BroadcastStream::new(session.subscribe()).filter_map(|msg| async move {
        // Lagged receivers skip what they missed.
        let event = msg.ok()?;
        Some(Event::default().json_data(event))
    })
}
