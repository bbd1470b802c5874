//! HTTP surface.
//!
//! Each conversation is a server-side [`ConversationSession`] addressed by a
//! UUID. All sessions share one [`Pipeline`] and therefore one loaded index.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET`    | `/health` | Health check (version and index size) |
//! | `POST`   | `/sessions` | Start a session, returns its `id` |
//! | `GET`    | `/sessions/{id}` | Session state and transcript |
//! | `POST`   | `/sessions/{id}/ask` | Ask a question: `{"question": "..."}` |
//! | `DELETE` | `/sessions/{id}` | End the session |
//!
//! # Error Contract
//!
//! ```json
//! { "error": { "code": "generation_failed", "message": "...", "hint": "..." } }
//! ```
//!
//! | Code | Status |
//! |------|--------|
//! | `bad_request` | 400 |
//! | `not_found` | 404 |
//! | `busy` | 409 |
//! | `retrieval_failed`, `generation_failed` | 502 |
//! | `index_unavailable` | 503 |
//! | `retrieval_timeout`, `generation_timeout` | 504 |
//! | `internal`, `cancelled` | 500 |
//!
//! A second question on a session that is still answering is rejected with
//! `busy` rather than queued. The pipeline runs in its own task, so a client
//! that disconnects mid-answer still leaves the session idle afterwards.
//!
//! Sessions idle for longer than `[server].session_idle_secs` are dropped the
//! next time a session is created. A session awaiting an answer is never dropped.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, RwLock};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;
use uuid::Uuid;

use medibot_core::error::Notification;
use medibot_core::models::{AnswerRecord, ConversationTurn};
use medibot_core::session::{ConversationSession, SessionState};

use crate::chat;
use crate::config::Config;
use crate::pipeline::Pipeline;

struct SessionSlot {
    session: Mutex<ConversationSession>,
    /// Milliseconds since [`AppState::started`].
    last_used_ms: AtomicU64,
}

impl SessionSlot {
    fn is_expired(&self, now_ms: u64, idle_ttl: Duration) -> bool {
        let idle = now_ms.saturating_sub(self.last_used_ms.load(Ordering::Relaxed));
        if u128::from(idle) < idle_ttl.as_millis() {
            return false;
        }
        matches!(self.session.try_lock(), Ok(s) if s.state() == SessionState::Idle)
    }
}

type Sessions = Arc<RwLock<HashMap<Uuid, Arc<SessionSlot>>>>;

#[derive(Clone)]
struct AppState {
    pipeline: Arc<Pipeline>,
    sessions: Sessions,
    started: Instant,
    idle_ttl: Duration,
}

impl AppState {
    fn now_ms(&self) -> u64 {
        self.started.elapsed().as_millis() as u64
    }

    fn touch(&self, slot: &SessionSlot) {
        slot.last_used_ms.store(self.now_ms(), Ordering::Relaxed);
    }
}

/// Build the router without binding, so tests can serve it on any listener.
///
/// Sessions unused for `idle_ttl` are expired.
pub fn router(pipeline: Arc<Pipeline>, idle_ttl: Duration) -> Router {
    let state = AppState {
        pipeline,
        sessions: Arc::new(RwLock::new(HashMap::new())),
        started: Instant::now(),
        idle_ttl,
    };

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(handle_health))
        .route("/sessions", post(handle_create_session))
        .route(
            "/sessions/{id}",
            get(handle_get_session).delete(handle_delete_session),
        )
        .route("/sessions/{id}/ask", post(handle_ask))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

/// Serve on `[server].bind` until Ctrl-C.
pub async fn run_server(config: &Config, pipeline: Arc<Pipeline>) -> anyhow::Result<()> {
    let bind_addr = config.server.bind.clone();
    let app = router(
        pipeline,
        Duration::from_secs(config.server.session_idle_secs),
    );

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    println!("Medibot listening on http://{}", bind_addr);
    info!(bind = %bind_addr, "server started");

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await?;

    info!("server stopped");
    Ok(())
}

// ============ Error response ============

#[derive(Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    code: String,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    hint: Option<String>,
}

struct AppError {
    status: StatusCode,
    code: String,
    message: String,
    hint: Option<String>,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: ErrorDetail {
                code: self.code,
                message: self.message,
                hint: self.hint,
            },
        };
        (self.status, Json(body)).into_response()
    }
}

fn bad_request(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::BAD_REQUEST,
        code: "bad_request".to_string(),
        message: message.into(),
        hint: None,
    }
}

fn not_found(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::NOT_FOUND,
        code: "not_found".to_string(),
        message: message.into(),
        hint: None,
    }
}

fn internal(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::INTERNAL_SERVER_ERROR,
        code: "internal".to_string(),
        message: message.into(),
        hint: None,
    }
}

fn status_for(code: &str) -> StatusCode {
    match code {
        "busy" => StatusCode::CONFLICT,
        "retrieval_failed" | "generation_failed" => StatusCode::BAD_GATEWAY,
        "index_unavailable" => StatusCode::SERVICE_UNAVAILABLE,
        "retrieval_timeout" | "generation_timeout" => StatusCode::GATEWAY_TIMEOUT,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl From<Notification> for AppError {
    fn from(n: Notification) -> Self {
        let message = match n.detail {
            Some(detail) => format!("{} ({})", n.banner, detail),
            None => n.banner,
        };
        AppError {
            status: status_for(&n.code),
            code: n.code,
            message,
            hint: Some(n.hint),
        }
    }
}

fn parse_id(id: &str) -> Result<Uuid, AppError> {
    Uuid::parse_str(id).map_err(|_| not_found(format!("no session with id: {}", id)))
}

async fn find_session(state: &AppState, id: &str) -> Result<(Uuid, Arc<SessionSlot>), AppError> {
    let uuid = parse_id(id)?;
    let slot = state
        .sessions
        .read()
        .await
        .get(&uuid)
        .cloned()
        .ok_or_else(|| not_found(format!("no session with id: {}", id)))?;
    state.touch(&slot);
    Ok((uuid, slot))
}

async fn expire_idle_sessions(state: &AppState) {
    let now_ms = state.now_ms();
    let mut sessions = state.sessions.write().await;
    let before = sessions.len();
    sessions.retain(|_, slot| !slot.is_expired(now_ms, state.idle_ttl));
    let expired = before - sessions.len();
    if expired > 0 {
        info!(expired, remaining = sessions.len(), "expired idle sessions");
    }
}

// ============ GET /health ============

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
    chunks: Option<usize>,
}

async fn handle_health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        chunks: state.pipeline.index_stats().map(|s| s.chunks),
    })
}

// ============ POST /sessions ============

#[derive(Serialize)]
struct CreatedSession {
    id: Uuid,
}

async fn handle_create_session(
    State(state): State<AppState>,
) -> (StatusCode, Json<CreatedSession>) {
    expire_idle_sessions(&state).await;

    let id = Uuid::new_v4();
    let slot = SessionSlot {
        session: Mutex::new(ConversationSession::new()),
        last_used_ms: AtomicU64::new(state.now_ms()),
    };
    state.sessions.write().await.insert(id, Arc::new(slot));
    info!(session = %id, "session started");
    (StatusCode::CREATED, Json(CreatedSession { id }))
}

// ============ GET /sessions/{id} ============

#[derive(Serialize)]
struct SessionView {
    id: Uuid,
    state: SessionState,
    transcript: Vec<ConversationTurn>,
}

async fn handle_get_session(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<SessionView>, AppError> {
    let (uuid, slot) = find_session(&state, &id).await?;
    let session = slot.session.lock().await;
    Ok(Json(SessionView {
        id: uuid,
        state: session.state(),
        transcript: session.transcript().to_vec(),
    }))
}

// ============ POST /sessions/{id}/ask ============

#[derive(Deserialize)]
struct AskRequest {
    question: String,
}

#[derive(Serialize)]
struct AskResponse {
    #[serde(flatten)]
    record: AnswerRecord,
    turns: usize,
}

async fn handle_ask(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<AskRequest>,
) -> Result<Json<AskResponse>, AppError> {
    let question = req.question.trim().to_string();
    if question.is_empty() {
        return Err(bad_request("question must not be empty"));
    }

    let (_, slot) = find_session(&state, &id).await?;

    let pipeline = state.pipeline.clone();
    let task_slot = slot.clone();
    let task = tokio::spawn(async move {
        chat::ask_shared(
            &task_slot.session,
            &pipeline,
            &question,
            &CancellationToken::new(),
        )
        .await
    });

    let outcome = task
        .await
        .map_err(|e| internal(format!("answer task failed: {}", e)))?;
    state.touch(&slot);

    let (record, turns) = outcome?;
    Ok(Json(AskResponse { record, turns }))
}

// ============ DELETE /sessions/{id} ============

async fn handle_delete_session(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<StatusCode, AppError> {
    let uuid = parse_id(&id)?;
    let slot = state
        .sessions
        .write()
        .await
        .remove(&uuid)
        .ok_or_else(|| not_found(format!("no session with id: {}", id)))?;

    // An answer still in flight completes, but its turn is not recorded.
    slot.session.lock().await.end();
    info!(session = %uuid, "session ended");
    Ok(StatusCode::NO_CONTENT)
}
