//! ---
//! mtwin_section: "05-networking-external-interfaces"
//! mtwin_subsection: "module"
//! mtwin_type: "source"
//! mtwin_scope: "code"
//! mtwin_description: "REST control surface for simulation sessions."
//! mtwin_version: "v0.1.0-prealpha"
//! mtwin_owner: "tbd"
//! ---
//! REST control surface consumed by external API clients. Thin by design:
//! every operation maps one-to-one onto the [`SessionManager`] contract.

use std::net::{SocketAddr, TcpListener as StdTcpListener};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tower_http::trace::TraceLayer;
use tracing::{error, info};
use uuid::Uuid;

use m_twin_common::config::SessionMode;
use m_twin_model::ModelSnapshot;
use m_twin_session::{SessionError, SessionManager, SessionStatus};

/// Shared API state exposed to handlers.
pub struct ApiState {
    manager: Arc<SessionManager>,
    default_mode: SessionMode,
    version: String,
    start: Instant,
}

impl ApiState {
    pub fn new(manager: Arc<SessionManager>, default_mode: SessionMode, version: String) -> Self {
        Self {
            manager,
            default_mode,
            version,
            start: Instant::now(),
        }
    }

    pub fn manager(&self) -> &Arc<SessionManager> {
        &self.manager
    }

    fn daemon_status(&self) -> DaemonStatus {
        DaemonStatus {
            version: self.version.clone(),
            default_mode: self.default_mode,
            uptime_seconds: self.start.elapsed().as_secs(),
            session_count: self.manager.list().len(),
        }
    }
}

impl std::fmt::Debug for ApiState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiState")
            .field("version", &self.version)
            .field("default_mode", &self.default_mode)
            .finish_non_exhaustive()
    }
}

/// Handle to the running API server.
#[derive(Debug)]
pub struct ApiServer {
    addr: SocketAddr,
    shutdown: Option<oneshot::Sender<()>>,
    task: JoinHandle<Result<()>>,
}

impl ApiServer {
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    pub async fn shutdown(mut self) -> Result<()> {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        match self.task.await {
            Ok(result) => result,
            Err(err) => Err(err.into()),
        }
    }
}

/// Spawn the REST API server with graceful shutdown.
pub fn spawn_api_server(state: Arc<ApiState>, addr: SocketAddr) -> Result<ApiServer> {
    let router = Router::new()
        .route("/api/status", get(get_daemon_status))
        .route("/api/sessions", get(list_sessions).post(create_session))
        .route("/api/sessions/:id", get(get_session))
        .route("/api/sessions/:id/start", post(start_session))
        .route("/api/sessions/:id/pause", post(pause_session))
        .route("/api/sessions/:id/resume", post(resume_session))
        .route("/api/sessions/:id/stop", post(stop_session))
        .with_state(state)
        .layer(TraceLayer::new_for_http());

    let listener = StdTcpListener::bind(addr)
        .with_context(|| format!("failed to bind API listener {addr}"))?;
    listener
        .set_nonblocking(true)
        .context("failed to configure API listener as non-blocking")?;
    let local_addr = listener
        .local_addr()
        .context("failed to read API listener address")?;
    let tcp_listener =
        TcpListener::from_std(listener).context("failed to create tokio listener")?;

    let (shutdown_tx, shutdown_rx) = oneshot::channel();
    let handle: JoinHandle<Result<()>> = tokio::spawn(async move {
        info!(address = %local_addr, "api server listening");
        if let Err(err) = axum::serve(tcp_listener, router)
            .with_graceful_shutdown(async move {
                let _ = shutdown_rx.await;
            })
            .await
        {
            error!(address = %local_addr, error = %err, "api server exited with error");
            return Err(err.into());
        }
        Ok(())
    });

    Ok(ApiServer {
        addr: local_addr,
        shutdown: Some(shutdown_tx),
        task: handle,
    })
}

#[derive(Debug, Serialize)]
struct DaemonStatus {
    version: String,
    default_mode: SessionMode,
    uptime_seconds: u64,
    session_count: usize,
}

#[derive(Debug, Deserialize)]
struct CreateSessionRequest {
    /// Inline model snapshot. Exactly one of `model` and `model_path` must
    /// be provided.
    model: Option<ModelSnapshot>,
    /// Path to a snapshot JSON document on the daemon host.
    model_path: Option<PathBuf>,
    mode: Option<SessionMode>,
    tick_interval_ms: Option<u64>,
}

#[derive(Debug, Serialize)]
struct CreateSessionResponse {
    session_id: Uuid,
}

#[derive(Debug, Serialize)]
struct ControlAck {
    session_id: Uuid,
    accepted: bool,
}

#[derive(Debug, Serialize)]
struct ErrorResponse {
    message: String,
}

#[derive(Debug)]
struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = Json(ErrorResponse {
            message: self.message,
        });
        (self.status, body).into_response()
    }
}

impl From<SessionError> for ApiError {
    fn from(err: SessionError) -> Self {
        let status = match &err {
            SessionError::NotFound { .. } => StatusCode::NOT_FOUND,
            SessionError::Configuration(_) | SessionError::Model(_) => StatusCode::BAD_REQUEST,
            SessionError::InvalidTransition { .. } => StatusCode::CONFLICT,
            SessionError::Step(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        ApiError::new(status, err.to_string())
    }
}

async fn get_daemon_status(State(state): State<Arc<ApiState>>) -> Json<DaemonStatus> {
    Json(state.daemon_status())
}

async fn list_sessions(State(state): State<Arc<ApiState>>) -> Json<Vec<SessionStatus>> {
    Json(state.manager.list())
}

async fn create_session(
    State(state): State<Arc<ApiState>>,
    Json(request): Json<CreateSessionRequest>,
) -> Result<(StatusCode, Json<CreateSessionResponse>), ApiError> {
    let snapshot = match (request.model, request.model_path) {
        (Some(snapshot), None) => snapshot,
        (None, Some(path)) => ModelSnapshot::from_path(&path)
            .map_err(|err| ApiError::new(StatusCode::BAD_REQUEST, err.to_string()))?,
        _ => {
            return Err(ApiError::new(
                StatusCode::BAD_REQUEST,
                "provide exactly one of 'model' or 'model_path'",
            ))
        }
    };
    let mode = request.mode.unwrap_or(state.default_mode);
    let tick_interval = request.tick_interval_ms.map(Duration::from_millis);
    let session_id = state.manager.create(snapshot, mode, tick_interval);
    Ok((
        StatusCode::CREATED,
        Json(CreateSessionResponse { session_id }),
    ))
}

async fn get_session(
    State(state): State<Arc<ApiState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<SessionStatus>, ApiError> {
    Ok(Json(state.manager.status(id)?))
}

async fn start_session(
    State(state): State<Arc<ApiState>>,
    Path(id): Path<Uuid>,
) -> Result<(StatusCode, Json<ControlAck>), ApiError> {
    state.manager.start(id).await?;
    Ok(control_ack(id))
}

async fn pause_session(
    State(state): State<Arc<ApiState>>,
    Path(id): Path<Uuid>,
) -> Result<(StatusCode, Json<ControlAck>), ApiError> {
    state.manager.pause(id)?;
    Ok(control_ack(id))
}

async fn resume_session(
    State(state): State<Arc<ApiState>>,
    Path(id): Path<Uuid>,
) -> Result<(StatusCode, Json<ControlAck>), ApiError> {
    state.manager.resume(id)?;
    Ok(control_ack(id))
}

async fn stop_session(
    State(state): State<Arc<ApiState>>,
    Path(id): Path<Uuid>,
) -> Result<(StatusCode, Json<ControlAck>), ApiError> {
    state.manager.stop(id).await?;
    Ok(control_ack(id))
}

fn control_ack(session_id: Uuid) -> (StatusCode, Json<ControlAck>) {
    (
        StatusCode::ACCEPTED,
        Json(ControlAck {
            session_id,
            accepted: true,
        }),
    )
}
