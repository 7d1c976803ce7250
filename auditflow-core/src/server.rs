//! HTTP API built on axum.
//!
//! | Route | Response |
//! |---|---|
//! | `POST /runs` | `{run_id, created_at}` |
//! | `GET /runs` | `{runs: [...]}` most recent first |
//! | `GET /runs/{run_id}/status` | run status with per-stage state |
//! | `GET /runs/{run_id}/nodes` | `{nodes: [...]}` in pipeline order |
//! | `GET /runs/{run_id}/nodes/{stage_id}/scratchpad` | `{scratchpad}` |
//! | `GET /runs/{run_id}/artifacts/{name}` | stored JSON payload |
//! | `GET /health` | `{status, runs}` |

use axum::{
    Json, Router,
    extract::{Path, State},
    http::{StatusCode, header},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde::Deserialize;
use serde_json::json;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

use crate::error::AuditError;
use crate::pipeline::PipelineExecutor;
use crate::reporter::StatusReporter;

/// Shared state for the axum handlers.
#[derive(Debug, Clone)]
pub struct AppState {
    executor: PipelineExecutor,
    reporter: StatusReporter,
}

impl AppState {
    pub fn new(executor: PipelineExecutor) -> Self {
        let reporter =
            StatusReporter::new(executor.registry().clone(), executor.artifacts().clone());
        Self { executor, reporter }
    }

    pub fn executor(&self) -> &PipelineExecutor {
        &self.executor
    }

    pub fn reporter(&self) -> &StatusReporter {
        &self.reporter
    }
}

/// Error response with a JSON `{"error": ...}` body.
#[derive(Debug)]
pub enum ApiError {
    BadRequest(String),
    Audit(AuditError),
}

impl From<AuditError> for ApiError {
    fn from(err: AuditError) -> Self {
        ApiError::Audit(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::BadRequest(message) => (StatusCode::BAD_REQUEST, message),
            ApiError::Audit(err) if err.is_not_found() => (StatusCode::NOT_FOUND, err.to_string()),
            ApiError::Audit(err) => {
                error!(error = %err, "Request failed");
                (StatusCode::INTERNAL_SERVER_ERROR, err.to_string())
            }
        };
        (status, Json(json!({ "error": message }))).into_response()
    }
}

#[derive(Debug, Deserialize)]
pub struct CreateRunRequest {
    pub audit_id: String,
    pub audit_name: String,
}

/// Build the API router with permissive CORS and request tracing.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/runs", post(create_run_handler).get(list_runs_handler))
        .route("/runs/{run_id}/status", get(run_status_handler))
        .route("/runs/{run_id}/nodes", get(nodes_handler))
        .route(
            "/runs/{run_id}/nodes/{stage_id}/scratchpad",
            get(scratchpad_handler),
        )
        .route("/runs/{run_id}/artifacts/{name}", get(artifact_handler))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn health_handler(State(state): State<AppState>) -> impl IntoResponse {
    Json(json!({
        "status": "ok",
        "runs": state.executor.registry().len().await,
    }))
}

async fn create_run_handler(
    State(state): State<AppState>,
    Json(body): Json<CreateRunRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let audit_id = body.audit_id.trim();
    let audit_name = body.audit_name.trim();
    if audit_id.is_empty() || audit_name.is_empty() {
        return Err(ApiError::BadRequest(
            "audit_id and audit_name must not be empty".to_string(),
        ));
    }

    // The run continues on its own task; the handle is not awaited here.
    let (run, _handle) = state.executor.submit(audit_id, audit_name).await;
    Ok(Json(json!({
        "run_id": run.run_id,
        "created_at": run.created_at,
    })))
}

async fn list_runs_handler(State(state): State<AppState>) -> impl IntoResponse {
    Json(json!({ "runs": state.reporter.list().await }))
}

async fn run_status_handler(
    State(state): State<AppState>,
    Path(run_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    Ok(Json(state.reporter.status(&run_id).await?))
}

async fn nodes_handler(
    State(state): State<AppState>,
    Path(run_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let nodes = state.reporter.nodes(&run_id).await?;
    Ok(Json(json!({ "nodes": nodes })))
}

async fn scratchpad_handler(
    State(state): State<AppState>,
    Path((run_id, stage_id)): Path<(String, String)>,
) -> Result<impl IntoResponse, ApiError> {
    let scratchpad = state.reporter.scratchpad(&run_id, &stage_id).await?;
    Ok(Json(json!({ "scratchpad": scratchpad })))
}

async fn artifact_handler(
    State(state): State<AppState>,
    Path((run_id, name)): Path<(String, String)>,
) -> Result<impl IntoResponse, ApiError> {
    let raw = state.reporter.artifact(&run_id, &name).await?;
    Ok(([(header::CONTENT_TYPE, "application/json")], raw))
}

/// Bind `addr` and serve until Ctrl-C.
pub async fn run(state: AppState, addr: &str) -> Result<(), std::io::Error> {
    let app = router(state);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(addr = %listener.local_addr()?, "Audit API listening");
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("Shutdown signal received");
        })
        .await
}
